//! Seller-owned product listings.

use common::{Money, Page, ProductId, ProductStatus, UserId};
use store::{Entity, MarketStore, NewProduct, Product, ProductChanges, ProductQuery};

use crate::{DomainError, Result};

/// Most images a listing may carry.
pub const MAX_IMAGES: usize = 5;

/// Input for a new listing. Status defaults to active.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub stock: i32,
    pub images: Vec<String>,
    pub status: Option<ProductStatus>,
}

fn check_images(images: &[String]) -> Result<()> {
    if images.len() > MAX_IMAGES {
        return Err(DomainError::Validation(format!(
            "A product can have at most {MAX_IMAGES} images"
        )));
    }
    Ok(())
}

/// Service for product listings.
#[derive(Clone)]
pub struct ProductService<S: MarketStore> {
    store: S,
}

impl<S: MarketStore> ProductService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, listing), fields(title = %listing.title))]
    pub async fn create(&self, seller_id: UserId, listing: NewListing) -> Result<Product> {
        check_images(&listing.images)?;

        let product = self
            .store
            .insert_product(NewProduct {
                seller_id,
                title: listing.title,
                description: listing.description,
                price: listing.price,
                category: listing.category,
                stock: listing.stock,
                images: listing.images,
                status: listing.status.unwrap_or_default(),
            })
            .await?;

        tracing::info!(product_id = %product.id, "Product listed");
        Ok(product)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product> {
        self.store
            .product_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Product, id))
    }

    pub async fn list(&self, page: Page, status: Option<ProductStatus>) -> Result<Vec<Product>> {
        Ok(self
            .store
            .list_products(ProductQuery {
                page,
                status,
                ..Default::default()
            })
            .await?)
    }

    /// Active listings in `category`.
    pub async fn list_by_category(&self, category: &str, page: Page) -> Result<Vec<Product>> {
        Ok(self
            .store
            .list_products(ProductQuery {
                page,
                category: Some(category.to_string()),
                status: Some(ProductStatus::Active),
                ..Default::default()
            })
            .await?)
    }

    pub async fn list_by_seller(&self, seller_id: UserId, page: Page) -> Result<Vec<Product>> {
        Ok(self
            .store
            .list_products(ProductQuery {
                page,
                seller_id: Some(seller_id),
                ..Default::default()
            })
            .await?)
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        actor: UserId,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Product> {
        if changes.is_empty() {
            return Err(DomainError::Validation("No fields to update".to_string()));
        }
        if let Some(ref images) = changes.images {
            check_images(images)?;
        }
        self.owned_by(actor, id).await?;

        self.store
            .update_product(id, changes)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Product, id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        actor: UserId,
        id: ProductId,
        status: ProductStatus,
    ) -> Result<Product> {
        self.update(
            actor,
            id,
            ProductChanges {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    /// Deletes a listing and every order placed on it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, actor: UserId, id: ProductId) -> Result<()> {
        self.owned_by(actor, id).await?;
        if !self.store.delete_product(id).await? {
            return Err(DomainError::not_found(Entity::Product, id));
        }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    async fn owned_by(&self, actor: UserId, id: ProductId) -> Result<Product> {
        let product = self.get(id).await?;
        if product.seller_id != actor {
            return Err(DomainError::Forbidden("Not your product".to_string()));
        }
        Ok(product)
    }
}
