//! Product listing endpoints. Mutations are owner-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, ProductId, ProductStatus, UserId};
use domain::NewListing;
use serde::{Deserialize, Serialize};
use store::{MarketStore, Product, ProductChanges};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, CurrentUser, Pagination, ValidatedJson};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: String,
    #[validate(range(min = 1))]
    pub price_cents: i64,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub price_cents: Option<i64>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub images: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
}

#[derive(Deserialize, Validate)]
pub struct ProductStatusRequest {
    pub new_status: ProductStatus,
}

#[derive(Deserialize)]
pub struct ListProductsQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ProductStatus>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub stock: i32,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub time_posted: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            seller_id: p.seller_id,
            title: p.title,
            description: p.description,
            price_cents: p.price.cents(),
            category: p.category,
            stock: p.stock,
            images: p.images,
            status: p.status,
            time_posted: p.time_posted,
        }
    }
}

fn responses(products: Vec<Product>) -> Json<Vec<ProductResponse>> {
    Json(products.into_iter().map(ProductResponse::from).collect())
}

// -- Handlers --

/// POST /api/products
#[tracing::instrument(skip(state, req))]
pub async fn create<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(seller_id): CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .market
        .products
        .create(
            seller_id,
            NewListing {
                title: req.title,
                description: req.description,
                price: Money::from_cents(req.price_cents),
                category: req.category,
                stock: req.stock,
                images: req.images,
                status: req.status,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /api/products/{id}
pub async fn get<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<ProductResponse>, ApiError> {
    Ok(Json(state.market.products.get(id).await?.into()))
}

/// GET /api/products?skip&limit&status
pub async fn list<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<ListProductsQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let page = Pagination {
        skip: query.skip,
        limit: query.limit,
    }
    .page()?;
    Ok(responses(
        state.market.products.list(page, query.status).await?,
    ))
}

/// GET /api/products/category/{category}
pub async fn by_category<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(category): ApiPath<String>,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    Ok(responses(
        state
            .market
            .products
            .list_by_category(&category, params.page()?)
            .await?,
    ))
}

/// GET /api/products/my
pub async fn mine<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(seller_id): CurrentUser,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    Ok(responses(
        state
            .market
            .products
            .list_by_seller(seller_id, params.page()?)
            .await?,
    ))
}

/// PUT or PATCH /api/products/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<ProductId>,
    ValidatedJson(req): ValidatedJson<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let changes = ProductChanges {
        title: req.title,
        description: req.description,
        price: req.price_cents.map(Money::from_cents),
        category: req.category,
        stock: req.stock,
        images: req.images,
        status: req.status,
    };
    let product = state.market.products.update(actor, id, changes).await?;
    Ok(Json(product.into()))
}

/// PATCH /api/products/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn set_status<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<ProductId>,
    ValidatedJson(req): ValidatedJson<ProductStatusRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .market
        .products
        .set_status(actor, id, req.new_status)
        .await?;
    Ok(Json(product.into()))
}

/// DELETE /api/products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode, ApiError> {
    state.market.products.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
