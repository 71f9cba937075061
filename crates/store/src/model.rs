//! Records stored in the `users`, `products` and `orders` tables.
//!
//! Partial updates use explicit `*Changes` structs: every `Some` field is
//! written by its own setter in [`UserChanges::apply`] and friends, and the
//! Postgres implementation mirrors the same field list column by column.

use chrono::{DateTime, NaiveDate, Utc};
use common::{Money, OrderId, OrderStatus, Page, ProductId, ProductStatus, UserId};

use crate::{Result, StoreError};

/// A registered account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub phone: String,
    pub hashed_password: String,
    pub full_name: String,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub rating: f64,
    pub is_superuser: bool,
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub hashed_password: String,
    pub full_name: String,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub rating: f64,
}

impl NewUser {
    pub const DEFAULT_RATING: f64 = 5.0;
}

/// Self-service profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub phone: Option<String>,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.hashed_password.is_none()
            && self.full_name.is_none()
            && self.about.is_none()
            && self.avatar.is_none()
            && self.birth_date.is_none()
    }

    pub fn apply(self, user: &mut User) {
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(hashed_password) = self.hashed_password {
            user.hashed_password = hashed_password;
        }
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(about) = self.about {
            user.about = Some(about);
        }
        if let Some(avatar) = self.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(birth_date) = self.birth_date {
            user.birth_date = Some(birth_date);
        }
    }
}

/// A listing owned by a seller. `stock` never drops below zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub stock: i32,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub time_posted: DateTime<Utc>,
}

/// Fields required to insert a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub stock: i32,
    pub images: Vec<String>,
    pub status: ProductStatus,
}

impl NewProduct {
    pub(crate) fn check(&self) -> Result<()> {
        check_price(self.price)?;
        check_stock(self.stock)
    }
}

/// Seller-side product update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub stock: Option<i32>,
    pub images: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.stock.is_none()
            && self.images.is_none()
            && self.status.is_none()
    }

    pub(crate) fn check(&self) -> Result<()> {
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(stock) = self.stock {
            check_stock(stock)?;
        }
        Ok(())
    }

    pub fn apply(self, product: &mut Product) {
        if let Some(title) = self.title {
            product.title = title;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
        if let Some(status) = self.status {
            product.status = status;
        }
    }
}

/// Filters for product listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub page: Page,
    pub seller_id: Option<UserId>,
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
}

impl ProductQuery {
    pub(crate) fn matches(&self, product: &Product) -> bool {
        self.seller_id.is_none_or(|id| product.seller_id == id)
            && self
                .category
                .as_deref()
                .is_none_or(|category| product.category == category)
            && self.status.is_none_or(|status| product.status == status)
    }
}

/// A purchase of `quantity` units of one product.
///
/// `total_price` is the product price times quantity at placement time and is
/// never recomputed from the product's current price.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub quantity: i32,
    pub total_price: Money,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub message: Option<String>,
}

impl Order {
    /// Total for a new quantity at the unit price captured when the order was placed.
    pub fn repriced(&self, quantity: i32) -> Result<Money> {
        self.total_price
            .per_unit(self.quantity)
            .and_then(|unit| unit.checked_multiply(quantity))
            .ok_or_else(|| {
                StoreError::Constraint(format!("cannot reprice order {} to {quantity}", self.id))
            })
    }
}

/// Fields required to place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub quantity: i32,
    pub message: Option<String>,
}

/// Patch applied by [`OrderStore::update_order`](crate::OrderStore::update_order).
///
/// The store applies the fields as given; who may set which field is decided
/// by the caller.
#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub quantity: Option<i32>,
    pub message: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderChanges {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.message.is_none() && self.status.is_none()
    }

    /// Quantity handed back to product stock when this patch is applied to
    /// `order`. Negative when a larger quantity takes more stock.
    pub(crate) fn stock_returned(&self, order: &Order) -> i32 {
        if !order.status.reserves_stock() {
            return 0;
        }
        if self.status == Some(OrderStatus::Cancelled) {
            return order.quantity;
        }
        match self.quantity {
            Some(quantity) => order.quantity - quantity,
            None => 0,
        }
    }
}

/// Filters for order listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub page: Page,
    pub buyer_id: Option<UserId>,
    pub seller_id: Option<UserId>,
    pub product_id: Option<ProductId>,
    pub status: Option<OrderStatus>,
}

pub(crate) fn check_price(price: Money) -> Result<()> {
    if price.is_positive() {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!(
            "price must be positive, got {price}"
        )))
    }
}

pub(crate) fn check_stock(stock: i32) -> Result<()> {
    if stock >= 0 {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!(
            "stock must not be negative, got {stock}"
        )))
    }
}

/// Stock level after `delta` is added to `stock`.
///
/// A negative delta larger than the stock fails with `InsufficientStock`; a
/// sum past `i32::MAX` fails with `Constraint`.
pub(crate) fn adjusted_stock(product_id: ProductId, stock: i32, delta: i32) -> Result<i32> {
    if delta < 0 && stock < -delta {
        return Err(StoreError::InsufficientStock {
            product_id,
            requested: -delta,
            available: stock,
        });
    }
    let level = stock.checked_add(delta).ok_or_else(|| {
        StoreError::Constraint(format!("stock of product {product_id} would overflow"))
    })?;
    check_stock(level)?;
    Ok(level)
}

pub(crate) fn check_quantity(quantity: i32) -> Result<()> {
    if quantity > 0 {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!(
            "quantity must be positive, got {quantity}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(quantity: i32, total_cents: i64) -> Order {
        Order {
            id: OrderId::new(1),
            product_id: ProductId::new(1),
            buyer_id: UserId::new(1),
            quantity,
            total_price: Money::from_cents(total_cents),
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            message: None,
        }
    }

    #[test]
    fn repriced_uses_snapshot_unit_price() {
        let order = order(3, 3000);
        assert_eq!(order.repriced(5).unwrap(), Money::from_cents(5000));
    }

    #[test]
    fn user_changes_apply_only_present_fields() {
        let mut user = User {
            id: UserId::new(1),
            phone: "+1000".into(),
            hashed_password: "hash".into(),
            full_name: "Old".into(),
            about: None,
            avatar: None,
            birth_date: None,
            rating: 5.0,
            is_superuser: false,
        };
        let changes = UserChanges {
            full_name: Some("New".into()),
            about: Some("hello".into()),
            ..Default::default()
        };
        assert!(!changes.is_empty());
        changes.apply(&mut user);
        assert_eq!(user.full_name, "New");
        assert_eq!(user.about.as_deref(), Some("hello"));
        assert_eq!(user.phone, "+1000");
    }

    #[test]
    fn product_changes_reject_bad_values() {
        let changes = ProductChanges {
            price: Some(Money::zero()),
            ..Default::default()
        };
        assert!(matches!(changes.check(), Err(StoreError::Constraint(_))));

        let changes = ProductChanges {
            stock: Some(-1),
            ..Default::default()
        };
        assert!(matches!(changes.check(), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(0).is_err());
    }

    #[test]
    fn adjusted_stock_bounds() {
        let id = ProductId::new(7);
        assert_eq!(adjusted_stock(id, 10, -4).unwrap(), 6);
        assert_eq!(adjusted_stock(id, 10, 5).unwrap(), 15);
        assert!(matches!(
            adjusted_stock(id, 3, -4),
            Err(StoreError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
        assert!(matches!(
            adjusted_stock(id, i32::MAX, 5),
            Err(StoreError::Constraint(_))
        ));
    }

    #[test]
    fn stock_returned_by_patch() {
        let pending = order(3, 3000);
        let grow = OrderChanges {
            quantity: Some(5),
            ..Default::default()
        };
        assert_eq!(grow.stock_returned(&pending), -2);

        let cancel = OrderChanges {
            quantity: Some(5),
            status: Some(OrderStatus::Cancelled),
            ..Default::default()
        };
        assert_eq!(cancel.stock_returned(&pending), 3);

        let completed = Order {
            status: OrderStatus::Completed,
            ..pending
        };
        assert_eq!(grow.stock_returned(&completed), 0);
    }
}
