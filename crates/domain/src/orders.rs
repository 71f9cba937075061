//! The order state machine.
//!
//! ```text
//! pending ──► confirmed ──► completed
//!    │            │
//!    └────────────┴──► cancelled
//! ```
//!
//! Placing an order takes its quantity out of product stock; cancelling or
//! deleting an order that still holds stock puts it back. Both happen in the
//! same store transaction as the order change. Events go out after commit.

use std::sync::Arc;

use common::{OrderId, OrderStatus, Page, ProductId, UserId};
use store::{Entity, MarketStore, NewOrder, Order, OrderChanges, OrderQuery, Product};

use crate::event::{EventPublisher, OrderEvent};
use crate::{DomainError, Result};

/// Buyer input for a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub product_id: ProductId,
    pub quantity: i32,
    pub message: Option<String>,
}

/// Patch for an existing order.
///
/// `quantity` may only be set by the buyer while the order is pending;
/// `status` only by the seller, subject to the transition table.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub quantity: Option<i32>,
    pub message: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.message.is_none() && self.status.is_none()
    }
}

/// Service for orders.
#[derive(Clone)]
pub struct OrderService<S: MarketStore> {
    store: S,
    events: Arc<dyn EventPublisher>,
}

impl<S: MarketStore> OrderService<S> {
    pub fn new(store: S, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    /// Places a pending order, taking `quantity` out of stock.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn place(&self, buyer_id: UserId, request: PlaceOrder) -> Result<Order> {
        if request.quantity <= 0 {
            return Err(DomainError::Validation(
                "Quantity must be positive".to_string(),
            ));
        }

        let placed = self
            .store
            .place_order(NewOrder {
                product_id: request.product_id,
                buyer_id,
                quantity: request.quantity,
                message: request.message,
            })
            .await
            .map_err(DomainError::from);

        let order = match placed {
            Ok(order) => order,
            Err(e) => {
                let reason = match &e {
                    DomainError::InsufficientStock { .. } => "insufficient_stock",
                    DomainError::NotFound { .. } => "not_found",
                    _ => "error",
                };
                metrics::counter!("orders_rejected_total", "reason" => reason).increment(1);
                tracing::info!(reason, "Order rejected");
                return Err(e);
            }
        };

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_price, "Order placed");
        self.events.publish(OrderEvent::created(&order));
        Ok(order)
    }

    /// Loads an order visible to its buyer or the product's seller.
    pub async fn get(&self, actor: UserId, id: OrderId) -> Result<Order> {
        let (order, product) = self.load(id).await?;
        if order.buyer_id != actor && product.seller_id != actor {
            return Err(DomainError::Forbidden("Not your order".to_string()));
        }
        Ok(order)
    }

    /// Orders placed by `buyer_id`, newest first.
    pub async fn list_for_buyer(&self, buyer_id: UserId, page: Page) -> Result<Vec<Order>> {
        self.list(OrderQuery {
            page,
            buyer_id: Some(buyer_id),
            ..Default::default()
        })
        .await
    }

    /// The buyer's orders in `status`.
    pub async fn list_by_status(
        &self,
        buyer_id: UserId,
        status: OrderStatus,
        page: Page,
    ) -> Result<Vec<Order>> {
        self.list(OrderQuery {
            page,
            buyer_id: Some(buyer_id),
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    /// Orders placed on any of the seller's products.
    pub async fn list_for_seller(&self, seller_id: UserId, page: Page) -> Result<Vec<Order>> {
        self.list(OrderQuery {
            page,
            seller_id: Some(seller_id),
            ..Default::default()
        })
        .await
    }

    /// Orders on one product. Only its seller may look.
    pub async fn list_for_product(
        &self,
        actor: UserId,
        product_id: ProductId,
        page: Page,
    ) -> Result<Vec<Order>> {
        let product = self.product(product_id).await?;
        if product.seller_id != actor {
            return Err(DomainError::Forbidden("Not your product".to_string()));
        }
        self.list(OrderQuery {
            page,
            product_id: Some(product_id),
            ..Default::default()
        })
        .await
    }

    /// Moves an order along the transition table. Seller only.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        actor: UserId,
        id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order> {
        let (order, product) = self.load(id).await?;
        if product.seller_id != actor {
            return Err(DomainError::Forbidden(
                "Only the seller can change the order status".to_string(),
            ));
        }
        self.transition(&order, new_status).await
    }

    /// Applies a buyer or seller patch.
    ///
    /// Permission and transition checks run against the loaded order; the
    /// store then applies every field in one transaction, guarded on the
    /// status those checks saw.
    #[tracing::instrument(skip(self, update))]
    pub async fn update(&self, actor: UserId, id: OrderId, update: OrderUpdate) -> Result<Order> {
        if update.is_empty() {
            return Err(DomainError::Validation("No fields to update".to_string()));
        }

        let (order, product) = self.load(id).await?;
        let is_buyer = order.buyer_id == actor;
        let is_seller = product.seller_id == actor;

        if !is_buyer && !is_seller {
            return Err(DomainError::Forbidden("Not your order".to_string()));
        }
        if update.quantity.is_some() {
            if !is_buyer {
                return Err(DomainError::Forbidden(
                    "Only the buyer can change the quantity".to_string(),
                ));
            }
            if order.status != OrderStatus::Pending {
                return Err(DomainError::Conflict(format!(
                    "Quantity can only change while the order is pending, it is {}",
                    order.status
                )));
            }
        }
        if let Some(status) = update.status {
            if !is_seller {
                return Err(DomainError::Forbidden(
                    "Only the seller can change the order status".to_string(),
                ));
            }
            if !order.status.can_transition_to(status) {
                return Err(DomainError::InvalidTransition {
                    from: order.status,
                    to: status,
                });
            }
        }

        let changes = OrderChanges {
            quantity: update.quantity,
            message: update.message,
            status: update.status,
        };
        let updated = self.store.update_order(id, order.status, changes).await?;
        tracing::info!(order_id = %id, quantity = updated.quantity, "Order updated");

        if update.status.is_some() {
            self.status_changed(order.status, &updated);
        }
        Ok(updated)
    }

    /// Deletes an order. Buyer only; stock still held by the order is returned.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, actor: UserId, id: OrderId) -> Result<()> {
        let order = self
            .store
            .order_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Order, id))?;
        if order.buyer_id != actor {
            return Err(DomainError::Forbidden(
                "Only the buyer can delete the order".to_string(),
            ));
        }

        let removed = self
            .store
            .remove_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Order, id))?;

        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(
            order_id = %id,
            restocked = removed.status.reserves_stock(),
            "Order deleted"
        );
        Ok(())
    }

    async fn transition(&self, order: &Order, new_status: OrderStatus) -> Result<Order> {
        if !order.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        let updated = self
            .store
            .transition_order(order.id, order.status, new_status)
            .await?;
        self.status_changed(order.status, &updated);
        Ok(updated)
    }

    fn status_changed(&self, from: OrderStatus, order: &Order) {
        metrics::counter!("order_status_changes_total", "status" => order.status.as_str())
            .increment(1);
        tracing::info!(
            order_id = %order.id,
            from = %from,
            to = %order.status,
            "Order status changed"
        );
        self.events.publish(OrderEvent::status_changed(order));
    }

    async fn list(&self, query: OrderQuery) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(query).await?)
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.store
            .product_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Product, id))
    }

    async fn load(&self, id: OrderId) -> Result<(Order, Product)> {
        let order = self
            .store
            .order_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Order, id))?;
        let product = self.product(order.product_id).await?;
        Ok((order, product))
    }
}
