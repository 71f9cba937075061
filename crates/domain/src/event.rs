//! Order lifecycle events and the publishing seam.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::Order;
use uuid::Uuid;

/// What happened to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    OrderCreated,
    OrderStatusChanged,
}

impl OrderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::OrderCreated => "order_created",
            OrderEventKind::OrderStatusChanged => "order_status_changed",
        }
    }
}

impl std::fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an order after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub event_type: OrderEventKind,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub status: OrderStatus,
    /// When the order was placed.
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    fn from_order(event_type: OrderEventKind, order: &Order) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            order_id: order.id,
            buyer_id: order.buyer_id,
            product_id: order.product_id,
            quantity: order.quantity,
            status: order.status,
            timestamp: order.order_date,
        }
    }

    pub fn created(order: &Order) -> Self {
        Self::from_order(OrderEventKind::OrderCreated, order)
    }

    pub fn status_changed(order: &Order) -> Self {
        Self::from_order(OrderEventKind::OrderStatusChanged, order)
    }
}

/// Best-effort sink for order events.
///
/// `publish` returns immediately. Implementations log delivery failures and
/// never report them to the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

/// Publisher used when no message bus is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventPublisher;

impl EventPublisher for NullEventPublisher {
    fn publish(&self, event: OrderEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            order_id = %event.order_id,
            "No message bus configured, dropping event"
        );
    }
}

/// Publisher that keeps every event in memory, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything published so far, oldest first.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: OrderEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn order() -> Order {
        Order {
            id: OrderId::new(9),
            product_id: ProductId::new(4),
            buyer_id: UserId::new(2),
            quantity: 3,
            total_price: Money::from_cents(300),
            status: OrderStatus::Confirmed,
            order_date: Utc::now(),
            message: None,
        }
    }

    #[test]
    fn event_carries_order_snapshot() {
        let order = order();
        let event = OrderEvent::status_changed(&order);

        assert_eq!(event.event_type, OrderEventKind::OrderStatusChanged);
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.status, OrderStatus::Confirmed);
        assert_eq!(event.timestamp, order.order_date);
    }

    #[test]
    fn wire_format() {
        let event = OrderEvent::created(&order());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "order_created");
        assert_eq!(json["order_id"], 9);
        assert_eq!(json["buyer_id"], 2);
        assert_eq!(json["status"], "confirmed");

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn in_memory_publisher_records_in_order() {
        let publisher = InMemoryEventPublisher::new();
        let order = order();
        publisher.publish(OrderEvent::created(&order));
        publisher.publish(OrderEvent::status_changed(&order));

        let kinds: Vec<_> = publisher.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                OrderEventKind::OrderCreated,
                OrderEventKind::OrderStatusChanged
            ]
        );
    }
}
