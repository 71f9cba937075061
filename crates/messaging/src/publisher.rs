use std::future::Future;

use async_nats::{Client, HeaderMap};
use domain::{EventPublisher, OrderEvent};
use tokio_util::task::TaskTracker;

use crate::Result;

/// Header carrying the order id, so consumers can route without decoding.
pub const ORDER_ID_HEADER: &str = "Order-Id";

/// Publish tasks still running. Clones share the same set.
#[derive(Clone, Default)]
pub struct InFlight {
    tasks: TaskTracker,
}

impl InFlight {
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Waits until every task spawned so far has finished.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Publishes order events to a NATS subject.
///
/// Each publish runs on its own task; failures are logged and counted.
#[derive(Clone)]
pub struct NatsEventPublisher {
    client: Client,
    subject: String,
    in_flight: InFlight,
}

impl NatsEventPublisher {
    pub fn new(client: Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
            in_flight: InFlight::default(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for in-flight publishes, then flushes buffered messages. Used on
    /// shutdown.
    pub async fn flush(&self) {
        self.in_flight.drain().await;
        if let Err(e) = self.client.flush().await {
            tracing::warn!(error = %e, "Failed to flush NATS client");
        }
    }
}

/// Serializes an event into its headers and JSON payload.
pub fn encode(event: &OrderEvent) -> Result<(HeaderMap, Vec<u8>)> {
    let payload = serde_json::to_vec(event)?;
    let mut headers = HeaderMap::new();
    headers.insert(ORDER_ID_HEADER, event.order_id.to_string().as_str());
    Ok((headers, payload))
}

impl EventPublisher for NatsEventPublisher {
    fn publish(&self, event: OrderEvent) {
        let (headers, payload) = match encode(&event) {
            Ok(encoded) => encoded,
            Err(e) => {
                metrics::counter!("events_publish_failures_total").increment(1);
                tracing::error!(error = %e, order_id = %event.order_id, "Failed to encode event");
                return;
            }
        };

        let client = self.client.clone();
        let subject = self.subject.clone();
        self.in_flight.spawn(async move {
            match client
                .publish_with_headers(subject, headers, payload.into())
                .await
            {
                Ok(()) => {
                    metrics::counter!("events_published_total").increment(1);
                    tracing::debug!(
                        event_type = %event.event_type,
                        order_id = %event.order_id,
                        "Published event"
                    );
                }
                Err(e) => {
                    metrics::counter!("events_publish_failures_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        event_type = %event.event_type,
                        order_id = %event.order_id,
                        "Failed to publish event"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId, OrderStatus, ProductId, UserId};
    use store::Order;

    #[tokio::test]
    async fn drain_waits_for_running_publishes() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let in_flight = InFlight::default();
        let done = Arc::new(AtomicUsize::new(0));
        for delay in [5, 20, 40] {
            let done = done.clone();
            in_flight.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        in_flight.drain().await;

        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(in_flight.is_empty());

        // Still usable after a drain.
        let done_again = done.clone();
        in_flight.spawn(async move {
            done_again.fetch_add(1, Ordering::SeqCst);
        });
        in_flight.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn encode_sets_order_header_and_json_body() {
        let order = Order {
            id: OrderId::new(31),
            product_id: ProductId::new(2),
            buyer_id: UserId::new(5),
            quantity: 1,
            total_price: Money::from_cents(100),
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            message: None,
        };
        let event = OrderEvent::created(&order);

        let (headers, payload) = encode(&event).unwrap();

        assert_eq!(
            headers.get(ORDER_ID_HEADER).map(|v| v.as_str()),
            Some("31")
        );
        let decoded: OrderEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, event);
    }
}
