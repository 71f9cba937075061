use async_nats::Client;
use domain::OrderEvent;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;

/// Counts from one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub consumed: u64,
    pub rejected: u64,
}

/// Subscribes to the order event subject and logs every event it sees.
pub struct EventConsumer {
    client: Client,
    subject: String,
}

impl EventConsumer {
    pub fn new(client: Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }

    /// Subscribes and starts the consumer task.
    pub async fn start(self) -> Result<ConsumerHandle> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        tracing::info!(subject = %self.subject, "Event consumer started");
        Ok(ConsumerHandle::spawn(subscriber.map(|message| message.payload)))
    }
}

/// Owner of a running consumer task.
///
/// Dropping the handle without calling [`stop`](Self::stop) also ends the
/// task, but nothing waits for it.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<ConsumerStats>,
}

impl ConsumerHandle {
    /// Runs the consume loop over any stream of raw payloads.
    pub fn spawn<St>(messages: St) -> Self
    where
        St: Stream + Send + Unpin + 'static,
        St::Item: AsRef<[u8]> + Send,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consume(messages, shutdown_rx));
        Self { shutdown, task }
    }

    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) -> ConsumerStats {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(stats) => {
                tracing::info!(
                    consumed = stats.consumed,
                    rejected = stats.rejected,
                    "Event consumer stopped"
                );
                stats
            }
            Err(e) => {
                tracing::error!(error = %e, "Event consumer task failed");
                ConsumerStats::default()
            }
        }
    }
}

async fn consume<St>(mut messages: St, mut shutdown: watch::Receiver<bool>) -> ConsumerStats
where
    St: Stream + Unpin,
    St::Item: AsRef<[u8]>,
{
    let mut stats = ConsumerStats::default();

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            message = messages.next() => {
                let Some(payload) = message else {
                    tracing::info!("Event stream closed");
                    break;
                };
                match serde_json::from_slice::<OrderEvent>(payload.as_ref()) {
                    Ok(event) => {
                        stats.consumed += 1;
                        metrics::counter!("events_consumed_total").increment(1);
                        tracing::info!(
                            event_type = %event.event_type,
                            order_id = %event.order_id,
                            status = %event.status,
                            "Received order event"
                        );
                    }
                    Err(e) => {
                        stats.rejected += 1;
                        tracing::warn!(error = %e, "Discarding undecodable event");
                    }
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId, OrderStatus, ProductId, UserId};
    use futures_util::stream;
    use store::Order;

    fn payload(id: i64) -> Vec<u8> {
        let order = Order {
            id: OrderId::new(id),
            product_id: ProductId::new(1),
            buyer_id: UserId::new(1),
            quantity: 1,
            total_price: Money::from_cents(500),
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            message: None,
        };
        serde_json::to_vec(&OrderEvent::created(&order)).unwrap()
    }

    #[tokio::test]
    async fn consumes_until_stream_ends() {
        let messages = stream::iter(vec![payload(1), b"not json".to_vec(), payload(2)]);

        let handle = ConsumerHandle::spawn(messages);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stats = handle.stop().await;

        assert_eq!(stats.consumed + stats.rejected, 3);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn stop_ends_an_idle_consumer() {
        let messages = stream::iter(vec![payload(1)]).chain(stream::pending());

        let handle = ConsumerHandle::spawn(messages);
        let stats = tokio::time::timeout(std::time::Duration::from_secs(5), handle.stop())
            .await
            .unwrap();

        assert!(stats.consumed <= 1);
        assert_eq!(stats.rejected, 0);
    }
}
