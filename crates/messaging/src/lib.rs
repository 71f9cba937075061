//! NATS transport for order events.
//!
//! [`NatsEventPublisher`] implements the domain's `EventPublisher` seam and
//! [`EventConsumer`] drains the same subject for observability.

pub mod consumer;
pub mod error;
pub mod publisher;

pub use consumer::{ConsumerHandle, ConsumerStats, EventConsumer};
pub use error::{MessagingError, Result};
pub use publisher::NatsEventPublisher;

/// Connects to NATS, retrying in the background if the server is not up yet.
pub async fn connect(url: &str) -> Result<async_nats::Client> {
    let client = async_nats::ConnectOptions::new()
        .name("marketplace")
        .retry_on_initial_connect()
        .connect(url)
        .await?;

    tracing::info!(url, "Connected to NATS");
    Ok(client)
}
