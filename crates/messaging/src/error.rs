use thiserror::Error;

/// Errors from the NATS transport.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::ConnectError),

    #[error("Subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    #[error("Publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MessagingError>;
