//! Domain error types.

use auth::AuthError;
use common::{OrderStatus, ProductId};
use store::{Entity, StoreError};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed a business rule.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// The caller is authenticated but does not own the resource.
    #[error("{0}")]
    Forbidden(String),

    /// Credentials are missing or wrong.
    #[error("{0}")]
    Unauthorized(String),

    /// A unique value is taken, or the row changed underneath the request.
    #[error("{0}")]
    Conflict(String),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The store failed; details are logged, not returned to clients.
    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl DomainError {
    pub(crate) fn not_found(entity: Entity, id: impl Into<i64>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            err @ StoreError::StatusConflict { .. } => DomainError::Conflict(err.to_string()),
            StoreError::Constraint(msg) => DomainError::Validation(msg),
            other => DomainError::Storage(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
