//! Shared identifiers and value types for the marketplace backend.

pub mod money;
pub mod page;
pub mod status;
pub mod types;

pub use money::Money;
pub use page::Page;
pub use status::{OrderStatus, ProductStatus, UnknownStatus};
pub use types::{OrderId, ProductId, UserId};
