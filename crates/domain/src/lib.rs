//! Domain layer for the marketplace.
//!
//! This crate provides the services the HTTP layer calls into:
//! - [`UserService`] for registration and profiles
//! - [`SessionService`] for login and token checks
//! - [`ProductService`] for seller-owned listings
//! - [`OrderService`], the order state machine, which publishes
//!   [`OrderEvent`]s through an [`EventPublisher`]

use std::sync::Arc;

use auth::TokenService;
use store::MarketStore;

pub mod error;
pub mod event;
pub mod orders;
pub mod products;
pub mod session;
pub mod users;

pub use error::{DomainError, Result};
pub use event::{
    EventPublisher, InMemoryEventPublisher, NullEventPublisher, OrderEvent, OrderEventKind,
};
pub use orders::{OrderService, OrderUpdate, PlaceOrder};
pub use products::{MAX_IMAGES, NewListing, ProductService};
pub use session::SessionService;
pub use users::{MIN_PASSWORD_LEN, ProfileUpdate, Registration, UserService};

/// All services over one store, built once at startup.
#[derive(Clone)]
pub struct Marketplace<S: MarketStore> {
    pub users: UserService<S>,
    pub sessions: SessionService<S>,
    pub products: ProductService<S>,
    pub orders: OrderService<S>,
}

impl<S: MarketStore> Marketplace<S> {
    pub fn new(store: S, tokens: Arc<TokenService>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            users: UserService::new(store.clone()),
            sessions: SessionService::new(store.clone(), tokens),
            products: ProductService::new(store.clone()),
            orders: OrderService::new(store, events),
        }
    }
}
