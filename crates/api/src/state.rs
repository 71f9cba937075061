//! Shared application state.

use domain::Marketplace;
use store::MarketStore;

use crate::cookies::SessionCookies;

/// Everything a handler needs, built once at startup.
pub struct AppState<S: MarketStore> {
    pub market: Marketplace<S>,
    pub cookies: SessionCookies,
}

impl<S: MarketStore> AppState<S> {
    pub fn new(market: Marketplace<S>, cookies: SessionCookies) -> Self {
        Self { market, cookies }
    }
}
