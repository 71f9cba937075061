//! HTTP API for the marketplace.
//!
//! Routes live under `/api`; every non-public route goes through the
//! session middleware, which authenticates from cookies and silently
//! refreshes expired access tokens.

pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::MarketStore;
use tower_http::trace::TraceLayer;

use routes::{orders, products, users};
use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/auth/signup", post(routes::auth::signup::<S>))
        .route("/auth/register", post(routes::auth::signup::<S>))
        .route("/auth/login", post(routes::auth::login::<S>))
        .route("/auth/logout", post(routes::auth::logout::<S>))
        .route("/users/all", get(users::all::<S>))
        .route("/users/get/{id}", get(users::get::<S>))
        .route("/users/me/get", get(users::me::<S>))
        .route("/users/me/update", patch(users::update_me::<S>))
        .route("/users/me/delete", delete(users::delete_me::<S>))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route("/products/my", get(products::mine::<S>))
        .route(
            "/products/category/{category}",
            get(products::by_category::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .patch(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route("/products/{id}/status", patch(products::set_status::<S>))
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route("/orders/seller", get(orders::for_seller::<S>))
        .route("/orders/status/{status}", get(orders::by_status::<S>))
        .route("/orders/product/{product_id}", get(orders::for_product::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .put(orders::update::<S>)
                .delete(orders::delete::<S>),
        )
        .route("/orders/{id}/status", patch(orders::change_status::<S>));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session::<S>,
        ))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
