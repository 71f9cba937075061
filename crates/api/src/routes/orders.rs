//! Order endpoints over the order state machine.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, ProductId, UserId};
use domain::{OrderUpdate, PlaceOrder};
use serde::{Deserialize, Serialize};
use store::{MarketStore, Order};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, CurrentUser, Pagination, ValidatedJson};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub product_id: ProductId,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub message: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateOrderRequest {
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize, Validate)]
pub struct OrderStatusRequest {
    pub new_status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub quantity: i32,
    pub total_price_cents: i64,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub message: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            product_id: order.product_id,
            buyer_id: order.buyer_id,
            quantity: order.quantity,
            total_price_cents: order.total_price.cents(),
            status: order.status,
            order_date: order.order_date,
            message: order.message,
        }
    }
}

fn responses(orders: Vec<Order>) -> Json<Vec<OrderResponse>> {
    Json(orders.into_iter().map(OrderResponse::from).collect())
}

// -- Handlers --

/// POST /api/orders
///
/// An unknown product or short stock is a 400.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(buyer_id): CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .market
        .orders
        .place(
            buyer_id,
            PlaceOrder {
                product_id: req.product_id,
                quantity: req.quantity,
                message: req.message,
            },
        )
        .await
        .map_err(ApiError::missing_as_bad_request)?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /api/orders/{id}
pub async fn get<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderResponse>, ApiError> {
    Ok(Json(state.market.orders.get(actor, id).await?.into()))
}

/// GET /api/orders: the caller's own orders.
pub async fn list<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(buyer_id): CurrentUser,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    Ok(responses(
        state
            .market
            .orders
            .list_for_buyer(buyer_id, params.page()?)
            .await?,
    ))
}

/// GET /api/orders/status/{status}
pub async fn by_status<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(buyer_id): CurrentUser,
    ApiPath(status): ApiPath<String>,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let status: OrderStatus = status
        .parse()
        .map_err(|e: common::UnknownStatus| ApiError::BadRequest(e.to_string()))?;
    Ok(responses(
        state
            .market
            .orders
            .list_by_status(buyer_id, status, params.page()?)
            .await?,
    ))
}

/// GET /api/orders/seller: orders on the caller's products.
pub async fn for_seller<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(seller_id): CurrentUser,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    Ok(responses(
        state
            .market
            .orders
            .list_for_seller(seller_id, params.page()?)
            .await?,
    ))
}

/// GET /api/orders/product/{product_id}
pub async fn for_product<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    Ok(responses(
        state
            .market
            .orders
            .list_for_product(actor, product_id, params.page()?)
            .await?,
    ))
}

/// PUT /api/orders/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<OrderId>,
    ValidatedJson(req): ValidatedJson<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let update = OrderUpdate {
        quantity: req.quantity,
        message: req.message,
        status: req.status,
    };
    let order = state.market.orders.update(actor, id, update).await?;
    Ok(Json(order.into()))
}

/// PATCH /api/orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<OrderId>,
    ValidatedJson(req): ValidatedJson<OrderStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .market
        .orders
        .change_status(actor, id, req.new_status)
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /api/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode, ApiError> {
    state.market.orders.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
