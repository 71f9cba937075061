//! Account endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;
use chrono::NaiveDate;
use common::UserId;
use domain::ProfileUpdate;
use serde::{Deserialize, Serialize};
use store::{MarketStore, User};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, CurrentUser, Pagination, ValidatedJson};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 20))]
    pub phone: Option<String>,
    pub password: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    pub avatar: Option<String>,
    pub about: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

// -- Response types --

#[derive(Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub phone: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub about: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub rating: f64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            phone: user.phone,
            full_name: user.full_name,
            avatar: user.avatar,
            about: user.about,
            birth_date: user.birth_date,
            rating: user.rating,
        }
    }
}

// -- Handlers --

/// GET /api/users/all
pub async fn all<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(params): ApiQuery<Pagination>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.market.users.list(params.page()?).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/users/get/{id}
pub async fn get<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.market.users.get(id).await?.into()))
}

/// GET /api/users/me/get
pub async fn me<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.market.users.get(user_id).await?.into()))
}

/// PATCH /api/users/me/update
#[tracing::instrument(skip(state, req))]
pub async fn update_me<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let update = ProfileUpdate {
        phone: req.phone,
        password: req.password,
        full_name: req.full_name,
        about: req.about,
        avatar: req.avatar,
        birth_date: req.birth_date,
    };
    let user = state
        .market
        .users
        .update_profile(user_id, update)
        .await
        .map_err(ApiError::conflict_as_bad_request)?;
    Ok(Json(user.into()))
}

/// DELETE /api/users/me/delete
///
/// Removes the account with its products and orders, then clears the session.
#[tracing::instrument(skip(state, jar))]
pub async fn delete_me<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    state.market.users.delete(user_id).await?;
    Ok((
        state.cookies.clear(jar),
        Json(serde_json::json!({ "message": "User deleted successfully" })),
    ))
}
