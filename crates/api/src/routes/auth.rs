//! Sign-up, login and logout.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use chrono::NaiveDate;
use domain::Registration;
use serde::{Deserialize, Serialize};
use store::MarketStore;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{JsonOrForm, ValidatedJson};
use crate::routes::users::UserResponse;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub avatar: Option<String>,
    pub about: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// `username` holds the phone number.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    pub password: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

// -- Handlers --

/// POST /api/auth/signup (also /api/auth/register)
#[tracing::instrument(skip(state, req))]
pub async fn signup<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .market
        .users
        .register(Registration {
            phone: req.phone,
            password: req.password,
            full_name: req.full_name,
            about: req.about,
            avatar: req.avatar,
            birth_date: req.birth_date,
        })
        .await
        .map_err(ApiError::conflict_as_bad_request)?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// POST /api/auth/login
///
/// Accepts JSON or an urlencoded form. Returns the token pair in the body and
/// sets it as cookies.
#[tracing::instrument(skip(state, jar, req))]
pub async fn login<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    jar: CookieJar,
    JsonOrForm(req): JsonOrForm<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    let (_, pair) = state
        .market
        .sessions
        .login(&req.username, &req.password)
        .await?;

    let jar = state.cookies.issue(jar, &pair);
    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access,
            refresh_token: pair.refresh,
            token_type: "bearer",
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    (
        state.cookies.clear(jar),
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    )
}
