//! Session middleware with silent refresh.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use domain::DomainError;
use store::MarketStore;

use crate::cookies;
use crate::error::ApiError;
use crate::state::AppState;

/// Path prefixes served without a session.
const PUBLIC_PATHS: &[&str] = &["/api/auth/", "/api/users/all", "/health", "/metrics"];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|prefix| path.starts_with(prefix))
}

/// Authenticates every non-public request.
///
/// A valid access token (cookie or bearer header) lets the request through.
/// Otherwise a valid refresh cookie mints a new token pair, which is set on
/// the response unless the handler already set or cleared the session
/// cookies itself. The user id is placed in the request extensions for
/// [`CurrentUser`](crate::extract::CurrentUser).
pub async fn require_session<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    if let Some(token) = cookies::access_token(&jar, request.headers()) {
        match state.market.sessions.authenticate(&token) {
            Ok(user_id) => {
                request.extensions_mut().insert(user_id);
                return next.run(request).await;
            }
            Err(e) => tracing::debug!(error = %e, "Access token rejected"),
        }
    }

    let Some(refresh) = cookies::refresh_token(&jar) else {
        return reject(
            "missing_token",
            ApiError::Unauthorized("Not authenticated".to_string()),
        );
    };

    match state.market.sessions.refresh(&refresh).await {
        Ok((user_id, pair)) => {
            request.extensions_mut().insert(user_id);
            let response = next.run(request).await;
            if sets_session_cookie(&response) {
                return response;
            }
            (state.cookies.issue(CookieJar::new(), &pair), response).into_response()
        }
        Err(DomainError::Forbidden(msg)) => reject("unknown_user", ApiError::Forbidden(msg)),
        Err(DomainError::Auth(e)) => {
            tracing::debug!(error = %e, "Refresh token rejected");
            let reason = e.reason();
            match ApiError::from(e) {
                ApiError::Unauthorized(_) => reject(
                    reason,
                    ApiError::Unauthorized("Invalid or expired session".to_string()),
                ),
                other => other.into_response(),
            }
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn sets_session_cookie(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .any(|cookie| {
            cookie.name() == cookies::ACCESS_COOKIE || cookie.name() == cookies::REFRESH_COOKIE
        })
}

fn reject(reason: &'static str, err: ApiError) -> Response {
    metrics::counter!("auth_rejections_total", "reason" => reason).increment(1);
    err.into_response()
}
