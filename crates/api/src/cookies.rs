//! Session cookie handling.

use auth::TokenPair;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Builds the `access_token` / `refresh_token` cookie pair.
///
/// Both are `HttpOnly`, `SameSite=Strict` and scoped to `/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCookies {
    secure: bool,
}

impl SessionCookies {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .build()
    }

    /// Adds both tokens of a fresh pair to the jar.
    pub fn issue(&self, jar: CookieJar, pair: &TokenPair) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, pair.access.clone()))
            .add(self.cookie(REFRESH_COOKIE, pair.refresh.clone()))
    }

    /// Expires both cookies (`Max-Age=0`), whether or not the client sent them.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut access = self.cookie(ACCESS_COOKIE, String::new());
        access.make_removal();
        let mut refresh = self.cookie(REFRESH_COOKIE, String::new());
        refresh.make_removal();
        jar.add(access).add(refresh)
    }
}

/// Reads the access token from its cookie, or from `Authorization: Bearer`.
pub fn access_token(jar: &CookieJar, headers: &axum::http::HeaderMap) -> Option<String> {
    jar.get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
}

pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
