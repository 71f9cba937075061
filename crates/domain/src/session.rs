//! Login and the token checks behind the auth middleware.

use std::sync::Arc;

use auth::{TokenKind, TokenPair, TokenService};
use common::UserId;
use store::{MarketStore, User};

use crate::{DomainError, Result};

/// Issues and checks session tokens against the user table.
#[derive(Clone)]
pub struct SessionService<S: MarketStore> {
    store: S,
    tokens: Arc<TokenService>,
}

impl<S: MarketStore> SessionService<S> {
    pub fn new(store: S, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Checks a phone/password pair and mints a token pair.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, phone: &str, password: &str) -> Result<(User, TokenPair)> {
        let Some(user) = self.store.user_by_phone(phone).await? else {
            return Err(DomainError::Unauthorized("Invalid credentials".to_string()));
        };
        if !auth::verify_password(password, &user.hashed_password)? {
            return Err(DomainError::Unauthorized("Invalid credentials".to_string()));
        }

        let pair = self.tokens.issue_pair(user.id)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, pair))
    }

    /// Resolves an access token to its user id without touching the store.
    pub fn authenticate(&self, access_token: &str) -> Result<UserId> {
        let claims = self.tokens.verify_kind(access_token, TokenKind::Access)?;
        Ok(claims.subject()?)
    }

    /// Trades a valid refresh token for a new pair.
    ///
    /// Fails with `Forbidden` when the token is valid but its user is gone.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<(UserId, TokenPair)> {
        let claims = self.tokens.verify_kind(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.subject()?;

        if self.store.user_by_id(user_id).await?.is_none() {
            return Err(DomainError::Forbidden("User not found".to_string()));
        }

        let pair = self.tokens.issue_pair(user_id)?;
        metrics::counter!("auth_sessions_refreshed_total").increment(1);
        tracing::debug!(user_id = %user_id, "Session refreshed");
        Ok((user_id, pair))
    }
}
