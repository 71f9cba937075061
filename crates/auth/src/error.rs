use std::path::PathBuf;

use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

use crate::TokenKind;

/// Errors from key loading, token handling and password hashing.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Cannot read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Expected a {expected} token, got a {actual} token")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

impl AuthError {
    /// Short label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::KeyFile { .. } | AuthError::InvalidKey(_) => "key",
            AuthError::Expired => "expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Malformed(_) => "malformed",
            AuthError::WrongKind { .. } => "wrong_kind",
            AuthError::Encoding(_) => "encoding",
            AuthError::PasswordHash(_) => "password_hash",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidRsaKey(msg) => AuthError::InvalidKey(msg.clone()),
            ErrorKind::InvalidKeyFormat => AuthError::InvalidKey(e.to_string()),
            _ => AuthError::Malformed(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
