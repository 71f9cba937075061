//! Credentials and session tokens.
//!
//! - [`password`]: argon2 hashing and verification
//! - [`token`]: RS256 access/refresh tokens signed with a key pair loaded at startup

pub mod error;
pub mod password;
pub mod token;

pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenKind, TokenPair, TokenService};
