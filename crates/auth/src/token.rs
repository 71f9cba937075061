use std::path::Path;

use chrono::{Duration, Utc};
use common::UserId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{AuthError, Result};

/// Which slot a token is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Lifetime of a freshly issued token.
    pub fn ttl(&self) -> Duration {
        match self {
            TokenKind::Access => Duration::hours(24),
            TokenKind::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(kind: TokenKind, subject: UserId) -> Self {
        let now = Utc::now();
        Self {
            kind,
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + kind.ttl()).timestamp(),
        }
    }

    /// Parses `sub` back into a user id.
    pub fn subject(&self) -> Result<UserId> {
        self.sub
            .parse()
            .map_err(|_| AuthError::Malformed(format!("subject '{}' is not a user id", self.sub)))
    }
}

/// Freshly minted access and refresh tokens for one user.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies RS256 tokens.
///
/// Built once at startup and shared by reference; there are no global keys.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &Algorithm::RS256)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Builds the service from PEM-encoded RSA keys.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::InvalidKey(format!("private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::InvalidKey(format!("public key: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
        })
    }

    /// Reads both keys from disk. A missing or unreadable file is an error.
    pub fn from_files(private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> Result<Self> {
        let private_pem = read_key(private_path.as_ref())?;
        let public_pem = read_key(public_path.as_ref())?;
        let service = Self::from_pem(&private_pem, &public_pem)?;

        tracing::info!(
            private_key = %private_path.as_ref().display(),
            public_key = %public_path.as_ref().display(),
            "Loaded token signing keys"
        );
        Ok(service)
    }

    /// Signs arbitrary claims.
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Issues a token of `kind` for `subject`, valid for [`TokenKind::ttl`].
    pub fn issue(&self, kind: TokenKind, subject: UserId) -> Result<String> {
        self.encode(&Claims::new(kind, subject))
    }

    /// Issues a new access and refresh token for `subject`.
    pub fn issue_pair(&self, subject: UserId) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(TokenKind::Access, subject)?,
            refresh: self.issue(TokenKind::Refresh, subject)?,
        })
    }

    /// Checks the signature and expiry and returns the claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Like [`verify`](Self::verify), but also rejects a token of the other kind.
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != expected {
            return Err(AuthError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }
}

fn read_key(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| AuthError::KeyFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &[u8] = include_bytes!("../tests/fixtures/jwt-private.pem");
    const PUBLIC: &[u8] = include_bytes!("../tests/fixtures/jwt-public.pem");
    const OTHER_PRIVATE: &[u8] = include_bytes!("../tests/fixtures/other-private.pem");

    fn service() -> TokenService {
        TokenService::from_pem(PRIVATE, PUBLIC).unwrap()
    }

    #[test]
    fn access_token_roundtrip() {
        let tokens = service();
        let token = tokens.issue(TokenKind::Access, UserId::new(42)).unwrap();

        let claims = tokens.verify(&token).unwrap();

        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.subject().unwrap(), UserId::new(42));
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn ttls_match_token_kind() {
        let access = Claims::new(TokenKind::Access, UserId::new(1));
        let refresh = Claims::new(TokenKind::Refresh, UserId::new(1));

        assert_eq!(access.exp - access.iat, 24 * 60 * 60);
        assert_eq!(refresh.exp - refresh.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn claims_serialize_kind_as_type() {
        let claims = Claims::new(TokenKind::Refresh, UserId::new(7));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["sub"], "7");
    }

    #[test]
    fn expired_token_is_reported_expired() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let token = tokens
            .encode(&Claims {
                kind: TokenKind::Access,
                sub: "1".to_string(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        assert!(matches!(tokens.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn token_signed_by_another_key_is_rejected() {
        let forger = TokenService::from_pem(OTHER_PRIVATE, PUBLIC).unwrap();
        let token = forger.issue(TokenKind::Access, UserId::new(1)).unwrap();

        assert!(matches!(
            service().verify(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            service().verify("not-a-token"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn refresh_token_does_not_pass_as_access() {
        let tokens = service();
        let pair = tokens.issue_pair(UserId::new(3)).unwrap();

        assert!(tokens.verify_kind(&pair.access, TokenKind::Access).is_ok());
        assert!(tokens.verify_kind(&pair.refresh, TokenKind::Refresh).is_ok());
        assert!(matches!(
            tokens.verify_kind(&pair.refresh, TokenKind::Access),
            Err(AuthError::WrongKind {
                expected: TokenKind::Access,
                actual: TokenKind::Refresh
            })
        ));
    }

    #[test]
    fn non_numeric_subject_is_malformed() {
        let claims = Claims {
            kind: TokenKind::Access,
            sub: "alice".to_string(),
            iat: 0,
            exp: 0,
        };
        assert!(matches!(claims.subject(), Err(AuthError::Malformed(_))));
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let result = TokenService::from_files("/nonexistent/private.pem", "/nonexistent/public.pem");
        assert!(matches!(result, Err(AuthError::KeyFile { .. })));
    }
}
