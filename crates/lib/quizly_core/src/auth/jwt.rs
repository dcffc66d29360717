//! JWT token generation and verification.
//!
//! Access and refresh tokens are signed with independent HS256 secrets so a
//! leaked access secret cannot forge refresh tokens and vice versa.

use std::fmt;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{AuthError, TokenError};
use crate::models::auth::{IdentityClaim, TokenClaims};

/// Access token lifetime: 3 hours.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 3 * 60 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

/// Which of the two token classes a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec with the default lifetimes (3h access, 7d refresh).
    pub fn new(access_secret: impl AsRef<[u8]>, refresh_secret: impl AsRef<[u8]>) -> Self {
        Self {
            access_secret: access_secret.as_ref().to_vec(),
            refresh_secret: refresh_secret.as_ref().to_vec(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS),
        }
    }

    /// Override token lifetimes.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Lifetime used when signing tokens of `kind`.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    /// Sign `claim` as a token of `kind` with the configured lifetime.
    pub fn sign(&self, claim: &IdentityClaim, kind: TokenKind) -> Result<String, AuthError> {
        self.sign_with_ttl(claim, kind, self.ttl(kind))
    }

    /// Sign `claim` as a token of `kind` expiring `ttl` from now.
    pub fn sign_with_ttl(
        &self,
        claim: &IdentityClaim,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let secret = self.secret(kind);
        if secret.is_empty() {
            return Err(AuthError::MissingSecret(kind));
        }
        let now = Utc::now();
        let claims = TokenClaims {
            identity: claim.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: generate_nonce(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Verify a token of `kind`, returning its claims on success.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError> {
        let secret = self.secret(kind);
        if secret.is_empty() {
            return Err(TokenError::InvalidSignature);
        }
        let key = DecodingKey::from_secret(secret);
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        decode::<TokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

/// Random 16-char nonce for the `jti` claim.
fn generate_nonce() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve a signing secret: env var `env_var` → persisted file → generated.
///
/// Generated secrets are written to `<data_dir>/quizly/<file_name>` so they
/// survive restarts.
pub fn resolve_token_secret(env_var: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_var)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(env_var, path = %secret_path.display(), "generated new token secret");
    secret
}

fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quizly")
        .join(file_name)
}
