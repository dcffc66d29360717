//! Authentication and session identity resolution.
//!
//! Provides the token codec, the identity cache and user store contracts,
//! and the session resolver that ties them together for every other
//! feature that needs to ask "who is the caller?".

pub mod cache;
pub mod jwt;
pub mod password;
pub mod session;
pub mod store;

use thiserror::Error;

use self::jwt::TokenKind;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Missing {0} token secret")]
    MissingSecret(TokenKind),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Typed verification failure returned by the token codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token malformed")]
    Malformed,

    #[error("token signature mismatch")]
    InvalidSignature,
}

/// Why a resolution ended unauthenticated.
///
/// Logged for operability only; callers of the resolver never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("no credentials presented")]
    NoCredentials,

    #[error("token expired")]
    TokenExpired,

    #[error("token malformed")]
    TokenMalformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("user not found")]
    UserNotFound,

    #[error("backing store failure")]
    BackingStoreFailure,
}

impl From<TokenError> for AuthFailure {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthFailure::TokenExpired,
            TokenError::Malformed => AuthFailure::TokenMalformed,
            TokenError::InvalidSignature => AuthFailure::InvalidSignature,
        }
    }
}

#[cfg(test)]
mod tests;
