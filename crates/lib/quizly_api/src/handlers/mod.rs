//! Request handlers.

pub mod auth;

use crate::error::AppError;

/// Fallback for unmatched routes.
pub async fn unknown_route() -> AppError {
    AppError::NotFound("Unknown route".into())
}
