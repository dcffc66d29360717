//! Authentication middleware: cookie credential resolution.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use quizly_core::models::auth::Identity;

use crate::AppState;
use crate::error::AppError;
use crate::services::auth::resolve_identity;

/// Resolved caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

/// Axum middleware: resolves the caller from the credential cookies and
/// injects `AuthenticatedUser` into request extensions.
///
/// Cookies minted by a rotation are attached to whatever response the inner
/// handler produces.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (jar, identity) = resolve_identity(&state, jar).await;
    let identity = identity.ok_or_else(|| AppError::Unauthorized("Unauthorized user".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(identity));

    Ok((jar, next.run(request).await).into_response())
}
