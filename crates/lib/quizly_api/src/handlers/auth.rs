//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use quizly_core::models::auth::Identity;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{LoginRequest, LogoutResponse};
use crate::services::auth;

/// `GET /api/user/me`: the resolved caller.
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> Json<Identity> {
    Json(user.0)
}

/// `POST /api/user/log-in`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<Identity>)> {
    let (jar, identity) = auth::login(&state, jar, &body.email, &body.password).await?;
    Ok((jar, Json(identity)))
}

/// `GET|POST /api/user/log-out`: end the session and clear the cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    let jar = auth::logout(&state, jar).await?;
    Ok((
        jar,
        Json(LogoutResponse {
            success: true,
            message: "Logged out successfully".into(),
            data: None,
        }),
    ))
}
