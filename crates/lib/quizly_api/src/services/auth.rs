//! Authentication service: bridges the cookie carrier and `quizly_core::auth`.

use axum_extra::extract::cookie::CookieJar;
use quizly_core::auth::jwt::{TokenCodec, TokenKind};
use quizly_core::auth::session::{Credentials, Session, TokenPair};
use quizly_core::models::auth::Identity;

use super::cookies::{
    ACCESS_COOKIE, REFRESH_COOKIE, access_cookie, clear_access_cookie, clear_refresh_cookie,
    refresh_cookie,
};
use crate::AppState;
use crate::error::AppResult;

/// Read both credential cookies.
pub fn credentials_from_jar(jar: &CookieJar) -> Credentials {
    Credentials::new(
        jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()),
        jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()),
    )
}

/// Add cookies for freshly issued tokens, sized to the signing TTLs.
pub fn apply_issued(
    jar: CookieJar,
    issued: &TokenPair,
    codec: &TokenCodec,
    secure: bool,
) -> CookieJar {
    jar.add(access_cookie(
        &issued.access_token,
        codec.ttl(TokenKind::Access).num_seconds(),
        secure,
    ))
    .add(refresh_cookie(
        &issued.refresh_token,
        codec.ttl(TokenKind::Refresh).num_seconds(),
        secure,
    ))
}

/// Replace both credential cookies with expired, empty ones.
pub fn clear_credentials(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(clear_access_cookie(secure))
        .add(clear_refresh_cookie(secure))
}

fn finish(state: &AppState, jar: CookieJar, session: Session) -> (CookieJar, Identity) {
    let jar = match &session.issued {
        Some(issued) => apply_issued(
            jar,
            issued,
            state.resolver.codec(),
            state.config.secure_cookies,
        ),
        None => jar,
    };
    (jar, session.identity)
}

/// Resolve the caller from the request cookies.
///
/// The returned jar carries rotated cookies when rotation happened.
pub async fn resolve_identity(state: &AppState, jar: CookieJar) -> (CookieJar, Option<Identity>) {
    let credentials = credentials_from_jar(&jar);
    match state.resolver.resolve(&credentials).await.into_session() {
        Some(session) => {
            let (jar, identity) = finish(state, jar, session);
            (jar, Some(identity))
        }
        None => (jar, None),
    }
}

/// Authenticate with email + password and set both cookies.
pub async fn login(
    state: &AppState,
    jar: CookieJar,
    email: &str,
    password: &str,
) -> AppResult<(CookieJar, Identity)> {
    let session = state.resolver.login(email.trim(), password).await?;
    Ok(finish(state, jar, session))
}

/// End the session named by the access cookie and clear both cookies.
pub async fn logout(state: &AppState, jar: CookieJar) -> AppResult<CookieJar> {
    let credentials = credentials_from_jar(&jar);
    state
        .resolver
        .logout(credentials.access_token.as_deref())
        .await?;
    Ok(clear_credentials(jar, state.config.secure_cookies))
}
