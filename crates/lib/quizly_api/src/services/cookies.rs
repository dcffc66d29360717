//! Cookie service: set/clear the httpOnly credential cookies.
//!
//! Both cookies are `HttpOnly`, `SameSite=Strict`, `Path=/`, and `Secure`
//! unless disabled for local development. Lifetimes match the signing TTLs.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

fn credential_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    let max_age = Duration::seconds(max_age_secs);
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(max_age)
        .expires(OffsetDateTime::now_utc() + max_age)
        .build()
}

fn cleared_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Build the access token cookie.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    credential_cookie(ACCESS_COOKIE, token, max_age_secs, secure)
}

/// Build the refresh token cookie.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    credential_cookie(REFRESH_COOKIE, token, max_age_secs, secure)
}

/// Build an expired access cookie to clear auth state.
pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    cleared_cookie(ACCESS_COOKIE, secure)
}

/// Build an expired refresh cookie to clear auth state.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    cleared_cookie(REFRESH_COOKIE, secure)
}
