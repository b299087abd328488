//! Cookie service: set/clear httpOnly auth cookies.
//!
//! Cookie names: `tg_access`, `tg_refresh`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "tg_access";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "tg_refresh";

fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

/// Build a httpOnly cookie for the access token.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, token, Duration::seconds(max_age_secs), secure)
}

/// Build a httpOnly cookie for the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, token, Duration::seconds(max_age_secs), secure)
}

/// Build expired cookie to clear the access token.
pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, "", Duration::ZERO, secure)
}

/// Build expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, "", Duration::ZERO, secure)
}
