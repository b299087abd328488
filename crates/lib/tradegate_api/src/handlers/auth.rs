//! Authentication request handlers.

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, Uri};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use tradegate_core::models::auth::Principal;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract;
use crate::middleware::auth::{AuthenticatedPrincipal, authenticate};
use crate::models::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, RefreshRequest, RefreshResponse,
};
use crate::services::auth;
use crate::services::cookies::{
    REFRESH_COOKIE, access_cookie, clear_access_cookie, clear_refresh_cookie, refresh_cookie,
};

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    extract::Json(body): extract::Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let outcome = auth::login(
        state.store.as_ref(),
        &state.tokens,
        &body.email,
        &body.password,
    )
    .await?;

    let secure = state.config.cookie_secure;
    let jar = jar
        .add(access_cookie(
            &outcome.tokens.access_token,
            outcome.tokens.expires_in,
            secure,
        ))
        .add(refresh_cookie(
            &outcome.tokens.refresh_token,
            outcome.tokens.refresh_expires_in,
            secure,
        ));
    Ok((jar, Json(outcome.response())))
}

/// `POST /auth/refresh`: exchange a refresh token for a new access token.
///
/// The token comes from the JSON body or, failing that, the refresh cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<RefreshResponse>)> {
    let request: RefreshRequest = if body.is_empty() {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid refresh request: {e}")))?
    };
    let token = request
        .refresh_token
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()));

    let resp = auth::refresh(&state.tokens, token.as_deref()).await?;
    let jar = jar.add(access_cookie(
        &resp.access_token,
        resp.expires_in,
        state.config.cookie_secure,
    ));
    Ok((jar, Json(resp)))
}

/// `POST /auth/logout`: revoke all refresh tokens of the caller.
///
/// The caller is identified by its access token, else by its refresh cookie,
/// else by a `refreshToken` in the JSON body. An unreadable body is ignored.
/// Always reports success.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> (CookieJar, Json<LogoutResponse>) {
    let subject = |token: &str| state.tokens.refresh_token_subject(token).ok();
    let user_id = authenticate(&state.tokens, &headers, &uri)
        .map(|principal| principal.id)
        .ok()
        .or_else(|| jar.get(REFRESH_COOKIE).and_then(|c| subject(c.value())))
        .or_else(|| {
            serde_json::from_slice::<LogoutRequest>(&body)
                .ok()
                .and_then(|req| req.refresh_token)
                .and_then(|token| subject(&token))
        });

    auth::logout(&state.tokens, user_id.as_deref()).await;

    let secure = state.config.cookie_secure;
    let jar = jar
        .add(clear_access_cookie(secure))
        .add(clear_refresh_cookie(secure));
    (jar, Json(LogoutResponse { success: true }))
}

/// `GET /auth/me`: the caller's verified principal.
pub async fn me_handler(
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
) -> Json<Principal> {
    Json(principal)
}
