//! Federated sign-in handlers.
//!
//! `GET /auth/federated` starts the handshake; the provider answers on
//! `/auth/federated/callback`, by form post or query string. On success
//! the browser is sent to the front-end callback with `?token=<access>`
//! and both auth cookies set.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};
use tradegate_core::federated::FederatedBridge;
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{Form, Query};
use crate::models::FederatedCallback;
use crate::services::cookies::{access_cookie, refresh_cookie};

/// `302 Found` to `location`.
fn found(location: &str) -> AppResult<Response> {
    let value = HeaderValue::from_str(location)
        .map_err(|e| AppError::Internal(format!("redirect location: {e}")))?;
    Ok((StatusCode::FOUND, [(LOCATION, value)]).into_response())
}

fn bridge(state: &AppState) -> AppResult<Arc<FederatedBridge>> {
    state
        .federated
        .clone()
        .ok_or_else(|| AppError::NotFound("Federated sign-in is not configured".into()))
}

/// `GET /auth/federated`: redirect to the identity provider.
pub async fn begin_handler(State(state): State<AppState>) -> AppResult<Response> {
    let url = bridge(&state)?.begin()?;
    found(url.as_str())
}

/// `POST /auth/federated/callback`: provider form post.
pub async fn callback_form_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(params): Form<FederatedCallback>,
) -> AppResult<(CookieJar, Response)> {
    complete(state, jar, params).await
}

/// `GET /auth/federated/callback`: provider redirect with query string.
pub async fn callback_query_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<FederatedCallback>,
) -> AppResult<(CookieJar, Response)> {
    complete(state, jar, params).await
}

async fn complete(
    state: AppState,
    jar: CookieJar,
    params: FederatedCallback,
) -> AppResult<(CookieJar, Response)> {
    let bridge = bridge(&state)?;

    if let Some(error) = params.error {
        warn!(
            %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "identity provider returned an error"
        );
        return Err(AppError::Unauthorized(format!("Identity provider error: {error}")));
    }
    let (Some(code), Some(handshake_state)) = (params.code, params.state) else {
        return Err(AppError::Unauthorized("Missing code or state".into()));
    };

    let login = bridge.finish(&code, &handshake_state).await?;
    info!(user_id = %login.user.id, created = login.created, "federated callback completed");

    let mut target = Url::parse(&state.config.frontend_callback_url)
        .map_err(|e| AppError::Internal(format!("frontend callback url: {e}")))?;
    target
        .query_pairs_mut()
        .append_pair("token", &login.tokens.access_token);

    let secure = state.config.cookie_secure;
    let jar = jar
        .add(access_cookie(
            &login.tokens.access_token,
            login.tokens.expires_in,
            secure,
        ))
        .add(refresh_cookie(
            &login.tokens.refresh_token,
            login.tokens.refresh_expires_in,
            secure,
        ));
    Ok((jar, found(target.as_str())?))
}
