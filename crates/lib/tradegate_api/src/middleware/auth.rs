//! Authentication middleware: credential carriers and access token verification.
//!
//! A credential may arrive in one of several carriers. They are tried in
//! order and the first one present wins; a present but bad token is not
//! retried against later carriers.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, Uri, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;
use tradegate_core::auth::tokens::TokenService;
use tradegate_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// Key used to store the verified `Principal` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

/// Pulls a raw token out of a request, if this carrier holds one.
pub type Carrier = fn(&HeaderMap, &Uri) -> Option<String>;

/// Carriers in priority order.
pub const CARRIERS: &[(&str, Carrier)] = &[
    ("bearer", bearer_token),
    ("cookie", cookie_token),
    ("query", query_token),
];

/// `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap, _uri: &Uri) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// The httpOnly access cookie set at login.
pub fn cookie_token(headers: &HeaderMap, _uri: &Uri) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// `?token=<token>` for clients that cannot set headers (downloads, websockets).
pub fn query_token(_headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

/// First credential found across [`CARRIERS`].
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    CARRIERS
        .iter()
        .find_map(|(_, carrier)| carrier(headers, uri))
}

/// Verify the request's credential and return its principal.
///
/// No credential yields `Unauthorized` without touching the token service.
pub fn authenticate(
    tokens: &TokenService,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<Principal, AppError> {
    let token = extract_token(headers, uri)
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".into()))?;
    Ok(tokens.verify_access_token(&token)?)
}

/// Emit the audit event for an authenticated request.
pub fn audit(principal: &Principal, method: &Method, uri: &Uri) {
    info!(
        target: "audit",
        actor = %principal.id,
        tenant = %principal.tenant_id,
        role = %principal.role,
        method = %method,
        path = %uri.path(),
        "authenticated request"
    );
}

/// Axum middleware: verifies the credential and injects
/// `AuthenticatedPrincipal` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state.tokens, request.headers(), request.uri())?;
    audit(&principal, request.method(), request.uri());
    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    Ok(next.run(request).await)
}
