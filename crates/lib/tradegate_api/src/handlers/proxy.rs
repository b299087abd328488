//! Gateway fallback: every path not served locally goes through the route table.

use axum::extract::{Request, State};
use axum::response::Response;
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{audit, authenticate};

/// Resolve the route, enforce its access rule and forward to the backend.
///
/// Routes that require authentication reject before any backend contact.
/// Public routes still attach a principal when a valid credential is present.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let path = request.uri().path().to_string();
    let route = state
        .config
        .routes
        .resolve(&path)
        .ok_or_else(|| AppError::NotFound(format!("No route for {path}")))?;

    let principal = if route.requires_auth() {
        let principal = authenticate(&state.tokens, request.headers(), request.uri())?;
        if !route.allows_role(&principal.role) {
            return Err(AppError::Forbidden(format!(
                "Role '{}' may not access {}",
                principal.role, route.name
            )));
        }
        Some(principal)
    } else {
        authenticate(&state.tokens, request.headers(), request.uri())
            .inspect_err(|e| debug!(error = %e, "no usable credential on public route"))
            .ok()
    };

    if let Some(principal) = &principal {
        audit(principal, request.method(), request.uri());
    }

    state.proxy.forward(route, principal.as_ref(), request).await
}
