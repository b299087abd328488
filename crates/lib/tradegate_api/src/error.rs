//! Application error types.
//!
//! Every failure leaving the gateway is rendered as `{error, message}` with
//! a stable `error` kind. Internal detail is only attached when the
//! `debug-errors` feature is enabled.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};
use tradegate_core::auth::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access token expired")]
    TokenExpired,

    #[error("Access token invalid")]
    TokenInvalid,

    #[error("Refresh token invalid")]
    RefreshInvalid,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Federated identity carries no email")]
    MissingEmail,

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind and HTTP status.
    pub fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AppError::TokenInvalid => (StatusCode::UNAUTHORIZED, "token_invalid"),
            AppError::RefreshInvalid => (StatusCode::UNAUTHORIZED, "refresh_invalid"),
            AppError::AccountDisabled => (StatusCode::FORBIDDEN, "account_disabled"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::MissingEmail => (StatusCode::BAD_REQUEST, "missing_email"),
            AppError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            AppError::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "too_many_requests"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::NotFound(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m) => m.clone(),
            AppError::BadGateway(_) => "Upstream service unavailable".into(),
            AppError::TooManyRequests { retry_after_secs } => {
                format!("Rate limit exceeded, retry in {retry_after_secs}s")
            }
            AppError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        if !cfg!(feature = "debug-errors") {
            return None;
        }
        match self {
            AppError::BadGateway(d) | AppError::Internal(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.kind();
        match &self {
            AppError::Internal(detail) => error!(%detail, "internal error"),
            AppError::BadGateway(detail) => warn!(%detail, "upstream failure"),
            _ => {}
        }

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.public_message(),
            detail: self.detail(),
        });
        let mut response = (status, body).into_response();
        if let AppError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::TokenExpired => AppError::TokenExpired,
            AuthError::TokenInvalid => AppError::TokenInvalid,
            AuthError::RefreshInvalid => AppError::RefreshInvalid,
            AuthError::AccountDisabled => AppError::AccountDisabled,
            AuthError::MissingEmail => AppError::MissingEmail,
            AuthError::Handshake(msg) => {
                warn!(%msg, "federated handshake rejected");
                AppError::Unauthorized("Federated sign-in failed".into())
            }
            AuthError::TokenError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
            AuthError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}
