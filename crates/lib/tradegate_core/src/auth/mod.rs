//! Authentication logic.
//!
//! Provides password hashing, JWT signing/verification and the token
//! service shared by the identity endpoints and the gateway.

pub mod jwt;
pub mod password;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Access token invalid")]
    TokenInvalid,

    #[error("Refresh token invalid")]
    RefreshInvalid,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Federated identity carries no email claim")]
    MissingEmail,

    #[error("Federated handshake failed: {0}")]
    Handshake(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
