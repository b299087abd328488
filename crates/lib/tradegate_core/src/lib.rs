//! # tradegate_core
//!
//! Identity domain logic for Tradegate: access/refresh tokens, the credential
//! store abstraction, and the federated sign-in bridge.

pub mod auth;
pub mod federated;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
