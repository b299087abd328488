//! Business logic behind the identity endpoints.

pub mod auth;
pub mod cookies;
