//! Request handlers.

pub mod auth;
pub mod federated;
pub mod health;
pub mod proxy;
