//! Edge gateway: route policy, reverse proxy and backend health.

pub mod health;
pub mod proxy;
pub mod routes;
