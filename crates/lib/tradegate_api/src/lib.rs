//! # tradegate_api
//!
//! HTTP edge for Tradegate: identity endpoints, rate limiting, route policy
//! enforcement and the reverse proxy to backend services.

pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tradegate_core::auth::tokens::TokenService;
use tradegate_core::federated::FederatedBridge;
use tradegate_core::federated::azure::AzureProvider;
use tradegate_core::store::CredentialStore;

use crate::config::ApiConfig;
use crate::gateway::health::HealthAggregator;
use crate::gateway::proxy::ReverseProxy;
use crate::handlers::{auth, federated, health, proxy};
use crate::middleware::rate_limit::{RateLimiter, rate_limit};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration, including the route table.
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: TokenService,
    pub rate_limiter: Arc<RateLimiter>,
    pub proxy: Arc<ReverseProxy>,
    pub health: Arc<HealthAggregator>,
    /// Present when federated sign-in is configured.
    pub federated: Option<Arc<FederatedBridge>>,
}

impl AppState {
    /// Wire the services described by `config` around `store`.
    pub fn new(config: ApiConfig, store: Arc<dyn CredentialStore>) -> Result<Self, reqwest::Error> {
        let tokens = TokenService::new(
            config.jwt_secret.as_bytes(),
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
            store.clone(),
        );

        let proxy = ReverseProxy::new(Duration::from_secs(config.proxy_timeout_secs))?;
        let health = HealthAggregator::new(
            HealthAggregator::targets_from_routes(&config.routes),
            Duration::from_secs(config.health_timeout_secs),
        )?;
        let rate_limiter = RateLimiter::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_max_requests,
        );

        let federated = match &config.azure {
            Some(azure) => {
                let provider = AzureProvider::new(reqwest::Client::builder().build()?, azure.clone());
                Some(Arc::new(FederatedBridge::new(
                    store.clone(),
                    tokens.clone(),
                    Arc::new(provider),
                )))
            }
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            rate_limiter: Arc::new(rate_limiter),
            proxy: Arc::new(proxy),
            health: Arc::new(health),
            federated,
        })
    }

    /// Replace the federated bridge, e.g. with one backed by another provider.
    pub fn with_federated(mut self, bridge: FederatedBridge) -> Self {
        self.federated = Some(Arc::new(bridge));
        self
    }
}

/// Run embedded database migrations.
///
/// Delegates to `tradegate_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tradegate_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
///
/// Probes bypass the rate limiter. Everything else is counted first, then
/// served locally or resolved through the route table.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let probes = Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler));

    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let gated = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/federated", get(federated::begin_handler))
        .route(
            "/auth/federated/callback",
            get(federated::callback_query_handler).post(federated::callback_form_handler),
        )
        .merge(protected)
        .fallback(proxy::proxy_handler)
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(probes)
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
