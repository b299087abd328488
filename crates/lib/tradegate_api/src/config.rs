//! API server configuration.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tradegate_core::auth::jwt::resolve_jwt_secret;
use tradegate_core::auth::tokens::{DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS};
use tradegate_core::federated::azure::{AzureConfig, DEFAULT_AUTHORITY, DEFAULT_USERINFO_URL};

use crate::gateway::routes::{RouteError, RouteTable};

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Routes(#[from] RouteError),
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    pub proxy_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// Backend routes.
    pub routes: RouteTable,
    /// Federated sign-in settings. `None` disables the federated endpoints.
    pub azure: Option<AzureConfig>,
    /// Front-end page receiving `?token=` after federated sign-in.
    pub frontend_callback_url: String,
    /// Mark auth cookies `Secure`.
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Defaults for everything but the signing secret and routes.
    pub fn new(jwt_secret: impl Into<String>, routes: RouteTable) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            database_url: None,
            jwt_secret: jwt_secret.into(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            proxy_timeout_secs: 30,
            health_timeout_secs: 5,
            routes,
            azure: None,
            frontend_callback_url: "http://localhost:3000/auth/callback".into(),
            cookie_secure: false,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `BIND_ADDR`                | `0.0.0.0:8080`                            |
    /// | `DATABASE_URL`             | unset → in-memory store                   |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file           |
    /// | `ACCESS_TOKEN_TTL_SECS`    | `86400`                                   |
    /// | `REFRESH_TOKEN_TTL_SECS`   | `604800`                                  |
    /// | `RATE_LIMIT_WINDOW_SECS`   | `60`                                      |
    /// | `RATE_LIMIT_MAX_REQUESTS`  | `100`                                     |
    /// | `PROXY_TIMEOUT_SECS`       | `30`                                      |
    /// | `HEALTH_TIMEOUT_SECS`      | `5`                                       |
    /// | `ROUTES_FILE`              | unset → built-in table (`*_SERVICE_URL`)  |
    /// | `AZURE_CLIENT_ID`          | unset → federated sign-in disabled        |
    /// | `AZURE_CLIENT_SECRET`, `AZURE_TENANT_ID`, `AZURE_REDIRECT_URL` |   |
    /// | `FRONTEND_CALLBACK_URL`    | `http://localhost:3000/auth/callback`     |
    /// | `COOKIE_SECURE`            | `false`                                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok(), resolve_jwt_secret)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        secret: impl FnOnce() -> String,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let routes = match var("ROUTES_FILE") {
            Some(path) => RouteTable::load(&PathBuf::from(path))?,
            None => RouteTable::platform_default(&var)?,
        };

        let mut config = Self::new(secret(), routes);
        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = var("DATABASE_URL");
        parse_into(&var, "ACCESS_TOKEN_TTL_SECS", &mut config.access_token_ttl_secs)?;
        parse_into(&var, "REFRESH_TOKEN_TTL_SECS", &mut config.refresh_token_ttl_secs)?;
        parse_into(&var, "RATE_LIMIT_WINDOW_SECS", &mut config.rate_limit_window_secs)?;
        parse_into(&var, "RATE_LIMIT_MAX_REQUESTS", &mut config.rate_limit_max_requests)?;
        parse_into(&var, "PROXY_TIMEOUT_SECS", &mut config.proxy_timeout_secs)?;
        parse_into(&var, "HEALTH_TIMEOUT_SECS", &mut config.health_timeout_secs)?;
        parse_into(&var, "COOKIE_SECURE", &mut config.cookie_secure)?;
        if let Some(url) = var("FRONTEND_CALLBACK_URL") {
            config.frontend_callback_url = url;
        }

        config.azure = var("AZURE_CLIENT_ID").map(|client_id| AzureConfig {
            client_id,
            client_secret: var("AZURE_CLIENT_SECRET").unwrap_or_default(),
            tenant: var("AZURE_TENANT_ID").unwrap_or_else(|| "common".into()),
            redirect_url: var("AZURE_REDIRECT_URL")
                .unwrap_or_else(|| "http://localhost:8080/auth/federated/callback".into()),
            authority: var("AZURE_AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.into()),
            userinfo_url: var("AZURE_USERINFO_URL").unwrap_or_else(|| DEFAULT_USERINFO_URL.into()),
        });

        Ok(config)
    }
}

fn parse_into<T: FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = var(name) {
        *slot = value.trim().parse().map_err(|_| ConfigError::Invalid { var: name, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|k| vars.get(k).cloned(), || "secret".into())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert_eq!(config.access_token_ttl_secs, 86_400);
        assert_eq!(config.refresh_token_ttl_secs, 604_800);
        assert_eq!(config.rate_limit_window_secs, 60);
        assert_eq!(config.rate_limit_max_requests, 100);
        assert_eq!(config.routes.len(), 7);
        assert!(config.azure.is_none());
        assert!(!config.cookie_secure);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
            ("COOKIE_SECURE", "true"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_TENANT_ID", "contoso"),
            ("BUDGETS_SERVICE_URL", "http://budgets.internal"),
        ])
        .unwrap();
        assert_eq!(config.rate_limit_max_requests, 5);
        assert!(config.cookie_secure);
        let azure = config.azure.unwrap();
        assert_eq!(azure.tenant, "contoso");
        assert_eq!(azure.authority, DEFAULT_AUTHORITY);
        assert_eq!(
            config.routes.resolve("/api/v1/budgets").unwrap().target,
            "http://budgets.internal"
        );
    }

    #[test]
    fn malformed_number_is_rejected() {
        assert!(matches!(
            config(&[("PROXY_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::Invalid {
                var: "PROXY_TIMEOUT_SECS",
                ..
            })
        ));
    }

    #[test]
    fn missing_routes_file_is_an_error() {
        assert!(matches!(
            config(&[("ROUTES_FILE", "/nonexistent/routes.yaml")]),
            Err(ConfigError::Routes(RouteError::Read { .. }))
        ));
    }
}
