//! Route policy table.
//!
//! Maps a path prefix to a backend target and its access rule. Built once at
//! startup and read-only afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Route table errors, raised while loading configuration.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Failed to read routes file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse routes file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid route '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

fn required() -> bool {
    true
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutePolicy {
    /// Backend service name, used in logs and readiness output.
    pub name: String,
    /// Path prefix, segment aligned (`/api/v1/budgets` does not match `/api/v1/budgetsx`).
    pub path_prefix: String,
    /// Base URL of the backend.
    pub target: String,
    #[serde(default = "required")]
    pub auth_required: bool,
    /// Roles allowed through. Empty means any authenticated role.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RoutePolicy {
    pub fn new(name: &str, path_prefix: &str, target: &str, auth_required: bool) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            target: target.to_string(),
            auth_required,
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    /// A role allow-list implies authentication.
    pub fn requires_auth(&self) -> bool {
        self.auth_required || !self.roles.is_empty()
    }

    pub fn allows_role(&self, role: &str) -> bool {
        self.roles.is_empty() || self.roles.iter().any(|r| r == role)
    }

    /// Whether `path` falls under this prefix on a segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        if self.path_prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path as the backend should see it: the prefix removed, always rooted.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        if self.path_prefix == "/" {
            return path;
        }
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }

    fn normalize(mut self) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if !self.path_prefix.starts_with('/') {
            return Err(invalid("path_prefix must start with '/'"));
        }
        match Url::parse(&self.target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(invalid("target must be an http(s) URL")),
        }
        let trimmed = self.path_prefix.trim_end_matches('/');
        self.path_prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        self.target = self.target.trim_end_matches('/').to_string();
        Ok(self)
    }
}

/// Immutable, validated set of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// Sorted by prefix length, longest first.
    routes: Vec<RoutePolicy>,
}

impl RouteTable {
    pub fn new(routes: Vec<RoutePolicy>) -> Result<Self, RouteError> {
        let mut routes = routes
            .into_iter()
            .map(RoutePolicy::normalize)
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.path_prefix.as_str()) {
                return Err(RouteError::Invalid {
                    name: route.name.clone(),
                    reason: format!("duplicate path_prefix {}", route.path_prefix),
                });
            }
        }
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Ok(Self { routes })
    }

    /// Parse a YAML list of route entries.
    pub fn from_yaml(yaml: &str) -> Result<Self, RouteError> {
        let routes: Vec<RoutePolicy> = serde_yaml::from_str(yaml)?;
        Self::new(routes)
    }

    pub fn load(path: &Path) -> Result<Self, RouteError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| RouteError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Built-in table for the platform's backend services.
    ///
    /// `lookup` resolves `<NAME>_SERVICE_URL` overrides.
    pub fn platform_default(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RouteError> {
        const SERVICES: &[(&str, u16, &[&str])] = &[
            ("budgets", 4001, &[]),
            ("promotions", 4002, &[]),
            ("customers", 4003, &[]),
            ("products", 4004, &[]),
            ("claims", 4005, &[]),
            ("analytics", 4006, &[]),
            ("integrations", 4007, &["admin"]),
        ];
        let routes = SERVICES
            .iter()
            .map(|(name, port, roles)| {
                let var = format!("{}_SERVICE_URL", name.to_uppercase());
                let target = lookup(&var).unwrap_or_else(|| format!("http://localhost:{port}"));
                RoutePolicy::new(name, &format!("/api/v1/{name}"), &target, true).with_roles(roles)
            })
            .collect();
        Self::new(routes)
    }

    /// Longest matching prefix wins.
    pub fn resolve(&self, path: &str) -> Option<&RoutePolicy> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[RoutePolicy] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
