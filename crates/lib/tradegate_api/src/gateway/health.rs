//! Service health aggregation.
//!
//! Probes every backend's `GET /health` concurrently, each bounded by the
//! same timeout, and reduces the results to one readiness verdict. All
//! probes run to completion; the full breakdown is always reported.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::gateway::routes::RouteTable;

/// Result of one liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub name: String,
    pub healthy: bool,
    /// HTTP status returned by the backend, when it answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    /// `healthy` or `unhealthy`.
    pub status: String,
    pub services: Vec<ServiceHealthRecord>,
}

impl Readiness {
    fn from_records(services: Vec<ServiceHealthRecord>) -> Self {
        let ready = services.iter().all(|s| s.healthy);
        Self {
            status: if ready { "healthy" } else { "unhealthy" }.to_string(),
            services,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.services.iter().all(|s| s.healthy)
    }
}

/// A backend to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub base_url: String,
}

/// Concurrent liveness fan-out over the configured backends.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    client: reqwest::Client,
    services: Vec<ServiceTarget>,
    timeout: Duration,
}

impl HealthAggregator {
    pub fn new(services: Vec<ServiceTarget>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            services,
            timeout,
        })
    }

    /// One target per distinct service name in the route table, in table order.
    pub fn targets_from_routes(routes: &RouteTable) -> Vec<ServiceTarget> {
        let mut targets: Vec<ServiceTarget> = Vec::new();
        for route in routes.routes() {
            if targets.iter().any(|t| t.name == route.name) {
                continue;
            }
            targets.push(ServiceTarget {
                name: route.name.clone(),
                base_url: route.target.clone(),
            });
        }
        targets
    }

    pub fn services(&self) -> &[ServiceTarget] {
        &self.services
    }

    async fn probe(&self, target: &ServiceTarget) -> ServiceHealthRecord {
        let url = format!("{}/health", target.base_url.trim_end_matches('/'));
        let outcome = tokio::time::timeout(self.timeout, self.client.get(&url).send()).await;

        let (healthy, status, error) = match outcome {
            Ok(Ok(resp)) if resp.status().is_success() => (true, Some(resp.status().as_u16()), None),
            Ok(Ok(resp)) => (
                false,
                Some(resp.status().as_u16()),
                Some(format!("HTTP {}", resp.status())),
            ),
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => (false, None, Some(format!("timed out after {:?}", self.timeout))),
        };

        if healthy {
            debug!(service = %target.name, "health probe ok");
        } else {
            warn!(service = %target.name, error = ?error, "health probe failed");
        }

        ServiceHealthRecord {
            name: target.name.clone(),
            healthy,
            status,
            error,
        }
    }

    /// Probe every service concurrently. Returns one record per service.
    pub async fn check_all(&self) -> Readiness {
        let records = join_all(self.services.iter().map(|target| self.probe(target))).await;
        Readiness::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::routes::RoutePolicy;

    #[test]
    fn verdict_is_and_of_all_flags() {
        let record = |name: &str, healthy| ServiceHealthRecord {
            name: name.into(),
            healthy,
            status: None,
            error: None,
        };
        assert!(Readiness::from_records(vec![record("a", true), record("b", true)]).is_ready());

        let mixed = Readiness::from_records(vec![record("a", true), record("b", false)]);
        assert!(!mixed.is_ready());
        assert_eq!(mixed.status, "unhealthy");
        assert_eq!(mixed.services.len(), 2);

        let empty = Readiness::from_records(Vec::new());
        assert!(empty.is_ready());
        assert_eq!(empty.status, "healthy");
    }

    #[test]
    fn targets_are_deduplicated_by_name() {
        let table = RouteTable::new(vec![
            RoutePolicy::new("promotions", "/api/v1/promotions", "http://promo:4002", true),
            RoutePolicy::new("promotions", "/api/v1/promo-public", "http://promo:4002", false),
            RoutePolicy::new("claims", "/api/v1/claims", "http://claims:4005", true),
        ])
        .unwrap();
        let targets = HealthAggregator::targets_from_routes(&table);
        assert_eq!(targets.len(), 2);
    }
}
