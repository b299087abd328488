//! Reverse proxy: forwards a request to the backend of its route.
//!
//! The path prefix is stripped, the method, query, body and ordinary
//! headers pass through, and the verified principal (if any) is injected as
//! `X-User-*` headers. Identity headers sent by the client are always
//! dropped first.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::Response;
use tracing::{debug, warn};
use tradegate_core::models::auth::Principal;

use crate::error::AppError;
use crate::gateway::routes::RoutePolicy;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated tenant id.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
/// Header carrying the authenticated role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Largest request body forwarded to a backend (10 MB).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Hop-by-hop headers (RFC 9110 §7.6.1) plus the legacy `keep-alive` family.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy `headers` minus hop-by-hop headers and any header the `Connection`
/// header nominates.
fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let nominated: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || nominated.iter().any(|n| n == lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers sent upstream: end-to-end headers without `host`,
/// `content-length` or client-supplied identity, plus the principal's
/// identity when there is one.
pub fn upstream_headers(inbound: &HeaderMap, principal: Option<&Principal>) -> HeaderMap {
    let mut headers = end_to_end_headers(inbound);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    for name in [USER_ID_HEADER, TENANT_ID_HEADER, USER_ROLE_HEADER] {
        headers.remove(name);
    }

    if let Some(principal) = principal {
        for (name, value) in [
            (USER_ID_HEADER, &principal.id),
            (TENANT_ID_HEADER, &principal.tenant_id),
            (USER_ROLE_HEADER, &principal.role),
        ] {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
    headers
}

/// Forwards requests to backends over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReverseProxy {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Backend URL for `path` and `query` under `route`.
    pub fn upstream_url(route: &RoutePolicy, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}{}", route.target, route.strip(path));
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Forward `request` to the route's backend and stream the answer back.
    ///
    /// Connection failures and timeouts become `BadGateway`; nothing is retried.
    pub async fn forward(
        &self,
        route: &RoutePolicy,
        principal: Option<&Principal>,
        request: Request,
    ) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let url = Self::upstream_url(route, parts.uri.path(), parts.uri.query());
        let headers = upstream_headers(&parts.headers, principal);

        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read request body: {e}")))?;

        debug!(service = %route.name, method = %parts.method, %url, "forwarding request");

        let send = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send();

        let upstream = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(service = %route.name, error = %e, "backend request failed");
                return Err(AppError::BadGateway(format!("{}: {e}", route.name)));
            }
            Err(_) => {
                warn!(service = %route.name, timeout = ?self.timeout, "backend timed out");
                return Err(AppError::BadGateway(format!(
                    "{}: no response within {:?}",
                    route.name, self.timeout
                )));
            }
        };

        let status = upstream.status();
        let mut headers = end_to_end_headers(upstream.headers());
        headers.remove(header::CONTENT_LENGTH);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            id: "u1".into(),
            email: "ana@acme.io".into(),
            tenant_id: "t1".into(),
            role: "admin".into(),
        }
    }

    fn inbound() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("host", "gateway.local".parse().unwrap());
        h.insert("content-length", "12".parse().unwrap());
        h.insert("connection", "keep-alive, x-internal".parse().unwrap());
        h.insert("keep-alive", "timeout=5".parse().unwrap());
        h.insert("x-internal", "1".parse().unwrap());
        h.insert("x-user-id", "spoofed".parse().unwrap());
        h.insert("x-tenant-id", "spoofed".parse().unwrap());
        h.insert("accept", "application/json".parse().unwrap());
        h.insert("x-request-id", "abc".parse().unwrap());
        h
    }

    #[test]
    fn reserved_headers_are_stripped() {
        let out = upstream_headers(&inbound(), None);
        for name in ["host", "content-length", "connection", "keep-alive", "x-internal"] {
            assert!(out.get(name).is_none(), "{name} should be stripped");
        }
        assert!(out.get(USER_ID_HEADER).is_none());
        assert!(out.get(TENANT_ID_HEADER).is_none());
        assert_eq!(out["accept"], "application/json");
        assert_eq!(out["x-request-id"], "abc");
    }

    #[test]
    fn principal_identity_replaces_spoofed_values() {
        let out = upstream_headers(&inbound(), Some(&principal()));
        assert_eq!(out[USER_ID_HEADER], "u1");
        assert_eq!(out[TENANT_ID_HEADER], "t1");
        assert_eq!(out[USER_ROLE_HEADER], "admin");
        assert_eq!(out.get_all(USER_ID_HEADER).iter().count(), 1);
    }

    #[test]
    fn upstream_url_strips_prefix_and_keeps_query() {
        let route = RoutePolicy::new("budgets", "/api/v1/budgets", "http://budgets:4001", true);
        assert_eq!(
            ReverseProxy::upstream_url(&route, "/api/v1/budgets/7", Some("year=2025")),
            "http://budgets:4001/7?year=2025"
        );
        assert_eq!(
            ReverseProxy::upstream_url(&route, "/api/v1/budgets", None),
            "http://budgets:4001/"
        );
    }
}
