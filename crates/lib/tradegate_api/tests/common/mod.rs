//! Shared helpers for the router integration tests.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! backends it proxies to are real axum servers on ephemeral ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};
use tower::ServiceExt;
use tradegate_api::config::ApiConfig;
use tradegate_api::gateway::routes::{RoutePolicy, RouteTable};
use tradegate_api::{AppState, router};
use tradegate_core::auth::password::hash_password;
use tradegate_core::models::auth::{DEFAULT_ROLE, NewUser, User};
use tradegate_core::store::{CredentialStore, MemoryCredentialStore};

pub const SECRET: &str = "integration-secret";

/// Router plus handles on its state.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryCredentialStore>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            json,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_with_token(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::get(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Seed an active user with a password and return it.
    pub async fn seed_user(&self, email: &str, password: &str, role: &str) -> User {
        let (user, _) = self
            .store
            .create_user_if_absent(NewUser {
                email: email.into(),
                tenant_id: "tenant-1".into(),
                role: role.into(),
                is_active: true,
                azure_id: None,
                first_name: None,
                last_name: None,
                password_hash: Some(hash_password(password).expect("hash")),
            })
            .await
            .expect("seed user");
        user
    }

    /// Issue an access token for a user without going through login.
    pub fn token_for(&self, user: &User) -> String {
        self.state
            .tokens
            .issue_access_token(&user.into())
            .expect("issue token")
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn error_kind(&self) -> &str {
        self.json["error"].as_str().unwrap_or_default()
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

pub fn config(routes: Vec<RoutePolicy>) -> ApiConfig {
    let mut config = ApiConfig::new(SECRET, RouteTable::new(routes).expect("valid routes"));
    config.proxy_timeout_secs = 2;
    config.health_timeout_secs = 1;
    config
}

pub fn test_app(config: ApiConfig) -> TestApp {
    let store = Arc::new(MemoryCredentialStore::new());
    let state = AppState::new(config, store.clone()).expect("app state");
    build(state, store)
}

pub fn build(state: AppState, store: Arc<MemoryCredentialStore>) -> TestApp {
    TestApp {
        app: router(state.clone()),
        state,
        store,
    }
}

pub fn default_user_role() -> &'static str {
    DEFAULT_ROLE
}

/// Backend answering `/health` with 200 and echoing every other request.
pub struct Backend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    axum::Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

pub async fn spawn_backend() -> Backend {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            counter.fetch_add(1, Ordering::SeqCst);
            echo(method, uri, headers, body)
        });
    Backend {
        addr: serve(app).await,
        hits,
    }
}

/// Backend whose `/health` answers with `status`.
pub async fn spawn_health_backend(status: StatusCode) -> SocketAddr {
    let app = Router::new().route("/health", get(move || async move { status }));
    serve(app).await
}

/// Backend that answers every path, `/health` included, only after `delay`.
pub async fn spawn_slow_backend(delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    });
    serve(app).await
}

/// Address nothing is listening on.
pub fn unreachable_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr")
}
