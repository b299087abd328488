//! Liveness and aggregated readiness.

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tradegate_api::gateway::routes::RoutePolicy;

use common::{
    config, spawn_backend, spawn_health_backend, spawn_slow_backend, test_app, unreachable_addr,
};

#[tokio::test]
async fn health_is_always_ok() {
    let dead = unreachable_addr();
    let app = test_app(config(vec![RoutePolicy::new(
        "budgets",
        "/api/v1/budgets",
        &format!("http://{dead}"),
        true,
    )]));

    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["status"], "healthy");
}

#[tokio::test]
async fn ready_when_every_backend_is_healthy() {
    let a = spawn_backend().await;
    let b = spawn_backend().await;
    let app = test_app(config(vec![
        RoutePolicy::new("budgets", "/api/v1/budgets", &a.url(), true),
        RoutePolicy::new("claims", "/api/v1/claims", &b.url(), true),
    ]));

    let resp = app.get("/ready").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["status"], "healthy");
    let services = resp.json["services"].as_array().unwrap();
    assert_eq!(services.len(), 2);
    assert!(services.iter().all(|s| s["healthy"] == true));
}

#[tokio::test]
async fn every_failure_is_reported_without_short_circuit() {
    let ok = spawn_backend().await;
    let failing = spawn_health_backend(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dead = unreachable_addr();
    let app = test_app(config(vec![
        RoutePolicy::new("budgets", "/api/v1/budgets", &ok.url(), true),
        RoutePolicy::new("claims", "/api/v1/claims", &format!("http://{failing}"), true),
        RoutePolicy::new("products", "/api/v1/products", &format!("http://{dead}"), true),
    ]));

    let resp = app.get("/ready").await;

    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.json["status"], "unhealthy");
    let services = resp.json["services"].as_array().unwrap();
    assert_eq!(services.len(), 3);

    let by_name = |name: &str| {
        services
            .iter()
            .find(|s| s["name"] == name)
            .unwrap_or_else(|| panic!("missing record for {name}"))
    };
    assert_eq!(by_name("budgets")["healthy"], true);
    assert_eq!(by_name("claims")["healthy"], false);
    assert_eq!(by_name("claims")["status"], 500);
    assert_eq!(by_name("products")["healthy"], false);
    assert!(by_name("products")["error"].is_string());
}

#[tokio::test]
async fn slow_backend_is_reported_as_timed_out() {
    let slow = spawn_slow_backend(Duration::from_secs(5)).await;
    let app = test_app(config(vec![RoutePolicy::new(
        "analytics",
        "/api/v1/analytics",
        &format!("http://{slow}"),
        true,
    )]));

    let resp = app.get("/ready").await;

    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    let record = &resp.json["services"][0];
    assert_eq!(record["healthy"], false);
    assert!(record["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn probes_run_concurrently() {
    let delay = Duration::from_millis(800);
    let mut routes = Vec::new();
    for name in ["budgets", "claims", "products"] {
        let addr = spawn_slow_backend(delay).await;
        routes.push(RoutePolicy::new(
            name,
            &format!("/api/v1/{name}"),
            &format!("http://{addr}"),
            true,
        ));
    }
    let app = test_app(config(routes));

    let started = Instant::now();
    let resp = app.get("/ready").await;
    let elapsed = started.elapsed();

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["services"].as_array().unwrap().len(), 3);
    assert!(
        elapsed < Duration::from_millis(1800),
        "probes took {elapsed:?}, expected about one delay"
    );
}
