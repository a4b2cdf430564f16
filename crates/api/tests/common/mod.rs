#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use opswatch_monitor::{ProbeError, ProbeOutcome, Prober};
use tower::ServiceExt;

use opswatch_api::config::ServerConfig;
use opswatch_api::router::build_app_router;
use opswatch_api::state::AppState;

/// Token accepted for writes by [`test_config_with_tokens`].
pub const WRITE_TOKEN: &str = "test-token";

/// Build a test `ServerConfig` with safe defaults and open writes.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        event_log_capacity: 500,
        history_capacity: 1000,
        data_dir: PathBuf::from("./unused"),
        write_tokens: Vec::new(),
        heartbeat_interval_secs: 30,
    }
}

/// Same as [`test_config`] but only [`WRITE_TOKEN`] may write.
pub fn test_config_with_tokens() -> ServerConfig {
    ServerConfig {
        write_tokens: vec![WRITE_TOKEN.to_string()],
        ..test_config()
    }
}

/// Prober that always reports the host as reachable after a short delay.
pub struct AlwaysUp;

#[async_trait]
impl Prober for AlwaysUp {
    async fn probe(&self, _hostname: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        Ok(ProbeOutcome::reachable(Some(1.0)))
    }
}

/// Build state plus the full application router (same middleware stack as
/// production) from the given config.
pub fn build_test_app_with(config: ServerConfig) -> (Router, AppState) {
    let state = AppState::new(config.clone(), Arc::new(AlwaysUp));
    let app = build_app_router(state.clone(), &config);
    (app, state)
}

/// Build the full application router with open writes.
pub fn build_test_app() -> Router {
    build_test_app_with(test_config()).0
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), None).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None, None).await
}

/// Issue a request, optionally with a JSON body and a bearer token.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    token: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
