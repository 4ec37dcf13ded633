//! Integration tests for the engine-gate HTTP API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use engine_gate::config::{ApiConfig, Config, EngineConfig};
use engine_gate::engine::{Bootstrap, EngineHealth, EngineInstance, EngineRegistry};
use engine_gate::error::Result;
use engine_gate::test_util::ScriptedBootstrap;
use engine_gate::{AppState, EngineHandle, Error, InitializationFailed, LifecycleState};
use engine_gate_common::{QueryRequest, QueryResponse};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        api: ApiConfig::default(),
        engine: EngineConfig::default(),
    }
}

fn app_with(bootstrap: Arc<dyn Bootstrap>) -> (Router, Arc<EngineRegistry>) {
    let registry = Arc::new(EngineRegistry::new(bootstrap));
    let state = Arc::new(AppState::new(test_config(), registry.clone()));
    (engine_gate::app(state), registry)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_resolved(registry: &EngineRegistry) -> LifecycleState {
    let mut rx = registry.subscribe();
    let state = rx.wait_for(|s| s.is_resolved()).await.unwrap().clone();
    state
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = app_with(ScriptedBootstrap::held([Ok(())]));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_status_does_not_trigger_init() {
    let bootstrap = ScriptedBootstrap::held([Ok(())]);
    let (app, registry) = app_with(bootstrap.clone());

    let (status, body) = send(&app, get("/v1/engine")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "uninitialized");
    assert_eq!(body["attempts"], 0);
    assert!(body.get("healthy").is_none());
    assert!(matches!(registry.state(), LifecycleState::Uninitialized));
    assert_eq!(bootstrap.calls(), 0);
}

#[tokio::test]
async fn test_init_reports_pending_then_ready() {
    let bootstrap = ScriptedBootstrap::held([Ok(())]);
    let (app, registry) = app_with(bootstrap.clone());

    let (status, body) = send(&app, post("/v1/engine/init")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"state": "pending"}));

    let (status, _) = send(&app, post("/v1/engine/init")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    bootstrap.release();
    let handle = wait_resolved(&registry).await.handle().cloned().unwrap();

    let (status, body) = send(&app, post("/v1/engine/init")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["engine_id"], handle.id().to_string());

    let (_, body) = send(&app, get("/v1/engine")).await;
    assert_eq!(body["phase"], "ready");
    assert_eq!(body["engine_type"], "static");
    assert_eq!(body["healthy"], true);
    assert_eq!(bootstrap.calls(), 1);
}

/// Engine whose worker stopped answering after instantiation.
struct UnreachableEngine;

#[async_trait]
impl EngineInstance for UnreachableEngine {
    fn engine_type(&self) -> &'static str {
        "unreachable"
    }

    async fn health_check(&self) -> Result<EngineHealth> {
        Err(Error::Communication("connection refused".to_string()))
    }

    async fn submit(&self, _request: &QueryRequest) -> Result<QueryResponse> {
        Err(Error::Communication("connection refused".to_string()))
    }
}

struct UnreachableBootstrap;

#[async_trait]
impl Bootstrap for UnreachableBootstrap {
    async fn bootstrap(&self) -> std::result::Result<EngineHandle, InitializationFailed> {
        Ok(EngineHandle::new(Arc::new(UnreachableEngine)))
    }
}

#[tokio::test]
async fn test_status_reports_unhealthy_worker() {
    let (app, registry) = app_with(Arc::new(UnreachableBootstrap));

    registry.request_init();
    wait_resolved(&registry).await;

    let (status, body) = send(&app, get("/v1/engine")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "ready");
    assert_eq!(body["engine_type"], "unreachable");
    assert_eq!(body["healthy"], false);
}

#[tokio::test]
async fn test_query_while_initializing() {
    let (app, _) = app_with(ScriptedBootstrap::held([Ok(())]));

    let (status, body) = send(&app, post_json("/v1/query", json!({"statement": "SELECT 1"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "engine_initializing");
}

#[tokio::test]
async fn test_query_after_failure_shows_message_verbatim() {
    let bootstrap = ScriptedBootstrap::immediate([Err("bundle resolution timed out")]);
    let (app, registry) = app_with(bootstrap);

    registry.request_init();
    wait_resolved(&registry).await;

    let (status, body) = send(&app, post_json("/v1/query", json!({"statement": "SELECT 1"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "engine_failed");
    assert_eq!(body["error"]["message"], "bundle resolution timed out");

    let (_, body) = send(&app, get("/v1/engine")).await;
    assert_eq!(body["phase"], "failed");
    assert_eq!(body["error"], "bundle resolution timed out");
}

#[tokio::test]
async fn test_query_waits_for_ready() {
    let bootstrap = ScriptedBootstrap::immediate([Ok(())]);
    let (app, _) = app_with(bootstrap.clone());

    let (status, body) = send(
        &app,
        post_json("/v1/query?wait_secs=5", json!({"statement": "SELECT 42"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!({"echo": "SELECT 42"}));
    assert_eq!(bootstrap.calls(), 1);
}

#[tokio::test]
async fn test_query_rejects_empty_statement() {
    let bootstrap = ScriptedBootstrap::held([Ok(())]);
    let (app, _) = app_with(bootstrap.clone());

    let (status, body) = send(&app, post_json("/v1/query", json!({"statement": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(bootstrap.calls(), 0);
}

#[tokio::test]
async fn test_retry_flow() {
    let bootstrap = ScriptedBootstrap::held([Err("worker crashed"), Ok(())]);
    let (app, registry) = app_with(bootstrap.clone());

    let (status, body) = send(&app, post("/v1/engine/retry")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict");

    registry.request_init();
    bootstrap.release();
    wait_resolved(&registry).await;

    let (status, body) = send(&app, post("/v1/engine/retry")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "initializing");
    assert_eq!(body["attempts"], 2);

    bootstrap.release();
    assert!(wait_resolved(&registry).await.handle().is_some());

    let (status, _) = send(&app, post("/v1/engine/retry")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(bootstrap.calls(), 2);
}

#[test]
fn test_query_request_minimal() {
    let request: QueryRequest = serde_json::from_str(r#"{"statement": "SELECT 1"}"#).unwrap();
    assert_eq!(request.statement, "SELECT 1");
    assert!(request.params.is_empty());
}
