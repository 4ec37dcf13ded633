//! Health check endpoint.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// GET /health - Liveness of the host process.
///
/// Independent of the engine: a host whose engine failed to initialize is
/// still alive and serves `/v1/engine`.
pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
