//! Engine lifecycle endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use engine_gate_common::{EngineStatus, GateState};

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::state::AppState;

const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Build the engine router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/engine", get(status))
        .route("/engine/init", post(init))
        .route("/engine/retry", post(retry))
}

/// GET /v1/engine - Current lifecycle snapshot. Never starts initialization.
///
/// When the engine is ready, its worker is asked whether it still answers.
async fn status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    let lifecycle = state.engine_registry.state();
    let mut status = state.engine_registry.status();

    if let Some(handle) = lifecycle.handle() {
        let check = tokio::time::timeout(
            Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
            handle.health_check(),
        )
        .await;

        let healthy = match check {
            Ok(Ok(health)) => health.is_healthy,
            Ok(Err(e)) => {
                tracing::warn!(engine_id = %handle.id(), error = %e, "Engine health check failed");
                false
            }
            Err(_) => {
                tracing::warn!(engine_id = %handle.id(), "Engine health check timed out");
                false
            }
        };
        status.healthy = Some(healthy);
    }

    Json(status)
}

/// POST /v1/engine/init - Ask for the engine and report what a gate sees.
async fn init(State(state): State<Arc<AppState>>) -> (StatusCode, Json<GateState>) {
    let gate = Gate::activate(&state.engine_registry);
    let view = gate.view();
    let code = if view.is_pending() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (code, Json(view.to_state()))
}

/// POST /v1/engine/retry - Start a fresh attempt after a failure.
async fn retry(State(state): State<Arc<AppState>>) -> Result<(StatusCode, Json<EngineStatus>)> {
    if !state.engine_registry.retry() {
        let phase = state.engine_registry.state().phase();
        return Err(Error::Conflict(format!(
            "engine is {}, retry is only allowed after a failure",
            phase
        )));
    }

    tracing::info!("Engine retry requested over HTTP");
    Ok((StatusCode::ACCEPTED, Json(state.engine_registry.status())))
}
