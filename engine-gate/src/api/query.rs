//! Query endpoint, gated on engine readiness.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use engine_gate_common::{QueryRequest, QueryResponse};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::state::AppState;

const MAX_WAIT_SECS: u64 = 300;

/// Build the query router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query))
}

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    /// Wait up to this many seconds for initialization to resolve.
    #[serde(default)]
    wait_secs: Option<u64>,
}

/// POST /v1/query - Submit work to the engine once it is ready.
async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    if request.statement.trim().is_empty() {
        return Err(Error::InvalidRequest("statement is required".to_string()));
    }

    let mut gate = Gate::activate(&state.engine_registry);
    let view = match params.wait_secs {
        Some(secs) if secs > 0 => {
            let limit = Duration::from_secs(secs.min(MAX_WAIT_SECS));
            let resolved = tokio::time::timeout(limit, gate.resolved()).await;
            match resolved {
                Ok(view) => view,
                Err(_) => gate.view(),
            }
        }
        _ => gate.view(),
    };

    let engine = view.into_result()?;
    tracing::debug!(engine_id = %engine.id(), "Submitting query");

    let response = engine.submit(&request).await?;
    Ok(Json(response))
}
