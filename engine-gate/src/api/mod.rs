//! HTTP API.

pub mod engine;
pub mod health;
pub mod query;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(engine::router())
        .merge(query::router())
}
