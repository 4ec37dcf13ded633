//! Engine Gate - shared, lazily initialized access to a worker-hosted query engine.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod state;
pub mod test_util;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use engine::{EngineHandle, EngineRegistry, LifecycleState};
pub use error::{Error, InitializationFailed};
pub use gate::{Gate, GateView};
pub use state::AppState;

/// Build the full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/v1", api::router())
        .route("/health", axum::routing::get(api::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
