//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::EngineRegistry;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: Config,
    pub engine_registry: Arc<EngineRegistry>,
}

impl AppState {
    pub fn new(config: Config, engine_registry: Arc<EngineRegistry>) -> Self {
        Self {
            config,
            engine_registry,
        }
    }
}
