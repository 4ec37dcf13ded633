//! Test doubles for the engine access layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engine_gate_common::{QueryRequest, QueryResponse};
use serde_json::json;
use tokio::sync::Semaphore;

use crate::engine::{Bootstrap, EngineHandle, EngineHealth, EngineInstance};
use crate::error::{InitializationFailed, Result};

/// Engine that answers every query by echoing its statement.
pub struct StaticEngine;

#[async_trait]
impl EngineInstance for StaticEngine {
    fn engine_type(&self) -> &'static str {
        "static"
    }

    fn version(&self) -> Option<String> {
        Some("test".to_string())
    }

    async fn health_check(&self) -> Result<EngineHealth> {
        Ok(EngineHealth {
            is_healthy: true,
            version: self.version(),
        })
    }

    async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse> {
        Ok(QueryResponse {
            result: json!({ "echo": request.statement }),
        })
    }
}

/// Bootstrap that plays back scripted outcomes and counts its invocations.
///
/// A held bootstrap parks every attempt until `release` is called, which lets
/// tests pile up requests while an attempt is in flight.
pub struct ScriptedBootstrap {
    calls: AtomicUsize,
    gate: Semaphore,
    outcomes: Mutex<VecDeque<std::result::Result<(), &'static str>>>,
}

impl ScriptedBootstrap {
    /// Attempts resolve as soon as they start.
    pub fn immediate(
        outcomes: impl IntoIterator<Item = std::result::Result<(), &'static str>>,
    ) -> Arc<Self> {
        Self::with_permits(outcomes, Semaphore::MAX_PERMITS)
    }

    /// Attempts wait for `release`.
    pub fn held(
        outcomes: impl IntoIterator<Item = std::result::Result<(), &'static str>>,
    ) -> Arc<Self> {
        Self::with_permits(outcomes, 0)
    }

    fn with_permits(
        outcomes: impl IntoIterator<Item = std::result::Result<(), &'static str>>,
        permits: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(permits),
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        })
    }

    /// Let one parked attempt finish.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Number of bootstrap invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bootstrap for ScriptedBootstrap {
    async fn bootstrap(&self) -> std::result::Result<EngineHandle, InitializationFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| InitializationFailed::new(e.to_string()))?;
        permit.forget();

        let outcome = self
            .outcomes
            .lock()
            .map_err(|e| InitializationFailed::new(e.to_string()))?
            .pop_front()
            .unwrap_or(Ok(()));

        match outcome {
            Ok(()) => Ok(EngineHandle::new(Arc::new(StaticEngine))),
            Err(message) => Err(InitializationFailed::new(message)),
        }
    }
}
