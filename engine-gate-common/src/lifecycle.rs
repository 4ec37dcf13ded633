//! Lifecycle snapshots of the shared engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-wide lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    /// No initialization attempted yet
    Uninitialized,
    /// A single bootstrap run is in flight
    Initializing,
    /// The engine is live; permanent for the process lifetime
    Ready,
    /// The last bootstrap attempt failed
    Failed,
}

impl EnginePhase {
    /// Whether the phase is a resolution of a bootstrap attempt.
    pub fn is_resolved(&self) -> bool {
        matches!(self, EnginePhase::Ready | EnginePhase::Failed)
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Uninitialized => write!(f, "uninitialized"),
            EnginePhase::Initializing => write!(f, "initializing"),
            EnginePhase::Ready => write!(f, "ready"),
            EnginePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Serializable snapshot of the engine registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    /// Number of bootstrap attempts started so far
    #[serde(default)]
    pub attempts: u32,
    /// Identifier of the live engine (Ready only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    /// Whether the hosting worker answered its last health check (Ready only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    /// Verbatim diagnostic of the failed attempt (Failed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EngineStatus {
    pub fn uninitialized() -> Self {
        Self {
            phase: EnginePhase::Uninitialized,
            attempts: 0,
            engine_id: None,
            engine_type: None,
            version: None,
            ready_at: None,
            healthy: None,
            error: None,
        }
    }
}

/// What a gate renders to its consumers. Exactly one state is visible at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum GateState {
    /// Initialization requested or in flight
    Pending,
    /// Initialization failed; the message is shown verbatim
    Failed { message: String },
    /// The engine is usable
    Ready { engine_id: Uuid },
}
