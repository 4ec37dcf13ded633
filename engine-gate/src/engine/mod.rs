//! Engine access layer.
//!
//! The engine runs out of process. This module owns the one-time bootstrap of
//! that engine and the handle every consumer shares once it is ready.

mod bootstrap;
mod bundle;
mod handoff;
mod registry;
mod worker;

pub use bootstrap::{Bootstrap, Bootstrapper};
pub use bundle::{BundleDescriptor, BundleResolver, ManifestResolver, PlatformCapabilities};
pub use handoff::{HandoffLease, HandoffStore, ModuleArtifacts, TempDirHandoff};
pub use registry::{EngineRegistry, LifecycleState};
pub use worker::{ContextFactory, IsolatedContext, ProcessContextFactory, WorkerContext, WorkerEngine};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_gate_common::{QueryRequest, QueryResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Health status reported by a live engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub is_healthy: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// A live engine instance hosted in an isolated execution context.
///
/// Work submitted here is forwarded to the context hosting the engine, which
/// serializes it. Ordering across callers follows that context's own queue.
#[async_trait]
pub trait EngineInstance: Send + Sync {
    /// Engine implementation identifier (e.g., "worker").
    fn engine_type(&self) -> &'static str;

    /// Version reported by the engine at instantiation.
    fn version(&self) -> Option<String> {
        None
    }

    /// Check that the hosting context still answers.
    async fn health_check(&self) -> Result<EngineHealth>;

    /// Submit one unit of work to the engine.
    async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse>;
}

/// Shared capability to a ready engine.
///
/// Created once per successful bootstrap and owned by the registry. Clones
/// share the same instance; nothing ever builds a second one from it.
#[derive(Clone)]
pub struct EngineHandle {
    id: Uuid,
    ready_at: DateTime<Utc>,
    instance: Arc<dyn EngineInstance>,
}

impl EngineHandle {
    pub fn new(instance: Arc<dyn EngineInstance>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ready_at: Utc::now(),
            instance,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ready_at(&self) -> DateTime<Utc> {
        self.ready_at
    }

    pub fn engine_type(&self) -> &'static str {
        self.instance.engine_type()
    }

    pub fn version(&self) -> Option<String> {
        self.instance.version()
    }

    /// Whether both handles refer to the same engine instance.
    pub fn ptr_eq(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    pub async fn health_check(&self) -> Result<EngineHealth> {
        self.instance.health_check().await
    }

    pub async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.instance.submit(request).await
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("engine_type", &self.instance.engine_type())
            .field("ready_at", &self.ready_at)
            .finish()
    }
}
