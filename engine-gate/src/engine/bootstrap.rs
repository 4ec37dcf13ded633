//! One-shot engine bootstrap.
//!
//! Resolve a bundle, stage its artifacts, start an isolated context, then
//! instantiate the engine inside it. The first failing step aborts the rest
//! and its message becomes the attempt's `InitializationFailed`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_gate_common::BundleManifest;

use super::{
    BundleResolver, ContextFactory, EngineHandle, HandoffStore, ManifestResolver,
    PlatformCapabilities, ProcessContextFactory, TempDirHandoff,
};
use crate::config::EngineConfig;
use crate::error::InitializationFailed;

/// Produces a ready engine or a single typed failure.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn bootstrap(&self) -> Result<EngineHandle, InitializationFailed>;
}

/// The production bootstrap sequence.
pub struct Bootstrapper {
    platform: PlatformCapabilities,
    resolver: Arc<dyn BundleResolver>,
    handoff: Arc<dyn HandoffStore>,
    contexts: Arc<dyn ContextFactory>,
    timeout: Option<Duration>,
}

impl Bootstrapper {
    pub fn new(
        platform: PlatformCapabilities,
        resolver: Arc<dyn BundleResolver>,
        handoff: Arc<dyn HandoffStore>,
        contexts: Arc<dyn ContextFactory>,
    ) -> Self {
        Self {
            platform,
            resolver,
            handoff,
            contexts,
            timeout: None,
        }
    }

    /// Bound each attempt. Expiry fails the attempt and drops whatever it had started.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the sequence from configuration, probing the current platform.
    pub fn from_config(config: &EngineConfig) -> Self {
        let resolver: Arc<dyn BundleResolver> = match &config.manifest_url {
            Some(url) => Arc::new(ManifestResolver::remote(url.clone())),
            None => Arc::new(ManifestResolver::inline(BundleManifest {
                bundles: config.bundles.clone(),
            })),
        };
        let handoff = Arc::new(TempDirHandoff::new(config.handoff_dir.as_ref().map(PathBuf::from)));
        let contexts = Arc::new(ProcessContextFactory::new(config.worker.clone()));
        let timeout = match config.init_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self::new(PlatformCapabilities::detect(), resolver, handoff, contexts).with_timeout(timeout)
    }

    async fn run_steps(&self) -> Result<EngineHandle, InitializationFailed> {
        let bundle = self
            .resolver
            .resolve(&self.platform)
            .await
            .inspect_err(|e| log_step_failure("resolve_bundle", e))?;
        tracing::info!(bundle = %bundle.name, "Resolved engine bundle");

        // Released when this scope ends, on success and on every error path
        let lease = self
            .handoff
            .acquire(&bundle)
            .await
            .inspect_err(|e| log_step_failure("stage_handoff", e))?;

        let context = self
            .contexts
            .spawn(&bundle)
            .await
            .inspect_err(|e| log_step_failure("spawn_context", e))?;

        let instance = context
            .instantiate(lease.artifacts())
            .await
            .inspect_err(|e| log_step_failure("instantiate", e))?;

        drop(lease);
        Ok(EngineHandle::new(instance))
    }
}

fn log_step_failure(step: &'static str, error: &InitializationFailed) {
    tracing::warn!(step, error = %error, "Engine bootstrap step failed");
}

#[async_trait]
impl Bootstrap for Bootstrapper {
    async fn bootstrap(&self) -> Result<EngineHandle, InitializationFailed> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_steps())
                .await
                .unwrap_or_else(|_| {
                    Err(InitializationFailed::new(format!(
                        "engine initialization timed out after {}s",
                        limit.as_secs_f64()
                    )))
                }),
            None => self.run_steps().await,
        }
    }
}
