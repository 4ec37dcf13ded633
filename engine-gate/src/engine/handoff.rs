//! Transient handoff resources.
//!
//! Module artifacts are staged into a scratch location the worker loads them
//! from. The stage only has to outlive instantiation; a `HandoffLease` drops
//! it on every exit path of the bootstrap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tempfile::TempDir;

use super::BundleDescriptor;
use crate::error::InitializationFailed;

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Local module artifacts handed to the engine at instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleArtifacts {
    pub main_module: PathBuf,
    pub pthread_worker: Option<PathBuf>,
}

/// Scoped ownership of staged artifacts. Dropping the lease releases them.
pub struct HandoffLease {
    artifacts: ModuleArtifacts,
    _guard: Box<dyn Send + Sync>,
}

impl HandoffLease {
    pub fn new(artifacts: ModuleArtifacts, guard: impl Send + Sync + 'static) -> Self {
        Self {
            artifacts,
            _guard: Box::new(guard),
        }
    }

    pub fn artifacts(&self) -> &ModuleArtifacts {
        &self.artifacts
    }
}

impl std::fmt::Debug for HandoffLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffLease")
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

/// Acquires the transient resources a bundle handoff needs.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    async fn acquire(&self, bundle: &BundleDescriptor) -> Result<HandoffLease, InitializationFailed>;
}

/// Stages artifacts into a temporary directory removed when the lease drops.
///
/// Local paths are copied; `http://` and `https://` artifacts are downloaded.
pub struct TempDirHandoff {
    parent: Option<PathBuf>,
    client: Client,
}

impl TempDirHandoff {
    pub fn new(parent: Option<PathBuf>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { parent, client }
    }

    fn create_dir(parent: Option<&Path>) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("engine-handoff-");
        match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }

    fn file_name(source: &str) -> String {
        source
            .rsplit(['/', '\\'])
            .find(|s| !s.is_empty())
            .map(|s| s.split(['?', '#']).next().unwrap_or(s))
            .filter(|s| !s.is_empty())
            .unwrap_or("artifact")
            .to_string()
    }

    /// Stage one artifact under `dir/<role>/`, keeping its file name.
    async fn stage(
        &self,
        source: &str,
        dir: &Path,
        role: &str,
    ) -> Result<PathBuf, InitializationFailed> {
        let role_dir = dir.join(role);
        tokio::fs::create_dir_all(&role_dir).await.map_err(|e| {
            InitializationFailed::new(format!("Failed to stage {}: {}", source, e))
        })?;
        let target = role_dir.join(Self::file_name(source));

        if source.starts_with("http://") || source.starts_with("https://") {
            let response = self.client.get(source).send().await.map_err(|e| {
                InitializationFailed::new(format!("Failed to download {}: {}", source, e))
            })?;

            if !response.status().is_success() {
                return Err(InitializationFailed::new(format!(
                    "Failed to download {}: server returned {}",
                    source,
                    response.status()
                )));
            }

            let bytes = response.bytes().await.map_err(|e| {
                InitializationFailed::new(format!("Failed to download {}: {}", source, e))
            })?;
            tokio::fs::write(&target, &bytes).await.map_err(|e| {
                InitializationFailed::new(format!("Failed to stage {}: {}", source, e))
            })?;
        } else {
            tokio::fs::copy(source, &target).await.map_err(|e| {
                InitializationFailed::new(format!("Failed to stage {}: {}", source, e))
            })?;
        }

        Ok(target)
    }
}

#[async_trait]
impl HandoffStore for TempDirHandoff {
    async fn acquire(&self, bundle: &BundleDescriptor) -> Result<HandoffLease, InitializationFailed> {
        let parent = self.parent.clone();
        let task = tokio::task::spawn_blocking(move || Self::create_dir(parent.as_deref()));
        let created = match task.await {
            Ok(created) => created,
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
        };
        let dir = created.map_err(|e| {
            InitializationFailed::new(format!("Failed to create handoff directory: {}", e))
        })?;

        // On error `dir` drops here and removes whatever was staged so far
        let main_module = self.stage(&bundle.main_module, dir.path(), "main").await?;
        let pthread_worker = match &bundle.pthread_worker {
            Some(source) => Some(self.stage(source, dir.path(), "worker").await?),
            None => None,
        };

        tracing::debug!(
            bundle = %bundle.name,
            dir = %dir.path().display(),
            "Staged engine artifacts"
        );

        Ok(HandoffLease::new(
            ModuleArtifacts {
                main_module,
                pthread_worker,
            },
            dir,
        ))
    }
}
