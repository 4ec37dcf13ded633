//! Bundle resolution.
//!
//! Picks the engine distribution that best fits the platform the host runs on,
//! from either an inline manifest or one fetched over HTTP.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use engine_gate_common::{BundleManifest, BundleSpec, PlatformFeature};
use reqwest::Client;

use crate::error::InitializationFailed;

const MANIFEST_TIMEOUT_SECS: u64 = 30;

/// Capabilities of the execution environment a bundle is selected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub os: String,
    pub arch: String,
    pub features: HashSet<PlatformFeature>,
}

impl PlatformCapabilities {
    /// Probe the current process.
    pub fn detect() -> Self {
        let mut features = HashSet::new();

        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if parallelism > 1 {
            features.insert(PlatformFeature::Threads);
        }

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if std::arch::is_x86_feature_detected!("sse4.2") {
                features.insert(PlatformFeature::Simd);
            }
            if std::arch::is_x86_feature_detected!("avx2") {
                features.insert(PlatformFeature::Avx2);
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            // NEON is mandatory on aarch64
            features.insert(PlatformFeature::Simd);
        }

        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            features,
        }
    }

    pub fn supports(&self, spec: &BundleSpec) -> bool {
        let os_ok = spec.os.as_deref().map_or(true, |os| os == self.os);
        let arch_ok = spec.arch.as_deref().map_or(true, |arch| arch == self.arch);
        os_ok && arch_ok && spec.requires.iter().all(|f| self.features.contains(f))
    }

    fn describe_features(&self) -> String {
        let mut names: Vec<String> = self.features.iter().map(|f| f.to_string()).collect();
        names.sort();
        names.join(", ")
    }
}

/// The bundle chosen for this process.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleDescriptor {
    pub name: String,
    pub main_module: String,
    pub pthread_worker: Option<String>,
}

impl From<&BundleSpec> for BundleDescriptor {
    fn from(spec: &BundleSpec) -> Self {
        Self {
            name: spec.name.clone(),
            main_module: spec.main_module.clone(),
            pthread_worker: spec.pthread_worker.clone(),
        }
    }
}

/// Resolves the platform-appropriate engine bundle.
#[async_trait]
pub trait BundleResolver: Send + Sync {
    async fn resolve(
        &self,
        platform: &PlatformCapabilities,
    ) -> Result<BundleDescriptor, InitializationFailed>;
}

enum ManifestSource {
    Inline(BundleManifest),
    Remote { url: String, client: Client },
}

/// Resolver backed by a bundle manifest.
pub struct ManifestResolver {
    source: ManifestSource,
}

impl ManifestResolver {
    /// Resolve from a manifest known up front (e.g., from configuration).
    pub fn inline(manifest: BundleManifest) -> Self {
        Self {
            source: ManifestSource::Inline(manifest),
        }
    }

    /// Resolve from a manifest served at `url`.
    pub fn remote(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(MANIFEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            source: ManifestSource::Remote {
                url: url.into(),
                client,
            },
        }
    }

    async fn fetch_manifest(
        client: &Client,
        url: &str,
        platform: &PlatformCapabilities,
    ) -> Result<BundleManifest, InitializationFailed> {
        let response = client
            .get(url)
            .query(&[("os", platform.os.as_str()), ("arch", platform.arch.as_str())])
            .send()
            .await
            .map_err(|e| {
                InitializationFailed::new(format!("Failed to fetch bundle manifest: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(InitializationFailed::new(format!(
                "Bundle manifest server returned {}",
                response.status()
            )));
        }

        response.json::<BundleManifest>().await.map_err(|e| {
            InitializationFailed::new(format!("Invalid bundle manifest format: {}", e))
        })
    }

    /// Pick the compatible bundle requiring the most features.
    /// Ties go to the earliest manifest entry.
    fn select<'a>(
        manifest: &'a BundleManifest,
        platform: &PlatformCapabilities,
    ) -> Option<&'a BundleSpec> {
        let mut best: Option<&BundleSpec> = None;
        for spec in manifest.bundles.iter().filter(|s| platform.supports(s)) {
            match best {
                Some(current) if spec.requires.len() <= current.requires.len() => {}
                _ => best = Some(spec),
            }
        }
        best
    }
}

#[async_trait]
impl BundleResolver for ManifestResolver {
    async fn resolve(
        &self,
        platform: &PlatformCapabilities,
    ) -> Result<BundleDescriptor, InitializationFailed> {
        let fetched;
        let manifest = match &self.source {
            ManifestSource::Inline(manifest) => manifest,
            ManifestSource::Remote { url, client } => {
                tracing::debug!("Fetching bundle manifest from {}", url);
                fetched = Self::fetch_manifest(client, url, platform).await?;
                &fetched
            }
        };

        let spec = Self::select(manifest, platform).ok_or_else(|| {
            InitializationFailed::new(format!(
                "No engine bundle matches platform {}/{} (features: [{}])",
                platform.os,
                platform.arch,
                platform.describe_features()
            ))
        })?;

        tracing::debug!(
            bundle = %spec.name,
            candidates = manifest.bundles.len(),
            "Selected engine bundle"
        );
        Ok(BundleDescriptor::from(spec))
    }
}
