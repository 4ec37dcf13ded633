//! Engine distribution bundles.
//!
//! A manifest lists the platform-specific bundles an engine ships in. The host
//! picks the best match for the platform it runs on.

use serde::{Deserialize, Serialize};

/// Platform capability a bundle may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFeature {
    /// More than one hardware thread is available
    Threads,
    /// 128-bit SIMD (SSE4.2 / NEON)
    Simd,
    /// 256-bit AVX2
    Avx2,
}

impl PlatformFeature {
    pub const ALL: [PlatformFeature; 3] = [
        PlatformFeature::Threads,
        PlatformFeature::Simd,
        PlatformFeature::Avx2,
    ];
}

impl std::fmt::Display for PlatformFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformFeature::Threads => write!(f, "threads"),
            PlatformFeature::Simd => write!(f, "simd"),
            PlatformFeature::Avx2 => write!(f, "avx2"),
        }
    }
}

/// One distribution bundle of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSpec {
    /// Bundle name (e.g., "mvp", "simd-threads")
    pub name: String,
    /// Target OS as reported by `std::env::consts::OS`; any when absent
    #[serde(default)]
    pub os: Option<String>,
    /// Target architecture as reported by `std::env::consts::ARCH`; any when absent
    #[serde(default)]
    pub arch: Option<String>,
    /// Features the platform must provide
    #[serde(default)]
    pub requires: Vec<PlatformFeature>,
    /// Path or http(s) URL of the main engine module
    pub main_module: String,
    /// Path or http(s) URL of the thread worker module, for threaded bundles
    #[serde(default)]
    pub pthread_worker: Option<String>,
}

/// List of bundles, in order of preference for equally capable candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default)]
    pub bundles: Vec<BundleSpec>,
}
