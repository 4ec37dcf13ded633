//! Configuration for the engine gate.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use engine_gate_common::BundleSpec;
use serde::Deserialize;

/// Main configuration structure for the engine gate.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Engine bootstrap configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Start the bootstrap at process start instead of on first request.
    #[serde(default)]
    pub eager: bool,
    /// Upper bound on one bootstrap attempt in seconds. 0 disables the bound.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,
    /// Parent directory for staged module artifacts (system temp dir if unset).
    #[serde(default)]
    pub handoff_dir: Option<String>,
    /// Remote bundle manifest. Takes precedence over `bundles` when set.
    #[serde(default)]
    pub manifest_url: Option<String>,
    /// Inline bundle manifest.
    #[serde(default)]
    pub bundles: Vec<BundleSpec>,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eager: false,
            init_timeout_secs: default_init_timeout(),
            handoff_dir: None,
            manifest_url: None,
            bundles: Vec::new(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Worker process configuration.
///
/// The worker hosts the engine in its own process so engine work never runs
/// on the host's runtime threads.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Path to the worker binary or wrapper command.
    #[serde(default = "default_worker_binary")]
    pub binary: String,
    /// Extra arguments inserted BEFORE the worker flags.
    /// Use this for wrapper commands, e.g. `["run", "--rm", "engine-worker"]`
    #[serde(default)]
    pub args: Vec<String>,
    /// Base port for the worker. If not set, OS assigns a port dynamically.
    #[serde(default)]
    pub base_port: Option<u16>,
    /// Worker startup timeout in seconds (default: 60).
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Grace period before a failed worker is killed, in seconds (default: 10).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Pass worker stdout/stderr through (default: false).
    #[serde(default)]
    pub log_output: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary: default_worker_binary(),
            args: Vec::new(),
            base_port: None,
            startup_timeout_secs: default_startup_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            log_output: false,
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_init_timeout() -> u64 {
    120
}
fn default_worker_binary() -> String {
    "engine-worker".to_string()
}
fn default_startup_timeout() -> u64 {
    60
}
fn default_shutdown_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (ENGINE_GATE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("api.host", default_host())?
            .set_default("api.port", default_port() as i64)?
            .set_default("engine.init_timeout_secs", default_init_timeout() as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("ENGINE_GATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
