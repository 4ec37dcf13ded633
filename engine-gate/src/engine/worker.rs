//! Isolated execution contexts.
//!
//! The engine is hosted in a dedicated worker process so heavy engine work
//! never runs on the host's own threads. The host talks to it over loopback
//! HTTP using the `engine_gate_common::protocol` messages.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use engine_gate_common::{InstantiateRequest, InstantiateResponse, QueryRequest, QueryResponse};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};

use super::{BundleDescriptor, EngineHealth, EngineInstance, ModuleArtifacts};
use crate::config::WorkerConfig;
use crate::error::{Error, InitializationFailed, Result};

const HEALTH_CHECK_INTERVAL_MS: u64 = 200;

/// Creates the isolated context the engine is instantiated in.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn spawn(
        &self,
        bundle: &BundleDescriptor,
    ) -> std::result::Result<Box<dyn IsolatedContext>, InitializationFailed>;
}

/// A started context that can host one engine instance.
#[async_trait]
pub trait IsolatedContext: Send + Sync {
    async fn instantiate(
        &self,
        artifacts: &ModuleArtifacts,
    ) -> std::result::Result<Arc<dyn EngineInstance>, InitializationFailed>;
}

/// A running worker process.
///
/// The child is killed when the last reference drops, so a context abandoned
/// before instantiation does not leak its process.
struct WorkerProcess {
    bundle: String,
    base_url: String,
    _child: Option<Child>,
}

/// Spawns worker processes from the configured binary.
pub struct ProcessContextFactory {
    config: WorkerConfig,
    http_client: Client,
}

impl ProcessContextFactory {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }

    /// Allocate a port for the worker.
    async fn allocate_port(&self) -> std::result::Result<u16, InitializationFailed> {
        if let Some(base) = self.config.base_port {
            return Ok(base);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            InitializationFailed::new(format!("Failed to bind for port allocation: {}", e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| InitializationFailed::new(format!("Failed to get local addr: {}", e)))?
            .port();
        drop(listener);
        Ok(port)
    }

    fn command(&self, bundle: &BundleDescriptor, port: u16) -> Command {
        let mut cmd = Command::new(&self.config.binary);

        // Wrapper arguments must come before the worker flags
        for arg in &self.config.args {
            cmd.arg(arg);
        }
        cmd.arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .arg("--bundle")
            .arg(&bundle.name);

        cmd.stdin(Stdio::null()).kill_on_drop(true);

        if self.config.log_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        cmd
    }

    /// Wait for a freshly spawned worker to answer its health endpoint.
    async fn wait_for_ready(
        &self,
        child: &mut Child,
        base_url: &str,
    ) -> std::result::Result<(), InitializationFailed> {
        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let start = Instant::now();
        let health_url = format!("{}/health", base_url);

        loop {
            if start.elapsed() > timeout {
                return Err(InitializationFailed::new(format!(
                    "Engine worker startup timeout after {:?}",
                    start.elapsed()
                )));
            }

            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    return Err(InitializationFailed::new(format!(
                        "Engine worker exited during startup ({})",
                        status
                    )));
                }
                Err(e) => {
                    return Err(InitializationFailed::new(format!(
                        "Failed to poll engine worker: {}",
                        e
                    )));
                }
            }

            if let Ok(resp) = self.http_client.get(&health_url).send().await {
                if resp.status().is_success() {
                    tracing::info!("Engine worker ready at {} ({:?})", base_url, start.elapsed());
                    return Ok(());
                }
            }

            tokio::time::sleep(Duration::from_millis(HEALTH_CHECK_INTERVAL_MS)).await;
        }
    }

    /// Terminate a worker that failed to start: SIGTERM, then kill after the grace period.
    async fn terminate(&self, mut child: Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        let wait_result = tokio::time::timeout(
            Duration::from_secs(self.config.shutdown_timeout_secs),
            child.wait(),
        )
        .await;

        match wait_result {
            Ok(Ok(status)) => {
                tracing::debug!("Engine worker exited with {}", status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Error waiting for engine worker: {}", e);
            }
            Err(_timeout) => {
                tracing::warn!("Engine worker didn't stop gracefully, killing");
                let _ = child.kill().await;
            }
        }
    }
}

#[async_trait]
impl ContextFactory for ProcessContextFactory {
    async fn spawn(
        &self,
        bundle: &BundleDescriptor,
    ) -> std::result::Result<Box<dyn IsolatedContext>, InitializationFailed> {
        let port = self.allocate_port().await?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = self.command(bundle, port);
        let mut child = cmd.spawn().map_err(|e| {
            InitializationFailed::new(format!(
                "Failed to spawn engine worker: {}. Binary: {}",
                e, self.config.binary
            ))
        })?;

        tracing::info!(
            "Spawned engine worker for bundle {} on port {} (pid: {:?})",
            bundle.name,
            port,
            child.id()
        );

        if let Err(e) = self.wait_for_ready(&mut child, &base_url).await {
            self.terminate(child).await;
            return Err(e);
        }

        Ok(Box::new(WorkerContext {
            process: Arc::new(WorkerProcess {
                bundle: bundle.name.clone(),
                base_url,
                _child: Some(child),
            }),
            http_client: self.http_client.clone(),
        }))
    }
}

/// Context backed by a running worker process.
pub struct WorkerContext {
    process: Arc<WorkerProcess>,
    http_client: Client,
}

impl WorkerContext {
    /// Attach to a worker the host does not own (already running elsewhere).
    pub fn attach(bundle: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            process: Arc::new(WorkerProcess {
                bundle: bundle.into(),
                base_url: base_url.into(),
                _child: None,
            }),
            http_client: Client::new(),
        }
    }
}

#[async_trait]
impl IsolatedContext for WorkerContext {
    async fn instantiate(
        &self,
        artifacts: &ModuleArtifacts,
    ) -> std::result::Result<Arc<dyn EngineInstance>, InitializationFailed> {
        let request = InstantiateRequest {
            bundle: self.process.bundle.clone(),
            main_module: artifacts.main_module.clone(),
            pthread_worker: artifacts.pthread_worker.clone(),
        };
        let url = format!("{}/instantiate", self.process.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                InitializationFailed::new(format!("Failed to reach engine worker: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InitializationFailed::new(format!(
                "Engine instantiation failed: {}: {}",
                status, body
            )));
        }

        let instantiated: InstantiateResponse = response.json().await.map_err(|e| {
            InitializationFailed::new(format!("Invalid instantiate response: {}", e))
        })?;

        tracing::info!(
            "Engine {} instantiated in worker ({})",
            instantiated.engine_version,
            self.process.bundle
        );

        Ok(Arc::new(WorkerEngine {
            process: self.process.clone(),
            http_client: self.http_client.clone(),
            version: instantiated.engine_version,
        }))
    }
}

/// Engine instance living inside a worker process.
///
/// Holds the worker for the rest of the process lifetime; there is no
/// teardown path short of the host exiting.
pub struct WorkerEngine {
    process: Arc<WorkerProcess>,
    http_client: Client,
    version: String,
}

#[async_trait]
impl EngineInstance for WorkerEngine {
    fn engine_type(&self) -> &'static str {
        "worker"
    }

    fn version(&self) -> Option<String> {
        Some(self.version.clone())
    }

    async fn health_check(&self) -> Result<EngineHealth> {
        let url = format!("{}/health", self.process.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Communication(e.to_string()))?;

        Ok(EngineHealth {
            is_healthy: response.status().is_success(),
            version: Some(self.version.clone()),
        })
    }

    async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let url = format!("{}/query", self.process.base_url);

        tracing::debug!("Submitting query to engine worker: {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Communication(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::QueryFailed(format!("{}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Communication(format!("Invalid query response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            binary: "/nonexistent/engine-worker".to_string(),
            args: vec![],
            base_port: None,
            startup_timeout_secs: 5,
            shutdown_timeout_secs: 1,
            log_output: false,
        }
    }

    fn bundle() -> BundleDescriptor {
        BundleDescriptor {
            name: "mvp".to_string(),
            main_module: "/opt/engine/engine.so".to_string(),
            pthread_worker: None,
        }
    }

    fn artifacts() -> ModuleArtifacts {
        ModuleArtifacts {
            main_module: PathBuf::from("/tmp/stage/engine.so"),
            pthread_worker: None,
        }
    }

    #[tokio::test]
    async fn test_port_allocation_with_base_port() {
        let mut config = test_config();
        config.base_port = Some(9000);
        let factory = ProcessContextFactory::new(config);

        assert_eq!(factory.allocate_port().await.unwrap(), 9000);
    }

    #[tokio::test]
    async fn test_port_allocation_dynamic() {
        let factory = ProcessContextFactory::new(test_config());
        assert!(factory.allocate_port().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let factory = ProcessContextFactory::new(test_config());
        let err = factory.spawn(&bundle()).await.err().unwrap();
        assert!(err.message().starts_with("Failed to spawn engine worker"));
        assert!(err.message().contains("/nonexistent/engine-worker"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_worker_exits_during_startup() {
        let mut config = test_config();
        config.binary = "false".to_string();
        let factory = ProcessContextFactory::new(config);

        let err = factory.spawn(&bundle()).await.err().unwrap();
        assert!(err.message().starts_with("Engine worker exited during startup"));
    }

    #[tokio::test]
    async fn test_instantiate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instantiate"))
            .and(body_partial_json(json!({
                "bundle": "mvp",
                "main_module": "/tmp/stage/engine.so"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"engine_version": "1.2.0"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let context = WorkerContext::attach("mvp", server.uri());
        let engine = context.instantiate(&artifacts()).await.unwrap();
        assert_eq!(engine.engine_type(), "worker");
        assert_eq!(engine.version().as_deref(), Some("1.2.0"));
    }

    #[tokio::test]
    async fn test_instantiate_failure_keeps_worker_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instantiate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("module is corrupt"))
            .mount(&server)
            .await;

        let context = WorkerContext::attach("mvp", server.uri());
        let err = context.instantiate(&artifacts()).await.err().unwrap();
        assert!(err.message().starts_with("Engine instantiation failed"));
        assert!(err.message().contains("module is corrupt"));
    }

    #[tokio::test]
    async fn test_submit_forwards_to_worker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instantiate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"engine_version": "1.2.0"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(json!({"statement": "SELECT 42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": [[42]]})))
            .expect(1)
            .mount(&server)
            .await;

        let context = WorkerContext::attach("mvp", server.uri());
        let engine = context.instantiate(&artifacts()).await.unwrap();
        let response = engine.submit(&QueryRequest::new("SELECT 42")).await.unwrap();
        assert_eq!(response.result, json!([[42]]));
    }

    #[tokio::test]
    async fn test_submit_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instantiate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"engine_version": "1.2.0"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(400).set_body_string("syntax error"))
            .mount(&server)
            .await;

        let context = WorkerContext::attach("mvp", server.uri());
        let engine = context.instantiate(&artifacts()).await.unwrap();
        match engine.submit(&QueryRequest::new("SELEC")).await {
            Err(Error::QueryFailed(msg)) => assert!(msg.contains("syntax error")),
            other => panic!("Expected QueryFailed, got {:?}", other.map(|r| r.result)),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instantiate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"engine_version": "1.2.0"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let context = WorkerContext::attach("mvp", server.uri());
        let engine = context.instantiate(&artifacts()).await.unwrap();
        let health = engine.health_check().await.unwrap();
        assert!(health.is_healthy);
        assert_eq!(health.version.as_deref(), Some("1.2.0"));
    }
}
