//! Host-worker protocol types.
//!
//! The worker is a separate process hosting the engine. It speaks JSON over
//! HTTP on a loopback port chosen by the host.
//!
//! # Protocol Overview
//!
//! 1. Host spawns the worker with `--port <port> --bundle <name>`
//! 2. Host polls `GET /health` until the worker answers with a success status
//! 3. Host sends `POST /instantiate` with the staged module artifacts
//! 4. Worker loads the modules and answers with `InstantiateResponse`
//! 5. Host forwards engine work as `POST /query`; the worker serializes it
//!
//! Statements and results are opaque to the host.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Request to instantiate the engine inside the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantiateRequest {
    /// Name of the selected bundle.
    pub bundle: String,
    /// Local path of the staged main module.
    pub main_module: PathBuf,
    /// Local path of the staged thread worker module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pthread_worker: Option<PathBuf>,
}

/// Worker answer once the engine is instantiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantiateResponse {
    pub engine_version: String,
}

/// Unit of work submitted to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<serde_json::Value>,
}

impl QueryRequest {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }
}

/// Result of a unit of work, as produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub result: serde_json::Value,
}
