//! Engine Gate Common Types
//!
//! Shared types used by the engine host, its HTTP consumers, and worker
//! implementations.

pub mod bundle;
pub mod lifecycle;
pub mod protocol;

pub use bundle::{BundleManifest, BundleSpec, PlatformFeature};
pub use lifecycle::{EnginePhase, EngineStatus, GateState};
pub use protocol::{InstantiateRequest, InstantiateResponse, QueryRequest, QueryResponse};
