//! Engine registry: the process-wide owner of the engine lifecycle.
//!
//! Any number of independent callers may ask for the engine. The first request
//! wins the `Uninitialized -> Initializing` transition and starts the only
//! bootstrap; everyone else observes the outcome through a subscription.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use engine_gate_common::{EnginePhase, EngineStatus};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::{Bootstrap, EngineHandle};
use crate::error::InitializationFailed;

/// Lifecycle of the shared engine.
#[derive(Debug, Clone)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    /// Permanent once entered.
    Ready(EngineHandle),
    /// The last attempt failed. Only an explicit retry leaves this state.
    Failed(InitializationFailed),
}

impl LifecycleState {
    pub fn phase(&self) -> EnginePhase {
        match self {
            LifecycleState::Uninitialized => EnginePhase::Uninitialized,
            LifecycleState::Initializing => EnginePhase::Initializing,
            LifecycleState::Ready(_) => EnginePhase::Ready,
            LifecycleState::Failed(_) => EnginePhase::Failed,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.phase().is_resolved()
    }

    pub fn handle(&self) -> Option<&EngineHandle> {
        match self {
            LifecycleState::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&InitializationFailed> {
        match self {
            LifecycleState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Single point of truth for the engine lifecycle.
///
/// Construct one per process and share it behind an `Arc`.
pub struct EngineRegistry {
    bootstrap: Arc<dyn Bootstrap>,
    state: watch::Sender<LifecycleState>,
    attempts: AtomicU32,
    /// Runtime the registry was built on, used by callers outside any runtime.
    runtime: Option<Handle>,
}

impl EngineRegistry {
    pub fn new(bootstrap: Arc<dyn Bootstrap>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            bootstrap,
            state,
            attempts: AtomicU32::new(0),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Ask for the engine. Idempotent and non-blocking.
    ///
    /// Starts the bootstrap only when nothing was attempted yet; in any other
    /// state this is a no-op and the caller learns the outcome by subscribing.
    ///
    /// Safe from any thread. The attempt runs on the caller's runtime, or on the
    /// one the registry was built on. With neither, the state is left untouched.
    pub fn request_init(self: &Arc<Self>) {
        let Some(runtime) = self.runtime() else {
            tracing::error!("Engine initialization requested without a Tokio runtime");
            return;
        };

        let started = self.state.send_if_modified(|state| match state {
            LifecycleState::Uninitialized => {
                *state = LifecycleState::Initializing;
                true
            }
            _ => false,
        });

        if started {
            self.spawn_attempt(&runtime);
        }
    }

    /// Start a fresh attempt after a failure.
    ///
    /// Returns `false` without side effects unless the state is `Failed` and a
    /// runtime is available to run the attempt.
    pub fn retry(self: &Arc<Self>) -> bool {
        let Some(runtime) = self.runtime() else {
            tracing::error!("Engine retry requested without a Tokio runtime");
            return false;
        };

        let mut previous = None;
        let started = self.state.send_if_modified(|state| match state {
            LifecycleState::Failed(error) => {
                previous = Some(error.clone());
                *state = LifecycleState::Initializing;
                true
            }
            _ => false,
        });

        if let Some(error) = previous {
            tracing::warn!(previous_error = %error, "Retrying engine initialization");
            self.spawn_attempt(&runtime);
        }
        started
    }

    /// Current lifecycle snapshot.
    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every lifecycle transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Number of bootstrap attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Serializable view of the current snapshot.
    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        let mut status = EngineStatus::uninitialized();
        status.phase = state.phase();
        status.attempts = self.attempts();

        match &state {
            LifecycleState::Ready(handle) => {
                status.engine_id = Some(handle.id());
                status.engine_type = Some(handle.engine_type().to_string());
                status.version = handle.version();
                status.ready_at = Some(handle.ready_at());
            }
            LifecycleState::Failed(error) => {
                status.error = Some(error.message().to_string());
            }
            LifecycleState::Uninitialized | LifecycleState::Initializing => {}
        }

        status
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.clone())
    }

    fn spawn_attempt(self: &Arc<Self>, runtime: &Handle) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, "Starting engine bootstrap");

        let registry = Arc::clone(self);
        runtime.spawn(async move {
            let outcome = AssertUnwindSafe(registry.bootstrap.bootstrap())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(InitializationFailed::new("engine bootstrap panicked")));
            registry.resolve(attempt, outcome);
        });
    }

    fn resolve(&self, attempt: u32, outcome: Result<EngineHandle, InitializationFailed>) {
        let next = match outcome {
            Ok(handle) => {
                tracing::info!(
                    attempt,
                    engine_id = %handle.id(),
                    engine_type = handle.engine_type(),
                    "Engine ready"
                );
                LifecycleState::Ready(handle)
            }
            Err(error) => {
                tracing::error!(attempt, error = %error, "Engine initialization failed");
                LifecycleState::Failed(error)
            }
        };

        self.state.send_modify(|state| {
            debug_assert!(matches!(state, LifecycleState::Initializing));
            *state = next;
        });
    }
}
