//! Presentation-side adapter over the engine registry.
//!
//! A gate is what a consumer holds while it needs the engine: activating it
//! asks the registry for the engine, and its view always mirrors the latest
//! lifecycle snapshot as one of pending, failed, or ready.

use std::sync::Arc;

use engine_gate_common::GateState;
use tokio::sync::watch;

use crate::engine::{EngineHandle, EngineRegistry, LifecycleState};
use crate::error::{Error, InitializationFailed, Result};

/// What a gate renders. Exactly one variant is visible at a time.
#[derive(Debug, Clone)]
pub enum GateView {
    Pending,
    Failed(InitializationFailed),
    Ready(EngineHandle),
}

impl GateView {
    /// Unblock dependent work only when ready.
    pub fn into_result(self) -> Result<EngineHandle> {
        match self {
            GateView::Pending => Err(Error::EngineInitializing),
            GateView::Failed(error) => Err(Error::EngineFailed(error)),
            GateView::Ready(handle) => Ok(handle),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, GateView::Pending)
    }

    pub fn to_state(&self) -> GateState {
        match self {
            GateView::Pending => GateState::Pending,
            GateView::Failed(error) => GateState::Failed {
                message: error.message().to_string(),
            },
            GateView::Ready(handle) => GateState::Ready {
                engine_id: handle.id(),
            },
        }
    }
}

impl From<&LifecycleState> for GateView {
    fn from(state: &LifecycleState) -> Self {
        match state {
            LifecycleState::Uninitialized | LifecycleState::Initializing => GateView::Pending,
            LifecycleState::Failed(error) => GateView::Failed(error.clone()),
            LifecycleState::Ready(handle) => GateView::Ready(handle.clone()),
        }
    }
}

pub struct Gate {
    rx: watch::Receiver<LifecycleState>,
}

impl Gate {
    /// Subscribe to the registry, then request initialization.
    pub fn activate(registry: &Arc<EngineRegistry>) -> Self {
        let rx = registry.subscribe();
        registry.request_init();
        Self { rx }
    }

    /// Latest view. Never stale: it reads the registry's current snapshot.
    pub fn view(&self) -> GateView {
        GateView::from(&*self.rx.borrow())
    }

    /// Wait for the next lifecycle transition and return the resulting view.
    pub async fn changed(&mut self) -> GateView {
        if self.rx.changed().await.is_err() {
            tracing::debug!("Engine registry dropped, gate keeps its last view");
        }
        GateView::from(&*self.rx.borrow_and_update())
    }

    /// Wait until the current attempt resolves to ready or failed.
    pub async fn resolved(&mut self) -> GateView {
        let view = match self.rx.wait_for(|s| s.is_resolved()).await {
            Ok(state) => Some(GateView::from(&*state)),
            Err(_) => None,
        };
        view.unwrap_or_else(|| self.view())
    }
}
