use std::sync::{Mutex, PoisonError};

use fetch_core::{InventorySet, RunResult};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::EngineEvent;

/// State shared by every stage and worker of one run.
///
/// Owned by the caller and handed to the pipeline by reference. The
/// cancellation token is monotonic: once cancelled it stays cancelled.
#[derive(Debug, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    inventory: InventorySet,
    claims: Notify,
    results: Mutex<RunResult>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(inventory: InventorySet) -> Self {
        Self {
            inventory,
            ..Self::default()
        }
    }

    /// Handle for external cancel sources (signal handler, key listener).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn inventory(&self) -> &InventorySet {
        &self.inventory
    }

    /// Resolves once any claim in this run is completed or released.
    ///
    /// Enable the returned future before checking the claim so a wake-up
    /// between the check and the await is not lost.
    pub(crate) fn claim_settled(&self) -> Notified<'_> {
        self.claims.notified()
    }

    pub(crate) fn complete_claim(&self, stem: &str) {
        self.inventory.complete(stem);
        self.claims.notify_waiters();
    }

    pub(crate) fn release_claim(&self, stem: &str) {
        self.inventory.release(stem);
        self.claims.notify_waiters();
    }

    pub fn record<R>(&self, apply: impl FnOnce(&mut RunResult) -> R) -> R {
        let mut guard = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard)
    }

    pub fn snapshot(&self) -> RunResult {
        self.record(|result| result.clone())
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: EngineEvent) {}
}
