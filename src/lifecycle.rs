//! Cancellable, supersedable request management.
//!
//! Every recurring async operation runs under a stable operation key. At most
//! one live request exists per key: submitting a new one cancels the previous
//! holder (supersession), and session teardown cancels everything. Each
//! submission also captures a per-key generation number; a completion may
//! take effect only while its generation is still current, so a stale
//! completion that resolves out of order is discarded instead of overwriting
//! newer state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{CancelReason, WorkflowError, WorkflowResult};

struct Slot {
    generation: u64,
    cancel_tx: watch::Sender<Option<CancelReason>>,
}

#[derive(Default)]
pub struct RequestManager {
    slots: Mutex<HashMap<String, Slot>>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` as the sole live request under `key`. Any previous live
    /// request under the same key is cancelled as superseded before the new
    /// one starts. The returned error is `Cancelled` when this submission
    /// itself lost to a newer one or to teardown; callers must discard the
    /// completion in that case and never surface it.
    pub async fn submit<F, T>(&self, key: &str, work: F) -> WorkflowResult<T>
    where
        F: Future<Output = WorkflowResult<T>>,
    {
        let (generation, mut cancel_rx) = self.begin(key);
        debug!(key, generation, "request started");

        let outcome = tokio::select! {
            result = work => result,
            reason = cancelled(&mut cancel_rx) => Err(WorkflowError::Cancelled(reason)),
        };

        self.settle(key, generation, outcome)
    }

    /// Cancels any live request under `key` and registers a fresh slot.
    fn begin(&self, key: &str) -> (u64, watch::Receiver<Option<CancelReason>>) {
        let mut slots = self.slots.lock().expect("request slot lock poisoned");
        let generation = match slots.get(key) {
            Some(slot) => {
                let _ = slot.cancel_tx.send(Some(CancelReason::Superseded));
                slot.generation + 1
            }
            None => 1,
        };
        let (cancel_tx, cancel_rx) = watch::channel(None);
        slots.insert(
            key.to_string(),
            Slot {
                generation,
                cancel_tx,
            },
        );
        (generation, cancel_rx)
    }

    /// Applies the generation check: a completion counts only while its
    /// captured generation is still the current one for the key.
    fn settle<T>(
        &self,
        key: &str,
        generation: u64,
        outcome: WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        if matches!(outcome, Err(WorkflowError::Cancelled(_))) {
            return outcome;
        }
        let mut slots = self.slots.lock().expect("request slot lock poisoned");
        let current = slots.get(key).map(|slot| slot.generation);
        if current != Some(generation) {
            debug!(key, generation, ?current, "stale completion discarded");
            return Err(WorkflowError::Cancelled(CancelReason::Superseded));
        }
        slots.remove(key);
        outcome
    }

    /// Current generation for `key`, if a request is live under it.
    pub fn generation(&self, key: &str) -> Option<u64> {
        self.slots
            .lock()
            .expect("request slot lock poisoned")
            .get(key)
            .map(|slot| slot.generation)
    }

    /// Number of keys with a live (started, not yet settled) request.
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .expect("request slot lock poisoned")
            .len()
    }

    /// Session teardown: cancels every outstanding request. Their
    /// completions resolve as `Cancelled(TornDown)` and are never surfaced.
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock().expect("request slot lock poisoned");
        for (key, slot) in slots.drain() {
            debug!(key, generation = slot.generation, "cancelled at teardown");
            let _ = slot.cancel_tx.send(Some(CancelReason::TornDown));
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<Option<CancelReason>>) -> CancelReason {
    loop {
        if let Some(reason) = *rx.borrow() {
            return reason;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without a reason: treat as teardown.
            return CancelReason::TornDown;
        }
    }
}
