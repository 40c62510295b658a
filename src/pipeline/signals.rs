//! Cooperative pause / cancel flags.
//!
//! Both flags are `tokio::sync::watch` channels. The orchestrator reads them
//! only at chunk boundaries; while paused it awaits a change on either
//! channel instead of polling.

use std::sync::Arc;

use tokio::sync::watch;

/// What the orchestrator should do at a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Cancel,
}

/// Shared pause/cancel flags for one job. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobSignals {
    pause: Arc<watch::Sender<bool>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl JobSignals {
    pub fn new() -> Self {
        Self {
            pause: Arc::new(watch::channel(false).0),
            cancel: Arc::new(watch::channel(false).0),
        }
    }

    pub fn pause(&self) {
        self.pause.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause.send_replace(false);
    }

    /// Cancellation is sticky.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Wait until the job is resumed or cancelled.
    ///
    /// Returns immediately when not paused.
    pub async fn wait_while_paused(&self) -> Checkpoint {
        let mut pause_rx = self.pause.subscribe();
        let mut cancel_rx = self.cancel.subscribe();
        loop {
            if *cancel_rx.borrow_and_update() {
                return Checkpoint::Cancel;
            }
            if !*pause_rx.borrow_and_update() {
                return Checkpoint::Continue;
            }
            // Both senders live in `self`, so neither `changed` can fail.
            tokio::select! {
                _ = pause_rx.changed() => {}
                _ = cancel_rx.changed() => {}
            }
        }
    }
}

impl Default for JobSignals {
    fn default() -> Self {
        Self::new()
    }
}
