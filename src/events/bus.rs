//! Per-job publish/subscribe on top of `tokio::sync::broadcast`.
//!
//! Each job gets its own bounded broadcast channel. Publishing never waits:
//! a subscriber that falls behind loses its oldest events and is told how
//! many in a synthesized `log` event. A terminal event closes the channel,
//! so every subscription to a finished job ends after draining it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::events::event::{JobEvent, JobId, LogLevel};

#[derive(Default)]
struct BusInner {
    channels: HashMap<JobId, broadcast::Sender<JobEvent>>,
    finished: HashSet<JobId>,
}

/// In-process event bus shared by the orchestrator and presentation layers.
pub struct EventBus {
    inner: Mutex<BusInner>,
    buffer: usize,
}

impl EventBus {
    /// `buffer` is the per-subscriber capacity before oldest events drop.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner::default()),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Publish `event` for `job_id`. Never blocks.
    ///
    /// `log` events are mirrored to the `log` facade.
    pub fn publish(&self, job_id: JobId, event: JobEvent) {
        if let JobEvent::Log { level, message, .. } = &event {
            let level: log::Level = (*level).into();
            log::log!(level, "{job_id}: {message}");
        }

        let mut inner = self.lock();
        if inner.finished.contains(&job_id) {
            log::debug!("events: dropping {} for finished {job_id}", event.kind());
            return;
        }

        let terminal = event.is_terminal();
        let buffer = self.buffer;
        let sender = inner
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(buffer).0);
        // No receivers is fine; events are fire-and-forget.
        let _ = sender.send(event);

        if terminal {
            inner.channels.remove(&job_id);
            inner.finished.insert(job_id);
        }
    }

    /// Subscribe to events published for `job_id` from now on.
    ///
    /// For a job that has already finished the subscription is empty.
    pub fn subscribe(&self, job_id: JobId) -> Subscription {
        let mut inner = self.lock();
        if inner.finished.contains(&job_id) {
            return Subscription { job_id, rx: None };
        }
        let buffer = self.buffer;
        let rx = inner
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(buffer).0)
            .subscribe();
        Subscription {
            job_id,
            rx: Some(rx),
        }
    }

    pub fn is_finished(&self, job_id: JobId) -> bool {
        self.lock().finished.contains(&job_id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Ordered view of one job's events. Dropping it unsubscribes.
pub struct Subscription {
    job_id: JobId,
    rx: Option<broadcast::Receiver<JobEvent>>,
}

impl Subscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, or `None` once the job's terminal event has been seen.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        let rx = self.rx.as_mut()?;
        let result = rx.recv().await;
        self.handle(result.map_err(|e| match e {
            RecvError::Lagged(n) => Lag::Dropped(n),
            RecvError::Closed => Lag::Closed,
        }))
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is
    /// queued right now or the stream has ended.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Lagged(n)) => self.handle(Err(Lag::Dropped(n))),
            Err(TryRecvError::Closed) => self.handle(Err(Lag::Closed)),
            Ok(ev) => self.handle(Ok(ev)),
        }
    }

    /// `true` once the stream has ended.
    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    fn handle(&mut self, result: Result<JobEvent, Lag>) -> Option<JobEvent> {
        match result {
            Ok(ev) => {
                if ev.is_terminal() {
                    self.rx = None;
                }
                Some(ev)
            }
            Err(Lag::Dropped(n)) => Some(JobEvent::log(
                LogLevel::Warn,
                format!("events: subscriber fell behind, dropped {n} events"),
            )),
            Err(Lag::Closed) => {
                self.rx = None;
                None
            }
        }
    }
}

enum Lag {
    Dropped(u64),
    Closed,
}
