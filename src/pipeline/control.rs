//! Control surface: `start`, `pause`, `resume`, `cancel`, `status`.
//!
//! [`Converter`] is the only type a presentation layer talks to. It holds at
//! most one active job; the orchestrator runs on its own tokio task and is
//! reached only through [`JobSignals`] and the [`EventBus`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::assembly::AssemblyEngine;
use crate::config::AppConfig;
use crate::document::SourceDocument;
use crate::events::{ErrorKind, EventBus, JobEvent, JobId, Subscription};
use crate::synth::{build_engine, SynthesisEngine, VoiceIdentity};

use super::runner::{ConversionOrchestrator, JobRequest};
use super::signals::JobSignals;
use super::state::{new_shared_status, snapshot, update_status, JobOutcome, JobState, JobStatus, SharedStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("{0} is still running")]
    AlreadyRunning(JobId),

    #[error("no active conversion job")]
    NoActiveJob,

    #[error("cannot {action} a job that is {}", .state.label())]
    InvalidTransition {
        state: JobState,
        action: &'static str,
    },

    #[error("no tokio runtime available to run the job")]
    NoRuntime,
}

struct ActiveJob {
    id: JobId,
    signals: JobSignals,
    /// Taken by [`Converter::wait`].
    handle: Option<JoinHandle<JobOutcome>>,
}

impl ActiveJob {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Entry point for presentation layers.
pub struct Converter {
    config: AppConfig,
    engine: Arc<dyn SynthesisEngine>,
    assembler: Arc<AssemblyEngine>,
    bus: Arc<EventBus>,
    status: SharedStatus,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveJob>>,
}

impl Converter {
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn SynthesisEngine>,
        assembler: Arc<AssemblyEngine>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.events.subscriber_buffer));
        Self {
            config,
            engine,
            assembler,
            bus,
            status: new_shared_status(),
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    /// Backend and encoder chosen from `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let engine = build_engine(&config.synthesis);
        let assembler = Arc::new(AssemblyEngine::from_config(&config.assembly));
        Self::new(config, engine, assembler)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Start a job on the current tokio runtime.
    pub fn start(
        &self,
        document: Arc<SourceDocument>,
        selection: Vec<usize>,
        voice: VoiceIdentity,
        output_dir: impl Into<PathBuf>,
    ) -> Result<JobId, ControlError> {
        self.launch(document, selection, voice, output_dir.into())
            .map(|(id, _)| id)
    }

    /// Like [`start`](Self::start), but subscribes before the job is spawned
    /// so no event is missed.
    pub fn start_with_events(
        &self,
        document: Arc<SourceDocument>,
        selection: Vec<usize>,
        voice: VoiceIdentity,
        output_dir: impl Into<PathBuf>,
    ) -> Result<(JobId, Subscription), ControlError> {
        self.launch(document, selection, voice, output_dir.into())
    }

    /// Pause at the next chunk boundary.
    pub fn pause(&self) -> Result<(), ControlError> {
        let signals = self.running_signals()?;
        signals.pause();
        log::info!("control: pause requested");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        let signals = self.running_signals()?;
        if !signals.is_paused() {
            return Err(ControlError::InvalidTransition {
                state: self.status().state,
                action: "resume",
            });
        }
        signals.resume();
        log::info!("control: resume requested");
        Ok(())
    }

    /// Cancel at the next chunk boundary. Ignored once assembly has started.
    pub fn cancel(&self) -> Result<(), ControlError> {
        let signals = self.running_signals()?;
        signals.cancel();
        log::info!("control: cancel requested");
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        snapshot(&self.status)
    }

    pub fn subscribe(&self, job_id: JobId) -> Subscription {
        self.bus.subscribe(job_id)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Id of the running job, if any.
    pub fn active_job(&self) -> Option<JobId> {
        self.lock_active()
            .as_ref()
            .filter(|job| self.is_live(job))
            .map(|job| job.id)
    }

    /// Wait for the active job to finish. `None` if there is no job or
    /// another caller is already waiting.
    pub async fn wait(&self) -> Option<JobOutcome> {
        let (id, handle) = {
            let mut active = self.lock_active();
            let job = active.as_mut()?;
            (job.id, job.handle.take()?)
        };

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("control: {id} task failed: {e}");
                let message = format!("job task failed: {e}");
                update_status(&self.status, |s| {
                    s.state = JobState::Failed;
                    s.error = Some(message.clone());
                });
                self.bus.publish(
                    id,
                    JobEvent::Error {
                        kind: ErrorKind::Internal,
                        message: message.clone(),
                        missing_indices: Vec::new(),
                        terminal: true,
                    },
                );
                Some(JobOutcome::Failed {
                    kind: ErrorKind::Internal,
                    message,
                    missing_indices: Vec::new(),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn launch(
        &self,
        document: Arc<SourceDocument>,
        selection: Vec<usize>,
        voice: VoiceIdentity,
        output_dir: PathBuf,
    ) -> Result<(JobId, Subscription), ControlError> {
        let runtime = Handle::try_current().map_err(|_| ControlError::NoRuntime)?;

        let mut active = self.lock_active();
        if let Some(job) = active.as_ref().filter(|job| self.is_live(job)) {
            return Err(ControlError::AlreadyRunning(job.id));
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let signals = JobSignals::new();
        let events = self.bus.subscribe(id);
        update_status(&self.status, |s| {
            *s = JobStatus {
                job_id: Some(id),
                ..JobStatus::default()
            };
        });

        log::info!(
            "control: starting {id} for \"{}\" ({} chapters, voice {}) in {}",
            document.title,
            selection.len(),
            voice.id,
            output_dir.display()
        );
        let orchestrator = ConversionOrchestrator::new(
            id,
            self.config.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.assembler),
            Arc::clone(&self.bus),
            signals.clone(),
            Arc::clone(&self.status),
        );
        let request = JobRequest {
            document,
            selection,
            voice,
            output_dir,
        };
        let handle = runtime.spawn(orchestrator.run(request));

        *active = Some(ActiveJob {
            id,
            signals,
            handle: Some(handle),
        });
        Ok((id, events))
    }

    fn running_signals(&self) -> Result<JobSignals, ControlError> {
        let active = self.lock_active();
        match active.as_ref() {
            Some(job) if self.is_live(job) => Ok(job.signals.clone()),
            _ => Err(ControlError::NoActiveJob),
        }
    }

    /// The handle is gone while someone waits on it; fall back to the
    /// published state.
    fn is_live(&self, job: &ActiveJob) -> bool {
        job.is_running() || self.status().state.is_busy()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }
}
