//! Job state machine and the shared status snapshot.
//!
//! [`JobState`] drives the orchestrator's state machine. Presentation layers
//! read the latest [`JobStatus`] through [`SharedStatus`] or reconstruct it
//! from the event stream.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::events::{ErrorKind, JobId};

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// States of a conversion job.
///
/// ```text
/// Idle ──start──▶ Planning ──plan ok──▶ Running ⇄ Paused
///                    │                     │        │
///                    └──error──▶ Failed ◀──┤        │
///                                          ├──────▶ Cancelled
///                                          └─complete─▶ Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// No job has been started.
    #[default]
    Idle,

    /// Chunks are being planned and progress is being loaded.
    Planning,

    /// Chunks are being dispatched to the synthesis engine.
    Running,

    /// Waiting at a chunk boundary for resume or cancel.
    Paused,

    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    /// `Completed`, `Cancelled` and `Failed` end a job.
    ///
    /// ```
    /// use audiobook_converter::pipeline::JobState;
    ///
    /// assert!(JobState::Completed.is_terminal());
    /// assert!(JobState::Cancelled.is_terminal());
    /// assert!(JobState::Failed.is_terminal());
    /// assert!(!JobState::Paused.is_terminal());
    /// assert!(!JobState::Idle.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// Returns `true` while a job holds the job lock.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            JobState::Planning | JobState::Running | JobState::Paused
        )
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Planning)
                | (Planning, Running)
                | (Planning, Failed)
                | (Planning, Cancelled)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Paused, Cancelled)
        ) || (self.is_terminal() && next == Planning)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Idle => "Idle",
            JobState::Planning => "Planning",
            JobState::Running => "Running",
            JobState::Paused => "Paused",
            JobState::Completed => "Completed",
            JobState::Cancelled => "Cancelled",
            JobState::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// JobOutcome
// ---------------------------------------------------------------------------

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        output_path: PathBuf,
        manifest_path: PathBuf,
    },
    Cancelled {
        completed: usize,
        total: usize,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        missing_indices: Vec<usize>,
    },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed { .. } => JobState::Completed,
            JobOutcome::Cancelled { .. } => JobState::Cancelled,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Point-in-time view of the active (or last) job.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobStatus {
    pub job_id: Option<JobId>,
    pub state: JobState,
    pub completed: usize,
    pub total: usize,
    pub current_index: Option<usize>,
    /// `"Chunk i/N | <chapter title>"` while running.
    pub status_text: String,
    pub missing_indices: Vec<usize>,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobStatus {
    /// Completion in percent, `0.0` when nothing is planned yet.
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 * 100.0 / self.total as f32
        }
    }
}

/// Thread-safe handle to the latest [`JobStatus`].
///
/// Do not hold the lock across `.await` points.
pub type SharedStatus = Arc<Mutex<JobStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(JobStatus::default()))
}

/// Run `f` against the status, recovering from a poisoned lock.
pub(crate) fn update_status(status: &SharedStatus, f: impl FnOnce(&mut JobStatus)) {
    let mut guard = status.lock().unwrap_or_else(|p| p.into_inner());
    f(&mut guard);
}

/// Clone the current status, recovering from a poisoned lock.
pub(crate) fn snapshot(status: &SharedStatus) -> JobStatus {
    status.lock().unwrap_or_else(|p| p.into_inner()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(JobState::default(), JobState::Idle);
    }

    #[test]
    fn busy_states() {
        assert!(JobState::Planning.is_busy());
        assert!(JobState::Running.is_busy());
        assert!(JobState::Paused.is_busy());
        assert!(!JobState::Idle.is_busy());
        assert!(!JobState::Completed.is_busy());
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        assert!(JobState::Idle.can_transition_to(JobState::Planning));
        assert!(JobState::Running.can_transition_to(JobState::Paused));
        assert!(JobState::Paused.can_transition_to(JobState::Running));
        assert!(JobState::Paused.can_transition_to(JobState::Cancelled));
        assert!(JobState::Failed.can_transition_to(JobState::Planning));

        assert!(!JobState::Idle.can_transition_to(JobState::Running));
        assert!(!JobState::Paused.can_transition_to(JobState::Completed));
        assert!(!JobState::Completed.can_transition_to(JobState::Running));
        assert!(!JobState::Planning.can_transition_to(JobState::Paused));
    }

    #[test]
    fn state_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&JobState::Paused).unwrap(), "\"paused\"");
    }

    #[test]
    fn labels() {
        assert_eq!(JobState::Idle.label(), "Idle");
        assert_eq!(JobState::Completed.label(), "Completed");
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        let o = JobOutcome::Cancelled {
            completed: 1,
            total: 2,
        };
        assert_eq!(o.state(), JobState::Cancelled);
        assert!(o.state().is_terminal());
    }

    #[test]
    fn percent_handles_empty_plan() {
        let mut s = JobStatus::default();
        assert_eq!(s.percent(), 0.0);
        s.total = 8;
        s.completed = 2;
        assert!((s.percent() - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn shared_status_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedStatus>();
    }

    #[test]
    fn shared_status_survives_poisoning() {
        let status = new_shared_status();
        let s2 = Arc::clone(&status);
        let _ = std::thread::spawn(move || {
            let _g = s2.lock().unwrap();
            panic!("poison");
        })
        .join();
        update_status(&status, |s| s.completed = 3);
        assert_eq!(snapshot(&status).completed, 3);
    }
}
