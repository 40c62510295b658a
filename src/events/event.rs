//! Event types delivered to subscribers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::pipeline::JobState;

/// Identifies one job within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Classification carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Planning,
    ResumeMismatch,
    Synthesis,
    Integrity,
    Assembly,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Planning => "planning",
            ErrorKind::ResumeMismatch => "resume_mismatch",
            ErrorKind::Synthesis => "synthesis",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Assembly => "assembly",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// One event on a job's stream.
///
/// Serialises with a `type` tag matching [`JobEvent::kind`] except for state
/// changes, whose tag is always `state_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        completed: usize,
        total: usize,
        current_index: usize,
        status_text: String,
    },
    Log {
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        level: LogLevel,
        message: String,
    },
    StateChanged {
        state: JobState,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default)]
        missing_indices: Vec<usize>,
        /// `true` when this error ends the job.
        terminal: bool,
    },
    Completed {
        output_path: PathBuf,
        manifest_path: PathBuf,
    },
    Cancelled {
        completed: usize,
        total: usize,
    },
}

impl JobEvent {
    /// Log event stamped with the current time.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        JobEvent::Log {
            timestamp: OffsetDateTime::now_utc(),
            level,
            message: message.into(),
        }
    }

    /// Wire name: `progress`, `log`, `state_changed`, `idle`, `completed`,
    /// `error` or `cancelled`.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Log { .. } => "log",
            JobEvent::StateChanged {
                state: JobState::Idle,
            } => "idle",
            JobEvent::StateChanged { .. } => "state_changed",
            JobEvent::Error { .. } => "error",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// Terminal events close every subscription to the job.
    pub fn is_terminal(&self) -> bool {
        match self {
            JobEvent::Completed { .. } | JobEvent::Cancelled { .. } => true,
            JobEvent::Error { terminal, .. } => *terminal,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(JobEvent::log(LogLevel::Info, "x").kind(), "log");
        assert_eq!(
            JobEvent::StateChanged {
                state: JobState::Idle
            }
            .kind(),
            "idle"
        );
        assert_eq!(
            JobEvent::StateChanged {
                state: JobState::Paused
            }
            .kind(),
            "state_changed"
        );
    }

    #[test]
    fn terminal_events() {
        assert!(JobEvent::Cancelled {
            completed: 0,
            total: 1
        }
        .is_terminal());
        let err = |terminal| JobEvent::Error {
            kind: ErrorKind::Synthesis,
            message: "boom".into(),
            missing_indices: vec![],
            terminal,
        };
        assert!(err(true).is_terminal());
        assert!(!err(false).is_terminal());
        assert!(!JobEvent::log(LogLevel::Warn, "x").is_terminal());
    }

    #[test]
    fn events_serialise_with_type_tag() {
        let ev = JobEvent::Progress {
            completed: 3,
            total: 10,
            current_index: 2,
            status_text: "Chunk 3/10 | One".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["current_index"], 2);

        let err = JobEvent::Error {
            kind: ErrorKind::ResumeMismatch,
            message: "m".into(),
            missing_indices: vec![7],
            terminal: false,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "resume_mismatch");
        assert_eq!(json["missing_indices"][0], 7);
    }

    #[test]
    fn job_id_display() {
        assert_eq!(JobId(4).to_string(), "job-4");
    }
}
