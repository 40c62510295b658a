//! Durable, resumable job progress.
//!
//! - [`Fingerprint`] identifies a job.
//! - [`ProgressRecord`] holds per-chunk status addressed by chunk index.
//! - [`ProgressStore`] reads and atomically writes the record file.

pub mod fingerprint;
pub mod record;
pub mod store;

pub use fingerprint::{Fingerprint, FingerprintInput};
pub use record::{ChunkEntry, ChunkStatus, ProgressRecord};
pub use store::{validate_resume_compatibility, ProgressError, ProgressStore, ResumeSummary};
