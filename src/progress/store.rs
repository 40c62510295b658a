//! Crash-safe persistence of [`ProgressRecord`]s.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a reader sees either the previous record or the new
//! one, never a torn write. The file is owner-only on Unix.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::progress_file;
use crate::progress::fingerprint::Fingerprint;
use crate::progress::record::{ChunkStatus, ProgressRecord, RawRecord};

// ---------------------------------------------------------------------------
// ProgressError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("no progress record at {0}")]
    NotFound(PathBuf),

    #[error("progress belongs to a different job (stored {stored}, requested {requested})")]
    ResumeMismatch { requested: String, stored: String },

    #[error("chunk index {index} outside planned range 0..{planned}")]
    IndexOutOfRange { index: i64, planned: usize },

    #[error("progress record is corrupt: {0}")]
    Corrupt(String),

    #[error("progress I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fail with [`ProgressError::ResumeMismatch`] unless the fingerprints match.
pub fn validate_resume_compatibility(
    requested: &Fingerprint,
    stored: &Fingerprint,
) -> Result<(), ProgressError> {
    if requested == stored {
        Ok(())
    } else {
        Err(ProgressError::ResumeMismatch {
            requested: requested.to_string(),
            stored: stored.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ResumeSummary
// ---------------------------------------------------------------------------

/// What a stored record says about a resumable job, without starting it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeSummary {
    pub fingerprint: Fingerprint,
    pub title: String,
    pub voice_id: String,
    pub selected_chapters: Vec<usize>,
    pub completed: usize,
    pub total: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl ResumeSummary {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 * 100.0 / self.total as f32
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressStore
// ---------------------------------------------------------------------------

/// Handle to one progress file.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Store for the conventional progress file inside `output_dir`.
    pub fn at(output_dir: &Path) -> Self {
        Self {
            path: progress_file(output_dir),
        }
    }

    pub fn from_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the record for `fingerprint`.
    ///
    /// Returns [`ProgressError::NotFound`] when there is no file and
    /// [`ProgressError::ResumeMismatch`] when the file belongs to another job.
    pub fn load(&self, fingerprint: &Fingerprint) -> Result<ProgressRecord, ProgressError> {
        let record = self.load_any()?;
        validate_resume_compatibility(fingerprint, &record.fingerprint)?;
        Ok(record)
    }

    /// Load whatever record is on disk, regardless of fingerprint.
    pub fn load_any(&self) -> Result<ProgressRecord, ProgressError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProgressError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let raw: RawRecord =
            serde_json::from_str(&data).map_err(|e| ProgressError::Corrupt(e.to_string()))?;
        ProgressRecord::try_from(raw)
    }

    /// Atomically replace the file with `record`.
    pub fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(&RawRecord::from(record))
            .map_err(|e| ProgressError::Corrupt(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        restrict_permissions(tmp.path())?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        log::debug!(
            "progress: saved {} ({} / {} completed)",
            self.path.display(),
            record.completed_count(),
            record.planned_count()
        );
        Ok(())
    }

    /// Apply one chunk result and persist it.
    ///
    /// Replaying a result already held by the record writes nothing and
    /// returns `Ok(false)`.
    pub fn record_chunk_result(
        &self,
        record: &mut ProgressRecord,
        index: usize,
        outcome: ChunkStatus,
        artifact_path: Option<PathBuf>,
    ) -> Result<bool, ProgressError> {
        let changed = record.apply(index, outcome, artifact_path)?;
        if changed {
            self.save(record)?;
        }
        Ok(changed)
    }

    /// Summary of the stored job, or `None` when there is no record.
    pub fn summary(&self) -> Result<Option<ResumeSummary>, ProgressError> {
        let record = match self.load_any() {
            Ok(r) => r,
            Err(ProgressError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(ResumeSummary {
            completed: record.completed_count(),
            total: record.planned_count(),
            fingerprint: record.fingerprint,
            title: record.title,
            voice_id: record.voice_id,
            selected_chapters: record.selected_chapters,
            started_at: record.started_at,
            last_updated: record.last_updated,
        }))
    }

    /// Delete the progress file. Missing files are not an error.
    pub fn remove(&self) -> Result<(), ProgressError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
