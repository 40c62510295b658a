//! In-memory progress record and its on-disk JSON form.
//!
//! The record is an arena of [`ChunkEntry`] values addressed by chunk index.
//! On disk the entries are a JSON object keyed by the decimal index; every key
//! is validated against `[0, planned_count)` when the file is read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::progress::fingerprint::Fingerprint;
use crate::progress::store::ProgressError;

/// Current on-disk layout version.
pub const RECORD_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// ChunkStatus / ChunkEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Persisted state for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub status: ChunkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl ChunkEntry {
    /// True when the entry is `completed` and its artifact exists with
    /// nonzero length.
    pub fn has_valid_artifact(&self) -> bool {
        self.status == ChunkStatus::Completed
            && self
                .artifact_path
                .as_deref()
                .is_some_and(artifact_is_nonempty)
    }
}

pub(crate) fn artifact_is_nonempty(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// ProgressRecord
// ---------------------------------------------------------------------------

/// Durable per-job progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub fingerprint: Fingerprint,
    pub title: String,
    pub voice_id: String,
    pub selected_chapters: Vec<usize>,
    pub started_at: OffsetDateTime,
    pub last_updated: OffsetDateTime,
    entries: Vec<ChunkEntry>,
}

impl ProgressRecord {
    /// A fresh record with every chunk pending.
    pub fn new(
        fingerprint: Fingerprint,
        planned_count: usize,
        title: impl Into<String>,
        voice_id: impl Into<String>,
        selected_chapters: Vec<usize>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            fingerprint,
            title: title.into(),
            voice_id: voice_id.into(),
            selected_chapters,
            started_at: now,
            last_updated: now,
            entries: vec![ChunkEntry::default(); planned_count],
        }
    }

    pub fn planned_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&ChunkEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &ChunkEntry)> {
        self.entries.iter().enumerate()
    }

    pub fn completed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == ChunkStatus::Completed)
            .count()
    }

    /// Indices that still need dispatching (`pending` or `failed`).
    pub fn outstanding_indices(&self) -> Vec<usize> {
        self.entries()
            .filter(|(_, e)| e.status != ChunkStatus::Completed)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices lacking a completed, nonzero-length artifact.
    pub fn missing_indices(&self) -> Vec<usize> {
        self.entries()
            .filter(|(_, e)| !e.has_valid_artifact())
            .map(|(i, _)| i)
            .collect()
    }

    /// Apply one chunk result. Returns `false` when the entry already held
    /// exactly this state, so callers can skip persisting.
    pub fn apply(
        &mut self,
        index: usize,
        status: ChunkStatus,
        artifact_path: Option<PathBuf>,
    ) -> Result<bool, ProgressError> {
        let planned = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ProgressError::IndexOutOfRange {
                index: index as i64,
                planned,
            })?;

        let next = ChunkEntry {
            status,
            artifact_path,
        };
        if *entry == next {
            return Ok(false);
        }
        *entry = next;
        self.last_updated = OffsetDateTime::now_utc();
        Ok(true)
    }

    /// Downgrade `completed` entries back to `pending` when their artifact is
    /// missing, empty, or stored anywhere other than `expected(index)`.
    /// Returns the affected indices.
    pub fn downgrade_stale(&mut self, expected: impl Fn(usize) -> PathBuf) -> Vec<usize> {
        let mut stale = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.status != ChunkStatus::Completed {
                continue;
            }
            let in_place = entry.artifact_path.as_deref() == Some(expected(i).as_path());
            if !in_place || !entry.has_valid_artifact() {
                entry.status = ChunkStatus::Pending;
                entry.artifact_path = None;
                stale.push(i);
            }
        }
        if !stale.is_empty() {
            self.last_updated = OffsetDateTime::now_utc();
        }
        stale
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawRecord {
    #[serde(default)]
    version: u32,
    fingerprint: Fingerprint,
    #[serde(default)]
    title: String,
    #[serde(default)]
    voice_id: String,
    #[serde(default)]
    selected_chapters: Vec<usize>,
    planned_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    last_updated: OffsetDateTime,
    #[serde(default)]
    chunks: BTreeMap<String, ChunkEntry>,
}

impl From<&ProgressRecord> for RawRecord {
    fn from(record: &ProgressRecord) -> Self {
        let chunks = record
            .entries()
            .filter(|(_, e)| **e != ChunkEntry::default())
            .map(|(i, e)| (i.to_string(), e.clone()))
            .collect();
        Self {
            version: RECORD_VERSION,
            fingerprint: record.fingerprint.clone(),
            title: record.title.clone(),
            voice_id: record.voice_id.clone(),
            selected_chapters: record.selected_chapters.clone(),
            planned_count: record.planned_count() as u64,
            started_at: record.started_at,
            last_updated: record.last_updated,
            chunks,
        }
    }
}

impl TryFrom<RawRecord> for ProgressRecord {
    type Error = ProgressError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let planned = usize::try_from(raw.planned_count)
            .map_err(|_| ProgressError::Corrupt("planned_count too large".into()))?;
        let mut entries = vec![ChunkEntry::default(); planned];

        for (key, entry) in raw.chunks {
            let index: i64 = key
                .trim()
                .parse()
                .map_err(|_| ProgressError::Corrupt(format!("non-numeric chunk index {key:?}")))?;
            if index < 0 || index as u64 >= planned as u64 {
                return Err(ProgressError::IndexOutOfRange { index, planned });
            }
            entries[index as usize] = entry;
        }

        Ok(Self {
            fingerprint: raw.fingerprint,
            title: raw.title,
            voice_id: raw.voice_id,
            selected_chapters: raw.selected_chapters,
            started_at: raw.started_at,
            last_updated: raw.last_updated,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(n: usize) -> ProgressRecord {
        ProgressRecord::new(Fingerprint::from_hex("ff"), n, "Book", "v", vec![0])
    }

    #[test]
    fn new_record_is_all_pending() {
        let r = record(3);
        assert_eq!(r.planned_count(), 3);
        assert_eq!(r.completed_count(), 0);
        assert_eq!(r.outstanding_indices(), [0, 1, 2]);
    }

    #[test]
    fn apply_is_idempotent() {
        let mut r = record(2);
        let p = PathBuf::from("/tmp/x.wav");
        assert!(r.apply(1, ChunkStatus::Completed, Some(p.clone())).unwrap());
        assert!(!r.apply(1, ChunkStatus::Completed, Some(p)).unwrap());
        assert_eq!(r.completed_count(), 1);
    }

    #[test]
    fn apply_rejects_out_of_range() {
        let mut r = record(2);
        assert!(matches!(
            r.apply(2, ChunkStatus::Failed, None),
            Err(ProgressError::IndexOutOfRange { index: 2, planned: 2 })
        ));
    }

    #[test]
    fn stale_completed_entries_are_downgraded() {
        let dir = tempdir().unwrap();
        let at = |i: usize| dir.path().join(format!("chunk_{i}.wav"));
        std::fs::write(at(0), b"data").unwrap();
        std::fs::write(at(1), b"").unwrap();

        let mut r = record(3);
        r.apply(0, ChunkStatus::Completed, Some(at(0))).unwrap();
        r.apply(1, ChunkStatus::Completed, Some(at(1))).unwrap();
        r.apply(2, ChunkStatus::Completed, Some(at(2))).unwrap();

        assert_eq!(r.downgrade_stale(at), [1, 2]);
        assert_eq!(r.outstanding_indices(), [1, 2]);
        assert_eq!(r.missing_indices(), [1, 2]);
        assert_eq!(r.entry(1).unwrap().artifact_path, None);
    }

    #[test]
    fn artifacts_outside_their_slot_are_downgraded() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        let elsewhere = dir.path().join("elsewhere.wav");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("0.wav"), b"data").unwrap();
        std::fs::write(&elsewhere, b"data").unwrap();

        let mut r = record(2);
        r.apply(0, ChunkStatus::Completed, Some(work.join("0.wav"))).unwrap();
        // Valid file, wrong slot.
        r.apply(1, ChunkStatus::Completed, Some(elsewhere.clone())).unwrap();

        assert_eq!(r.downgrade_stale(|i| work.join(format!("{i}.wav"))), [1]);
        assert_eq!(r.entry(1).unwrap().status, ChunkStatus::Pending);
        assert!(elsewhere.is_file());
    }

    #[test]
    fn raw_form_only_keeps_non_default_entries() {
        let mut r = record(4);
        r.apply(2, ChunkStatus::Failed, None).unwrap();
        let raw = RawRecord::from(&r);
        assert_eq!(raw.chunks.len(), 1);
        assert!(raw.chunks.contains_key("2"));

        let back = ProgressRecord::try_from(raw).unwrap();
        assert_eq!(back.planned_count(), 4);
        assert_eq!(back.entry(2).unwrap().status, ChunkStatus::Failed);
    }

    #[test]
    fn raw_form_rejects_negative_and_large_indices() {
        for key in ["-1", "4", "99"] {
            let mut raw = RawRecord::from(&record(4));
            raw.chunks.insert(key.into(), ChunkEntry::default());
            assert!(matches!(
                ProgressRecord::try_from(raw),
                Err(ProgressError::IndexOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn raw_form_rejects_non_numeric_keys() {
        let mut raw = RawRecord::from(&record(4));
        raw.chunks.insert("one".into(), ChunkEntry::default());
        assert!(matches!(
            ProgressRecord::try_from(raw),
            Err(ProgressError::Corrupt(_))
        ));
    }
}
