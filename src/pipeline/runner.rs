//! Conversion orchestrator: drives one job from plan to final artifact.
//!
//! [`ConversionOrchestrator`] owns a job's lifecycle and reports it through
//! the [`EventBus`] and a [`SharedStatus`] snapshot.
//!
//! # Job flow
//!
//! ```text
//! Planning
//!   └─▶ ChunkPlanner::plan                       (PlanningError → Failed)
//!   └─▶ fingerprint → ProgressStore::load        (mismatch → fresh record)
//!   └─▶ downgrade stale artifacts, create work dir
//! Running ⇄ Paused
//!   └─▶ per batch: checkpoint (pause / cancel) → spawn_blocking(engine)
//!         with retry → write chunk_<index>.wav → record by index
//! Completeness check                             (gaps → Failed)
//! Assembly                                       (cancel deferred)
//!   └─▶ spawn_blocking(AssemblyEngine::assemble)
//! Cleanup (each resource independently) → Completed
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::assembly::{
    file_safe_name, AssemblyEngine, AssemblyError, AssemblyInput, AssemblyOutput,
    CHAPTER_FILE_NAME, COMBINED_WAV_NAME,
};
use crate::audio::{write_wav, AudioSamples};
use crate::chunk::{ChunkPlan, ChunkPlanner};
use crate::config::{work_dir, AppConfig};
use crate::document::SourceDocument;
use crate::events::{ErrorKind, EventBus, JobEvent, JobId, LogLevel};
use crate::progress::{
    ChunkStatus, Fingerprint, FingerprintInput, ProgressError, ProgressRecord, ProgressStore,
};
use crate::synth::{synthesize_with_retry, RetryPolicy, SynthesisEngine, SynthesisError, VoiceIdentity};

use super::signals::{Checkpoint, JobSignals};
use super::state::{update_status, JobOutcome, JobState, SharedStatus};

/// Extension of the final container.
pub const OUTPUT_EXTENSION: &str = "m4b";

/// Path of chunk `index`'s artifact inside `work_dir`.
pub fn artifact_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir.join(format!("chunk_{index:05}.wav"))
}

/// `<output_dir>/<file-safe title>.m4b`.
pub fn output_path_for(output_dir: &Path, title: &str) -> PathBuf {
    output_dir.join(format!("{}.{OUTPUT_EXTENSION}", file_safe_name(title)))
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Parameters of one conversion, as given to `start`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub document: Arc<SourceDocument>,
    /// Chapter orders, in the order they should appear.
    pub selection: Vec<usize>,
    pub voice: VoiceIdentity,
    pub output_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// A job-ending error on its way to becoming [`JobOutcome::Failed`].
#[derive(Debug)]
struct Failure {
    kind: ErrorKind,
    message: String,
    missing_indices: Vec<usize>,
}

impl Failure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            missing_indices: Vec::new(),
        }
    }
}

impl From<ProgressError> for Failure {
    fn from(e: ProgressError) -> Self {
        Failure::new(ErrorKind::Internal, format!("progress record: {e}"))
    }
}

// ---------------------------------------------------------------------------
// ConversionOrchestrator
// ---------------------------------------------------------------------------

/// Drives a single job. Create one per job and call [`run`](Self::run)
/// inside a tokio task.
pub struct ConversionOrchestrator {
    job_id: JobId,
    config: AppConfig,
    engine: Arc<dyn SynthesisEngine>,
    assembler: Arc<AssemblyEngine>,
    bus: Arc<EventBus>,
    signals: JobSignals,
    status: SharedStatus,
    retry: RetryPolicy,
    state: JobState,
}

impl ConversionOrchestrator {
    pub fn new(
        job_id: JobId,
        config: AppConfig,
        engine: Arc<dyn SynthesisEngine>,
        assembler: Arc<AssemblyEngine>,
        bus: Arc<EventBus>,
        signals: JobSignals,
        status: SharedStatus,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.synthesis);
        Self {
            job_id,
            config,
            engine,
            assembler,
            bus,
            signals,
            status,
            retry,
            state: JobState::Idle,
        }
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Run the job to a terminal state and publish its terminal event.
    pub async fn run(mut self, request: JobRequest) -> JobOutcome {
        update_status(&self.status, |s| {
            *s = Default::default();
            s.job_id = Some(self.job_id);
        });

        let outcome = match self.execute(&request).await {
            Ok(outcome) => outcome,
            Err(f) => JobOutcome::Failed {
                kind: f.kind,
                message: f.message,
                missing_indices: f.missing_indices,
            },
        };
        self.finish(&outcome);
        outcome
    }

    async fn execute(&mut self, request: &JobRequest) -> Result<JobOutcome, Failure> {
        // ── 1. Plan ──────────────────────────────────────────────────────
        self.set_state(JobState::Planning);
        let doc = Arc::clone(&request.document);
        let plan = ChunkPlanner::from_config(&self.config.chunking)
            .plan(&doc, &request.selection)
            .map_err(|e| Failure::new(ErrorKind::Planning, e.to_string()))?;
        let total = plan.len();
        self.log(
            LogLevel::Info,
            format!(
                "pipeline: planned {total} chunks across {} chapters",
                plan.chapters.len()
            ),
        );

        // ── 2. Identity, progress, working directory ─────────────────────
        let fingerprint = Fingerprint::compute(&FingerprintInput {
            content_hash: &doc.content_hash(),
            selected_chapters: &request.selection,
            voice_id: &request.voice.id,
            voice_description: &request.voice.description,
            engine_identity: &self.engine.identity(),
            chunking: &self.config.chunking,
        });
        let store = ProgressStore::at(&request.output_dir);
        let work = work_dir(&request.output_dir, fingerprint.as_str());
        let (mut record, superseded) =
            self.load_or_create(&store, &fingerprint, &plan, request, &work)?;
        persist(&store, &record).await?;
        if let Some(old) = superseded.filter(|old| *old != work) {
            self.remove_superseded(&old);
        }

        create_private_dir(&work).map_err(|e| {
            Failure::new(
                ErrorKind::Internal,
                format!("cannot create working directory {}: {e}", work.display()),
            )
        })?;

        let output_path = output_path_for(&request.output_dir, &doc.title);
        if std::fs::symlink_metadata(&output_path).is_ok() {
            return Err(Failure::new(
                ErrorKind::Assembly,
                AssemblyError::OutputExists(output_path).to_string(),
            ));
        }

        // ── 3. Dispatch ──────────────────────────────────────────────────
        let done = record.completed_count();
        update_status(&self.status, |s| {
            s.total = total;
            s.completed = done;
        });
        self.set_state(JobState::Running);
        if done > 0 {
            self.log(
                LogLevel::Info,
                format!("pipeline: resuming, {done}/{total} chunks already synthesized"),
            );
        }

        let outstanding = record.outstanding_indices();
        let width = self.config.synthesis.batch_width.max(1);
        for batch in outstanding.chunks(width) {
            if self.checkpoint().await == Checkpoint::Cancel {
                return self.cancelled(&store, &record).await;
            }
            self.dispatch_batch(batch, &plan, &request.voice, &work, &store, &mut record)
                .await?;
        }
        if self.signals.is_cancelled() {
            return self.cancelled(&store, &record).await;
        }

        // ── 4. Completeness check ────────────────────────────────────────
        let missing = record.missing_indices();
        if !missing.is_empty() {
            return Err(Failure {
                kind: ErrorKind::Integrity,
                message: format!(
                    "{} of {total} chunks have no audio; nothing was assembled",
                    missing.len()
                ),
                missing_indices: missing,
            });
        }

        // ── 5. Assembly (cancellation deferred) ──────────────────────────
        // Paths come from the work dir, never from the stored record.
        let artifacts: Vec<PathBuf> = (0..total).map(|i| artifact_path(&work, i)).collect();

        self.log(
            LogLevel::Info,
            format!("pipeline: assembling {}", output_path.display()),
        );
        let assembled = self
            .assemble(&doc, &plan, artifacts.clone(), &work, &output_path)
            .await?;
        if self.signals.is_cancelled() {
            self.log(
                LogLevel::Warn,
                "pipeline: cancel requested during assembly; assembly was allowed to finish",
            );
        }

        // ── 6. Cleanup ───────────────────────────────────────────────────
        if self.config.assembly.keep_artifacts {
            log::info!("pipeline: keeping artifacts in {}", work.display());
        } else {
            self.cleanup(&store, &artifacts, &work);
        }

        Ok(JobOutcome::Completed {
            output_path: assembled.output_path,
            manifest_path: assembled.manifest_path,
        })
    }

    // -----------------------------------------------------------------------
    // Progress record
    // -----------------------------------------------------------------------

    /// Resume the stored record when it belongs to this job, otherwise start
    /// a fresh one. Completed entries whose artifact is not a non-empty file
    /// at its slot in `work` are downgraded to pending.
    ///
    /// Also returns the work dir of a record this job replaces, if any.
    fn load_or_create(
        &self,
        store: &ProgressStore,
        fingerprint: &Fingerprint,
        plan: &ChunkPlan,
        request: &JobRequest,
        work: &Path,
    ) -> Result<(ProgressRecord, Option<PathBuf>), Failure> {
        let fresh = || {
            ProgressRecord::new(
                fingerprint.clone(),
                plan.len(),
                request.document.title.clone(),
                request.voice.id.clone(),
                request.selection.clone(),
            )
        };

        let mut superseded = None;
        let mut record = match store.load(fingerprint) {
            Ok(r) if r.planned_count() == plan.len() => {
                log::info!(
                    "pipeline: found progress for {} ({}/{} completed)",
                    fingerprint.short(),
                    r.completed_count(),
                    r.planned_count()
                );
                r
            }
            Ok(r) => {
                self.log(
                    LogLevel::Warn,
                    format!(
                        "pipeline: stored progress plans {} chunks but the plan has {}; starting fresh",
                        r.planned_count(),
                        plan.len()
                    ),
                );
                fresh()
            }
            Err(ProgressError::NotFound(_)) => fresh(),
            Err(e @ ProgressError::ResumeMismatch { .. }) => {
                self.bus.publish(
                    self.job_id,
                    JobEvent::Error {
                        kind: ErrorKind::ResumeMismatch,
                        message: format!("{e}; starting a fresh job"),
                        missing_indices: Vec::new(),
                        terminal: false,
                    },
                );
                log::warn!("pipeline: {e}");
                superseded = store
                    .load_any()
                    .ok()
                    .filter(|old| old.fingerprint.is_well_formed())
                    .map(|old| work_dir(&request.output_dir, old.fingerprint.as_str()));
                fresh()
            }
            Err(e) => {
                self.bus.publish(
                    self.job_id,
                    JobEvent::Error {
                        kind: ErrorKind::Internal,
                        message: format!("discarding unreadable progress record: {e}"),
                        missing_indices: Vec::new(),
                        terminal: false,
                    },
                );
                log::warn!("pipeline: discarding unreadable progress record: {e}");
                fresh()
            }
        };

        let stale = record.downgrade_stale(|i| artifact_path(work, i));
        if !stale.is_empty() {
            self.log(
                LogLevel::Warn,
                format!(
                    "pipeline: {} completed chunks lost their audio and will be synthesized again",
                    stale.len()
                ),
            );
        }
        Ok((record, superseded))
    }

    /// Delete the chunk audio of a job whose progress record was replaced.
    fn remove_superseded(&self, old: &Path) {
        match std::fs::remove_dir_all(old) {
            Ok(()) => self.log(
                LogLevel::Info,
                format!("pipeline: removed superseded job files in {}", old.display()),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "pipeline: could not remove superseded job files in {}: {e}",
                old.display()
            ),
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Honour pause/cancel. Only called between batches.
    async fn checkpoint(&mut self) -> Checkpoint {
        if self.signals.is_cancelled() {
            return Checkpoint::Cancel;
        }
        if !self.signals.is_paused() {
            return Checkpoint::Continue;
        }

        self.set_state(JobState::Paused);
        let decision = self.signals.wait_while_paused().await;
        if decision == Checkpoint::Continue {
            self.set_state(JobState::Running);
        }
        decision
    }

    /// Synthesize `batch` concurrently and record each result by index as it
    /// arrives.
    async fn dispatch_batch(
        &mut self,
        batch: &[usize],
        plan: &ChunkPlan,
        voice: &VoiceIdentity,
        work: &Path,
        store: &ProgressStore,
        record: &mut ProgressRecord,
    ) -> Result<(), Failure> {
        let mut tasks = JoinSet::new();
        for &index in batch {
            let chunk = plan.chunks.get(index).ok_or_else(|| {
                Failure::new(ErrorKind::Internal, format!("chunk {index} is not in the plan"))
            })?;
            let engine = Arc::clone(&self.engine);
            let text = chunk.text.clone();
            let voice = voice.clone();
            let policy = self.retry;
            let path = artifact_path(work, index);
            let bus = Arc::clone(&self.bus);
            let job_id = self.job_id;

            tasks.spawn(async move {
                let result = synthesize_with_retry(engine, &text, &voice, &policy, |attempt, e| {
                    bus.publish(
                        job_id,
                        JobEvent::log(
                            LogLevel::Warn,
                            format!(
                                "synth: chunk {index} attempt {attempt}/{} failed: {e}",
                                policy.max_attempts
                            ),
                        ),
                    );
                })
                .await;
                let stored = match result {
                    Ok(audio) => store_artifact(path, audio).await,
                    Err(e) => Err(e),
                };
                (index, stored)
            });
        }

        let mut reported = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    reported.insert(index);
                    self.record_result(index, result, plan, store, record).await?;
                }
                Err(e) => log::error!("pipeline: dispatch task failed: {e}"),
            }
        }
        for &index in batch {
            if !reported.contains(&index) {
                let lost = Err(SynthesisError::Internal("dispatch task was lost".into()));
                self.record_result(index, lost, plan, store, record).await?;
            }
        }
        Ok(())
    }

    async fn record_result(
        &self,
        index: usize,
        result: Result<PathBuf, SynthesisError>,
        plan: &ChunkPlan,
        store: &ProgressStore,
        record: &mut ProgressRecord,
    ) -> Result<(), Failure> {
        let total = plan.len();
        match result {
            Ok(path) => {
                record_chunk(store, record, index, ChunkStatus::Completed, Some(path)).await?;
                let completed = record.completed_count();
                let title = plan
                    .chunks
                    .get(index)
                    .map(|c| plan.chapter_title(c))
                    .unwrap_or("");
                let status_text = format!("Chunk {}/{total} | {title}", index + 1);

                update_status(&self.status, |s| {
                    s.completed = completed;
                    s.current_index = Some(index);
                    s.status_text = status_text.clone();
                });
                self.bus.publish(
                    self.job_id,
                    JobEvent::Progress {
                        completed,
                        total,
                        current_index: index,
                        status_text,
                    },
                );
            }
            Err(e) => {
                record_chunk(store, record, index, ChunkStatus::Failed, None).await?;
                log::warn!("pipeline: chunk {index} failed: {e}");
                self.bus.publish(
                    self.job_id,
                    JobEvent::Error {
                        kind: ErrorKind::Synthesis,
                        message: format!("chunk {index} failed after retries: {e}"),
                        missing_indices: vec![index],
                        terminal: false,
                    },
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Assembly & cleanup
    // -----------------------------------------------------------------------

    async fn assemble(
        &self,
        doc: &SourceDocument,
        plan: &ChunkPlan,
        artifacts: Vec<PathBuf>,
        work: &Path,
        output: &Path,
    ) -> Result<AssemblyOutput, Failure> {
        let assembler = Arc::clone(&self.assembler);
        let title = doc.title.clone();
        let author = doc.author.clone();
        let chapters = plan.chapters.clone();
        let cover = doc.cover_image.clone();
        let work = work.to_path_buf();
        let output = output.to_path_buf();

        let joined = tokio::task::spawn_blocking(move || {
            assembler.assemble(&AssemblyInput {
                title: &title,
                author: &author,
                chapters: &chapters,
                artifacts: &artifacts,
                work_dir: &work,
                cover_image: cover.as_deref(),
                output_path: &output,
            })
        })
        .await;

        match joined {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(Failure::new(ErrorKind::Assembly, e.to_string())),
            Err(e) => Err(Failure::new(
                ErrorKind::Internal,
                format!("assembly task failed: {e}"),
            )),
        }
    }

    /// Remove every job resource. Each removal is attempted on its own; a
    /// failure is logged and does not stop the others.
    fn cleanup(&self, store: &ProgressStore, artifacts: &[PathBuf], work: &Path) {
        let intermediates = [work.join(COMBINED_WAV_NAME), work.join(CHAPTER_FILE_NAME)];
        let mut failed = 0usize;
        for path in artifacts.iter().chain(intermediates.iter()) {
            if let Err(e) = remove_file_if_present(path) {
                failed += 1;
                log::warn!("pipeline: cleanup could not remove {}: {e}", path.display());
            }
        }
        if let Err(e) = std::fs::remove_dir_all(work) {
            if e.kind() != std::io::ErrorKind::NotFound {
                failed += 1;
                log::warn!("pipeline: cleanup could not remove {}: {e}", work.display());
            }
        }
        if let Some(parent) = work.parent() {
            // Only succeeds when no other job's work dir is left.
            if std::fs::remove_dir(parent).is_ok() {
                log::debug!("pipeline: removed {}", parent.display());
            }
        }
        if let Err(e) = store.remove() {
            failed += 1;
            log::warn!("pipeline: cleanup could not remove progress record: {e}");
        }

        if failed == 0 {
            log::info!("pipeline: cleaned up job files");
        } else {
            log::warn!("pipeline: cleanup finished with {failed} failures");
        }
    }

    // -----------------------------------------------------------------------
    // Terminal states
    // -----------------------------------------------------------------------

    async fn cancelled(
        &self,
        store: &ProgressStore,
        record: &ProgressRecord,
    ) -> Result<JobOutcome, Failure> {
        persist(store, record).await?;
        log::info!(
            "pipeline: cancelled with {}/{} chunks kept for resume",
            record.completed_count(),
            record.planned_count()
        );
        Ok(JobOutcome::Cancelled {
            completed: record.completed_count(),
            total: record.planned_count(),
        })
    }

    fn finish(&mut self, outcome: &JobOutcome) {
        self.set_state(outcome.state());

        let event = match outcome {
            JobOutcome::Completed {
                output_path,
                manifest_path,
            } => {
                update_status(&self.status, |s| {
                    s.output_path = Some(output_path.clone());
                    s.current_index = None;
                });
                JobEvent::Completed {
                    output_path: output_path.clone(),
                    manifest_path: manifest_path.clone(),
                }
            }
            JobOutcome::Cancelled { completed, total } => JobEvent::Cancelled {
                completed: *completed,
                total: *total,
            },
            JobOutcome::Failed {
                kind,
                message,
                missing_indices,
            } => {
                log::error!("pipeline error ({kind}): {message}");
                update_status(&self.status, |s| {
                    s.error = Some(message.clone());
                    s.missing_indices = missing_indices.clone();
                });
                JobEvent::Error {
                    kind: *kind,
                    message: message.clone(),
                    missing_indices: missing_indices.clone(),
                    terminal: true,
                }
            }
        };
        self.bus.publish(self.job_id, event);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_state(&mut self, next: JobState) {
        if self.state != next && !self.state.can_transition_to(next) {
            log::warn!(
                "pipeline: unexpected transition {} -> {}",
                self.state.label(),
                next.label()
            );
        }
        self.state = next;
        update_status(&self.status, |s| s.state = next);
        self.bus
            .publish(self.job_id, JobEvent::StateChanged { state: next });
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.bus.publish(self.job_id, JobEvent::log(level, message));
    }
}

/// Save a snapshot of `record` on the blocking pool.
async fn persist(store: &ProgressStore, record: &ProgressRecord) -> Result<(), Failure> {
    let store = store.clone();
    let snapshot = record.clone();
    tokio::task::spawn_blocking(move || store.save(&snapshot))
        .await
        .map_err(|e| Failure::new(ErrorKind::Internal, format!("progress save task failed: {e}")))??;
    Ok(())
}

/// Apply one chunk result and persist it, on the blocking pool.
async fn record_chunk(
    store: &ProgressStore,
    record: &mut ProgressRecord,
    index: usize,
    status: ChunkStatus,
    artifact: Option<PathBuf>,
) -> Result<(), Failure> {
    let store = store.clone();
    let mut updated = record.clone();
    *record = tokio::task::spawn_blocking(move || {
        store
            .record_chunk_result(&mut updated, index, status, artifact)
            .map(|_| updated)
    })
    .await
    .map_err(|e| Failure::new(ErrorKind::Internal, format!("progress save task failed: {e}")))??;
    Ok(())
}

async fn store_artifact(path: PathBuf, audio: AudioSamples) -> Result<PathBuf, SynthesisError> {
    let joined = tokio::task::spawn_blocking(move || write_wav(&path, &audio).map(|_| path)).await;
    match joined {
        Ok(Ok(path)) => Ok(path),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(SynthesisError::Internal(format!("artifact write failed: {e}"))),
    }
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
