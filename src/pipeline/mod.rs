//! Conversion pipeline: job lifecycle, orchestration and control surface.
//!
//! # Architecture
//!
//! ```text
//! presentation (CLI / UI)
//!        │ start / pause / resume / cancel / status
//!        ▼
//! Converter  ── one active job (job lock)
//!        │ tokio::spawn
//!        ▼
//! ConversionOrchestrator::run()  ← async tokio task
//!        │
//!        ├─ ChunkPlanner::plan                         → Planning
//!        ├─ ProgressStore::load / save (fingerprint)
//!        ├─ per batch: JobSignals checkpoint           → Running ⇄ Paused
//!        │     └─ spawn_blocking(SynthesisEngine)      → chunk_<index>.wav
//!        ├─ completeness check
//!        └─ spawn_blocking(AssemblyEngine::assemble)   → Completed
//!
//! EventBus (per-job broadcast) ──▶ Subscription::recv()
//! SharedStatus (Arc<Mutex<JobStatus>>) ──▶ Converter::status()
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audiobook_converter::config::AppConfig;
//! use audiobook_converter::document::SourceDocument;
//! use audiobook_converter::pipeline::Converter;
//! use audiobook_converter::synth::VoiceIdentity;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let converter = Converter::from_config(AppConfig::load()?);
//!     let book = Arc::new(SourceDocument::load("book.txt".as_ref())?);
//!     let selection = book.all_chapter_orders();
//!
//!     let (_, mut events) = converter.start_with_events(
//!         book,
//!         selection,
//!         VoiceIdentity::resolve("male_us_warm")?,
//!         "out",
//!     )?;
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod runner;
pub mod signals;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use control::{ControlError, Converter};
pub use runner::{artifact_path, output_path_for, ConversionOrchestrator, JobRequest, OUTPUT_EXTENSION};
pub use signals::{Checkpoint, JobSignals};
pub use state::{new_shared_status, JobOutcome, JobState, JobStatus, SharedStatus};
