//! Core synthesis engine trait.
//!
//! [`SynthesisEngine`] is the collaborator boundary between the pipeline and
//! whatever produces speech. It is object-safe and `Send + Sync` so the
//! orchestrator can hold one `Arc<dyn SynthesisEngine>` for a job's lifetime
//! and call it from the blocking thread pool.

use thiserror::Error;

use crate::audio::{AudioError, AudioSamples};
use crate::synth::voice::VoiceIdentity;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Errors a synthesis call can produce. All of them are retryable from the
/// pipeline's point of view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// No voice preset with this id exists.
    #[error("unknown voice preset: {0}")]
    UnknownVoice(String),

    /// The backend ran but reported failure.
    #[error("synthesis backend failed: {0}")]
    Engine(String),

    #[error("synthesis timed out")]
    Timeout,

    /// The backend succeeded but produced zero samples.
    #[error("synthesis produced no audio")]
    EmptyAudio,

    /// The backend produced bytes that are not a decodable WAV.
    #[error("synthesis returned invalid audio: {0}")]
    InvalidAudio(String),

    #[error("synthesis I/O failed: {0}")]
    Io(String),

    /// The engine panicked or the blocking task was lost.
    #[error("internal synthesis fault: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SynthesisError {
    fn from(e: std::io::Error) -> Self {
        SynthesisError::Io(e.to_string())
    }
}

impl From<AudioError> for SynthesisError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Io(io) => SynthesisError::Io(io.to_string()),
            AudioError::Empty => SynthesisError::EmptyAudio,
            other => SynthesisError::InvalidAudio(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisEngine trait
// ---------------------------------------------------------------------------

/// Maps `(text, voice)` to mono audio samples.
///
/// # Contract
///
/// - Blocking; the pipeline calls it through `tokio::task::spawn_blocking`.
/// - Safe to call again with the same arguments after a failure.
/// - [`identity`](SynthesisEngine::identity) is stable for the engine's
///   configuration and feeds the job fingerprint.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceIdentity)
        -> Result<AudioSamples, SynthesisError>;

    fn identity(&self) -> String;
}

// Compile-time assertion: Box<dyn SynthesisEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SynthesisEngine>) {}
};
