//! Speech synthesis collaborator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           SynthesisEngine (trait)             │
//! │                                              │
//! │   ┌───────────────┐   ┌──────────────────┐   │
//! │   │ CommandEngine │   │ HttpSpeechEngine │   │
//! │   │ local program │   │ /v1/audio/speech │   │
//! │   └───────┬───────┘   └────────┬─────────┘   │
//! │           └──────────┬─────────┘             │
//! │                      ▼                       │
//! │     synthesize_with_retry (spawn_blocking,   │
//! │     exponential backoff, panic containment)  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The backend is chosen once per job by [`build_engine`] and held for the
//! job's lifetime.

pub mod command;
pub mod engine;
pub mod http;
pub mod retry;
pub mod voice;

use std::sync::Arc;

use crate::config::{EngineKind, SynthesisConfig};

pub use crate::audio::AudioSamples;
pub use command::CommandEngine;
pub use engine::{SynthesisEngine, SynthesisError};
pub use http::HttpSpeechEngine;
pub use retry::{synthesize_once, synthesize_with_retry, RetryPolicy};
pub use voice::{find_voice, VoiceIdentity, VoicePreset, VOICE_PRESETS};

/// Construct the configured backend.
pub fn build_engine(config: &SynthesisConfig) -> Arc<dyn SynthesisEngine> {
    match config.engine {
        EngineKind::Command => Arc::new(CommandEngine::from_config(&config.command)),
        EngineKind::Http => Arc::new(HttpSpeechEngine::from_config(&config.http)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_engine_follows_config() {
        let mut cfg = SynthesisConfig::default();
        assert!(build_engine(&cfg).identity().starts_with("command:"));
        cfg.engine = EngineKind::Http;
        assert!(build_engine(&cfg).identity().starts_with("http:"));
    }
}
