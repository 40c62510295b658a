//! Bounded retry with exponential backoff around a blocking engine call.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioSamples;
use crate::config::SynthesisConfig;
use crate::synth::engine::{SynthesisEngine, SynthesisError};
use crate::synth::voice::VoiceIdentity;

/// How often and how patiently a chunk is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }

    /// Delay before attempt `failed_attempt + 1`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use audiobook_converter::synth::RetryPolicy;
    ///
    /// let p = RetryPolicy::new(4, Duration::from_millis(100));
    /// assert_eq!(p.delay_after(1), Duration::from_millis(100));
    /// assert_eq!(p.delay_after(3), Duration::from_millis(400));
    /// ```
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SynthesisConfig::default())
    }
}

/// Run one blocking engine call on the blocking pool.
///
/// Empty audio counts as failure; a panic inside the engine becomes
/// [`SynthesisError::Internal`].
pub async fn synthesize_once(
    engine: Arc<dyn SynthesisEngine>,
    text: String,
    voice: VoiceIdentity,
) -> Result<AudioSamples, SynthesisError> {
    let joined = tokio::task::spawn_blocking(move || engine.synthesize(&text, &voice)).await;
    match joined {
        Ok(Ok(audio)) if audio.is_empty() => Err(SynthesisError::EmptyAudio),
        Ok(Ok(audio)) => Ok(audio),
        Ok(Err(e)) => Err(e),
        Err(join_err) => Err(SynthesisError::Internal(format!(
            "engine task failed: {join_err}"
        ))),
    }
}

/// Synthesize with up to `policy.max_attempts` attempts.
///
/// `on_failure(attempt, &error)` is called after every failed attempt,
/// including the last. Returns the last error when all attempts fail.
pub async fn synthesize_with_retry(
    engine: Arc<dyn SynthesisEngine>,
    text: &str,
    voice: &VoiceIdentity,
    policy: &RetryPolicy,
    mut on_failure: impl FnMut(u32, &SynthesisError),
) -> Result<AudioSamples, SynthesisError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match synthesize_once(Arc::clone(&engine), text.to_string(), voice.clone()).await {
            Ok(audio) => return Ok(audio),
            Err(e) => {
                on_failure(attempt, &e);
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;

    fn voice() -> VoiceIdentity {
        VoiceIdentity::new("v", "d")
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::new(5, Duration::from_millis(500));
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1_000));
        assert_eq!(p.delay_after(4), Duration::from_millis(4_000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let engine = Arc::new(ScriptedEngine::new(100).fail_first("Hello.", 2));
        let mut failures = Vec::new();
        let audio = synthesize_with_retry(
            engine.clone(),
            "Hello.",
            &voice(),
            &RetryPolicy::new(3, Duration::ZERO),
            |n, _| failures.push(n),
        )
        .await
        .unwrap();
        assert!(!audio.is_empty());
        assert_eq!(failures, [1, 2]);
        assert_eq!(engine.calls_for("Hello."), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let engine = Arc::new(ScriptedEngine::new(100).always_fail("Bad."));
        let err = synthesize_with_retry(
            engine.clone(),
            "Bad.",
            &voice(),
            &RetryPolicy::new(3, Duration::ZERO),
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SynthesisError::Engine(_)));
        assert_eq!(engine.calls_for("Bad."), 3);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let engine = Arc::new(ScriptedEngine::new(100).panic_on("Boom."));
        let err = synthesize_once(engine, "Boom.".into(), voice())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Internal(_)));
    }

    #[tokio::test]
    async fn empty_audio_is_failure() {
        let engine = Arc::new(ScriptedEngine::new(100).silent_on("Quiet."));
        let err = synthesize_once(engine, "Quiet.".into(), voice())
            .await
            .unwrap_err();
        assert_eq!(err, SynthesisError::EmptyAudio);
    }
}
