//! Synthesis through an OpenAI-compatible `/v1/audio/speech` endpoint.
//!
//! Works with any server that accepts `{model, input, voice, response_format}`
//! and answers with a WAV body (OpenAI, Kokoro-FastAPI, openedai-speech, ...).
//! All connection details come from [`HttpEngineConfig`].

use std::time::Duration;

use crate::audio::{decode_wav_bytes, AudioSamples};
use crate::config::HttpEngineConfig;
use crate::synth::engine::{SynthesisEngine, SynthesisError};
use crate::synth::voice::VoiceIdentity;

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Engine(e.to_string())
        }
    }
}

/// Remote speech endpoint.
///
/// [`synthesize`](SynthesisEngine::synthesize) is called on the blocking
/// thread pool, so it drives the async request with the ambient tokio
/// runtime handle.
pub struct HttpSpeechEngine {
    client: reqwest::Client,
    config: HttpEngineConfig,
}

impl HttpSpeechEngine {
    /// The client carries the per-request timeout from `timeout_secs`.
    pub fn from_config(config: &HttpEngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.config.base_url.trim_end_matches('/'))
    }

    /// JSON request body for one chunk.
    pub fn request_body(&self, text: &str, voice: &VoiceIdentity) -> serde_json::Value {
        serde_json::json!({
            "model":           self.config.model,
            "input":           text,
            "voice":           voice.id,
            "instructions":    voice.description,
            "response_format": "wav"
        })
    }

    async fn request(
        &self,
        text: &str,
        voice: &VoiceIdentity,
    ) -> Result<AudioSamples, SynthesisError> {
        let mut req = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(text, voice));

        // Bearer auth only when a non-empty key is configured.
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Engine(format!(
                "speech endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let bytes = response.bytes().await?;
        let audio = decode_wav_bytes(&bytes)?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio)
    }
}

impl SynthesisEngine for HttpSpeechEngine {
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceIdentity,
    ) -> Result<AudioSamples, SynthesisError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SynthesisError::Internal("HTTP synthesis needs a tokio runtime".into())
        })?;
        handle.block_on(self.request(text, voice))
    }

    fn identity(&self) -> String {
        format!(
            "http:{} model={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}
