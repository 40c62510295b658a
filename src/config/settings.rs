//! Settings sections, their defaults, and `settings.toml` persistence.
//!
//! Every section is `#[serde(default)]`, so a hand-written `settings.toml`
//! only needs the keys it overrides. Values are checked by
//! [`AppConfig::validate`] on load so a bad file fails at startup rather than
//! mid-job.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::settings_file;

// ---------------------------------------------------------------------------
// ChunkingConfig
// ---------------------------------------------------------------------------

/// Bounds used by the chunk planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// A chunk is never closed below this many words unless it is the last
    /// chunk of its chapter.
    pub min_words: usize,
    /// Sentences are accumulated until adding the next one would exceed this.
    pub max_words: usize,
    /// Hard ceiling on the number of chunks in one job.
    pub max_total_chunks: usize,
    /// Run the TTS-oriented text normaliser before sentence splitting.
    pub normalize_text: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_words: 15,
            max_words: 40,
            max_total_chunks: 20_000,
            normalize_text: true,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineKind
// ---------------------------------------------------------------------------

/// Selects which synthesis backend a job is bound to.
///
/// | Variant | Backend                                               |
/// |---------|-------------------------------------------------------|
/// | Command | External TTS program that writes a WAV file           |
/// | Http    | OpenAI-compatible `/v1/audio/speech` endpoint (WAV)   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Command,
    Http,
}

// ---------------------------------------------------------------------------
// CommandEngineConfig
// ---------------------------------------------------------------------------

/// Settings for the external-program backend.
///
/// `args` may contain the placeholders `{text_file}`, `{output}` and
/// `{voice}`; each placeholder is substituted inside a single argument, the
/// argument list itself is never re-split or passed through a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandEngineConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CommandEngineConfig {
    fn default() -> Self {
        Self {
            program: "piper".into(),
            args: vec![
                "--model".into(),
                "{voice}".into(),
                "--input_file".into(),
                "{text_file}".into(),
                "--output_file".into(),
                "{output}".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// HttpEngineConfig
// ---------------------------------------------------------------------------

/// Settings for the HTTP speech backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEngineConfig {
    /// Base URL of the API endpoint, without the `/v1/...` suffix.
    pub base_url: String,
    /// API key; `None` for local servers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    /// Maximum seconds to wait for one chunk before timing out.
    pub timeout_secs: u64,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8880".into(),
            api_key: None,
            model: "tts-1".into(),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Settings for chunk dispatch and the synthesis backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub engine: EngineKind,
    /// Sample rate every artifact is expected to carry.
    pub sample_rate: u32,
    /// Number of chunks dispatched concurrently; `1` means strictly sequential.
    pub batch_width: usize,
    /// Total attempts per chunk before it is marked failed.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on each further attempt.
    pub backoff_ms: u64,
    /// Voice preset id used when the caller does not pick one.
    pub default_voice: String,
    pub command: CommandEngineConfig,
    pub http: HttpEngineConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            sample_rate: 24_000,
            batch_width: 1,
            max_attempts: 3,
            backoff_ms: 500,
            default_voice: "male_us_warm".into(),
            command: CommandEngineConfig::default(),
            http: HttpEngineConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AssemblyConfig
// ---------------------------------------------------------------------------

/// Settings for concatenation and container encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Encoder executable, resolved through `PATH` when not absolute.
    pub encoder_program: String,
    pub audio_codec: String,
    pub bitrate: String,
    /// Silence inserted between the last chunk of one chapter and the first
    /// chunk of the next.
    pub chapter_silence_ms: u32,
    /// Program used to read back the encoded duration. Empty disables the
    /// duration check.
    pub inspect_program: String,
    /// Keep chunk artifacts and the progress record after a verified success.
    pub keep_artifacts: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            encoder_program: "ffmpeg".into(),
            audio_codec: "aac".into(),
            bitrate: "64k".into(),
            chapter_silence_ms: 1_000,
            inspect_program: "ffprobe".into(),
            keep_artifacts: false,
        }
    }
}

// ---------------------------------------------------------------------------
// EventsConfig / LoggingConfig
// ---------------------------------------------------------------------------

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-subscriber buffer; the oldest events are dropped beyond this.
    pub subscriber_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `env_logger` filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Everything the converter reads from `settings.toml`.
///
/// ```rust,no_run
/// use audiobook_converter::config::AppConfig;
///
/// let mut config = AppConfig::load()?; // defaults on first run
/// config.synthesis.batch_width = 2;
/// config.save()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub synthesis: SynthesisConfig,
    pub assembly: AssemblyConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Read [`settings_file`]; defaults when it does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_file())
    }

    /// Read and validate `path`; defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()))
            }
        };
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid TOML in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        log::debug!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Write to [`settings_file`].
    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file())
    }

    /// Write `path` atomically (temp file in the same directory, then
    /// rename), creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;

        let content = toml::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }

    /// Reject values no job could run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.min_words == 0 || c.max_words == 0 {
            bail!("chunking.min_words and chunking.max_words must be at least 1");
        }
        if c.min_words > c.max_words {
            bail!(
                "chunking.min_words ({}) exceeds chunking.max_words ({})",
                c.min_words,
                c.max_words
            );
        }
        if c.max_total_chunks == 0 {
            bail!("chunking.max_total_chunks must be at least 1");
        }

        let s = &self.synthesis;
        if s.batch_width == 0 {
            bail!("synthesis.batch_width must be at least 1");
        }
        if s.max_attempts == 0 {
            bail!("synthesis.max_attempts must be at least 1");
        }
        match s.engine {
            EngineKind::Command if s.command.program.trim().is_empty() => {
                bail!("synthesis.command.program is empty")
            }
            EngineKind::Http if s.http.base_url.trim().is_empty() => {
                bail!("synthesis.http.base_url is empty")
            }
            _ => {}
        }

        if self.assembly.encoder_program.trim().is_empty() {
            bail!("assembly.encoder_program is empty");
        }
        if self.events.subscriber_buffer == 0 {
            bail!("events.subscriber_buffer must be at least 1");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saved_defaults_load_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        AppConfig::default().save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[chunking]\nmin_words = 50\nmax_words = 10\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("min_words"), "{err:#}");
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[synthesis\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn validate_checks_the_selected_backend() {
        let mut cfg = AppConfig::default();
        cfg.synthesis.engine = EngineKind::Http;
        cfg.synthesis.command.program.clear();
        assert!(cfg.validate().is_ok());

        cfg.synthesis.http.base_url = " ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.synthesis.batch_width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.chunking.min_words, 15);
        assert_eq!(cfg.chunking.max_words, 40);
        assert_eq!(cfg.synthesis.engine, EngineKind::Command);
        assert_eq!(cfg.synthesis.sample_rate, 24_000);
        assert_eq!(cfg.synthesis.batch_width, 1);
        assert_eq!(cfg.synthesis.max_attempts, 3);
        assert_eq!(cfg.assembly.encoder_program, "ffmpeg");
        assert!(!cfg.assembly.keep_artifacts);
        assert_eq!(cfg.events.subscriber_buffer, 256);
        assert_eq!(cfg.logging.level, "info");
    }

    /// A partial file only overrides what it names.
    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[synthesis]\nengine = \"http\"\nbatch_width = 4\n\n[assembly]\nkeep_artifacts = true\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.synthesis.engine, EngineKind::Http);
        assert_eq!(cfg.synthesis.batch_width, 4);
        assert_eq!(cfg.synthesis.max_attempts, 3);
        assert!(cfg.assembly.keep_artifacts);
        assert_eq!(cfg.chunking, ChunkingConfig::default());
    }

    #[test]
    fn overrides_survive_a_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.chunking.max_words = 60;
        cfg.synthesis.http.api_key = Some("sk-test".into());
        cfg.synthesis.command.args = vec!["-v".into(), "{voice}".into()];
        cfg.assembly.bitrate = "96k".into();

        cfg.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();

        assert_eq!(loaded.chunking.max_words, 60);
        assert_eq!(loaded.synthesis.http.api_key, Some("sk-test".into()));
        assert_eq!(loaded.synthesis.command.args, vec!["-v", "{voice}"]);
        assert_eq!(loaded.assembly.bitrate, "96k");
    }
}
