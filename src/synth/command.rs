//! Synthesis through an external text-to-speech program.
//!
//! The program is run once per chunk with a fixed argument list built from
//! [`CommandEngineConfig::args`]. Placeholders are substituted per argument,
//! never through a shell:
//!
//! | Placeholder    | Value                                   |
//! |----------------|-----------------------------------------|
//! | `{text_file}`  | temp file holding the chunk text (UTF-8) |
//! | `{output}`     | WAV path the program must write         |
//! | `{voice}`      | voice preset id                         |
//! | `{voice_description}` | natural-language voice description |

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::audio::read_wav;
use crate::audio::AudioSamples;
use crate::config::CommandEngineConfig;
use crate::synth::engine::{SynthesisEngine, SynthesisError};
use crate::synth::voice::VoiceIdentity;

/// Runs a local TTS program per chunk.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: CommandEngineConfig,
}

impl CommandEngine {
    pub fn from_config(config: &CommandEngineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Argument list for one invocation.
    pub fn build_args(
        &self,
        text_file: &Path,
        output: &Path,
        voice: &VoiceIdentity,
    ) -> Vec<OsString> {
        self.config
            .args
            .iter()
            .map(|arg| match arg.as_str() {
                "{text_file}" => text_file.as_os_str().to_os_string(),
                "{output}" => output.as_os_str().to_os_string(),
                _ => OsString::from(
                    arg.replace("{voice_description}", &voice.description)
                        .replace("{voice}", &voice.id),
                ),
            })
            .collect()
    }
}

impl SynthesisEngine for CommandEngine {
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceIdentity,
    ) -> Result<AudioSamples, SynthesisError> {
        let scratch = tempfile::tempdir()?;
        let text_file = scratch.path().join("chunk.txt");
        let output = scratch.path().join("chunk.wav");
        std::fs::write(&text_file, text)?;

        let args = self.build_args(&text_file, &output, voice);
        log::debug!("synth: running {} ({} args)", self.config.program, args.len());

        let result = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                SynthesisError::Engine(format!("failed to start {}: {e}", self.config.program))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SynthesisError::Engine(format!(
                "{} exited with {}: {}",
                self.config.program,
                result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(SynthesisError::Engine(format!(
                "{} did not write {}",
                self.config.program,
                output.display()
            )));
        }

        let audio = read_wav(&output)?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio)
    }

    fn identity(&self) -> String {
        format!("command:{} {}", self.config.program, self.config.args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &str, args: &[&str]) -> CommandEngine {
        CommandEngine::from_config(&CommandEngineConfig {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn placeholders_are_substituted_per_argument() {
        let e = engine(
            "tts",
            &["--in", "{text_file}", "--out", "{output}", "--voice={voice}"],
        );
        let voice = VoiceIdentity::new("v1", "calm");
        let args = e.build_args(Path::new("/t/in.txt"), Path::new("/t/out.wav"), &voice);
        assert_eq!(
            args,
            ["--in", "/t/in.txt", "--out", "/t/out.wav", "--voice=v1"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn description_placeholder_is_one_argument() {
        let e = engine("tts", &["--describe", "{voice_description}"]);
        let voice = VoiceIdentity::new("v", "a; rm -rf / \"quoted\"");
        let args = e.build_args(Path::new("a"), Path::new("b"), &voice);
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], OsString::from("a; rm -rf / \"quoted\""));
    }

    #[test]
    fn identity_covers_program_and_args() {
        let a = engine("piper", &["--model", "{voice}"]);
        let b = engine("piper", &["--model", "x"]);
        assert_ne!(a.identity(), b.identity());
        assert!(a.identity().starts_with("command:piper"));
    }

    #[test]
    fn missing_program_is_an_engine_error() {
        let e = engine("definitely-not-a-real-tts-binary-4821", &[]);
        let err = e
            .synthesize("Hello.", &VoiceIdentity::new("v", ""))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Engine(_)));
    }

    #[cfg(unix)]
    #[test]
    fn program_that_writes_nothing_fails() {
        let e = engine("true", &[]);
        let err = e
            .synthesize("Hello.", &VoiceIdentity::new("v", ""))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Engine(_)));
    }
}
