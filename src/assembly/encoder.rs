//! External container encoder.
//!
//! The encoder is always invoked with a discrete argument vector; no shell is
//! involved, so metadata values cannot be interpreted as syntax.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::assembly::engine::AssemblyError;
use crate::config::AssemblyConfig;

/// A fully-built encoder call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    /// Concatenated PCM input.
    pub input_wav: PathBuf,
    /// FFMETADATA chapter file.
    pub metadata_file: PathBuf,
    /// Image attached as the container's cover.
    pub cover_image: Option<PathBuf>,
    /// Where the encoder must write its output.
    pub output: PathBuf,
}

/// Runs an [`EncoderInvocation`]. Blocking.
pub trait Encoder: Send + Sync {
    fn encode(&self, invocation: &EncoderInvocation) -> Result<(), AssemblyError>;

    /// Duration of an encoded file in milliseconds, or `None` when it cannot
    /// be measured.
    fn encoded_duration_ms(&self, _output: &Path) -> Option<u64> {
        None
    }
}

// Compile-time assertion: Box<dyn Encoder> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Encoder>) {}
};

/// Metadata handed to the encoder. Values must already be sanitised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderMetadata<'a> {
    pub title: &'a str,
    pub author: &'a str,
}

/// Build the ffmpeg call that muxes `input_wav`, the chapter file and an
/// optional cover image into an AAC `.m4b` at `output`.
pub fn build_ffmpeg_invocation(
    config: &AssemblyConfig,
    input_wav: PathBuf,
    metadata_file: PathBuf,
    cover_image: Option<PathBuf>,
    output: PathBuf,
    metadata: &EncoderMetadata<'_>,
) -> EncoderInvocation {
    let mut args: Vec<OsString> = ["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input_wav.as_os_str().to_os_string());
    args.push(OsString::from("-i"));
    args.push(metadata_file.as_os_str().to_os_string());
    if let Some(cover) = &cover_image {
        args.push(OsString::from("-i"));
        args.push(cover.as_os_str().to_os_string());
    }
    args.push(OsString::from("-map"));
    args.push(OsString::from("0:a"));
    if cover_image.is_some() {
        // Input 2 becomes an attached picture, not a video stream.
        for a in ["-map", "2:v", "-c:v", "copy", "-disposition:v:0", "attached_pic"] {
            args.push(OsString::from(a));
        }
    }
    for a in [
        "-map_metadata",
        "1",
        "-map_chapters",
        "1",
        "-c:a",
        config.audio_codec.as_str(),
        "-b:a",
        config.bitrate.as_str(),
    ] {
        args.push(OsString::from(a));
    }
    for (key, value) in [
        ("title", metadata.title),
        ("artist", metadata.author),
        ("album", metadata.title),
    ] {
        args.push(OsString::from("-metadata"));
        args.push(OsString::from(format!("{key}={value}")));
    }
    args.push(OsString::from("-f"));
    args.push(OsString::from("mp4"));
    args.push(output.as_os_str().to_os_string());

    EncoderInvocation {
        program: config.encoder_program.clone(),
        args,
        input_wav,
        metadata_file,
        cover_image,
        output,
    }
}

/// Runs ffmpeg (or a compatible program) as a child process.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    /// ffprobe-compatible program for [`Encoder::encoded_duration_ms`];
    /// empty disables the duration check.
    pub inspect_program: String,
}

impl FfmpegEncoder {
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self {
            inspect_program: config.inspect_program.clone(),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, inv: &EncoderInvocation) -> Result<(), AssemblyError> {
        log::info!(
            "assembly: encoding {} -> {}",
            inv.input_wav.display(),
            inv.output.display()
        );
        let output = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| AssemblyError::EncoderFailed(format!("failed to start {}: {e}", inv.program)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AssemblyError::EncoderFailed(format!(
                "{} exited with {}: {}",
                inv.program,
                output.status,
                stderr.trim()
            )))
        }
    }

    fn encoded_duration_ms(&self, output: &Path) -> Option<u64> {
        if self.inspect_program.trim().is_empty() {
            return None;
        }
        let inspected = Command::new(&self.inspect_program)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(output)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match inspected {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                let parsed = parse_seconds(&text);
                if parsed.is_none() {
                    log::warn!(
                        "assembly: unreadable duration from {}: {:?}",
                        self.inspect_program,
                        text.trim()
                    );
                }
                parsed
            }
            Ok(out) => {
                log::warn!(
                    "assembly: {} exited with {}; duration not checked",
                    self.inspect_program,
                    out.status
                );
                None
            }
            Err(e) => {
                log::warn!(
                    "assembly: cannot run {}: {e}; duration not checked",
                    self.inspect_program
                );
                None
            }
        }
    }
}

/// ffprobe prints the duration in seconds, e.g. `3.500000`.
fn parse_seconds(text: &str) -> Option<u64> {
    let seconds: f64 = text.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0).round() as u64)
}
