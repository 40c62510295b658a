//! Final assembly: ordered chunk artifacts → one chaptered container.
//!
//! Steps, in order:
//!
//! 1. refuse if the destination already exists,
//! 2. concatenate artifacts by chunk index with chapter-transition silence,
//! 3. write the FFMETADATA chapter file,
//! 4. run the encoder once into a `.partial` path,
//! 5. verify the partial output is non-empty and as long as the combined
//!    audio, re-check the destination and rename into place,
//! 6. write the JSON manifest sidecar.
//!
//! Chunk artifacts are never touched here; on any failure they stay on disk
//! so assembly can be retried without re-synthesising.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::assembly::concat::{concatenate, ChapterArtifacts};
use crate::assembly::encoder::{build_ffmpeg_invocation, Encoder, EncoderMetadata, FfmpegEncoder};
use crate::assembly::manifest::{manifest_path_for, AssemblyManifest, ManifestChapter};
use crate::assembly::sanitize::sanitize_metadata;
use crate::audio::{duration_ms, AudioError};
use crate::chunk::PlannedChapter;
use crate::config::AssemblyConfig;

/// File names used inside the job's working directory.
pub const COMBINED_WAV_NAME: &str = "combined.wav";
pub const CHAPTER_FILE_NAME: &str = "chapters.ffmeta";

/// Allowed gap between the encoded and the combined duration, at least this
/// many milliseconds or 1% of the book.
const DURATION_TOLERANCE_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// AssemblyError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The destination exists; it is never overwritten.
    #[error("output already exists: {0}")]
    OutputExists(PathBuf),

    #[error("artifact for chunk {index} is missing: {path}")]
    MissingArtifact { index: usize, path: PathBuf },

    #[error("chunk {index} has sample rate {found} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("artifact count {artifacts} does not match planned chunk count {planned}")]
    PlanMismatch { artifacts: usize, planned: usize },

    #[error("combined audio needs {bytes} bytes of PCM, over the {limit}-byte WAV limit")]
    TooLong { bytes: u64, limit: u64 },

    #[error("nothing to assemble")]
    NoArtifacts,

    #[error("encoder failed: {0}")]
    EncoderFailed(String),

    #[error("output verification failed: {0}")]
    Verification(String),

    #[error("invalid artifact audio: {0}")]
    Audio(String),

    #[error("assembly I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AssemblyError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => AssemblyError::Io(io),
            other => AssemblyError::Audio(other.to_string()),
        }
    }
}

impl From<AudioError> for AssemblyError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Io(io) => AssemblyError::Io(io),
            AudioError::Wav(w) => w.into(),
            other => AssemblyError::Audio(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Everything one assembly run needs.
#[derive(Debug, Clone)]
pub struct AssemblyInput<'a> {
    pub title: &'a str,
    pub author: &'a str,
    /// Planned chapters in selection order; their chunk ranges cover
    /// `artifacts` exactly.
    pub chapters: &'a [PlannedChapter],
    /// Artifact path for each chunk, indexed by chunk index.
    pub artifacts: &'a [PathBuf],
    /// Private directory for intermediate files.
    pub work_dir: &'a Path,
    /// Cover image to attach; skipped with a warning when it is not a file.
    pub cover_image: Option<&'a Path>,
    /// Final destination.
    pub output_path: &'a Path,
}

/// A produced artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutput {
    pub output_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: AssemblyManifest,
}

// ---------------------------------------------------------------------------
// AssemblyEngine
// ---------------------------------------------------------------------------

/// Produces the final container from completed chunk artifacts.
pub struct AssemblyEngine {
    config: AssemblyConfig,
    encoder: Arc<dyn Encoder>,
}

impl AssemblyEngine {
    pub fn new(config: AssemblyConfig, encoder: Arc<dyn Encoder>) -> Self {
        Self { config, encoder }
    }

    /// Engine using [`FfmpegEncoder`].
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(config.clone(), Arc::new(FfmpegEncoder::from_config(config)))
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Run the full assembly. Blocking.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssemblyOutput, AssemblyError> {
        let output = input.output_path;
        ensure_absent(output)?;

        let planned: usize = input.chapters.iter().map(|c| c.chunk_count).sum();
        if planned != input.artifacts.len() {
            return Err(AssemblyError::PlanMismatch {
                artifacts: input.artifacts.len(),
                planned,
            });
        }

        let title = sanitize_metadata(input.title);
        let author = sanitize_metadata(input.author);

        let grouped = input
            .chapters
            .iter()
            .map(|ch| {
                let artifacts = (ch.first_chunk..ch.first_chunk + ch.chunk_count)
                    .map(|i| {
                        input
                            .artifacts
                            .get(i)
                            .map(|p| (i, p.clone()))
                            .ok_or(AssemblyError::PlanMismatch {
                                artifacts: input.artifacts.len(),
                                planned,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ChapterArtifacts {
                    title: sanitize_metadata(&ch.title),
                    artifacts,
                })
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;

        std::fs::create_dir_all(input.work_dir)?;
        let combined = input.work_dir.join(COMBINED_WAV_NAME);
        let concat = concatenate(&grouped, self.config.chapter_silence_ms, &combined)?;

        let manifest = AssemblyManifest {
            title: title.clone(),
            author: author.clone(),
            duration_ms: duration_ms(concat.sample_rate, concat.total_samples as usize),
            chapters: concat
                .spans
                .iter()
                .map(|s| ManifestChapter {
                    title: s.title.clone(),
                    start_ms: s.start_ms(concat.sample_rate),
                    end_ms: s.end_ms(concat.sample_rate),
                })
                .collect(),
        };
        let chapter_file = input.work_dir.join(CHAPTER_FILE_NAME);
        manifest.write_ffmetadata(&chapter_file)?;

        let cover = input.cover_image.and_then(|p| {
            if p.is_file() {
                Some(p.to_path_buf())
            } else {
                log::warn!("assembly: cover image {} not found; skipping it", p.display());
                None
            }
        });

        let partial = partial_path_for(output);
        remove_if_present(&partial)?;
        let invocation = build_ffmpeg_invocation(
            &self.config,
            combined,
            chapter_file,
            cover,
            partial.clone(),
            &EncoderMetadata {
                title: &title,
                author: &author,
            },
        );
        self.encoder.encode(&invocation)?;

        let size = std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = std::fs::remove_file(&partial);
            return Err(AssemblyError::Verification(format!(
                "encoder produced no output at {}",
                partial.display()
            )));
        }
        if let Some(encoded) = self.encoder.encoded_duration_ms(&partial) {
            let expected = manifest.duration_ms;
            let tolerance = (expected / 100).max(DURATION_TOLERANCE_MS);
            if encoded.abs_diff(expected) > tolerance {
                let _ = std::fs::remove_file(&partial);
                return Err(AssemblyError::Verification(format!(
                    "encoded audio lasts {encoded} ms, expected {expected} ms"
                )));
            }
        }

        if let Err(e) = ensure_absent(output) {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
        std::fs::rename(&partial, output)?;

        let manifest_path = manifest_path_for(output);
        manifest.write_json(&manifest_path)?;

        log::info!(
            "assembly: wrote {} ({} chapters, {} ms)",
            output.display(),
            manifest.chapters.len(),
            manifest.duration_ms
        );

        Ok(AssemblyOutput {
            output_path: output.to_path_buf(),
            manifest_path,
            manifest,
        })
    }
}

/// `<stem>.partial.<ext>` next to `output`.
pub fn partial_path_for(output: &Path) -> PathBuf {
    let mut name: OsString = output
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".partial");
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

fn ensure_absent(path: &Path) -> Result<(), AssemblyError> {
    // symlink_metadata so a dangling symlink also counts as a conflict
    if std::fs::symlink_metadata(path).is_ok() {
        Err(AssemblyError::OutputExists(path.to_path_buf()))
    } else {
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{write_wav, AudioSamples};
    use crate::testing::RecordingEncoder;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        chapters: Vec<PlannedChapter>,
        artifacts: Vec<PathBuf>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let work = root.join(".work");
        std::fs::create_dir_all(&work).unwrap();

        let artifacts: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = work.join(format!("chunk_{i:05}.wav"));
                write_wav(&p, &AudioSamples::new(vec![0.25; 1_000], 1_000)).unwrap();
                p
            })
            .collect();
        let chapters = vec![
            PlannedChapter {
                order: 0,
                title: "One\u{2028}\"Begins\"".into(),
                first_chunk: 0,
                chunk_count: 2,
            },
            PlannedChapter {
                order: 1,
                title: "Two".into(),
                first_chunk: 2,
                chunk_count: 1,
            },
        ];
        Fixture {
            _dir: dir,
            root,
            chapters,
            artifacts,
        }
    }

    fn config() -> AssemblyConfig {
        AssemblyConfig {
            chapter_silence_ms: 500,
            ..AssemblyConfig::default()
        }
    }

    #[test]
    fn assembles_and_writes_manifest() {
        let f = fixture();
        let encoder = Arc::new(RecordingEncoder::default());
        let engine = AssemblyEngine::new(config(), encoder.clone());
        let output = f.root.join("Book.m4b");

        let out = engine
            .assemble(&AssemblyInput {
                title: "Bo\u{0007}ok",
                author: "A \"Writer\"",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &output,
            })
            .unwrap();

        assert!(output.is_file());
        assert_eq!(out.manifest_path, f.root.join("Book.m4b.chapters.json"));
        assert_eq!(out.manifest.title, "Book");
        assert_eq!(out.manifest.author, "A Writer");
        assert_eq!(
            out.manifest.chapters,
            vec![
                ManifestChapter {
                    title: "One Begins".into(),
                    start_ms: 0,
                    end_ms: 2_500,
                },
                ManifestChapter {
                    title: "Two".into(),
                    start_ms: 2_500,
                    end_ms: 3_500,
                },
            ]
        );
        assert_eq!(out.manifest.duration_ms, 3_500);

        let calls = encoder.invocations();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.contains(&OsString::from("title=Book")));
        assert!(calls[0].args.contains(&OsString::from("artist=A Writer")));
        assert!(!f.root.join("Book.partial.m4b").exists());

        let meta = std::fs::read_to_string(f.root.join(".work").join(CHAPTER_FILE_NAME)).unwrap();
        assert!(meta.contains("title=One Begins\n"));
    }

    #[test]
    fn existing_output_is_a_conflict() {
        let f = fixture();
        let encoder = Arc::new(RecordingEncoder::default());
        let engine = AssemblyEngine::new(config(), encoder.clone());
        let output = f.root.join("Book.m4b");
        std::fs::write(&output, b"keep me").unwrap();

        let err = engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &output,
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::OutputExists(_)));
        assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
        assert!(encoder.invocations().is_empty());
    }

    #[test]
    fn encoder_failure_keeps_artifacts() {
        let f = fixture();
        let engine = AssemblyEngine::new(config(), Arc::new(RecordingEncoder::failing()));
        let output = f.root.join("Book.m4b");

        let err = engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &output,
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::EncoderFailed(_)));
        assert!(!output.exists());
        assert!(f.artifacts.iter().all(|p| p.is_file()));
    }

    #[test]
    fn empty_encoder_output_fails_verification() {
        let f = fixture();
        let engine = AssemblyEngine::new(config(), Arc::new(RecordingEncoder::empty_output()));
        let output = f.root.join("Book.m4b");

        let err = engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &output,
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Verification(_)));
        assert!(!output.exists());
    }

    #[test]
    fn artifact_count_must_match_plan() {
        let f = fixture();
        let engine = AssemblyEngine::new(config(), Arc::new(RecordingEncoder::default()));
        let err = engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts[..2],
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &f.root.join("Book.m4b"),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::PlanMismatch {
                artifacts: 2,
                planned: 3
            }
        ));
    }

    #[test]
    fn cover_image_reaches_the_encoder() {
        let f = fixture();
        let cover = f.root.join("cover.jpg");
        std::fs::write(&cover, b"\xff\xd8\xff").unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let engine = AssemblyEngine::new(config(), encoder.clone());

        engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: Some(&cover),
                output_path: &f.root.join("Book.m4b"),
            })
            .unwrap();
        assert_eq!(encoder.invocations()[0].cover_image.as_deref(), Some(cover.as_path()));
    }

    #[test]
    fn missing_cover_image_is_skipped() {
        let f = fixture();
        let encoder = Arc::new(RecordingEncoder::default());
        let engine = AssemblyEngine::new(config(), encoder.clone());

        engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: Some(&f.root.join("no-cover.png")),
                output_path: &f.root.join("Book.m4b"),
            })
            .unwrap();
        assert_eq!(encoder.invocations()[0].cover_image, None);
    }

    #[test]
    fn truncated_encoding_fails_verification() {
        let f = fixture();
        let engine = AssemblyEngine::new(config(), Arc::new(RecordingEncoder::truncating()));
        let output = f.root.join("Book.m4b");

        let err = engine
            .assemble(&AssemblyInput {
                title: "Book",
                author: "A",
                chapters: &f.chapters,
                artifacts: &f.artifacts,
                work_dir: &f.root.join(".work"),
                cover_image: None,
                output_path: &output,
            })
            .unwrap_err();
        match err {
            AssemblyError::Verification(msg) => assert!(msg.contains("expected 3500 ms"), "{msg}"),
            other => panic!("expected verification failure, got {other:?}"),
        }
        assert!(!output.exists());
        assert!(!f.root.join("Book.partial.m4b").exists());
        assert!(f.artifacts.iter().all(|p| p.is_file()));
    }

    #[test]
    fn partial_path_keeps_extension() {
        assert_eq!(
            partial_path_for(Path::new("/o/Book.m4b")),
            Path::new("/o/Book.partial.m4b")
        );
        assert_eq!(partial_path_for(Path::new("/o/Book")), Path::new("/o/Book.partial"));
    }
}
