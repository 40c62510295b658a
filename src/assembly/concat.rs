//! Ordered concatenation of chunk artifacts into one WAV.
//!
//! Artifacts are read strictly by chunk index. Silence is inserted only
//! where one chapter ends and the next begins, and each chapter's span is
//! recorded in samples.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::assembly::engine::AssemblyError;
use crate::audio::{duration_ms, read_pcm16};

/// Artifacts belonging to one chapter, in chunk order.
#[derive(Debug, Clone)]
pub struct ChapterArtifacts {
    pub title: String,
    /// `(chunk index, artifact path)` pairs in ascending index order.
    pub artifacts: Vec<(usize, PathBuf)>,
}

/// Where a chapter landed in the combined audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSpan {
    pub title: String,
    pub start_sample: u64,
    /// Exclusive; includes the silence that follows the chapter.
    pub end_sample: u64,
}

impl ChapterSpan {
    pub fn start_ms(&self, sample_rate: u32) -> u64 {
        duration_ms(sample_rate, self.start_sample as usize)
    }

    pub fn end_ms(&self, sample_rate: u32) -> u64 {
        duration_ms(sample_rate, self.end_sample as usize)
    }
}

/// Largest PCM payload a WAV header can describe. The RIFF size field is a
/// `u32` that also counts the 36 header bytes before the data.
pub const WAV_DATA_LIMIT: u64 = u32::MAX as u64 - 36;

/// Bytes per sample of the combined file (16-bit mono).
const BYTES_PER_SAMPLE: u64 = 2;

/// Result of [`concatenate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concatenated {
    pub sample_rate: u32,
    pub total_samples: u64,
    pub spans: Vec<ChapterSpan>,
}

/// Concatenate `chapters` into `output` (16-bit PCM mono).
///
/// Chapters with no artifacts are skipped. Every artifact must share the
/// first artifact's sample rate.
pub fn concatenate(
    chapters: &[ChapterArtifacts],
    silence_ms: u32,
    output: &Path,
) -> Result<Concatenated, AssemblyError> {
    concatenate_within(chapters, silence_ms, output, WAV_DATA_LIMIT)
}

/// [`concatenate`] with an explicit cap on the PCM payload.
///
/// The size is computed from the artifact headers before anything is
/// written; a book that would not fit fails with
/// [`AssemblyError::TooLong`] and `output` is not created.
pub fn concatenate_within(
    chapters: &[ChapterArtifacts],
    silence_ms: u32,
    output: &Path,
    max_data_bytes: u64,
) -> Result<Concatenated, AssemblyError> {
    let bytes = planned_samples(chapters, silence_ms)? * BYTES_PER_SAMPLE;
    if bytes > max_data_bytes {
        return Err(AssemblyError::TooLong {
            bytes,
            limit: max_data_bytes,
        });
    }

    let mut writer: Option<(hound::WavWriter<BufWriter<File>>, u32)> = None;
    let mut written: u64 = 0;
    let mut spans: Vec<ChapterSpan> = Vec::new();

    for chapter in chapters.iter().filter(|c| !c.artifacts.is_empty()) {
        if let (Some((w, rate)), Some(prev)) = (writer.as_mut(), spans.last_mut()) {
            let silence = (*rate as u64 * silence_ms as u64) / 1000;
            for _ in 0..silence {
                w.write_sample(0i16)?;
            }
            written += silence;
            prev.end_sample = written;
        }

        let start = written;
        for (index, path) in &chapter.artifacts {
            if !path.is_file() {
                return Err(AssemblyError::MissingArtifact {
                    index: *index,
                    path: path.clone(),
                });
            }
            let (rate, samples) = read_pcm16(path)?;

            if writer.is_none() {
                let spec = hound::WavSpec {
                    channels: 1,
                    sample_rate: rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                writer = Some((hound::WavWriter::create(output, spec)?, rate));
            }
            if let Some((w, expected)) = writer.as_mut() {
                if rate != *expected {
                    return Err(AssemblyError::SampleRateMismatch {
                        index: *index,
                        expected: *expected,
                        found: rate,
                    });
                }
                for s in &samples {
                    w.write_sample(*s)?;
                }
                written += samples.len() as u64;
            }
        }

        spans.push(ChapterSpan {
            title: chapter.title.clone(),
            start_sample: start,
            end_sample: written,
        });
    }

    let (w, sample_rate) = writer.ok_or(AssemblyError::NoArtifacts)?;
    w.finalize()?;

    Ok(Concatenated {
        sample_rate,
        total_samples: written,
        spans,
    })
}

/// Samples the combined file will hold, read from the artifact headers.
fn planned_samples(chapters: &[ChapterArtifacts], silence_ms: u32) -> Result<u64, AssemblyError> {
    let mut total: u64 = 0;
    let mut first_rate: Option<u32> = None;
    let mut transitions: u64 = 0;

    for chapter in chapters.iter().filter(|c| !c.artifacts.is_empty()) {
        if first_rate.is_some() {
            transitions += 1;
        }
        for (index, path) in &chapter.artifacts {
            if !path.is_file() {
                return Err(AssemblyError::MissingArtifact {
                    index: *index,
                    path: path.clone(),
                });
            }
            let reader = hound::WavReader::open(path)?;
            first_rate.get_or_insert(reader.spec().sample_rate);
            total += u64::from(reader.duration());
        }
    }

    let silence = first_rate.map_or(0, |rate| u64::from(rate) * u64::from(silence_ms) / 1000);
    Ok(total + silence * transitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{write_wav, AudioSamples};
    use tempfile::tempdir;

    fn artifact(dir: &Path, index: usize, value: f32, len: usize, rate: u32) -> (usize, PathBuf) {
        let path = dir.join(format!("chunk_{index:05}.wav"));
        write_wav(&path, &AudioSamples::new(vec![value; len], rate)).unwrap();
        (index, path)
    }

    #[test]
    fn silence_only_between_chapters() {
        let dir = tempdir().unwrap();
        let d = dir.path();
        let chapters = vec![
            ChapterArtifacts {
                title: "One".into(),
                artifacts: vec![artifact(d, 0, 0.5, 100, 1_000), artifact(d, 1, 0.5, 100, 1_000)],
            },
            ChapterArtifacts {
                title: "Empty".into(),
                artifacts: vec![],
            },
            ChapterArtifacts {
                title: "Two".into(),
                artifacts: vec![artifact(d, 2, -0.5, 50, 1_000)],
            },
        ];
        let out = d.join("combined.wav");
        let result = concatenate(&chapters, 100, &out).unwrap();

        assert_eq!(result.sample_rate, 1_000);
        assert_eq!(result.total_samples, 100 + 100 + 100 + 50);
        assert_eq!(
            result.spans,
            vec![
                ChapterSpan {
                    title: "One".into(),
                    start_sample: 0,
                    end_sample: 300,
                },
                ChapterSpan {
                    title: "Two".into(),
                    start_sample: 300,
                    end_sample: 350,
                },
            ]
        );

        let (_, pcm) = read_pcm16(&out).unwrap();
        assert_eq!(pcm.len(), 350);
        assert!(pcm[..200].iter().all(|&s| s > 0));
        assert!(pcm[200..300].iter().all(|&s| s == 0));
        assert!(pcm[300..].iter().all(|&s| s < 0));
        assert_eq!(result.spans[1].start_ms(1_000), 300);
    }

    #[test]
    fn sample_rate_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let d = dir.path();
        let chapters = vec![ChapterArtifacts {
            title: "One".into(),
            artifacts: vec![artifact(d, 0, 0.1, 10, 8_000), artifact(d, 1, 0.1, 10, 16_000)],
        }];
        let err = concatenate(&chapters, 0, &d.join("c.wav")).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::SampleRateMismatch {
                index: 1,
                expected: 8_000,
                found: 16_000
            }
        ));
    }

    #[test]
    fn missing_artifact_names_its_index() {
        let dir = tempdir().unwrap();
        let chapters = vec![ChapterArtifacts {
            title: "One".into(),
            artifacts: vec![(4, dir.path().join("nope.wav"))],
        }];
        let err = concatenate(&chapters, 0, &dir.path().join("c.wav")).unwrap_err();
        assert!(matches!(err, AssemblyError::MissingArtifact { index: 4, .. }));
    }

    #[test]
    fn size_is_checked_before_writing() {
        let dir = tempdir().unwrap();
        let d = dir.path();
        let chapters = vec![
            ChapterArtifacts {
                title: "One".into(),
                artifacts: vec![artifact(d, 0, 0.5, 100, 1_000)],
            },
            ChapterArtifacts {
                title: "Two".into(),
                artifacts: vec![artifact(d, 1, 0.5, 100, 1_000)],
            },
        ];
        // 100 + 50 silence + 100 samples, two bytes each.
        let out = d.join("combined.wav");
        let err = concatenate_within(&chapters, 50, &out, 499).unwrap_err();
        assert!(matches!(err, AssemblyError::TooLong { bytes: 500, limit: 499 }));
        assert!(!out.exists());

        let ok = concatenate_within(&chapters, 50, &out, 500).unwrap();
        assert_eq!(ok.total_samples, 250);
    }

    #[test]
    fn nothing_to_concatenate() {
        let dir = tempdir().unwrap();
        let err = concatenate(&[], 0, &dir.path().join("c.wav")).unwrap_err();
        assert!(matches!(err, AssemblyError::NoArtifacts));
    }
}
