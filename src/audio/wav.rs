//! WAV encode/decode for chunk artifacts.
//!
//! Artifacts are always written as 16-bit PCM mono. Decoding accepts
//! whatever a synthesis backend produces (8/16/24/32-bit int or 32-bit
//! float, any channel count) and folds it to mono `f32`.

use std::io::{Cursor, Read};
use std::path::Path;

use thiserror::Error;

/// Errors from artifact I/O.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("sample rate must be > 0")]
    ZeroSampleRate,

    #[error("audio contains no samples")]
    Empty,
}

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    /// Samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSamples {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        duration_ms(self.sample_rate, self.samples.len())
    }
}

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write `audio` to `path` as 16-bit PCM mono.
pub fn write_wav(path: &Path, audio: &AudioSamples) -> Result<(), AudioError> {
    if audio.sample_rate == 0 {
        return Err(AudioError::ZeroSampleRate);
    }
    let mut writer = hound::WavWriter::create(path, pcm16_spec(audio.sample_rate))?;
    for s in f32_to_pcm16(&audio.samples) {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a 16-bit artifact back as raw PCM without any conversion.
pub fn read_pcm16(path: &Path) -> Result<(u32, Vec<i16>), AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = if spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16 {
        reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?
    } else {
        let decoded = decode(reader)?;
        f32_to_pcm16(&decoded.samples)
    };
    Ok((spec.sample_rate, samples))
}

/// Decode an in-memory WAV file (e.g. an HTTP response body).
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioSamples, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    decode(reader)
}

/// Decode a WAV file on disk.
pub fn read_wav(path: &Path) -> Result<AudioSamples, AudioError> {
    let reader = hound::WavReader::open(path)?;
    decode(reader)
}

fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<AudioSamples, AudioError> {
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AudioError::ZeroSampleRate);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioSamples::new(samples, spec.sample_rate))
}

/// Convert `[-1.0, 1.0]` floats to 16-bit PCM, clamping out-of-range input.
pub fn f32_to_pcm16(pcm_f32: &[f32]) -> Vec<i16> {
    pcm_f32
        .iter()
        .map(|&x| {
            let x = x.clamp(-1.0, 1.0);
            if x >= 0.0 {
                (x * 32767.0).round() as i16
            } else {
                (x * 32768.0).round() as i16
            }
        })
        .collect()
}

/// Duration of `samples` at `sample_rate`, in milliseconds.
pub fn duration_ms(sample_rate: u32, samples: usize) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((samples as u128) * 1000u128 / (sample_rate as u128)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_keeps_pcm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let audio = AudioSamples::new(vec![0.0, 0.5, -0.5, 1.0, -1.0], 24_000);
        write_wav(&path, &audio).unwrap();

        let (rate, pcm) = read_pcm16(&path).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(pcm, f32_to_pcm16(&audio.samples));

        let back = read_wav(&path).unwrap();
        assert_eq!(back.sample_rate, 24_000);
        assert_eq!(back.samples.len(), 5);
        assert!((back.samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut buf = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut buf, spec).unwrap();
            for s in [0.2f32, 0.4, -1.0, 1.0] {
                w.write_sample(s).unwrap();
            }
            w.finalize().unwrap();
        }
        let audio = decode_wav_bytes(&buf.into_inner()).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.samples.len(), 2);
        assert!((audio.samples[0] - 0.3).abs() < 1e-6);
        assert!(audio.samples[1].abs() < 1e-6);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            decode_wav_bytes(b"not a wav"),
            Err(AudioError::Wav(_))
        ));
    }

    #[test]
    fn zero_rate_is_rejected_on_write() {
        let dir = tempdir().unwrap();
        let audio = AudioSamples::new(vec![0.0], 0);
        assert!(matches!(
            write_wav(&dir.path().join("x.wav"), &audio),
            Err(AudioError::ZeroSampleRate)
        ));
    }

    #[test]
    fn f32_to_pcm16_clamps() {
        let pcm = f32_to_pcm16(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(pcm, [-32768, -32768, 0, 32767, 32767]);
    }

    #[test]
    fn duration_math() {
        assert_eq!(duration_ms(24_000, 24_000), 1_000);
        assert_eq!(duration_ms(24_000, 12), 0);
        assert_eq!(duration_ms(0, 100), 0);
    }
}
