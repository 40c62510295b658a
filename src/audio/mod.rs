//! Audio artifacts: chunk WAV files on disk.
//!
//! # Format
//!
//! ```text
//! synthesis backend (any WAV) → decode → AudioSamples (mono f32)
//!                             → write_wav → chunk_<index:05>.wav (PCM16 mono)
//!                             → read_pcm16 → assembly
//! ```

pub mod wav;

pub use wav::{
    decode_wav_bytes, duration_ms, f32_to_pcm16, read_pcm16, read_wav, write_wav, AudioError,
    AudioSamples,
};
