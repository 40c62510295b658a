//! Ordered, integrity-checked audio assembly.
//!
//! ```text
//! chunk_00000.wav … chunk_NNNNN.wav
//!        │  concatenate by index, silence between chapters
//!        ▼
//! combined.wav + chapters.ffmeta ──encoder (argv, no shell)──▶ <title>.partial.m4b
//!        │  verify non-empty, re-check destination, rename
//!        ▼
//! <title>.m4b + <title>.m4b.chapters.json
//! ```

pub mod concat;
pub mod encoder;
pub mod engine;
pub mod manifest;
pub mod sanitize;

pub use concat::{
    concatenate, concatenate_within, ChapterArtifacts, ChapterSpan, Concatenated, WAV_DATA_LIMIT,
};
pub use encoder::{
    build_ffmpeg_invocation, Encoder, EncoderInvocation, EncoderMetadata, FfmpegEncoder,
};
pub use engine::{
    partial_path_for, AssemblyEngine, AssemblyError, AssemblyInput, AssemblyOutput,
    CHAPTER_FILE_NAME, COMBINED_WAV_NAME,
};
pub use manifest::{escape_ffmetadata, manifest_path_for, AssemblyManifest, ManifestChapter};
pub use sanitize::{file_safe_name, sanitize_metadata};
