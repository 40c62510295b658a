//! Audiobook converter: turns a chaptered book into one chaptered audio
//! file through an external speech-synthesis engine.
//!
//! Conversions are resumable (a durable progress record per output
//! directory), pausable and cancellable at chunk boundaries, and end with an
//! ordered, integrity-checked assembly step.
//!
//! Start at [`pipeline::Converter`].

pub mod assembly;
pub mod audio;
pub mod chunk;
pub mod config;
pub mod document;
pub mod events;
pub mod pipeline;
pub mod progress;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;
