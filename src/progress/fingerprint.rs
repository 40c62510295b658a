//! Job identity.
//!
//! A [`Fingerprint`] is a SHA-256 digest over everything that changes what
//! audio a job would produce: the document text, the chapter selection, the
//! voice, the engine and the chunking parameters. Two runs may share progress
//! only when their fingerprints are equal.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;

/// Hex-encoded SHA-256 job identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

/// Everything a fingerprint is derived from.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    /// [`SourceDocument::content_hash`](crate::document::SourceDocument::content_hash).
    pub content_hash: &'a str,
    /// Chapter orders in selection order.
    pub selected_chapters: &'a [usize],
    pub voice_id: &'a str,
    pub voice_description: &'a str,
    /// [`SynthesisEngine::identity`](crate::synth::SynthesisEngine::identity).
    pub engine_identity: &'a str,
    pub chunking: &'a ChunkingConfig,
}

impl Fingerprint {
    pub fn compute(input: &FingerprintInput<'_>) -> Self {
        let mut hasher = Sha256::new();
        field(&mut hasher, "content", input.content_hash.as_bytes());

        let selection = input
            .selected_chapters
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(",");
        field(&mut hasher, "selection", selection.as_bytes());

        field(&mut hasher, "voice.id", input.voice_id.as_bytes());
        field(&mut hasher, "voice.description", input.voice_description.as_bytes());
        field(&mut hasher, "engine", input.engine_identity.as_bytes());

        let c = input.chunking;
        let chunking = format!(
            "{}/{}/{}/{}",
            c.min_words, c.max_words, c.max_total_chunks, c.normalize_text
        );
        field(&mut hasher, "chunking", chunking.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-computed hex digest (e.g. read from disk).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// True for a 64-digit lowercase hex digest, the only form
    /// [`compute`](Self::compute) produces.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex digits, used for directory names and log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(16);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Labelled, length-prefixed so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, label: &str, value: &[u8]) {
    hasher.update(label.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        selection: &'a [usize],
        voice: &'a str,
        chunking: &'a ChunkingConfig,
    ) -> FingerprintInput<'a> {
        FingerprintInput {
            content_hash: "abc",
            selected_chapters: selection,
            voice_id: voice,
            voice_description: "warm",
            engine_identity: "command:piper",
            chunking,
        }
    }

    #[test]
    fn identical_inputs_match() {
        let c = ChunkingConfig::default();
        let a = Fingerprint::compute(&input(&[0, 1], "v", &c));
        let b = Fingerprint::compute(&input(&[0, 1], "v", &c));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 16);
    }

    #[test]
    fn voice_and_selection_change_identity() {
        let c = ChunkingConfig::default();
        let base = Fingerprint::compute(&input(&[0, 1], "v", &c));
        assert_ne!(base, Fingerprint::compute(&input(&[0, 1], "w", &c)));
        assert_ne!(base, Fingerprint::compute(&input(&[0], "v", &c)));
        assert_ne!(base, Fingerprint::compute(&input(&[1, 0], "v", &c)));
    }

    #[test]
    fn selection_encoding_is_unambiguous() {
        let c = ChunkingConfig::default();
        let a = Fingerprint::compute(&input(&[1, 12], "v", &c));
        let b = Fingerprint::compute(&input(&[11, 2], "v", &c));
        assert_ne!(a, b);
    }

    #[test]
    fn chunking_parameters_change_identity() {
        let c = ChunkingConfig::default();
        let mut d = ChunkingConfig::default();
        d.max_words += 1;
        assert_ne!(
            Fingerprint::compute(&input(&[0], "v", &c)),
            Fingerprint::compute(&input(&[0], "v", &d))
        );
    }

    #[test]
    fn only_computed_digests_are_well_formed() {
        let c = ChunkingConfig::default();
        assert!(Fingerprint::compute(&input(&[0], "v", &c)).is_well_formed());
        assert!(!Fingerprint::from_hex("aa").is_well_formed());
        assert!(!Fingerprint::from_hex(format!("../{}", "a".repeat(61))).is_well_formed());
        assert!(!Fingerprint::from_hex("A".repeat(64)).is_well_formed());
    }
}
