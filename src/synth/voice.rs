//! Built-in voice presets and the voice identity passed to engines.

use serde::{Deserialize, Serialize};

use crate::synth::engine::SynthesisError;

// ---------------------------------------------------------------------------
// VoicePreset
// ---------------------------------------------------------------------------

/// Static metadata for a named narrator voice.
#[derive(Debug)]
pub struct VoicePreset {
    /// Identifier used on the command line and in `synthesis.default_voice`.
    pub id: &'static str,
    /// Short display label.
    pub label: &'static str,
    /// Natural-language description handed to description-driven engines.
    pub description: &'static str,
}

pub const VOICE_PRESETS: &[VoicePreset] = &[
    VoicePreset {
        id: "male_us_warm",
        label: "EN-US Neural (M)",
        description: "Male narrator voice in his 40s with an American accent. \
                      Warm baritone, calm pacing, clear diction, conversational delivery.",
    },
    VoicePreset {
        id: "female_us_clear",
        label: "EN-US Neural (F)",
        description: "Female narrator voice in her 30s with an American accent. \
                      Professional, clear articulation, warm and engaging tone.",
    },
    VoicePreset {
        id: "male_uk_classic",
        label: "EN-GB Standard",
        description: "Male narrator voice with a British accent in his 40s. \
                      Classic BBC style, authoritative and refined tone, measured pacing.",
    },
];

/// Look up a preset by its `id`.
pub fn find_voice(id: &str) -> Option<&'static VoicePreset> {
    VOICE_PRESETS.iter().find(|p| p.id == id)
}

// ---------------------------------------------------------------------------
// VoiceIdentity
// ---------------------------------------------------------------------------

/// The voice a job is synthesized with. Part of the job fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceIdentity {
    pub id: String,
    pub description: String,
}

impl VoiceIdentity {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    /// Resolve a preset id, failing with [`SynthesisError::UnknownVoice`].
    pub fn resolve(id: &str) -> Result<Self, SynthesisError> {
        find_voice(id)
            .map(Self::from)
            .ok_or_else(|| SynthesisError::UnknownVoice(id.to_string()))
    }
}

impl From<&VoicePreset> for VoiceIdentity {
    fn from(p: &VoicePreset) -> Self {
        Self::new(p.id, p.description)
    }
}
