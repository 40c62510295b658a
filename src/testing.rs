//! Test doubles shared by unit tests across modules.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::assembly::{AssemblyError, Encoder, EncoderInvocation};
use crate::audio::{duration_ms, read_pcm16, write_wav, AudioSamples};
use crate::synth::{SynthesisEngine, SynthesisError, VoiceIdentity};

/// Sample rate of every [`ScriptedEngine`] result.
pub const SCRIPTED_RATE: u32 = 8_000;

type Hook = Box<dyn Fn(&str) + Send + Sync>;

// ---------------------------------------------------------------------------
// ScriptedEngine
// ---------------------------------------------------------------------------

/// Deterministic engine whose behaviour is scripted per chunk text.
///
/// Successful calls return `samples` copies of a level derived from the
/// text, so identical text always yields identical audio.
pub struct ScriptedEngine {
    samples: usize,
    failures: Mutex<HashMap<String, u32>>,
    panics: HashSet<String>,
    silent: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    hook: Option<Hook>,
}

impl ScriptedEngine {
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            failures: Mutex::new(HashMap::new()),
            panics: HashSet::new(),
            silent: HashSet::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Fail the first `n` calls for `text`.
    pub fn fail_first(self, text: &str, n: u32) -> Self {
        self.failures.lock().unwrap().insert(text.to_string(), n);
        self
    }

    pub fn always_fail(self, text: &str) -> Self {
        self.fail_first(text, u32::MAX)
    }

    pub fn panic_on(mut self, text: &str) -> Self {
        self.panics.insert(text.to_string());
        self
    }

    /// Succeed with zero samples.
    pub fn silent_on(mut self, text: &str) -> Self {
        self.silent.insert(text.to_string());
        self
    }

    pub fn delay_on(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Run `hook(text)` at the start of every call.
    pub fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Texts in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == text).count()
    }

    /// The level a successful call for `text` produces.
    pub fn level_for(text: &str) -> f32 {
        let sum: u32 = text.bytes().map(u32::from).sum();
        0.05 + (sum % 200) as f32 / 400.0
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceIdentity,
    ) -> Result<AudioSamples, SynthesisError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(hook) = &self.hook {
            hook(text);
        }
        if let Some(delay) = self.delays.get(text) {
            std::thread::sleep(*delay);
        }
        if self.panics.contains(text) {
            panic!("scripted panic for {text:?}");
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(text) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(SynthesisError::Engine(format!("scripted failure for {text:?}")));
                }
            }
        }
        if self.silent.contains(text) {
            return Ok(AudioSamples::new(Vec::new(), SCRIPTED_RATE));
        }
        Ok(AudioSamples::new(
            vec![Self::level_for(text); self.samples],
            SCRIPTED_RATE,
        ))
    }

    fn identity(&self) -> String {
        "scripted".into()
    }
}

// ---------------------------------------------------------------------------
// RecordingEncoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum EncoderMode {
    /// Copy the input WAV to the output path.
    #[default]
    CopyInput,
    Fail,
    EmptyOutput,
    /// Write only the first half of the input's samples.
    Truncate,
}

/// Encoder double that records every invocation.
#[derive(Default)]
pub struct RecordingEncoder {
    mode: EncoderMode,
    calls: Mutex<Vec<EncoderInvocation>>,
    hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl RecordingEncoder {
    pub fn failing() -> Self {
        Self {
            mode: EncoderMode::Fail,
            ..Self::default()
        }
    }

    pub fn empty_output() -> Self {
        Self {
            mode: EncoderMode::EmptyOutput,
            ..Self::default()
        }
    }

    pub fn truncating() -> Self {
        Self {
            mode: EncoderMode::Truncate,
            ..Self::default()
        }
    }

    /// Run `hook` at the start of every encode.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn invocations(&self) -> Vec<EncoderInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl Encoder for RecordingEncoder {
    fn encode(&self, inv: &EncoderInvocation) -> Result<(), AssemblyError> {
        self.calls.lock().unwrap().push(inv.clone());
        if let Some(hook) = &self.hook {
            hook();
        }
        match self.mode {
            EncoderMode::CopyInput => {
                std::fs::copy(&inv.input_wav, &inv.output)?;
                Ok(())
            }
            EncoderMode::Fail => Err(AssemblyError::EncoderFailed("scripted encoder failure".into())),
            EncoderMode::EmptyOutput => {
                std::fs::File::create(&inv.output)?;
                Ok(())
            }
            EncoderMode::Truncate => {
                let (rate, pcm) = read_pcm16(&inv.input_wav)?;
                let half: Vec<f32> = pcm[..pcm.len() / 2]
                    .iter()
                    .map(|&s| f32::from(s) / 32768.0)
                    .collect();
                write_wav(&inv.output, &AudioSamples::new(half, rate))?;
                Ok(())
            }
        }
    }

    /// Outputs are WAV copies, so their length can be read back directly.
    fn encoded_duration_ms(&self, output: &Path) -> Option<u64> {
        let reader = hound::WavReader::open(output).ok()?;
        Some(duration_ms(reader.spec().sample_rate, reader.duration() as usize))
    }
}
