//! Provider capability interface and the value types that cross it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::{Result, TtsError};

/// Incremental audio from a provider, in transport order.
pub type AudioStream = BoxStream<'static, Result<Bytes>>;

/// Per-request emotion and prosody values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalParameters {
    #[serde(default)]
    pub emotions: BTreeMap<String, f32>,
    #[serde(default)]
    pub prosody: BTreeMap<String, f32>,
}

impl EmotionalParameters {
    pub fn is_empty(&self) -> bool {
        self.emotions.is_empty() && self.prosody.is_empty()
    }

    /// Overlay `explicit` on top of `self`; explicit values win on key collision.
    pub fn merged_with(&self, explicit: &EmotionalParameters) -> EmotionalParameters {
        let mut merged = self.clone();
        merged.emotions.extend(explicit.emotions.iter().map(|(k, v)| (k.clone(), *v)));
        merged.prosody.extend(explicit.prosody.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }
}

/// Request options shared by every provider.
///
/// `speed` is a multiplier in [0.5, 2.0] and `pitch` a multiplier in [0.5, 1.5]. Each provider
/// converts these to its own wire domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    pub speed: f32,
    pub pitch: f32,
    pub temperature: f32,
    pub emotional_parameters: Option<EmotionalParameters>,
    pub voice_description: Option<String>, // free-text voice prompt for description-driven providers
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self { speed: 1.0, pitch: 1.0, temperature: 0.25, emotional_parameters: None, voice_description: None }
    }
}

impl SynthesisOptions {
    pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);
    pub const PITCH_RANGE: (f32, f32) = (0.5, 1.5);
    pub const TEMPERATURE_RANGE: (f32, f32) = (0.1, 0.8);

    /// Clamp numeric fields into their shared ranges. Non-finite values fall back to defaults.
    /// Applying this twice gives the same result as applying it once.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        Self {
            speed: clamp_or(self.speed, Self::SPEED_RANGE, defaults.speed),
            pitch: clamp_or(self.pitch, Self::PITCH_RANGE, defaults.pitch),
            temperature: clamp_or(self.temperature, Self::TEMPERATURE_RANGE, defaults.temperature),
            emotional_parameters: self.emotional_parameters.clone().filter(|p| !p.is_empty()),
            voice_description: self.voice_description.clone().filter(|d| !d.trim().is_empty()),
        }
    }
}

fn clamp_or(value: f32, (lo, hi): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(lo, hi) } else { fallback }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Neutral,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Neutral => "neutral",
        })
    }
}

/// Read-only voice catalog entry. Ids are unique within a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceDescriptor {
    pub id: String,
    pub display_name: String,
    pub gender: Gender,
    pub language: String,
    pub tags: BTreeSet<String>,
}

/// Static facts about a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub max_text_length: usize,
    pub cost_per_million_chars: f64,
    pub languages: usize,
}

/// A speech backend.
///
/// Network I/O happens only inside [`synthesize`](Self::synthesize) and the stream returned by
/// [`stream`](Self::stream). Both validate their input first and fail with
/// [`TtsError::Validation`] without touching the network.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Largest text (in chars) accepted by one request.
    fn max_text_length(&self) -> usize;

    /// Whole-audio synthesis.
    async fn synthesize(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Result<Bytes>;

    /// Incremental synthesis. The request is not sent until the stream is first polled.
    fn stream(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> AudioStream;

    /// Static voice catalog.
    fn list_voices(&self) -> &[VoiceDescriptor];

    /// Check text against this provider's limits.
    fn validate_text(&self, text: &str) -> Result<()> {
        validate_length(text, self.max_text_length())
    }
}

/// Shared text check: non-blank and at most `max_len` chars.
pub fn validate_length(text: &str, max_len: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TtsError::validation("text is empty"));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(TtsError::validation(format!("text is {} characters, limit is {}", len, max_len)));
    }
    Ok(())
}

/// Shared voice id check.
pub fn validate_voice(voice_id: &str) -> Result<()> {
    if voice_id.trim().is_empty() {
        return Err(TtsError::validation("voice id is empty"));
    }
    Ok(())
}

/// A stream that yields a single error, for requests rejected before any I/O.
pub(crate) fn failed_stream(err: TtsError) -> AudioStream {
    Box::pin(futures_util::stream::once(async move { Err(err) }))
}

/// Shortened text for log lines.
pub(crate) fn text_preview(text: &str) -> String {
    const PREVIEW: usize = 50;
    if text.chars().count() > PREVIEW { format!("{}...", text.chars().take(PREVIEW).collect::<String>()) } else { text.to_string() }
}
