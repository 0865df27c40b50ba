//! Affect tracking and delivery adaptation.
//!
//! Holds the latest emotional reading for a conversation plus a short FIFO history, and
//! turns the latest reading into tone/pace/detail guidance and synthesis parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::tts::provider::EmotionalParameters;

/// Number of emotional states retained in history.
pub const HISTORY_CAPACITY: usize = 10;

/// Dominant-emotion intensity above which adaptation is always indicated.
const DOMINANT_THRESHOLD: f32 = 0.7;

/// Intensity above which a watch-list emotion triggers adaptation.
const WATCH_THRESHOLD: f32 = 0.6;

/// Watch-list emotions in preset priority order.
const WATCH_LIST: [&str; 3] = ["frustration", "excitement", "confusion"];

/// Context shared between a session owner and a provider.
pub type SharedEmotionalContext = Arc<Mutex<EmotionalContext>>;

/// One affect reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmotionalState {
    pub emotions: BTreeMap<String, f32>, // intensities in [0, 1]
    pub prosody: BTreeMap<String, f32>,  // e.g. pitch, speech_rate
    pub confidence: f32,                 // in [0, 1]
}

impl EmotionalState {
    /// The strongest emotion, if any.
    pub fn dominant(&self) -> Option<(&str, f32)> {
        self.emotions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, &value)| (name.as_str(), value))
    }

    fn intensity(&self, emotion: &str) -> f32 {
        self.emotions.get(emotion).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Supportive,
    Enthusiastic,
    Patient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    Normal,
    Slower,
    Faster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Normal,
    Simplified,
    Detailed,
}

/// Tone, pace and detail to apply to the next response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuidancePreset {
    pub tone: Tone,
    pub pace: Pace,
    pub detail_level: DetailLevel,
}

impl GuidancePreset {
    const NEUTRAL: Self = Self { tone: Tone::Neutral, pace: Pace::Normal, detail_level: DetailLevel::Normal };
    const FRUSTRATED: Self = Self { tone: Tone::Supportive, pace: Pace::Slower, detail_level: DetailLevel::Simplified };
    const EXCITED: Self = Self { tone: Tone::Enthusiastic, pace: Pace::Faster, detail_level: DetailLevel::Detailed };
    const CONFUSED: Self = Self { tone: Tone::Patient, pace: Pace::Slower, detail_level: DetailLevel::Simplified };

    fn for_emotion(emotion: &str) -> Self {
        match emotion {
            "frustration" => Self::FRUSTRATED,
            "excitement" => Self::EXCITED,
            "confusion" => Self::CONFUSED,
            _ => Self::NEUTRAL,
        }
    }
}

/// Result of [`EmotionalContext::adaptation_guidance`]. `preset` is `None` when no adaptation is indicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdaptationGuidance {
    pub should_adapt: bool,
    #[serde(flatten)]
    pub preset: Option<GuidancePreset>,
}

/// Snapshot of the latest state only. History is never aggregated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionalSummary {
    pub has_emotional_data: bool,
    pub dominant_emotion: Option<String>,
    pub emotional_intensity: f32,
    pub confidence: f32,
}

/// Tracks the most recent affect signal of one conversation.
///
/// Not internally synchronized; wrap it in a [`SharedEmotionalContext`] when a provider
/// and a session owner both need it.
pub struct EmotionalContext {
    current: Option<EmotionalState>,
    history: HeapRb<EmotionalState>,
}

impl fmt::Debug for EmotionalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmotionalContext")
            .field("current", &self.current)
            .field("history_len", &self.history.occupied_len())
            .finish()
    }
}

impl Default for EmotionalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionalContext {
    pub fn new() -> Self {
        Self { current: None, history: HeapRb::new(HISTORY_CAPACITY) }
    }

    /// Create a context ready to be shared across threads.
    pub fn shared() -> SharedEmotionalContext {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Parse an untyped affect payload and make it the current state.
    ///
    /// Parsing is lenient and never fails:
    /// - missing `emotions`/`prosody` become empty maps, missing `confidence` becomes 0.0
    /// - non-numeric entries are skipped, intensities and confidence are clamped to [0, 1]
    /// - a payload that is not a JSON object yields a zero state that is returned but not recorded
    pub fn process_emotional_data(&mut self, raw: &Value) -> EmotionalState {
        let Some(object) = raw.as_object() else {
            warn!("Ignoring emotional data that is not an object");
            return EmotionalState::default();
        };

        let state = EmotionalState {
            emotions: numeric_map(object.get("emotions"), true),
            prosody: numeric_map(object.get("prosody"), false),
            confidence: object.get("confidence").and_then(Value::as_f64).map_or(0.0, |c| (c as f32).clamp(0.0, 1.0)),
        };

        self.record(state.clone());
        state
    }

    /// Make `state` current and append it to the history, evicting the oldest entry when full.
    pub fn record(&mut self, state: EmotionalState) {
        if let Some((emotion, intensity)) = state.dominant() {
            debug!("Emotional state: {} ({:.2}), confidence {:.2}", emotion, intensity, state.confidence);
        }
        self.history.push_overwrite(state.clone());
        self.current = Some(state);
    }

    pub fn current(&self) -> Option<&EmotionalState> {
        self.current.as_ref()
    }

    /// Retained states, oldest first.
    pub fn history(&self) -> Vec<EmotionalState> {
        self.history.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.history.clear();
    }

    pub fn summary(&self) -> EmotionalSummary {
        match &self.current {
            None => EmotionalSummary { has_emotional_data: false, dominant_emotion: None, emotional_intensity: 0.0, confidence: 0.0 },
            Some(state) => {
                let dominant = state.dominant();
                EmotionalSummary {
                    has_emotional_data: true,
                    dominant_emotion: dominant.map(|(name, _)| name.to_string()),
                    emotional_intensity: dominant.map_or(0.0, |(_, value)| value),
                    confidence: state.confidence,
                }
            }
        }
    }

    /// True when the latest dominant emotion exceeds 0.7 or a watch-list emotion exceeds 0.6.
    pub fn should_adapt(&self) -> bool {
        let Some(state) = &self.current else {
            return false;
        };
        state.dominant().is_some_and(|(_, value)| value > DOMINANT_THRESHOLD) || WATCH_LIST.iter().any(|e| state.intensity(e) > WATCH_THRESHOLD)
    }

    /// Guidance for the next response.
    ///
    /// Watch-list emotions are checked in the order frustration, excitement, confusion and the
    /// first one over threshold picks the preset, even when several are elevated. Adaptation
    /// triggered only by a strong non-watch-list emotion uses the neutral preset.
    pub fn adaptation_guidance(&self) -> AdaptationGuidance {
        let Some(state) = self.current.as_ref().filter(|_| self.should_adapt()) else {
            return AdaptationGuidance { should_adapt: false, preset: None };
        };

        let preset = WATCH_LIST
            .iter()
            .find(|e| state.intensity(e) > WATCH_THRESHOLD)
            .map_or(GuidancePreset::NEUTRAL, |e| GuidancePreset::for_emotion(e));

        AdaptationGuidance { should_adapt: true, preset: Some(preset) }
    }

    /// Emotion and prosody maps of the latest state, for providers that accept them.
    pub fn current_parameters(&self) -> Option<EmotionalParameters> {
        self.current
            .as_ref()
            .filter(|s| !s.emotions.is_empty() || !s.prosody.is_empty())
            .map(|s| EmotionalParameters { emotions: s.emotions.clone(), prosody: s.prosody.clone() })
    }
}

fn numeric_map(value: Option<&Value>, unit_range: bool) -> BTreeMap<String, f32> {
    let Some(entries) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(key, v)| {
            let v = v.as_f64()? as f32;
            if !v.is_finite() {
                return None;
            }
            Some((key.clone(), if unit_range { v.clamp(0.0, 1.0) } else { v }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_state_means_no_adaptation() {
        let ctx = EmotionalContext::new();
        assert!(!ctx.should_adapt());
        assert_eq!(ctx.adaptation_guidance(), AdaptationGuidance { should_adapt: false, preset: None });
        assert!(!ctx.summary().has_emotional_data);
    }

    #[test]
    fn test_frustration_then_neutral() {
        let mut ctx = EmotionalContext::new();
        ctx.process_emotional_data(&json!({"emotions": {"frustration": 0.65}, "confidence": 0.8}));
        assert!(ctx.should_adapt());
        let guidance = ctx.adaptation_guidance();
        assert_eq!(guidance.preset, Some(GuidancePreset::FRUSTRATED));

        ctx.process_emotional_data(&json!({"emotions": {"calmness": 0.3, "interest": 0.4}}));
        assert!(!ctx.should_adapt());
        assert!(!ctx.adaptation_guidance().should_adapt);
    }

    #[test]
    fn test_watch_list_priority() {
        let mut ctx = EmotionalContext::new();
        ctx.process_emotional_data(&json!({"emotions": {"confusion": 0.9, "excitement": 0.65}}));
        assert_eq!(ctx.adaptation_guidance().preset, Some(GuidancePreset::EXCITED));

        ctx.process_emotional_data(&json!({"emotions": {"confusion": 0.9, "excitement": 0.65, "frustration": 0.61}}));
        assert_eq!(ctx.adaptation_guidance().preset, Some(GuidancePreset::FRUSTRATED));

        ctx.process_emotional_data(&json!({"emotions": {"confusion": 0.62}}));
        assert_eq!(ctx.adaptation_guidance().preset, Some(GuidancePreset::CONFUSED));
    }

    #[test]
    fn test_strong_unlisted_emotion_uses_neutral_preset() {
        let mut ctx = EmotionalContext::new();
        ctx.process_emotional_data(&json!({"emotions": {"joy": 0.95}}));
        let guidance = ctx.adaptation_guidance();
        assert!(guidance.should_adapt);
        assert_eq!(guidance.preset, Some(GuidancePreset::NEUTRAL));
    }

    #[test]
    fn test_lenient_parsing() {
        let mut ctx = EmotionalContext::new();
        let state = ctx.process_emotional_data(&json!({
            "emotions": {"joy": 1.7, "sadness": "high", "calm": -0.2},
            "prosody": {"pitch": 1.2},
            "confidence": "unknown"
        }));
        assert_eq!(state.emotions.get("joy"), Some(&1.0));
        assert_eq!(state.emotions.get("calm"), Some(&0.0));
        assert!(!state.emotions.contains_key("sadness"));
        assert_eq!(state.prosody.get("pitch"), Some(&1.2));
        assert_eq!(state.confidence, 0.0);
        assert!(ctx.current().is_some());
    }

    #[test]
    fn test_non_object_degrades_to_zero_state() {
        let mut ctx = EmotionalContext::new();
        let state = ctx.process_emotional_data(&json!(["not", "a", "map"]));
        assert_eq!(state, EmotionalState::default());
        assert!(ctx.current().is_none());
        assert!(ctx.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut ctx = EmotionalContext::new();
        for i in 0..15 {
            ctx.process_emotional_data(&json!({"confidence": i as f64 / 100.0}));
        }
        let history = ctx.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert!((history[0].confidence - 0.05).abs() < 1e-6);
        assert!((history[HISTORY_CAPACITY - 1].confidence - 0.14).abs() < 1e-6);

        ctx.clear();
        assert!(ctx.history().is_empty());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_summary_reports_latest_only() {
        let mut ctx = EmotionalContext::new();
        ctx.process_emotional_data(&json!({"emotions": {"anger": 0.9}}));
        ctx.process_emotional_data(&json!({"emotions": {"interest": 0.4, "joy": 0.2}, "confidence": 0.7}));
        let summary = ctx.summary();
        assert_eq!(summary.dominant_emotion.as_deref(), Some("interest"));
        assert!((summary.emotional_intensity - 0.4).abs() < 1e-6);
        assert!((summary.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_guidance_serializes_flat() {
        let mut ctx = EmotionalContext::new();
        ctx.process_emotional_data(&json!({"emotions": {"frustration": 0.8}}));
        let value = serde_json::to_value(ctx.adaptation_guidance()).unwrap();
        assert_eq!(value, json!({"should_adapt": true, "tone": "supportive", "pace": "slower", "detail_level": "simplified"}));
    }

    #[test]
    fn test_current_parameters() {
        let mut ctx = EmotionalContext::new();
        assert!(ctx.current_parameters().is_none());
        ctx.process_emotional_data(&json!({"emotions": {"joy": 0.5}, "prosody": {"speech_rate": 0.9}}));
        let params = ctx.current_parameters().unwrap();
        assert_eq!(params.emotions.get("joy"), Some(&0.5));
        assert_eq!(params.prosody.get("speech_rate"), Some(&0.9));
    }
}
