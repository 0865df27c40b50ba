//! Emotional context tracking for adaptive speech delivery.

pub mod context;

pub use context::{
    AdaptationGuidance, DetailLevel, EmotionalContext, EmotionalState, EmotionalSummary, GuidancePreset, Pace, SharedEmotionalContext, Tone,
};
