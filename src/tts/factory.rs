//! Provider construction and static provider facts.

use std::sync::Arc;

use tracing::info;

use super::error::Result;
use super::hume::{HUME_MAX_TEXT_LENGTH, HumeProvider};
use super::provider::{ProviderInfo, SynthesisProvider};
use super::unreal::{UNREAL_MAX_TEXT_LENGTH, UnrealSpeechProvider};
use crate::config::{ProviderKind, TtsConfig};
use crate::emotion::SharedEmotionalContext;

/// Build the provider selected by `config`.
///
/// # Errors
/// [`TtsError::Configuration`](super::error::TtsError::Configuration) when the API key is missing
/// or a setting is invalid. Nothing is sent over the network here.
pub fn create_provider(config: &TtsConfig, emotional_context: SharedEmotionalContext) -> Result<Arc<dyn SynthesisProvider>> {
    let provider: Arc<dyn SynthesisProvider> = match config.provider {
        ProviderKind::UnrealSpeech => Arc::new(UnrealSpeechProvider::new(config)?),
        ProviderKind::Hume => Arc::new(HumeProvider::new(config, emotional_context)?),
    };
    info!("🔊 Using {} speech provider", provider.name());
    Ok(provider)
}

pub fn available_providers() -> &'static [ProviderKind] {
    &ProviderKind::ALL
}

pub fn provider_info(kind: ProviderKind) -> ProviderInfo {
    match kind {
        ProviderKind::UnrealSpeech => ProviderInfo {
            name: "Unreal Speech",
            description: "Low-latency HTTP streaming TTS",
            features: &["streaming", "word_timestamps", "low_latency"],
            max_text_length: UNREAL_MAX_TEXT_LENGTH,
            cost_per_million_chars: 8.0,
            languages: 8,
        },
        ProviderKind::Hume => ProviderInfo {
            name: "Hume AI",
            description: "Emotionally expressive TTS with instant-mode streaming",
            features: &["emotional_synthesis", "voice_descriptions", "instant_mode"],
            max_text_length: HUME_MAX_TEXT_LENGTH,
            cost_per_million_chars: 240.0,
            languages: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionalContext;
    use crate::tts::error::TtsError;

    #[test]
    fn test_create_each_provider() {
        for kind in available_providers() {
            let provider = create_provider(&TtsConfig::new(*kind, "key"), EmotionalContext::shared()).unwrap();
            assert_eq!(provider.max_text_length(), provider_info(*kind).max_text_length);
            assert!(!provider.list_voices().is_empty());
        }
    }

    #[test]
    fn test_missing_key_fails_at_construction() {
        let result = create_provider(&TtsConfig::new(ProviderKind::Hume, ""), EmotionalContext::shared());
        assert!(matches!(result, Err(TtsError::Configuration(_))));
    }

    #[test]
    fn test_unknown_provider_name_fails_fast() {
        assert!(matches!("azure".parse::<ProviderKind>(), Err(TtsError::Configuration(_))));
    }
}
