//! Hume provider with instant-mode streaming and emotional synthesis.
//!
//! Whole-audio synthesis posts a voice *description* to `/v0/tts` and decodes base64 audio
//! from the JSON reply. Streaming posts to `/v0/tts/stream/json` with instant mode enabled,
//! which only accepts predefined voices; any other voice is swapped for the default instant
//! voice. Emotion and prosody values from the shared [`EmotionalContext`] are attached to
//! every utterance, with per-request values taking precedence.
//!
//! [`EmotionalContext`]: crate::emotion::EmotionalContext

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::error::{Result, TtsError};
use super::framing::JsonLineDecoder;
use super::http::{self, wire_number};
use super::provider::{
    AudioStream, EmotionalParameters, SynthesisOptions, SynthesisProvider, VoiceDescriptor, failed_stream, text_preview, validate_length,
    validate_voice,
};
use crate::config::voices::{self, HUME_DEFAULT_INSTANT_VOICE};
use crate::config::{ProviderKind, TtsConfig};
use crate::emotion::SharedEmotionalContext;

pub const HUME_BASE_URL: &str = "https://api.hume.ai";

pub const HUME_MAX_TEXT_LENGTH: usize = 5000;

const NAME: &str = "hume";
const API_KEY_HEADER: &str = "X-Hume-Api-Key";

#[derive(Debug, Deserialize)]
struct TtsReply {
    #[serde(default)]
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    audio: String,
}

/// Emotion-aware synthesis over Hume's TTS API.
pub struct HumeProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    instant_voice: String, // Fallback for streaming requests
    emotional_context: SharedEmotionalContext,
    voices: Vec<VoiceDescriptor>,
}

impl HumeProvider {
    pub fn new(config: &TtsConfig, emotional_context: SharedEmotionalContext) -> Result<Self> {
        config.validate()?;

        let instant_voice = match config.default_voice.as_deref() {
            Some(voice) if voices::is_instant_voice(voice) => voice.to_string(),
            Some(voice) => {
                warn!("Default voice {} is not an instant-mode voice, streaming will use {}", voice, HUME_DEFAULT_INSTANT_VOICE);
                HUME_DEFAULT_INSTANT_VOICE.to_string()
            }
            None => HUME_DEFAULT_INSTANT_VOICE.to_string(),
        };

        Ok(Self {
            client: http::build_client(config)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.as_deref().unwrap_or(HUME_BASE_URL).trim_end_matches('/').to_string(),
            instant_voice,
            emotional_context,
            voices: voices::descriptors(ProviderKind::Hume),
        })
    }

    /// Standing context merged with explicit request values. `None` when both are empty.
    fn emotional_parameters(&self, options: &SynthesisOptions) -> Option<EmotionalParameters> {
        let standing = self.emotional_context.lock().current_parameters().unwrap_or_default();
        let merged = match &options.emotional_parameters {
            Some(explicit) => standing.merged_with(explicit),
            None => standing,
        };
        (!merged.is_empty()).then_some(merged)
    }

    /// Voice for an instant-mode request.
    fn instant_voice_for<'a>(&'a self, voice_id: &'a str) -> &'a str {
        if voices::is_instant_voice(voice_id) {
            voice_id
        } else {
            warn!("Voice {} is not available in instant mode, using {}", voice_id, self.instant_voice);
            &self.instant_voice
        }
    }

    fn utterance(&self, text: &str, voice: Value, options: &SynthesisOptions) -> Value {
        let options = options.normalized();
        let mut utterance = Map::new();
        utterance.insert("text".into(), json!(text));
        utterance.insert("speed".into(), json!(wire_number(options.speed)));
        match voice {
            Value::String(description) => utterance.insert("description".into(), json!(description)),
            voice => utterance.insert("voice".into(), voice),
        };

        if let Some(parameters) = self.emotional_parameters(&options) {
            if !parameters.emotions.is_empty() {
                utterance.insert("emotions".into(), json!(parameters.emotions));
            }
            if !parameters.prosody.is_empty() {
                utterance.insert("prosody".into(), json!(parameters.prosody));
            }
        }
        Value::Object(utterance)
    }

    fn synthesis_payload(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Value {
        let description = options.voice_description.as_deref().filter(|d| !d.trim().is_empty()).unwrap_or_else(|| voices::hume_description(voice_id));
        json!({
            "utterances": [self.utterance(text, json!(description), options)],
            "format": {"type": "mp3"},
        })
    }

    fn stream_payload(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Value {
        let voice = self.instant_voice_for(voice_id);
        json!({
            "utterances": [self.utterance(text, json!({"id": voice}), options)],
            "format": {"type": "mp3"},
            "instant_mode": true,
            "strip_headers": true,
            "num_generations": 1,
        })
    }

    fn post(&self, path: &str, payload: &Value) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url, path)).header(API_KEY_HEADER, &self.api_key).json(payload)
    }
}

#[async_trait]
impl SynthesisProvider for HumeProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_text_length(&self) -> usize {
        HUME_MAX_TEXT_LENGTH
    }

    async fn synthesize(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Result<Bytes> {
        validate_length(text, HUME_MAX_TEXT_LENGTH)?;
        validate_voice(voice_id)?;

        let payload = self.synthesis_payload(text, voice_id, options);
        debug!("Hume synthesis: description='{}', text='{}'", payload["utterances"][0]["description"], text_preview(text));

        let response = http::send(NAME, self.post("/v0/tts", &payload)).await?;
        let body = response.bytes().await?;
        let reply: TtsReply = serde_json::from_slice(&body)
            .map_err(|e| TtsError::Upstream { provider: NAME, status: 200, message: format!("malformed synthesis reply: {}", e) })?;

        let encoded = reply
            .generations
            .into_iter()
            .next()
            .map(|g| g.audio)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| TtsError::Upstream { provider: NAME, status: 200, message: "no audio data received".to_string() })?;

        let audio = BASE64
            .decode(encoded)
            .map_err(|e| TtsError::Upstream { provider: NAME, status: 200, message: format!("invalid base64 audio: {}", e) })?;
        debug!("Hume synthesized {} bytes", audio.len());
        Ok(Bytes::from(audio))
    }

    fn stream(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> AudioStream {
        if let Err(e) = validate_length(text, HUME_MAX_TEXT_LENGTH).and_then(|_| validate_voice(voice_id)) {
            return failed_stream(e);
        }

        let payload = self.stream_payload(text, voice_id, options);
        debug!("Hume instant stream: voice={}, text='{}'", payload["utterances"][0]["voice"]["id"], text_preview(text));
        let request = self.post("/v0/tts/stream/json", &payload);

        Box::pin(async_stream::try_stream! {
            let response = http::send(NAME, request).await?;
            let mut body = response.bytes_stream();
            let mut decoder = JsonLineDecoder::new(NAME);

            while let Some(read) = body.next().await {
                let read = read.map_err(TtsError::Network)?;
                for audio in decoder.push(&read)? {
                    yield audio;
                }
            }
            if let Some(audio) = decoder.finish()? {
                yield audio;
            }
        })
    }

    fn list_voices(&self) -> &[VoiceDescriptor] {
        &self.voices
    }
}
