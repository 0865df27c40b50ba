//! UnrealSpeech provider.
//!
//! One `POST {base}/stream` request per call; the MP3 body is relayed as fixed-size windows
//! while it downloads. Shared speed multipliers in [0.5, 2.0] are converted to UnrealSpeech's
//! [-1, 1] domain as `speed - 1.0`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};
use tracing::debug;

use super::error::{Result, TtsError};
use super::framing::{ByteWindows, DEFAULT_WINDOW_SIZE};
use super::http::{self, wire_number};
use super::provider::{
    AudioStream, SynthesisOptions, SynthesisProvider, VoiceDescriptor, failed_stream, text_preview, validate_length, validate_voice,
};
use crate::config::voices::{self, resolve_unreal_voice};
use crate::config::{ProviderKind, TtsConfig};

pub const UNREAL_BASE_URL: &str = "https://api.v8.unrealspeech.com";

/// Longest text accepted by one streaming request.
pub const UNREAL_MAX_TEXT_LENGTH: usize = 1000;

const NAME: &str = "unrealspeech";

/// Convert a shared speed multiplier to UnrealSpeech's [-1, 1] range.
pub fn unreal_speed(multiplier: f32) -> f32 {
    (multiplier - 1.0).clamp(-1.0, 1.0)
}

/// HTTP-streamed MP3 synthesis with voice alias resolution.
pub struct UnrealSpeechProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String, // Full /stream URL
    bitrate: String,
    window_size: usize,
    voices: Vec<VoiceDescriptor>,
}

impl UnrealSpeechProvider {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        config.validate()?;
        let base = config.base_url.as_deref().unwrap_or(UNREAL_BASE_URL).trim_end_matches('/');

        Ok(Self {
            client: http::build_client(config)?,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/stream", base),
            bitrate: config.bitrate.clone(),
            window_size: DEFAULT_WINDOW_SIZE,
            voices: voices::descriptors(ProviderKind::UnrealSpeech),
        })
    }

    /// Relay the body in windows of `size` bytes instead of 16 KiB.
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Request body with UnrealSpeech field names and ranges.
    fn payload(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Value {
        let options = options.normalized();
        json!({
            "Text": text,
            "VoiceId": resolve_unreal_voice(voice_id),
            "Bitrate": self.bitrate,
            "Speed": wire_number(unreal_speed(options.speed)).to_string(),
            "Pitch": wire_number(options.pitch).to_string(),
            "Codec": "libmp3lame",
            "Temperature": wire_number(options.temperature),
        })
    }
}

#[async_trait]
impl SynthesisProvider for UnrealSpeechProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_text_length(&self) -> usize {
        UNREAL_MAX_TEXT_LENGTH
    }

    async fn synthesize(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Result<Bytes> {
        let mut stream = self.stream(text, voice_id, options);
        let mut audio = BytesMut::new();
        while let Some(window) = stream.next().await {
            audio.extend_from_slice(&window?);
        }

        if audio.is_empty() {
            return Err(TtsError::Upstream { provider: NAME, status: 200, message: "response contained no audio".to_string() });
        }
        debug!("UnrealSpeech synthesized {} bytes", audio.len());
        Ok(audio.freeze())
    }

    fn stream(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> AudioStream {
        if let Err(e) = validate_length(text, UNREAL_MAX_TEXT_LENGTH).and_then(|_| validate_voice(voice_id)) {
            return failed_stream(e);
        }

        let payload = self.payload(text, voice_id, options);
        debug!("UnrealSpeech request: voice={}, speed={}, text='{}'", payload["VoiceId"], payload["Speed"], text_preview(text));

        let request = self.client.post(&self.endpoint).header(AUTHORIZATION, format!("Bearer {}", self.api_key)).json(&payload);
        let window_size = self.window_size;

        Box::pin(async_stream::try_stream! {
            let response = http::send(NAME, request).await?;
            let mut body = response.bytes_stream();
            let mut windows = ByteWindows::new(window_size);

            while let Some(read) = body.next().await {
                let read = read.map_err(TtsError::Network)?;
                for window in windows.push(&read) {
                    yield window;
                }
            }
            if let Some(rest) = windows.finish() {
                yield rest;
            }
        })
    }

    fn list_voices(&self) -> &[VoiceDescriptor] {
        &self.voices
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::tts::test_server::{MockResponse, MockServer, unreachable_url};

    fn provider(base_url: &str) -> UnrealSpeechProvider {
        UnrealSpeechProvider::new(&TtsConfig::new(ProviderKind::UnrealSpeech, "test-key").with_base_url(base_url)).unwrap()
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn test_speed_conversion() {
        assert_eq!(unreal_speed(1.0), 0.0);
        assert_eq!(unreal_speed(0.5), -0.5);
        assert_eq!(unreal_speed(2.0), 1.0);
        assert_eq!(unreal_speed(3.5), 1.0);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let result = UnrealSpeechProvider::new(&TtsConfig::new(ProviderKind::UnrealSpeech, ""));
        assert!(matches!(result, Err(TtsError::Configuration(_))));
    }

    #[test]
    fn test_malformed_base_url_fails_at_construction() {
        let result = UnrealSpeechProvider::new(&TtsConfig::new(ProviderKind::UnrealSpeech, "test-key").with_base_url("http://bad host:99999"));
        assert!(matches!(result, Err(TtsError::Configuration(_))));
    }

    #[test]
    fn test_payload_fields() {
        let provider = provider("http://127.0.0.1:1");
        let options = SynthesisOptions { speed: 1.5, pitch: 1.1, temperature: 0.3, ..Default::default() };
        let payload = provider.payload("Hi", "professional", &options);
        assert_eq!(payload["VoiceId"], "am_adam");
        assert_eq!(payload["Speed"], "0.5");
        assert_eq!(payload["Pitch"], "1.1");
        assert_eq!(payload["Codec"], "libmp3lame");
        assert_eq!(payload["Bitrate"], "192k");
        assert_eq!(payload["Temperature"], 0.3);
        assert_eq!(provider.payload("Hi", "Eleanor", &options)["VoiceId"], "Eleanor");
    }

    #[test]
    fn test_stream_relays_fixed_windows() {
        let server = MockServer::start(vec![MockResponse::chunked("audio/mpeg", vec![b"ID3abc".to_vec(), b"defgh".to_vec(), b"ij".to_vec()])]);
        let provider = provider(&server.base_url).with_window_size(4);

        let windows: Vec<Bytes> = runtime().block_on(async {
            provider.stream("Hello there.", "friendly_casual", &SynthesisOptions::default()).map(|w| w.unwrap()).collect().await
        });
        assert_eq!(windows, vec![Bytes::from_static(b"ID3a"), Bytes::from_static(b"bcde"), Bytes::from_static(b"fghi"), Bytes::from_static(b"j")]);

        let request = server.request();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/stream");
        assert_eq!(request.headers.get("authorization").map(String::as_str), Some("Bearer test-key"));
        let body = request.json();
        assert_eq!(body["Text"], "Hello there.");
        assert_eq!(body["VoiceId"], "af_sky");
        assert_eq!(body["Speed"], "0");
    }

    #[test]
    fn test_synthesize_concatenates_body() {
        let server = MockServer::start(vec![MockResponse::ok("audio/mpeg", b"0123456789".to_vec())]);
        let provider = provider(&server.base_url).with_window_size(3);
        let audio = runtime().block_on(provider.synthesize("Hello.", "af_sky", &SynthesisOptions::default())).unwrap();
        assert_eq!(audio, Bytes::from_static(b"0123456789"));
    }

    #[test]
    fn test_http_error_is_upstream_error() {
        let server = MockServer::start(vec![MockResponse::status(401, r#"{"message":"Invalid API key"}"#)]);
        let provider = provider(&server.base_url);
        let err = runtime().block_on(provider.synthesize("Hello.", "af_sky", &SynthesisOptions::default())).unwrap_err();
        match err {
            TtsError::Upstream { provider, status, message } => {
                assert_eq!(provider, "unrealspeech");
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_error_body_keeps_status() {
        let server = MockServer::start(vec![MockResponse::truncated(503, r#"{"message":"overl"#)]);
        let provider = provider(&server.base_url);
        let err = runtime().block_on(provider.synthesize("Hello.", "af_sky", &SynthesisOptions::default())).unwrap_err();
        assert!(matches!(err, TtsError::Upstream { status: 503, ref message, .. } if message == "empty error body"), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_invalid_text_fails_without_network() {
        // Port 1 would refuse; a validation error proves no request was attempted.
        let provider = provider("http://127.0.0.1:1");
        let rt = runtime();
        let long = "a".repeat(UNREAL_MAX_TEXT_LENGTH + 1);
        assert!(matches!(rt.block_on(provider.synthesize(&long, "af_sky", &SynthesisOptions::default())), Err(TtsError::Validation(_))));
        assert!(matches!(rt.block_on(provider.synthesize("   ", "af_sky", &SynthesisOptions::default())), Err(TtsError::Validation(_))));
        assert!(matches!(rt.block_on(provider.synthesize("Hi", "", &SynthesisOptions::default())), Err(TtsError::Validation(_))));
    }

    #[test]
    fn test_unreachable_endpoint_is_network_error() {
        let provider = provider(&unreachable_url());
        let started = Instant::now();
        let err = runtime().block_on(provider.synthesize("Hello.", "af_sky", &SynthesisOptions::default())).unwrap_err();
        assert!(matches!(err, TtsError::Network(_)), "unexpected error: {:?}", err);
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_catalog() {
        let provider = provider("http://127.0.0.1:1");
        assert_eq!(provider.list_voices().len(), 10);
        assert_eq!(provider.max_text_length(), 1000);
        assert!(provider.validate_text("Hello").is_ok());
    }
}
