//! Speech synthesis over cloud TTS providers.
//!
//! Providers expose async streams of encoded audio; [`service::SynthesisService`] chunks long text
//! and hands the audio to blocking callers through a [`bridge::StreamBridge`].

pub mod bridge;
pub mod chunker;
pub mod error;
pub mod factory;
pub mod framing;
mod http;
pub mod hume;
pub mod provider;
pub mod service;
pub mod unreal;

#[cfg(test)]
mod test_server;

pub use bridge::{BridgeSettings, BridgeState, StreamBridge, StreamEvent, StreamStats};
pub use chunker::{ChunkingInfo, TextChunk, TextChunker, chunk_text};
pub use error::{Result, TtsError};
pub use factory::{available_providers, create_provider, provider_info};
pub use provider::{AudioStream, EmotionalParameters, SynthesisOptions, SynthesisProvider, VoiceDescriptor};
pub use service::{SpeechStream, SynthesisService};
