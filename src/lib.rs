//! Streaming speech synthesis for cloud TTS providers.
//!
//! Long text is split at natural boundaries, each piece is sent to the selected provider and the
//! audio comes back as it downloads, either as one buffer or through a blocking iterator.

pub mod config;
pub mod emotion;
pub mod tts;

pub use config::{ProviderKind, TtsConfig};
pub use emotion::{EmotionalContext, SharedEmotionalContext};
pub use tts::{SpeechStream, SynthesisOptions, SynthesisProvider, SynthesisService, TextChunker, TtsError};
