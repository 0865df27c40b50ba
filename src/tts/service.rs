//! Blocking synthesis API over an async provider.
//!
//! [`SynthesisService`] is the explicit root object: it owns (or borrows) the tokio runtime,
//! the active provider and the session's emotional context. Callers that cannot run async code
//! use [`SynthesisService::synthesize`] for whole audio or [`SynthesisService::stream`] for a
//! blocking iterator of audio chunks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bridge::{BridgeSettings, StreamBridge, StreamStats};
use super::chunker::{ChunkingInfo, TextChunk, TextChunker};
use super::error::{Result, TtsError};
use super::factory::create_provider;
use super::provider::{SynthesisOptions, SynthesisProvider, VoiceDescriptor, validate_voice};
use crate::config::TtsConfig;
use crate::emotion::{AdaptationGuidance, EmotionalContext, EmotionalState, EmotionalSummary, SharedEmotionalContext};

/// Runtime shared by the service and every stream it hands out.
#[derive(Clone)]
enum RuntimeHandle {
    Owned(Arc<Runtime>),
    Shared(Handle),
}

impl RuntimeHandle {
    fn handle(&self) -> Handle {
        match self {
            RuntimeHandle::Owned(rt) => rt.handle().clone(),
            RuntimeHandle::Shared(handle) => handle.clone(),
        }
    }
}

/// Synthesis entry point for one process or request scope.
pub struct SynthesisService {
    runtime: RuntimeHandle,
    provider: Arc<dyn SynthesisProvider>,
    emotional_context: SharedEmotionalContext,
    chunker: TextChunker,
    bridge_settings: BridgeSettings,
    default_voice: String,
    cancel: CancellationToken, // Parent of every stream's token
}

impl SynthesisService {
    /// Build the configured provider with a fresh emotional context and an owned runtime.
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let emotional_context = EmotionalContext::shared();
        let provider = create_provider(config, emotional_context.clone())?;
        Ok(Self::new(provider, emotional_context)?
            .with_max_chunk_size(config.max_chunk_size)
            .with_default_voice(config.effective_default_voice()))
    }

    /// Wrap `provider`, starting a dedicated multi-thread runtime.
    pub fn new(provider: Arc<dyn SynthesisProvider>, emotional_context: SharedEmotionalContext) -> Result<Self> {
        let workers = num_cpus::get().clamp(2, 4);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("tts-runtime")
            .enable_all()
            .build()
            .map_err(|e| TtsError::Configuration(format!("failed to start runtime: {}", e)))?;
        debug!("Started synthesis runtime with {} workers", workers);
        Ok(Self::build(RuntimeHandle::Owned(Arc::new(runtime)), provider, emotional_context))
    }

    /// Wrap `provider` using an existing multi-thread runtime.
    pub fn with_handle(handle: Handle, provider: Arc<dyn SynthesisProvider>, emotional_context: SharedEmotionalContext) -> Self {
        Self::build(RuntimeHandle::Shared(handle), provider, emotional_context)
    }

    fn build(runtime: RuntimeHandle, provider: Arc<dyn SynthesisProvider>, emotional_context: SharedEmotionalContext) -> Self {
        let default_voice = provider.list_voices().first().map(|v| v.id.clone()).unwrap_or_default();
        let chunker = TextChunker::new(provider.max_text_length());
        Self {
            runtime,
            provider,
            emotional_context,
            chunker,
            bridge_settings: BridgeSettings::default(),
            default_voice,
            cancel: CancellationToken::new(),
        }
    }

    /// Chunk size, capped at the provider's request limit.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.chunker = TextChunker::new(max_chunk_size.min(self.provider.max_text_length()));
        self
    }

    pub fn with_bridge_settings(mut self, settings: BridgeSettings) -> Self {
        self.bridge_settings = settings;
        self
    }

    pub fn with_default_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = voice.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn SynthesisProvider> {
        &self.provider
    }

    pub fn runtime_handle(&self) -> Handle {
        self.runtime.handle()
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn max_chunk_size(&self) -> usize {
        self.chunker.max_chunk_size()
    }

    /// Token that cancels every in-flight call made through this service.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn emotional_context(&self) -> SharedEmotionalContext {
        self.emotional_context.clone()
    }

    pub fn process_emotional_data(&self, raw: &Value) -> EmotionalState {
        self.emotional_context.lock().process_emotional_data(raw)
    }

    pub fn adaptation_guidance(&self) -> AdaptationGuidance {
        self.emotional_context.lock().adaptation_guidance()
    }

    pub fn emotional_summary(&self) -> EmotionalSummary {
        self.emotional_context.lock().summary()
    }

    pub fn list_voices(&self) -> &[VoiceDescriptor] {
        self.provider.list_voices()
    }

    pub fn chunking_info(&self, text: &str) -> ChunkingInfo {
        self.chunker.info(text)
    }

    /// Chunk `text`, synthesize every chunk in order and return the concatenated audio.
    ///
    /// Blocks the calling thread; must not be called from inside an async runtime.
    pub fn synthesize(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Result<Bytes> {
        let chunks = self.prepare(text, voice_id)?;
        ensure_blocking_context()?;

        let started = Instant::now();
        let provider = self.provider.clone();
        let cancel = self.cancel.child_token();
        let total = chunks.len();

        let audio = self.runtime.handle().block_on(async move {
            let mut audio = BytesMut::new();
            for chunk in &chunks {
                debug!("Synthesizing chunk {}/{} ({} chars)", chunk.index + 1, total, chunk.text.chars().count());
                let part = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TtsError::Cancelled),
                    part = provider.synthesize(&chunk.text, voice_id, options) => part?,
                };
                audio.extend_from_slice(&part);
            }
            Ok(audio.freeze())
        })?;

        info!("Synthesized {} bytes from {} text chunks in {:?}", audio.len(), total, started.elapsed());
        Ok(audio)
    }

    /// Chunk `text` and return a blocking iterator over the audio of every chunk, in order.
    ///
    /// Each text chunk is streamed through its own [`StreamBridge`]; the next request starts
    /// only after the previous chunk's audio has been fully delivered.
    pub fn stream(&self, text: &str, voice_id: &str, options: &SynthesisOptions) -> Result<SpeechStream> {
        let chunks = self.prepare(text, voice_id)?;
        ensure_blocking_context()?;
        debug!("Streaming {} text chunks with voice {}", chunks.len(), voice_id);

        Ok(SpeechStream {
            runtime: self.runtime.clone(),
            provider: self.provider.clone(),
            voice_id: voice_id.to_string(),
            options: options.clone(),
            settings: self.bridge_settings,
            pending: chunks.into(),
            current: None,
            cancel: self.cancel.child_token(),
            totals: StreamStats::default(),
            started: Instant::now(),
            finished: false,
        })
    }

    /// Round-trip a short phrase with the default voice. Returns the audio size.
    pub fn test_connection(&self) -> Result<usize> {
        let audio = self.synthesize("Hello, this is a connection test.", &self.default_voice, &SynthesisOptions::default())?;
        info!("✅ {} connection OK ({} bytes)", self.provider.name(), audio.len());
        Ok(audio.len())
    }

    fn prepare(&self, text: &str, voice_id: &str) -> Result<Vec<TextChunk>> {
        validate_voice(voice_id)?;
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(TtsError::validation("text is empty"));
        }
        Ok(chunks)
    }
}

fn ensure_blocking_context() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(TtsError::configuration("blocking synthesis called from inside an async runtime"));
    }
    Ok(())
}

/// Blocking iterator over the audio of a chunked text.
///
/// Ends with `None` after the last chunk's audio, or yields one `Err` and then `None`.
/// Dropping it cancels the in-flight request.
pub struct SpeechStream {
    provider: Arc<dyn SynthesisProvider>,
    voice_id: String,
    options: SynthesisOptions,
    settings: BridgeSettings,
    pending: VecDeque<TextChunk>,
    current: Option<StreamBridge>,
    cancel: CancellationToken,
    totals: StreamStats,
    started: Instant,
    finished: bool,
    runtime: RuntimeHandle, // Keeps an owned runtime alive after the service is dropped
}

impl SpeechStream {
    /// Totals across every text chunk delivered so far.
    pub fn stats(&self) -> StreamStats {
        StreamStats { elapsed: self.started.elapsed(), ..self.totals }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Text chunks not yet requested.
    pub fn remaining_chunks(&self) -> usize {
        self.pending.len()
    }

    fn open_next(&mut self) -> Option<Result<()>> {
        let chunk = self.pending.pop_front()?;
        debug!("Streaming text chunk {} ({} chars)", chunk.index, chunk.text.chars().count());

        let audio = self.provider.stream(&chunk.text, &self.voice_id, &self.options);
        let mut bridge = StreamBridge::new(self.runtime.handle(), self.settings).with_cancel_token(self.cancel.child_token());
        if let Err(e) = bridge.start(audio) {
            return Some(Err(e));
        }
        self.current = Some(bridge);
        Some(Ok(()))
    }
}

impl Iterator for SpeechStream {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.current.is_none() {
                match self.open_next() {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.finished = true;
                        let stats = self.stats();
                        info!("Speech stream complete: {} chunks, {} bytes in {:?}", stats.chunks, stats.bytes, stats.elapsed);
                        return None;
                    }
                }
            }

            let bridge = self.current.as_mut()?;
            match bridge.next() {
                Some(Ok(audio)) => {
                    if self.totals.first_chunk_latency.is_none() {
                        self.totals.first_chunk_latency = Some(self.started.elapsed());
                    }
                    self.totals.chunks += 1;
                    self.totals.bytes += audio.len();
                    return Some(Ok(audio));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.current = None;
                    return Some(Err(e));
                }
                None => self.current = None,
            }
        }
    }
}
