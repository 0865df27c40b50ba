//! Application configuration and CLI argument parsing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::voices;
use crate::tts::bridge::BridgeSettings;
use crate::tts::chunker::DEFAULT_MAX_CHUNK_SIZE;
use crate::tts::error::TtsError;
use crate::tts::provider::{EmotionalParameters, SynthesisOptions};

/// Upstream speech provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// HTTP-streamed MP3 with fixed-size windows (default)
    #[default]
    #[value(name = "unrealspeech")]
    UnrealSpeech,
    /// Instant-mode JSON streaming with emotional synthesis
    #[value(alias = "hume_evi3", alias = "hume-evi3")]
    #[serde(alias = "hume_evi3", alias = "hume-evi3")]
    Hume,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::UnrealSpeech, ProviderKind::Hume];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::UnrealSpeech => "unrealspeech",
            ProviderKind::Hume => "hume",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::UnrealSpeech => "UNREALSPEECH_API_KEY",
            ProviderKind::Hume => "HUME_API_KEY",
        }
    }

    pub fn default_voice(&self) -> &'static str {
        match self {
            ProviderKind::UnrealSpeech => voices::UNREAL_DEFAULT_VOICE,
            ProviderKind::Hume => voices::HUME_DEFAULT_INSTANT_VOICE,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = TtsError;

    /// Case-insensitive. Unknown names are a configuration error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrealspeech" => Ok(ProviderKind::UnrealSpeech),
            "hume" | "hume_evi3" | "hume-evi3" => Ok(ProviderKind::Hume),
            other => Err(TtsError::Configuration(format!("unknown TTS provider '{}' (expected unrealspeech or hume)", other))),
        }
    }
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

/// Library configuration for one synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub default_voice: Option<String>, // Provider default when unset
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    #[serde(default)]
    pub base_url: Option<String>, // Override the provider API origin
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration, // Read timeout per body read
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

impl TtsConfig {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            default_voice: None,
            bitrate: default_bitrate(),
            base_url: None,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            max_chunk_size: default_max_chunk_size(),
        }
    }

    /// Build from `TTS_PROVIDER`, the provider's API key variable, `TTS_VOICE` and `TTS_BITRATE`.
    pub fn from_env() -> Result<Self, TtsError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, TtsError> {
        let provider = match var("TTS_PROVIDER").filter(|name| !name.trim().is_empty()) {
            Some(name) => name.parse()?,
            None => ProviderKind::default(),
        };
        let api_key = var(provider.api_key_env()).unwrap_or_default();

        let mut config = Self::new(provider, api_key);
        config.default_voice = var("TTS_VOICE").filter(|v| !v.trim().is_empty());
        if let Some(bitrate) = var("TTS_BITRATE") {
            config.bitrate = bitrate;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = Some(voice.into());
        self
    }

    pub fn effective_default_voice(&self) -> &str {
        self.default_voice.as_deref().unwrap_or_else(|| self.provider.default_voice())
    }

    /// Check settings that must hold before any provider is built.
    pub fn validate(&self) -> Result<(), TtsError> {
        if self.api_key.trim().is_empty() {
            return Err(TtsError::Configuration(format!("{} requires an API key (set {})", self.provider, self.provider.api_key_env())));
        }
        if !is_valid_bitrate(&self.bitrate) {
            return Err(TtsError::Configuration(format!("invalid bitrate '{}' (expected e.g. 192k)", self.bitrate)));
        }
        if let Some(url) = &self.base_url {
            let parsed = reqwest::Url::parse(url).map_err(|e| TtsError::Configuration(format!("invalid base URL '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                return Err(TtsError::Configuration(format!("base URL must be http(s): {}", url)));
            }
        }
        if self.max_chunk_size == 0 {
            return Err(TtsError::configuration("max chunk size must be positive"));
        }
        Ok(())
    }
}

fn is_valid_bitrate(bitrate: &str) -> bool {
    bitrate.strip_suffix('k').is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Command line for the `voice-stream` binary.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-stream")]
#[command(author, version, about = "Stream synthesized speech from cloud TTS providers", long_about = None)]
pub struct AppConfig {
    /// Text to synthesize (read from stdin when omitted)
    pub text: Option<String>,

    /// List the provider's voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Show details for one voice and exit
    #[arg(long)]
    pub voice_info: Option<String>,

    /// Print the chunking plan for the text and exit
    #[arg(long)]
    pub chunk_info: bool,

    /// Speech provider
    #[arg(long, value_enum, env = "TTS_PROVIDER", default_value = "unrealspeech")]
    pub provider: ProviderKind,

    /// UnrealSpeech API key
    #[arg(long, env = "UNREALSPEECH_API_KEY", hide_env_values = true)]
    pub unrealspeech_api_key: Option<String>,

    /// Hume API key
    #[arg(long, env = "HUME_API_KEY", hide_env_values = true)]
    pub hume_api_key: Option<String>,

    /// Voice id or alias (provider default when omitted)
    #[arg(long, env = "TTS_VOICE")]
    pub voice: Option<String>,

    /// Speaking rate multiplier (0.5-2.0)
    #[arg(long, default_value = "1.0")]
    pub speed: f32,

    /// Pitch multiplier (0.5-1.5)
    #[arg(long, default_value = "1.0")]
    pub pitch: f32,

    /// Sampling temperature (0.1-0.8)
    #[arg(long, default_value = "0.25", value_parser = parse_temperature)]
    pub temperature: f32,

    /// MP3 bitrate
    #[arg(long, env = "TTS_BITRATE", default_value = "192k")]
    pub bitrate: String,

    /// Override the provider API origin
    #[arg(long)]
    pub base_url: Option<String>,

    /// Write chunks as they arrive instead of synthesizing the whole text first
    #[arg(long)]
    pub stream: bool,

    /// Output file (stdout when omitted)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Affect reading as JSON, e.g. '{"emotions":{"frustration":0.7},"confidence":0.9}'
    #[arg(long)]
    pub affect: Option<String>,

    /// Explicit emotions as a JSON object of name -> intensity
    #[arg(long)]
    pub emotions: Option<String>,

    /// Explicit prosody as a JSON object of name -> value
    #[arg(long)]
    pub prosody: Option<String>,

    /// Maximum characters per synthesis request
    #[arg(long, default_value = "995")]
    pub max_chunk_size: usize,

    /// Seconds to wait for each streamed audio chunk
    #[arg(long, default_value = "30")]
    pub stream_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let config = Self::parse();

        if config.list_voices {
            voices::print_voices(config.provider);
            std::process::exit(0);
        }

        if let Some(ref voice_id) = config.voice_info {
            match voices::print_voice_info(config.provider, voice_id) {
                Ok(_) => std::process::exit(0),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// API key for the selected provider.
    pub fn effective_api_key(&self) -> Option<&str> {
        match self.provider {
            ProviderKind::UnrealSpeech => self.unrealspeech_api_key.as_deref(),
            ProviderKind::Hume => self.hume_api_key.as_deref(),
        }
    }

    pub fn effective_voice(&self) -> &str {
        self.voice.as_deref().unwrap_or_else(|| self.provider.default_voice())
    }

    /// Library configuration derived from the command line.
    pub fn tts_config(&self) -> TtsConfig {
        TtsConfig {
            provider: self.provider,
            api_key: self.effective_api_key().unwrap_or_default().to_string(),
            default_voice: self.voice.clone(),
            bitrate: self.bitrate.clone(),
            base_url: self.base_url.clone(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout().max(Duration::from_secs(self.stream_timeout_secs)),
            max_chunk_size: self.max_chunk_size,
        }
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings { item_timeout: Duration::from_secs(self.stream_timeout_secs), ..BridgeSettings::default() }
    }

    /// Request options, including any explicit emotion/prosody JSON.
    pub fn synthesis_options(&self) -> Result<SynthesisOptions> {
        let emotions = parse_value_map(self.emotions.as_deref()).context("Invalid --emotions JSON")?;
        let prosody = parse_value_map(self.prosody.as_deref()).context("Invalid --prosody JSON")?;
        let parameters = EmotionalParameters { emotions, prosody };

        Ok(SynthesisOptions {
            speed: self.speed,
            pitch: self.pitch,
            temperature: self.temperature,
            emotional_parameters: (!parameters.is_empty()).then_some(parameters),
            voice_description: None,
        })
    }

    /// Parsed `--affect` payload.
    pub fn affect_value(&self) -> Result<Option<serde_json::Value>> {
        self.affect.as_deref().map(serde_json::from_str).transpose().context("Invalid --affect JSON")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.list_voices || self.voice_info.is_some() {
            return Ok(());
        }

        if !self.chunk_info {
            self.tts_config().validate()?;
        }

        let (lo, hi) = SynthesisOptions::SPEED_RANGE;
        if !(lo..=hi).contains(&self.speed) {
            anyhow::bail!("Speed must be between {} and {}", lo, hi);
        }

        let (lo, hi) = SynthesisOptions::PITCH_RANGE;
        if !(lo..=hi).contains(&self.pitch) {
            anyhow::bail!("Pitch must be between {} and {}", lo, hi);
        }

        if self.max_chunk_size == 0 {
            anyhow::bail!("Max chunk size must be positive");
        }

        if self.stream_timeout_secs == 0 {
            anyhow::bail!("Stream timeout must be at least one second");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Provider: {}", self.provider);
        info!("  Voice: {}", self.effective_voice());
        info!("  Speed: {}, pitch: {}, temperature: {}", self.speed, self.pitch, self.temperature);
        info!("  Bitrate: {}", self.bitrate);
        if let Some(ref url) = self.base_url {
            info!("  Base URL: {}", url);
        }
        info!("  Mode: {}", if self.stream { "streaming" } else { "buffered" });
        info!("  Max chunk size: {}", self.max_chunk_size);
        info!("  Stream timeout: {}s", self.stream_timeout_secs);
        match self.output {
            Some(ref path) => info!("  Output: {}", path.display()),
            None => info!("  Output: stdout"),
        }
    }
}

fn parse_value_map(json: Option<&str>) -> Result<BTreeMap<String, f32>> {
    match json {
        Some(s) => Ok(serde_json::from_str(s)?),
        None => Ok(BTreeMap::new()),
    }
}

/// Parse and validate temperature value (0.1-0.8).
fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    let (lo, hi) = SynthesisOptions::TEMPERATURE_RANGE;
    if (lo..=hi).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be between {} and {}, got {}", lo, hi, value))
    }
}
