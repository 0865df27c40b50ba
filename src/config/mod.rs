//! Configuration module for the speech streamer.
//!
//! Provides CLI argument parsing, the library configuration surface and voice catalogs.

#[allow(clippy::module_inception)]
mod config;
pub mod voices;

pub use config::{AppConfig, ProviderKind, TtsConfig};
