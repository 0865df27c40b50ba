//! voice-stream - synthesize text with a cloud TTS provider and write the MP3 audio.
//!
//! Text comes from the command line or stdin. Long input is split into provider-sized chunks;
//! with `--stream` every audio chunk is written as soon as it arrives.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use voice_stream::config::AppConfig;
use voice_stream::tts::{SynthesisService, TextChunker};

/// Input text from the positional argument, or all of stdin.
fn read_text(config: &AppConfig) -> Result<String> {
    if let Some(ref text) = config.text {
        return Ok(text.clone());
    }
    let mut text = String::new();
    io::stdin().read_to_string(&mut text).context("Failed to read text from stdin")?;
    Ok(text)
}

fn open_output(config: &AppConfig) -> Result<Box<dyn Write>> {
    match config.output {
        Some(ref path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Cancel every in-flight request when Ctrl+C arrives.
fn install_interrupt_handler(service: &SynthesisService) {
    let cancel = service.cancel_token();
    service.runtime_handle().spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    debug!("Ctrl+C handler unavailable: {}", e);
                    return;
                }
                info!("🛑 Received Ctrl+C, cancelling synthesis...");
                cancel.cancel();
            }
        }
    });
}

fn run(config: &AppConfig) -> Result<()> {
    let text = read_text(config)?;

    if config.chunk_info {
        let info = TextChunker::new(config.max_chunk_size).info(&text);
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let options = config.synthesis_options()?;
    let service = SynthesisService::from_config(&config.tts_config())?.with_bridge_settings(config.bridge_settings());

    if let Some(affect) = config.affect_value()? {
        let state = service.process_emotional_data(&affect);
        if let Some((emotion, intensity)) = state.dominant() {
            info!("🎭 Dominant emotion: {} ({:.2})", emotion, intensity);
        }
        let guidance = service.adaptation_guidance();
        if guidance.should_adapt {
            info!("🎭 Adaptation guidance: {}", serde_json::to_string(&guidance)?);
        }
    }

    install_interrupt_handler(&service);

    let voice = config.effective_voice();
    let mut output = open_output(config)?;
    let mut written = 0usize;

    if config.stream {
        let mut stream = service.stream(&text, voice, &options)?;
        for audio in stream.by_ref() {
            let audio = audio?;
            output.write_all(&audio)?;
            output.flush()?;
            written += audio.len();
        }
        let stats = stream.stats();
        if let Some(latency) = stats.first_chunk_latency {
            info!("First audio after {:?}", latency);
        }
    } else {
        let audio = service.synthesize(&text, voice, &options)?;
        output.write_all(&audio)?;
        written = audio.len();
    }
    output.flush()?;

    if written == 0 {
        warn!("No audio was written");
    }
    info!("✅ Wrote {} bytes of audio", written);
    Ok(())
}

fn main() {
    let config = AppConfig::from_args();

    // Respect RUST_LOG, fall back to the verbose flag. Logs go to stderr so stdout can carry audio.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    debug!("voice-stream v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(2);
    }
    config.log_config();

    if let Err(e) = run(&config) {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}
