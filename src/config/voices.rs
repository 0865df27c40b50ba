//! Static voice catalogs for the supported providers.
//!
//! Catalogs are compile-time slices sorted by id so lookups are a binary search.
//! The Hume catalog mixes predefined instant-mode voices (UUID ids) with description-driven
//! voices that only work for whole-audio synthesis.

use std::collections::BTreeSet;

use super::config::ProviderKind;
use crate::tts::provider::{Gender, VoiceDescriptor};

pub const UNREAL_DEFAULT_VOICE: &str = "af_sky";

/// Predefined coaching voice usable in instant mode.
pub const HUME_UX_COACH_VOICE: &str = "358105e3-807d-4f0a-9b17-c35751a1040b";

/// Voice used in instant mode when the requested one is not predefined.
pub const HUME_DEFAULT_INSTANT_VOICE: &str = "ee966436-01ab-4810-a880-9e0a532e03b8";

/// Voices accepted by Hume instant mode.
pub const HUME_INSTANT_VOICES: &[&str] = &[HUME_UX_COACH_VOICE, HUME_DEFAULT_INSTANT_VOICE];

/// Catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub display_name: &'static str,
    pub gender: Gender,
    pub language: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
}

const UNREAL_VOICES: &[(&str, Voice)] = &[
    (
        "af_bella",
        Voice {
            display_name: "Bella (Female)",
            gender: Gender::Female,
            language: "en-US",
            description: "Clear and professional female voice",
            tags: &["clear", "professional"],
        },
    ),
    (
        "af_nicole",
        Voice {
            display_name: "Nicole (Female)",
            gender: Gender::Female,
            language: "en-US",
            description: "Energetic and expressive female voice",
            tags: &["energetic", "expressive"],
        },
    ),
    (
        "af_sarah",
        Voice {
            display_name: "Sarah (Female)",
            gender: Gender::Female,
            language: "en-US",
            description: "Natural and conversational female voice",
            tags: &["conversational", "natural"],
        },
    ),
    (
        "af_sky",
        Voice {
            display_name: "Sky (Female)",
            gender: Gender::Female,
            language: "en-US",
            description: "Friendly and warm female voice",
            tags: &["friendly", "warm"],
        },
    ),
    (
        "am_adam",
        Voice {
            display_name: "Adam (Male)",
            gender: Gender::Male,
            language: "en-US",
            description: "Professional and authoritative male voice",
            tags: &["authoritative", "professional"],
        },
    ),
    (
        "am_michael",
        Voice {
            display_name: "Michael (Male)",
            gender: Gender::Male,
            language: "en-US",
            description: "Warm and friendly male voice",
            tags: &["friendly", "warm"],
        },
    ),
    (
        "bf_emma",
        Voice {
            display_name: "Emma (British Female)",
            gender: Gender::Female,
            language: "en-GB",
            description: "Elegant British female voice",
            tags: &["british", "elegant"],
        },
    ),
    (
        "bf_isabella",
        Voice {
            display_name: "Isabella (British Female)",
            gender: Gender::Female,
            language: "en-GB",
            description: "Sophisticated British female voice",
            tags: &["british", "sophisticated"],
        },
    ),
    (
        "bm_george",
        Voice {
            display_name: "George (British Male)",
            gender: Gender::Male,
            language: "en-GB",
            description: "Distinguished British male voice",
            tags: &["british", "distinguished"],
        },
    ),
    (
        "bm_lewis",
        Voice {
            display_name: "Lewis (British Male)",
            gender: Gender::Male,
            language: "en-GB",
            description: "Contemporary British male voice",
            tags: &["british", "contemporary"],
        },
    ),
];

const HUME_VOICES: &[(&str, Voice)] = &[
    (
        HUME_UX_COACH_VOICE,
        Voice {
            display_name: "UX Coach EVI",
            gender: Gender::Female,
            language: "en-US",
            description: "UX Coach EVI - A warm, friendly female voice with clear pronunciation. Great for educational content.",
            tags: &["emotional", "instant", "natural"],
        },
    ),
    (
        HUME_DEFAULT_INSTANT_VOICE,
        Voice {
            display_name: "Default Instant Voice",
            gender: Gender::Female,
            language: "en-US",
            description: "Consistent custom voice for low-latency instant streaming",
            tags: &["default", "instant"],
        },
    ),
    (
        "friendly_casual",
        Voice {
            display_name: "Friendly Casual",
            gender: Gender::Female,
            language: "en-US",
            description: "friendly casual female voice with emotional intelligence",
            tags: &["casual", "emotional", "friendly"],
        },
    ),
    (
        "professional",
        Voice {
            display_name: "Professional",
            gender: Gender::Male,
            language: "en-US",
            description: "clear and professional male voice with emotional intelligence",
            tags: &["clear", "emotional", "professional"],
        },
    ),
    (
        "warm_natural",
        Voice {
            display_name: "Warm Natural",
            gender: Gender::Female,
            language: "en-US",
            description: "warm and natural-sounding female voice with emotional intelligence",
            tags: &["emotional", "natural", "warm"],
        },
    ),
];

/// Friendly names accepted by UnrealSpeech, sorted by alias.
const UNREAL_ALIASES: &[(&str, &str)] = &[("friendly_casual", "af_sky"), ("professional", "am_adam"), ("warm_natural", "af_bella")];

fn catalog(kind: ProviderKind) -> &'static [(&'static str, Voice)] {
    match kind {
        ProviderKind::UnrealSpeech => UNREAL_VOICES,
        ProviderKind::Hume => HUME_VOICES,
    }
}

/// Look up a voice by exact id.
pub fn get_voice(kind: ProviderKind, id: &str) -> Option<&'static Voice> {
    let voices = catalog(kind);
    voices.binary_search_by_key(&id, |&(n, _)| n).ok().map(|idx| &voices[idx].1)
}

/// Map an UnrealSpeech alias to its native id. Unmapped ids pass through verbatim.
pub fn resolve_unreal_voice(id: &str) -> &str {
    UNREAL_ALIASES.binary_search_by_key(&id, |&(alias, _)| alias).map_or(id, |idx| UNREAL_ALIASES[idx].1)
}

pub fn is_instant_voice(id: &str) -> bool {
    HUME_INSTANT_VOICES.contains(&id)
}

/// Description for Hume whole-audio synthesis. Unknown ids are used as the description itself.
pub fn hume_description(id: &str) -> &str {
    get_voice(ProviderKind::Hume, id).map_or(id, |v| v.description)
}

/// Catalog as provider-facing descriptors.
pub fn descriptors(kind: ProviderKind) -> Vec<VoiceDescriptor> {
    catalog(kind)
        .iter()
        .map(|(id, voice)| VoiceDescriptor {
            id: id.to_string(),
            display_name: voice.display_name.to_string(),
            gender: voice.gender,
            language: voice.language.to_string(),
            tags: voice.tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        })
        .collect()
}

/// Print every voice for `kind`.
pub fn print_voices(kind: ProviderKind) {
    let voices = catalog(kind);
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  {} - {} voices", kind, voices.len());
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("{:<38} {:<26} {:<8} LANG", "VOICE", "NAME", "GENDER");
    println!("{}", "─".repeat(80));

    for (id, voice) in voices {
        println!("{:<38} {:<26} {:<8} {}", id, voice.display_name, voice.gender, voice.language);
    }

    println!();
    println!("Default: {}", kind.default_voice());
    match kind {
        ProviderKind::UnrealSpeech => {
            println!("Aliases: {}", UNREAL_ALIASES.iter().map(|(a, v)| format!("{} -> {}", a, v)).collect::<Vec<_>>().join(", "));
        }
        ProviderKind::Hume => {
            println!("Streaming uses instant mode and only accepts: {}", HUME_INSTANT_VOICES.join(", "));
        }
    }
    println!();
    println!("Usage:");
    println!("  ./voice-stream --provider {} --voice {} \"Hello there\"", kind, kind.default_voice());
}

/// Print detailed information about a specific voice.
pub fn print_voice_info(kind: ProviderKind, id: &str) -> anyhow::Result<()> {
    let resolved = match kind {
        ProviderKind::UnrealSpeech => resolve_unreal_voice(id),
        ProviderKind::Hume => id,
    };
    let voice = get_voice(kind, resolved)
        .ok_or_else(|| anyhow::anyhow!("Voice '{}' not found for {}. Run with --list-voices to see available voices", id, kind))?;

    println!();
    println!("Voice: {}", resolved);
    println!("{}", "─".repeat(40));
    println!("Name:          {}", voice.display_name);
    println!("Gender:        {}", voice.gender);
    println!("Language:      {}", voice.language);
    println!("Description:   {}", voice.description);
    println!("Tags:          {}", voice.tags.join(", "));
    if kind == ProviderKind::Hume {
        println!("Instant mode:  {}", if is_instant_voice(resolved) { "yes" } else { "no (whole-audio synthesis only)" });
    }
    println!();

    Ok(())
}
