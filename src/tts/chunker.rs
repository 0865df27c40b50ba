//! Boundary-aware text chunking for provider request limits.
//!
//! Long text is cut into segments no longer than a configured number of characters,
//! preferring the rightmost natural pause inside the upper half of each segment.
//! Boundary classes are tried in strict priority order:
//!
//! 1. sentence terminators (`.`, `!`, `?` followed by whitespace or end of text)
//! 2. semicolons
//! 3. colons
//! 4. commas
//! 5. discourse connectives ("however", "for example", "meanwhile", ...), split before the phrase
//! 6. bare whitespace
//!
//! When no class yields a split point the segment is cut exactly at the limit.
//! All lengths and offsets are measured in `char`s.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Default segment size, leaving headroom under a 1000 character request limit.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 995;

/// Characters past the limit that are still visible to boundary matching.
const LOOKAHEAD_CHARS: usize = 100;

/// Length of the preview shown in chunking plans.
const PREVIEW_CHARS: usize = 50;

/// Punctuation classes in priority order. Each must be followed by whitespace (or end of text).
const PUNCTUATION_CLASSES: [&[char]; 4] = [&['.', '!', '?'], &[';'], &[':'], &[',']];

/// Discourse connectives; a chunk may end right before one of these.
const CONNECTIVE_PHRASES: &[&str] = &[
    "and", "but", "or", "so", "yet", "for", "nor", "because", "since", "although", "though", "while", "whereas",
    "however", "nevertheless", "furthermore", "moreover", "therefore", "thus", "consequently", "meanwhile",
    "subsequently", "finally", "ultimately", "in conclusion", "in summary", "additionally", "first", "second",
    "third", "next", "then", "after", "before", "during", "lastly", "for example", "for instance", "such as",
    "including", "like", "namely", "specifically", "particularly", "in other words", "that is", r"i\.e\.",
    r"e\.g\.",
];

static CONNECTIVES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\s+(?:{})\s+", CONNECTIVE_PHRASES.join("|"))).expect("connective pattern is a valid regex")
});

/// A bounded, contiguous piece of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Trimmed chunk text
    pub text: String,
    /// 0-based position in the segmentation
    pub index: usize,
    /// True only for the last chunk
    pub is_final: bool,
    /// Char offset of `text` in the original input (inclusive)
    pub original_start: usize,
    /// Char offset of `text` in the original input (exclusive)
    pub original_end: usize,
}

/// Per-chunk entry of a [`ChunkingInfo`] report.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub length: usize,
    pub text_preview: String,
    pub is_final: bool,
}

/// Summary of how a text would be segmented.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkingInfo {
    pub original_length: usize,
    pub chunk_count: usize,
    pub chunks: Vec<ChunkSummary>,
    pub avg_chunk_size: f64,
    pub max_chunk_size_used: usize,
}

/// Splits text into provider-sized chunks along natural speech boundaries.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_chunk_size: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_SIZE)
    }
}

impl TextChunker {
    /// Create a chunker. A limit of zero is treated as one character.
    pub fn new(max_chunk_size: usize) -> Self {
        Self { max_chunk_size: max_chunk_size.max(1) }
    }

    /// Maximum number of characters per chunk.
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Segment `text` into ordered chunks.
    ///
    /// Empty or whitespace-only input yields no chunks. Input that fits the limit after
    /// trimming yields exactly one final chunk without any boundary search.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let leading_bytes = text.len() - text.trim_start().len();
        let mut cursor = text[..leading_bytes].chars().count();
        let max = self.max_chunk_size;

        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut rest = trimmed;

        while !rest.is_empty() {
            let fits = rest.chars().nth(max).is_none();
            let (split_byte, split_chars) = if fits { (rest.len(), rest.chars().count()) } else { find_split(rest, max) };

            let piece = rest[..split_byte].trim_end();
            let piece_chars = piece.chars().count();
            chunks.push(TextChunk {
                text: piece.to_string(),
                index: chunks.len(),
                is_final: false,
                original_start: cursor,
                original_end: cursor + piece_chars,
            });

            let remainder = &rest[split_byte..];
            let next = remainder.trim_start();
            cursor += split_chars + remainder[..remainder.len() - next.len()].chars().count();
            rest = next;
        }

        if let Some(last) = chunks.last_mut() {
            last.is_final = true;
        }

        if chunks.len() > 1 {
            debug!("Split {} chars into {} chunks (max {})", trimmed.chars().count(), chunks.len(), max);
        }

        chunks
    }

    /// Describe how `text` would be chunked without synthesizing anything.
    pub fn info(&self, text: &str) -> ChunkingInfo {
        let chunks = self.chunk(text);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        let total: usize = lengths.iter().sum();

        ChunkingInfo {
            original_length: text.chars().count(),
            chunk_count: chunks.len(),
            avg_chunk_size: if chunks.is_empty() { 0.0 } else { total as f64 / chunks.len() as f64 },
            max_chunk_size_used: lengths.iter().copied().max().unwrap_or(0),
            chunks: chunks
                .iter()
                .zip(&lengths)
                .map(|(chunk, &length)| ChunkSummary { index: chunk.index, length, text_preview: preview(&chunk.text), is_final: chunk.is_final })
                .collect(),
        }
    }
}

/// Chunk `text` and return only the chunk strings.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    TextChunker::new(max_chunk_size).chunk(text).into_iter().map(|c| c.text).collect()
}

/// Pick the split point for `rest`, which is known to be longer than `max` chars.
///
/// Returns `(byte offset, char offset)` of the cut. The cut is always in `1..=max`.
fn find_split(rest: &str, max: usize) -> (usize, usize) {
    let window: Vec<(usize, char)> = rest.char_indices().take(max + LOOKAHEAD_CHARS + 1).collect();
    let byte_at = |pos: usize| window.get(pos).map_or(rest.len(), |&(byte, _)| byte);
    let floor = (max / 2).max(1);

    for class in PUNCTUATION_CLASSES {
        if let Some(pos) = rightmost_punctuation(&window, class, floor, max) {
            return (byte_at(pos), pos);
        }
    }

    if let Some(pos) = rightmost_connective(rest, &window, floor, max) {
        return (byte_at(pos), pos);
    }

    if let Some(pos) = (floor..=max.min(window.len() - 1)).rev().find(|&i| window[i].1.is_whitespace()) {
        return (byte_at(pos), pos);
    }

    (byte_at(max), max)
}

/// Rightmost cut just after a character of `class` that is followed by whitespace or end of text.
fn rightmost_punctuation(window: &[(usize, char)], class: &[char], floor: usize, max: usize) -> Option<usize> {
    (floor..=max)
        .rev()
        .find(|&cut| class.contains(&window[cut - 1].1) && window.get(cut).is_none_or(|&(_, next)| next.is_whitespace()))
}

/// Rightmost cut just before a discourse connective phrase.
fn rightmost_connective(rest: &str, window: &[(usize, char)], floor: usize, max: usize) -> Option<usize> {
    let end = window.last().map_or(rest.len(), |&(byte, c)| byte + c.len_utf8());

    CONNECTIVES
        .find_iter(&rest[..end])
        .filter_map(|m| window.binary_search_by_key(&m.start(), |&(byte, _)| byte).ok())
        .filter(|&cut| cut >= floor && cut <= max)
        .last()
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}
