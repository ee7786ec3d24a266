//! Entropy triage: split raw text into bounded segments and sort them by
//! information density.
//!
//! Text is broken into units (runs of word characters, or a single
//! non-space punctuation character) which are greedily packed into
//! segments of at most `max_batch_chars` characters. Each segment is then
//! scored by the Shannon entropy of its character distribution. Low-entropy
//! segments are repetitive or boilerplate and go to the archive; the rest
//! are kept verbatim.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default segment size in characters.
pub const DEFAULT_MAX_BATCH_CHARS: usize = 512;

/// Default entropy cutoff (bits per character).
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 3.0;

/// A word (`\w+`) or a single punctuation character.
///
/// Shared with [`WordTokenizer`](crate::provider::tokenizer::WordTokenizer)
/// so one token there is exactly one triage unit.
pub(crate) static UNIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("unit pattern is valid"));

/// Triage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Maximum characters per segment. A single unit longer than this still
    /// forms its own segment.
    pub max_batch_chars: usize,
    /// Segments with entropy at or above this value are retained.
    pub entropy_threshold: f64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            max_batch_chars: DEFAULT_MAX_BATCH_CHARS,
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
        }
    }
}

impl TriageConfig {
    pub fn with_max_batch_chars(mut self, chars: usize) -> Self {
        self.max_batch_chars = chars;
        self
    }

    pub fn with_entropy_threshold(mut self, threshold: f64) -> Self {
        self.entropy_threshold = threshold;
        self
    }
}

/// A contiguous slice of the source text produced by [`split_into_batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The source slice, from the first unit's start to the last unit's end.
    pub text: &'a str,
    /// Length of `text` in characters (not bytes).
    pub char_len: usize,
}

impl Segment<'_> {
    /// Entropy of this segment's characters.
    pub fn entropy(&self) -> f64 {
        calculate_entropy(self.text)
    }
}

/// Result of [`classify_by_entropy`]. Every input segment lands in exactly
/// one of the two lists, in its original relative order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification<'a> {
    /// High-density segments kept verbatim.
    pub retain: Vec<Segment<'a>>,
    /// Low-density segments to be summarized into the archive.
    pub archive: Vec<Segment<'a>>,
}

impl Classification<'_> {
    /// Total number of segments classified.
    pub fn len(&self) -> usize {
        self.retain.len() + self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retain.is_empty() && self.archive.is_empty()
    }
}

/// Split `text` into segments of at most `max_batch_chars` characters.
///
/// Units are packed greedily. A segment's length counts the whitespace
/// between its units, because the segment is the literal source slice. A
/// unit that alone exceeds the limit becomes a segment by itself.
pub fn split_into_batches(text: &str, max_batch_chars: usize) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    // (start byte, end byte, char length) of the segment being built.
    let mut current: Option<(usize, usize, usize)> = None;

    for unit in UNIT_PATTERN.find_iter(text) {
        let unit_chars = unit.as_str().chars().count();
        current = match current {
            None => Some((unit.start(), unit.end(), unit_chars)),
            Some((start, end, chars)) => {
                let gap = text.get(end..unit.start()).unwrap_or_default();
                let grown = chars + gap.chars().count() + unit_chars;
                if grown > max_batch_chars {
                    segments.push(make_segment(text, start, end, chars));
                    Some((unit.start(), unit.end(), unit_chars))
                } else {
                    Some((start, unit.end(), grown))
                }
            }
        };
    }

    if let Some((start, end, chars)) = current {
        segments.push(make_segment(text, start, end, chars));
    }

    debug!(
        "split {} chars into {} segment(s) (max {} chars)",
        text.chars().count(),
        segments.len(),
        max_batch_chars
    );
    segments
}

fn make_segment(text: &str, start: usize, end: usize, char_len: usize) -> Segment<'_> {
    Segment {
        text: text.get(start..end).unwrap_or_default(),
        char_len,
    }
}

/// Shannon entropy (bits) of the character frequency distribution of `text`.
///
/// Returns `0.0` for empty text.
pub fn calculate_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Partition segments by entropy. `entropy >= threshold` retains.
pub fn classify_by_entropy(segments: Vec<Segment<'_>>, threshold: f64) -> Classification<'_> {
    let mut out = Classification::default();
    for segment in segments {
        if segment.entropy() >= threshold {
            out.retain.push(segment);
        } else {
            out.archive.push(segment);
        }
    }
    out
}

/// Split and classify in one call.
pub fn triage<'a>(text: &'a str, config: &TriageConfig) -> Classification<'a> {
    let segments = split_into_batches(text, config.max_batch_chars);
    let classified = classify_by_entropy(segments, config.entropy_threshold);
    debug!(
        "triage: {} retained, {} archived (threshold {:.2})",
        classified.retain.len(),
        classified.archive.len(),
        config.entropy_threshold
    );
    classified
}
