//! Tokenizers used for budget accounting.
//!
//! Neither is a model tokenizer. [`CharRatioTokenizer`] is the usual
//! chars-per-token estimate; [`WordTokenizer`] counts triage units exactly
//! and is what the tests use when they need precise budgets.

use super::Tokenizer;
use crate::triage::UNIT_PATTERN;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Estimates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioTokenizer {
    chars_per_token: f64,
}

impl Default for CharRatioTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl CharRatioTokenizer {
    /// Non-positive or non-finite ratios fall back to the default.
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    fn tokens_for_chars(&self, chars: usize) -> usize {
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

impl Tokenizer for CharRatioTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.tokens_for_chars(text.chars().count())
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let mut keep = (max_tokens as f64 * self.chars_per_token).floor() as usize;
        // Float rounding can overshoot by one char at the boundary.
        while keep > 0 && self.tokens_for_chars(keep) > max_tokens {
            keep -= 1;
        }
        text.chars().take(keep).collect()
    }
}

/// One token per word or punctuation character, matching triage units.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        UNIT_PATTERN.find_iter(text).count()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        match UNIT_PATTERN.find_iter(text).nth(max_tokens - 1) {
            Some(last) => text.get(..last.end()).unwrap_or_default().to_string(),
            None => text.to_string(),
        }
    }
}
