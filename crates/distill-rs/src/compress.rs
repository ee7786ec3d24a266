//! Recursive compression: shrink text until it fits a token budget.
//!
//! Each pass triages the current text, summarizes the low-entropy segments
//! into a scoped [`ArchiveStore`] that lives only for this call, and
//! reassembles retained segments followed by the summaries. Passes repeat
//! while each one shrinks the text below `convergence_ratio` of its previous
//! size. When a pass stalls, or `max_depth` passes have run, the text is
//! truncated at the tokenizer level.
//!
//! Whatever path is taken, the result never exceeds the budget.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::ArchiveStore;
use crate::error::Result;
use crate::provider::{Embedder, TextGenerator, Tokenizer};
use crate::triage::{TriageConfig, triage};

/// Default shrink factor a pass must beat to count as progress.
pub const DEFAULT_CONVERGENCE_RATIO: f64 = 0.9;

/// Default cap on summarization passes.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Compression loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// A pass counts as progress when the new text is shorter (in chars)
    /// than this fraction of the previous text.
    pub convergence_ratio: f64,
    /// Maximum summarization passes before forced truncation.
    pub max_depth: usize,
    /// Joins retained segments and summaries when reassembling.
    pub separator: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            convergence_ratio: DEFAULT_CONVERGENCE_RATIO,
            max_depth: DEFAULT_MAX_DEPTH,
            separator: "\n".to_string(),
        }
    }
}

impl CompressionConfig {
    pub fn with_convergence_ratio(mut self, ratio: f64) -> Self {
        self.convergence_ratio = ratio;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Why truncation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    /// A pass failed to shrink the text below the convergence ratio.
    Stalled,
    /// `max_depth` passes ran without fitting the budget.
    DepthLimit,
}

/// How a compression call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// The input already fit; returned unchanged.
    WithinBudget,
    /// Summarization alone brought the text within budget.
    Summarized,
    /// Hard truncation was applied. Information may have been dropped.
    Truncated(TruncationReason),
}

/// Result of [`Compressor::compress`].
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    /// Text whose token count is within the budget.
    pub text: String,
    /// Summarization passes run.
    pub passes: usize,
    /// Segments summarized across all passes.
    pub archived_segments: usize,
    pub outcome: CompressionOutcome,
}

/// Transient state of one compression call.
#[derive(Debug, Clone)]
pub struct CompressionState {
    /// Current text.
    pub text: String,
    /// Target token budget.
    pub budget: usize,
    /// Completed summarization passes.
    pub iteration: usize,
    /// Character length of the text before the current pass.
    pub size_before: usize,
}

impl CompressionState {
    fn new(text: &str, budget: usize) -> Self {
        Self {
            text: text.to_string(),
            budget,
            iteration: 0,
            size_before: text.chars().count(),
        }
    }

    /// Whether `candidate` is meaningfully shorter than the current text.
    fn converging(&self, candidate: &str, ratio: f64) -> bool {
        (candidate.chars().count() as f64) < ratio * self.size_before as f64
    }

    fn advance(&mut self, candidate: String) {
        self.size_before = candidate.chars().count();
        self.text = candidate;
    }
}

/// Budget-driven compressor. Cheap to clone; holds only shared providers.
///
/// Never touches a session archive: every call builds its own scoped
/// [`ArchiveStore`] per pass and drops it afterwards.
#[derive(Clone)]
pub struct Compressor {
    generator: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
    triage: TriageConfig,
    config: CompressionConfig,
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("triage", &self.triage)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Compressor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            generator,
            embedder,
            tokenizer,
            triage: TriageConfig::default(),
            config: CompressionConfig::default(),
        }
    }

    pub fn with_triage(mut self, triage: TriageConfig) -> Self {
        self.triage = triage;
        self
    }

    pub fn with_config(mut self, config: CompressionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Return `text` unchanged if it fits `budget`, otherwise compress it.
    pub async fn prepare_for_budget(&self, text: &str, budget: usize) -> Result<String> {
        if self.tokenizer.count_tokens(text) <= budget {
            return Ok(text.to_string());
        }
        Ok(self.compress(text, budget).await?.text)
    }

    /// Shrink `text` to at most `budget` tokens.
    ///
    /// Provider failures propagate. Failure to converge does not: it ends
    /// in truncation.
    pub async fn compress(&self, text: &str, budget: usize) -> Result<Compressed> {
        let mut state = CompressionState::new(text, budget);
        let mut archived_segments = 0;

        loop {
            let tokens = self.tokenizer.count_tokens(&state.text);
            if tokens <= budget {
                let outcome = if state.iteration == 0 {
                    CompressionOutcome::WithinBudget
                } else {
                    CompressionOutcome::Summarized
                };
                return Ok(self.finish(state, archived_segments, outcome));
            }

            if state.iteration >= self.config.max_depth {
                warn!(
                    "compression hit max depth {} at {tokens} tokens (budget {budget})",
                    self.config.max_depth
                );
                return Ok(self.truncate(state, archived_segments, TruncationReason::DepthLimit));
            }

            let (candidate, archived) = self.pass(&state.text).await?;
            state.iteration += 1;
            archived_segments += archived;

            let candidate_tokens = self.tokenizer.count_tokens(&candidate);
            debug!(
                "compression pass {}: {} -> {} chars, {candidate_tokens} tokens (budget {budget})",
                state.iteration,
                state.size_before,
                candidate.chars().count()
            );

            if candidate_tokens <= budget {
                state.advance(candidate);
                return Ok(self.finish(state, archived_segments, CompressionOutcome::Summarized));
            }

            if state.converging(&candidate, self.config.convergence_ratio) {
                state.advance(candidate);
                continue;
            }

            warn!(
                "compression stalled after pass {} ({candidate_tokens} tokens, budget {budget}); truncating",
                state.iteration
            );
            state.advance(candidate);
            return Ok(self.truncate(state, archived_segments, TruncationReason::Stalled));
        }
    }

    /// One triage + summarize + reassemble pass. Returns the candidate text
    /// and how many segments were archived.
    ///
    /// The candidate is the retained segments followed by the summaries.
    /// Each distinct non-empty summary appears once, in first-stored order.
    async fn pass(&self, text: &str) -> Result<(String, usize)> {
        let mut scoped = ArchiveStore::new(self.generator.clone(), self.embedder.clone())?;
        let classified = triage(text, &self.triage);
        let archive_texts: Vec<&str> = classified.archive.iter().map(|s| s.text).collect();
        let summaries = scoped.batch_store(&archive_texts).await?;

        let mut seen = HashSet::new();
        let parts: Vec<&str> = classified
            .retain
            .iter()
            .map(|s| s.text)
            .chain(
                summaries
                    .iter()
                    .map(String::as_str)
                    .filter(|s| !s.is_empty() && seen.insert(*s)),
            )
            .collect();
        Ok((parts.join(&self.config.separator), archive_texts.len()))
    }

    fn truncate(
        &self,
        state: CompressionState,
        archived_segments: usize,
        reason: TruncationReason,
    ) -> Compressed {
        let text = self.tokenizer.truncate(&state.text, state.budget);
        debug_assert!(self.tokenizer.count_tokens(&text) <= state.budget);
        self.finish(
            CompressionState { text, ..state },
            archived_segments,
            CompressionOutcome::Truncated(reason),
        )
    }

    fn finish(
        &self,
        state: CompressionState,
        archived_segments: usize,
        outcome: CompressionOutcome,
    ) -> Compressed {
        if outcome != CompressionOutcome::WithinBudget {
            info!(
                "compressed to {} tokens (budget {}) in {} pass(es): {:?}",
                self.tokenizer.count_tokens(&state.text),
                state.budget,
                state.iteration,
                outcome
            );
        }
        Compressed {
            text: state.text,
            passes: state.iteration,
            archived_segments,
            outcome,
        }
    }
}
