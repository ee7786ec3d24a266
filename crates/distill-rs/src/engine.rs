//! Session-level engine: the surface an orchestration layer talks to.
//!
//! A [`ContextEngine`] owns one session's [`ArchiveStore`] and the retained
//! text blocks emitted by [`ingest`](ContextEngine::ingest). It has no
//! internal locking: mutating calls take `&mut self`, so one engine serves
//! one conversation. Hosts that multiplex sessions keep one engine per
//! session, or wrap it in their own mutex.

use tracing::{debug, info};

use crate::archive::{ArchiveStore, RetrievedEntry};
use crate::compress::{Compressed, Compressor};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::provider::Providers;
use crate::triage::triage;

/// What one [`ContextEngine::ingest`] call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Segments produced by triage.
    pub segments: usize,
    /// Segments kept verbatim.
    pub retained: usize,
    /// Segments summarized into the archive.
    pub archived: usize,
    /// Summary keys returned by the archive, one per archived segment.
    pub summaries: Vec<String>,
}

/// Context budget manager for one session.
#[derive(Debug)]
pub struct ContextEngine {
    config: EngineConfig,
    providers: Providers,
    archive: ArchiveStore,
    compressor: Compressor,
    retained: Vec<String>,
}

impl ContextEngine {
    /// Build an engine from explicit providers. Fails on invalid config or
    /// an embedder without a usable dimension.
    pub fn new(config: EngineConfig, providers: Providers) -> Result<Self> {
        config.validate()?;
        let archive = ArchiveStore::new(providers.generator.clone(), providers.embedder.clone())?;
        let compressor = Compressor::new(
            providers.generator.clone(),
            providers.embedder.clone(),
            providers.tokenizer.clone(),
        )
        .with_triage(config.triage.clone())
        .with_config(config.compression.clone());

        info!(
            "engine ready: dimension={}, max_batch_chars={}, entropy_threshold={}",
            archive.dimension(),
            config.triage.max_batch_chars,
            config.triage.entropy_threshold
        );
        Ok(Self {
            config,
            providers,
            archive,
            compressor,
            retained: Vec::new(),
        })
    }

    /// Build an engine with providers resolved from `config.provider`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let providers = Providers::from_config(&config.provider)?;
        Self::new(config, providers)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// The session archive.
    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Retained blocks emitted by [`ingest`](Self::ingest), oldest first.
    pub fn retained(&self) -> &[String] {
        &self.retained
    }

    /// Triage `text`, archive its low-entropy segments, and keep the rest.
    ///
    /// The retained segments of one call are joined with a newline and
    /// appended as a single block. A call that retains nothing appends
    /// nothing. On a provider failure the archive keeps whatever was stored
    /// before the failing segment and no block is appended.
    pub async fn ingest(&mut self, text: &str) -> Result<IngestReport> {
        let classified = triage(text, &self.config.triage);
        let archive_texts: Vec<&str> = classified.archive.iter().map(|s| s.text).collect();
        let summaries = self.archive.batch_store(&archive_texts).await?;

        let block = classified
            .retain
            .iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join("\n");
        if !block.is_empty() {
            self.retained.push(block);
        }

        let report = IngestReport {
            segments: classified.len(),
            retained: classified.retain.len(),
            archived: archive_texts.len(),
            summaries,
        };
        info!(
            "ingested {} segment(s): {} retained, {} archived ({} archive entries)",
            report.segments,
            report.retained,
            report.archived,
            self.archive.len()
        );
        Ok(report)
    }

    /// Return `text` fitted to `budget` tokens.
    ///
    /// Uses a scoped archive per call; the session archive is untouched.
    pub async fn prepare_for_budget(&self, text: &str, budget: usize) -> Result<String> {
        self.compressor.prepare_for_budget(text, budget).await
    }

    /// Like [`prepare_for_budget`](Self::prepare_for_budget), with details
    /// on how the result was reached.
    pub async fn compress(&self, text: &str, budget: usize) -> Result<Compressed> {
        self.compressor.compress(text, budget).await
    }

    /// Original texts of the archived segments most relevant to `query`.
    /// `None` uses the configured `retrieval.top_k`.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<String>> {
        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        self.archive.retrieve(query, k).await
    }

    /// Scored form of [`retrieve`](Self::retrieve).
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievedEntry>> {
        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        self.archive.search(query, k).await
    }

    /// Newest retained blocks whose combined size fits `max_tokens`, in
    /// oldest-first order, separated by a blank line. Stops at the first
    /// block that would overflow.
    pub fn recent_context(&self, max_tokens: usize) -> String {
        let tokenizer = &self.providers.tokenizer;
        let mut used = 0;
        let mut picked = Vec::new();
        for block in self.retained.iter().rev() {
            used += tokenizer.count_tokens(block);
            if used > max_tokens {
                break;
            }
            picked.push(block.as_str());
        }
        picked.reverse();
        picked.join("\n\n")
    }

    /// Discard all session state: a new empty archive and no retained text.
    pub fn reset(&mut self) {
        debug!(
            "reset: dropping {} archive entries and {} retained block(s)",
            self.archive.len(),
            self.retained.len()
        );
        self.archive.clear();
        self.retained.clear();
    }
}
