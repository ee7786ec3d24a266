//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] is fully populated: every field has a default. Partial
//! settings (a JSON config file, command-line flags) are expressed as
//! [`EngineConfigOverrides`], whose fields are all optional, and layered on
//! top with [`EngineConfig::apply`]. Later layers win field by field.
//!
//! ```json
//! {
//!   "provider": { "generation_model": "openai/gpt-4o-mini", "tokenizer": "words" },
//!   "triage": { "entropy_threshold": 3.5 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compress::CompressionConfig;
use crate::error::{DistillError, Result};
use crate::provider::hashing::DEFAULT_HASHING_DIMENSION;
use crate::provider::openrouter::{DEFAULT_SUMMARY_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::provider::tokenizer::DEFAULT_CHARS_PER_TOKEN;
use crate::triage::TriageConfig;

/// Default number of entries returned by retrieval.
pub const DEFAULT_TOP_K: usize = 3;

/// Which [`Embedder`](crate::provider::Embedder) backs the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing. No network, deterministic.
    #[default]
    Hashing,
    /// OpenRouter embeddings endpoint.
    OpenRouter,
}

/// Which [`Tokenizer`](crate::provider::Tokenizer) measures budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenizerKind {
    /// `ceil(chars / chars_per_token)`.
    #[default]
    CharRatio,
    /// One token per word or punctuation character.
    Words,
}

/// Provider selection and model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenRouter API key. Falls back to `OPENROUTER_KEY` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model used for summaries. Default: `"z-ai/glm-5"`.
    pub generation_model: String,
    /// Completion cap per summary call. Default: `512`.
    pub summary_max_tokens: u32,
    /// Default: `0.3`.
    pub temperature: f32,
    pub embedding: EmbeddingBackend,
    /// Only used with [`EmbeddingBackend::OpenRouter`].
    pub embedding_model: String,
    /// Vector length. Must match the embedding model's output.
    pub embedding_dimension: usize,
    pub tokenizer: TokenizerKind,
    /// Only used with [`TokenizerKind::CharRatio`]. Default: `3.5`.
    pub chars_per_token: f64,
    /// Retries on transient provider failures. Default: `0`.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            generation_model: crate::DEFAULT_MODEL.to_string(),
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            embedding: EmbeddingBackend::default(),
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_HASHING_DIMENSION,
            tokenizer: TokenizerKind::default(),
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            max_retries: 0,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Entries returned by [`ContextEngine::retrieve`](crate::engine::ContextEngine::retrieve)
    /// when the caller does not say otherwise.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub provider: ProviderConfig,
    pub triage: TriageConfig,
    pub compression: CompressionConfig,
    pub retrieval: RetrievalConfig,
}

impl EngineConfig {
    /// Defaults overlaid with the JSON config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let overrides = EngineConfigOverrides::from_file(path)?;
        let mut config = Self::default();
        config.apply(overrides);
        Ok(config)
    }

    /// Overlay every field set in `overrides`.
    pub fn apply(&mut self, overrides: EngineConfigOverrides) {
        let EngineConfigOverrides {
            provider: p,
            triage: t,
            compression: c,
            retrieval: r,
        } = overrides;

        if p.api_key.is_some() {
            self.provider.api_key = p.api_key;
        }
        set(&mut self.provider.generation_model, p.generation_model);
        set(&mut self.provider.summary_max_tokens, p.summary_max_tokens);
        set(&mut self.provider.temperature, p.temperature);
        set(&mut self.provider.embedding, p.embedding);
        set(&mut self.provider.embedding_model, p.embedding_model);
        set(&mut self.provider.embedding_dimension, p.embedding_dimension);
        set(&mut self.provider.tokenizer, p.tokenizer);
        set(&mut self.provider.chars_per_token, p.chars_per_token);
        set(&mut self.provider.max_retries, p.max_retries);

        set(&mut self.triage.max_batch_chars, t.max_batch_chars);
        set(&mut self.triage.entropy_threshold, t.entropy_threshold);

        set(&mut self.compression.convergence_ratio, c.convergence_ratio);
        set(&mut self.compression.max_depth, c.max_depth);
        set(&mut self.compression.separator, c.separator);

        set(&mut self.retrieval.top_k, r.top_k);
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.triage.max_batch_chars == 0 {
            return invalid("triage.max_batch_chars must be at least 1");
        }
        if !self.triage.entropy_threshold.is_finite() {
            return invalid("triage.entropy_threshold must be a finite number");
        }
        let ratio = self.compression.convergence_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return invalid(format!(
                "compression.convergence_ratio must be in (0, 1], got {ratio}"
            ));
        }
        if self.compression.max_depth == 0 {
            return invalid("compression.max_depth must be at least 1");
        }
        if self.provider.embedding_dimension == 0 {
            return invalid("provider.embedding_dimension must be at least 1");
        }
        if !(self.provider.chars_per_token.is_finite() && self.provider.chars_per_token > 0.0) {
            return invalid("provider.chars_per_token must be a positive number");
        }
        Ok(())
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *field = v;
    }
}

fn invalid(msg: impl Into<String>) -> Result<()> {
    Err(DistillError::Config(msg.into()))
}

/// Partial [`EngineConfig`]. Missing sections and fields mean "keep".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfigOverrides {
    pub provider: ProviderOverrides,
    pub triage: TriageOverrides,
    pub compression: CompressionOverrides,
    pub retrieval: RetrievalOverrides,
}

impl EngineConfigOverrides {
    /// Parse a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DistillError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderOverrides {
    pub api_key: Option<String>,
    pub generation_model: Option<String>,
    pub summary_max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub embedding: Option<EmbeddingBackend>,
    pub embedding_model: Option<String>,
    pub embedding_dimension: Option<usize>,
    pub tokenizer: Option<TokenizerKind>,
    pub chars_per_token: Option<f64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriageOverrides {
    pub max_batch_chars: Option<usize>,
    pub entropy_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionOverrides {
    pub convergence_ratio: Option<f64>,
    pub max_depth: Option<usize>,
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalOverrides {
    pub top_k: Option<usize>,
}
