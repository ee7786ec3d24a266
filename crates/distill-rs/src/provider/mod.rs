//! Capability interfaces consumed by the core, plus concrete providers.
//!
//! The core never talks to a model directly. It goes through three traits:
//!
//! - [`TextGenerator`]: prompt in, text out (used for summaries).
//! - [`Embedder`]: text in, fixed-dimension vector out.
//! - [`Tokenizer`]: token counting and truncation, consistent with each
//!   other: truncating to `n` tokens always yields a count `<= n`.
//!
//! Generation and embedding return boxed futures so the traits stay
//! dyn-compatible and can be shared as `Arc<dyn ...>` between the session
//! archive and every scoped compression archive.
//!
//! Concrete implementations:
//! - [`openrouter`]: HTTP-backed generator and embedder.
//! - [`hashing`]: deterministic local feature-hashing embedder.
//! - [`tokenizer`]: chars-per-token estimate and unit-exact tokenizers.
//! - [`retry`]: backoff policy for the transient subset of provider errors.

pub mod hashing;
pub mod openrouter;
pub mod retry;
pub mod tokenizer;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::OpenRouterClient;
use crate::config::{EmbeddingBackend, ProviderConfig, TokenizerKind};
use crate::error::{DistillError, ProviderError};

pub use hashing::HashingEmbedder;
pub use openrouter::{OpenRouterEmbedder, OpenRouterGenerator};
pub use retry::RetryConfig;
pub use tokenizer::{CharRatioTokenizer, WordTokenizer};

/// Boxed future returned by provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Text-generation capability.
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`. No output-length guarantee.
    fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String>;
}

/// Embedding capability. One instance serves a whole archive so that all
/// stored vectors are comparable.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed `text`.
    fn embed<'a>(&'a self, text: &'a str) -> ProviderFuture<'a, Vec<f32>>;
}

/// Tokenization capability.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> usize;

    /// Longest prefix of `text` with at most `max_tokens` tokens.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// The three capabilities an engine needs, shareable across archives.
#[derive(Clone)]
pub struct Providers {
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn Embedder>,
    pub tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("embedding_dimension", &self.embedder.dimension())
            .finish_non_exhaustive()
    }
}

impl Providers {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            generator,
            embedder,
            tokenizer,
        }
    }

    /// Build providers from configuration.
    ///
    /// Generation always goes through OpenRouter, so a missing API key (in
    /// the config or `OPENROUTER_KEY`) fails here rather than on first use.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, DistillError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(crate::API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DistillError::Config(format!(
                    "no API key for text generation: set provider.api_key or {}",
                    crate::API_KEY_ENV
                ))
            })?;
        let client = Arc::new(OpenRouterClient::new(api_key)?);
        let retry = RetryConfig::with_retries(config.max_retries);

        let generator: Arc<dyn TextGenerator> = Arc::new(
            OpenRouterGenerator::new(client.clone(), config.generation_model.clone())
                .with_max_tokens(config.summary_max_tokens)
                .with_temperature(config.temperature)
                .with_retry(retry.clone()),
        );

        let embedder: Arc<dyn Embedder> = match config.embedding {
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            EmbeddingBackend::OpenRouter => Arc::new(
                OpenRouterEmbedder::new(
                    client,
                    config.embedding_model.clone(),
                    config.embedding_dimension,
                )
                .with_retry(retry),
            ),
        };

        Ok(Self::new(generator, embedder, tokenizer_for(config)))
    }
}

/// Build just the tokenizer; needs no network access.
pub fn tokenizer_for(config: &ProviderConfig) -> Arc<dyn Tokenizer> {
    match config.tokenizer {
        TokenizerKind::CharRatio => Arc::new(CharRatioTokenizer::new(config.chars_per_token)),
        TokenizerKind::Words => Arc::new(WordTokenizer),
    }
}
