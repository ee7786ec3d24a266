//! Context budget manager for LLM inputs.
//!
//! `distill-rs` keeps an unbounded stream of ingested text usable by a model
//! with a fixed input-token budget. Three pieces do the work:
//!
//! 1. **[`triage`]** splits text into bounded segments and sorts them by
//!    character entropy: dense segments are kept verbatim, repetitive ones
//!    are sent to the archive.
//! 2. **[`archive`]** summarizes archived segments, keys them by summary,
//!    embeds each summary, and answers cosine-similarity queries.
//! 3. **[`compress`]** shrinks oversized text to a token budget by repeated
//!    triage + summarization, falling back to hard truncation when progress
//!    stalls. The result always fits the budget.
//!
//! [`ContextEngine`](engine::ContextEngine) ties them into a per-session
//! object with `ingest`, `prepare_for_budget`, `retrieve`, and `reset`.
//!
//! # Getting started
//!
//! ```ignore
//! use distill_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DistillError> {
//!     let config = EngineConfig::default();
//!     let mut engine = ContextEngine::from_config(config)?;
//!
//!     engine.ingest(&std::fs::read_to_string("notes.txt")?).await?;
//!     let related = engine.retrieve("how do I boil pasta", Some(3)).await?;
//!     let prompt = engine.prepare_for_budget(&related.join("\n"), 2048).await?;
//!     println!("{prompt}");
//!     Ok(())
//! }
//! ```
//!
//! # Capabilities
//!
//! The core consumes three traits from [`provider`]: [`TextGenerator`](provider::TextGenerator),
//! [`Embedder`](provider::Embedder), and [`Tokenizer`](provider::Tokenizer).
//! [`OpenRouterClient`] backs generation (and optionally embeddings) over
//! HTTP; [`HashingEmbedder`](provider::HashingEmbedder) and the tokenizers in
//! [`provider::tokenizer`] run locally.
//!
//! # Thread safety
//!
//! Nothing in the core takes a lock. A [`ContextEngine`](engine::ContextEngine)
//! and its session [`ArchiveStore`](archive::ArchiveStore) mutate through
//! `&mut self`; a host serving several conversations keeps one engine per
//! session, or wraps a shared one in its own mutex. Compression uses a
//! private scoped archive per call, so concurrent compressions never share
//! state.

pub mod archive;
pub mod compress;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod triage;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::ProviderError;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const OPENROUTER_EMBEDDINGS_URL: &str = "https://openrouter.ai/api/v1/embeddings";

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";

/// Default model for summarization calls.
pub const DEFAULT_MODEL: &str = "z-ai/glm-5";

/// Default model for remote embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Embeddings request body (OpenAI-compatible).
#[derive(Serialize, Debug)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a chat message. Summary calls send a single user turn.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

/// A message in the request.
#[derive(Serialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug)]
struct RawEmbeddingResponse {
    data: Option<Vec<RawEmbedding>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawEmbedding {
    embedding: Vec<f32>,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions and embeddings APIs.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_headers(api_key, "https://github.com/distill-rs", "distill-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("distill-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, ProviderError> {
        let start = Instant::now();

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to read response: {e}")))?;

        debug!(
            "POST {url}: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={:?}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let text = self.post_json(OPENROUTER_URL, body).await?;
        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ProviderError::Api(err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            },
        })
    }

    /// Embed a single input string.
    pub async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, ProviderError> {
        debug!("Embedding request: model={model}, {} chars", input.len());
        let body = EmbeddingRequest { model, input };
        let text = self.post_json(OPENROUTER_EMBEDDINGS_URL, &body).await?;
        parse_embedding_response(&text)
    }
}

fn parse_embedding_response(text: &str) -> Result<Vec<f32>, ProviderError> {
    let parsed: RawEmbeddingResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if let Some(err) = parsed.error {
        return Err(ProviderError::Api(err.message));
    }
    parsed
        .data
        .and_then(|d| d.into_iter().next())
        .map(|e| e.embedding)
        .ok_or(ProviderError::EmptyResponse)
}
