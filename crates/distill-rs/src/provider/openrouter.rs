//! OpenRouter-backed generation and embedding capabilities.

use std::sync::Arc;

use tracing::debug;

use super::retry::{RetryConfig, retry_provider_call};
use super::{Embedder, ProviderFuture, TextGenerator};
use crate::error::ProviderError;
use crate::{ChatRequest, Message, OpenRouterClient};

/// Default completion cap for summary calls.
pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 512;

/// Default sampling temperature for summary calls.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// [`TextGenerator`] that sends each prompt as a single user message.
#[derive(Debug, Clone)]
pub struct OpenRouterGenerator {
    client: Arc<OpenRouterClient>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl OpenRouterGenerator {
    pub fn new(client: Arc<OpenRouterClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: Some(self.model.clone()),
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }
}

impl TextGenerator for OpenRouterGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let body = self.request(prompt);
            let completion = retry_provider_call(&self.retry, || self.client.chat(&body)).await?;
            let content = completion.content.ok_or(ProviderError::EmptyResponse)?;
            debug!(
                "generated {} chars (finish_reason={})",
                content.len(),
                completion.finish_reason.as_deref().unwrap_or("?")
            );
            Ok(content)
        })
    }
}

/// [`Embedder`] backed by the OpenRouter embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterEmbedder {
    client: Arc<OpenRouterClient>,
    model: String,
    dimension: usize,
    retry: RetryConfig,
}

impl OpenRouterEmbedder {
    /// `dimension` must match what `model` returns; the archive rejects
    /// vectors of any other length.
    pub fn new(client: Arc<OpenRouterClient>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Embedder for OpenRouterEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed<'a>(&'a self, text: &'a str) -> ProviderFuture<'a, Vec<f32>> {
        Box::pin(async move {
            retry_provider_call(&self.retry, || self.client.embed(&self.model, text)).await
        })
    }
}
