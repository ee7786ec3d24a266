//! Convenience re-exports for common `distill-rs` types.
//!
//! ```ignore
//! use distill_rs::prelude::*;
//! ```
//!
//! Covers the engine, its configuration, the capability traits and their
//! stock implementations. Lower-level pieces (vector index backends, the
//! HTTP client, retry policy) are imported from their modules directly.

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::engine::{ContextEngine, IngestReport};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::compress::CompressionConfig;
pub use crate::config::{
    EmbeddingBackend, EngineConfig, EngineConfigOverrides, ProviderConfig, RetrievalConfig,
    TokenizerKind,
};
pub use crate::triage::TriageConfig;

// ── Results ─────────────────────────────────────────────────────────
pub use crate::archive::RetrievedEntry;
pub use crate::compress::{Compressed, CompressionOutcome, TruncationReason};
pub use crate::error::{DistillError, ProviderError};

// ── Capabilities ────────────────────────────────────────────────────
pub use crate::provider::{
    CharRatioTokenizer, Embedder, HashingEmbedder, Providers, TextGenerator, Tokenizer,
    WordTokenizer,
};
