//! Summarizing archive with vector retrieval.
//!
//! Archived segments are summarized by the text-generation capability; the
//! summary becomes the entry's key and is embedded for retrieval. Queries
//! are answered by cosine similarity between the query embedding and the
//! summary embeddings, returning the full original texts.
//!
//! An [`ArchiveStore`] is plain owned state with no internal locking. The
//! session engine owns one; the compression loop creates a throwaway one
//! per call.

pub mod index;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DistillError, Result};
use crate::provider::{Embedder, TextGenerator};
use index::{FlatIndex, ScoredId, VectorIndex, rank_by_similarity};

/// Instruction template for summaries. `{text}` is replaced with the input.
const SUMMARIZATION_PROMPT: &str = "\
Write a short summary of the following text. Keep its core information \
points, names, and numbers. Output only the summary.

{text}

Summary:";

/// Build the summarization prompt for `text`.
pub fn summarization_prompt(text: &str) -> String {
    SUMMARIZATION_PROMPT.replace("{text}", text)
}

/// A unit of summarized knowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Generated summary; unique within a store.
    pub summary: String,
    /// The full archived text.
    pub original_text: String,
    /// Embedding of `summary`, of the store's dimension.
    pub embedding: Vec<f32>,
}

/// One retrieval hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedEntry {
    pub summary: String,
    pub original_text: String,
    pub score: f32,
}

/// Summary-keyed archive of text with an embedding index.
///
/// Invariant: `index.len() == entries.len()`, and entry `i` is indexed
/// under id `i`.
pub struct ArchiveStore {
    generator: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    entries: Vec<ArchiveEntry>,
    by_summary: HashMap<String, usize>,
    index: Box<dyn VectorIndex>,
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("dimension", &self.dimension)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ArchiveStore {
    /// Create a store backed by an exact [`FlatIndex`].
    pub fn new(generator: Arc<dyn TextGenerator>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimension = embedder.dimension();
        Self::with_index(generator, embedder, Box::new(FlatIndex::new(dimension)))
    }

    /// Create a store with a custom index backend. The index must be empty.
    pub fn with_index(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        index: Box<dyn VectorIndex>,
    ) -> Result<Self> {
        let dimension = embedder.dimension();
        if dimension == 0 {
            return Err(DistillError::Config(
                "embedder reports dimension 0; an archive needs a fixed non-zero dimension".into(),
            ));
        }
        if !index.is_empty() {
            return Err(DistillError::Config(
                "archive index must start empty".into(),
            ));
        }
        Ok(Self {
            generator,
            embedder,
            dimension,
            entries: Vec::new(),
            by_summary: HashMap::new(),
            index,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Look up an entry by its summary key.
    pub fn get(&self, summary: &str) -> Option<&ArchiveEntry> {
        self.by_summary.get(summary).map(|&i| &self.entries[i])
    }

    /// Drop every entry and indexed vector.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_summary.clear();
        self.index.clear();
    }

    /// Summarize `text` with the generation capability.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = summarization_prompt(text);
        let summary = self.generator.generate(&prompt).await?;
        Ok(summary.trim().to_string())
    }

    /// Archive `text` and return its summary key.
    ///
    /// A summary that already keys an entry is returned as-is: nothing is
    /// re-embedded or stored twice. Dedup is exact string equality.
    pub async fn store(&mut self, text: &str) -> Result<String> {
        let summary = self.summarize(text).await?;
        if self.by_summary.contains_key(&summary) {
            debug!("archive: summary already stored, skipping ({} chars)", summary.len());
            return Ok(summary);
        }

        let embedding = self.embedder.embed(&summary).await?;
        if embedding.len() != self.dimension {
            return Err(DistillError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        // Index first: if it rejects the vector, the map is untouched.
        let id = self.entries.len();
        self.index.insert(id, &embedding)?;
        self.by_summary.insert(summary.clone(), id);
        self.entries.push(ArchiveEntry {
            summary: summary.clone(),
            original_text: text.to_string(),
            embedding,
        });
        debug_assert_eq!(self.index.len(), self.entries.len());

        debug!(
            "archive: stored {} chars under {}-char summary ({} entries)",
            text.len(),
            summary.len(),
            self.entries.len()
        );
        Ok(summary)
    }

    /// [`store`](Self::store) each text in order; summaries come back in the
    /// same order.
    pub async fn batch_store<T: AsRef<str> + Sync>(&mut self, texts: &[T]) -> Result<Vec<String>> {
        let mut summaries = Vec::with_capacity(texts.len());
        for text in texts {
            summaries.push(self.store(text.as_ref()).await?);
        }
        Ok(summaries)
    }

    /// Scored retrieval: up to `top_k` entries most similar to `query`,
    /// best first, all with similarity strictly above zero.
    ///
    /// An empty archive, a blank query, or `top_k == 0` yields an empty list
    /// without calling the embedder.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedEntry>> {
        if self.is_empty() || query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.len() != self.dimension {
            return Err(DistillError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        let ranked = match self.index.search(&query_embedding, top_k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("archive index search failed ({e}); falling back to flat scan");
                self.flat_scan(&query_embedding, top_k)
            }
        };

        let hits: Vec<RetrievedEntry> = ranked
            .into_iter()
            .filter(|hit| hit.score > 0.0)
            .filter_map(|hit| {
                self.entries.get(hit.id).map(|entry| RetrievedEntry {
                    summary: entry.summary.clone(),
                    original_text: entry.original_text.clone(),
                    score: hit.score,
                })
            })
            .collect();

        debug!(
            "archive: query matched {} of {} entries (top_k={top_k})",
            hits.len(),
            self.entries.len()
        );
        Ok(hits)
    }

    /// Original texts of the best matches for `query`, most similar first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .search(query, top_k)
            .await?
            .into_iter()
            .map(|hit| hit.original_text)
            .collect())
    }

    fn flat_scan(&self, query: &[f32], k: usize) -> Vec<ScoredId> {
        rank_by_similarity(
            self.entries
                .iter()
                .enumerate()
                .map(|(id, e)| (id, e.embedding.as_slice())),
            query,
            k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{HashingEmbedder, ProviderFuture};
    use index::IndexError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Summary is the first line of the text.
    struct FirstLine;

    impl TextGenerator for FirstLine {
        fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String> {
            let body = prompt
                .split("\n\n")
                .nth(1)
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            Box::pin(async move { Ok(body) })
        }
    }

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn embed<'a>(&'a self, text: &'a str) -> ProviderFuture<'a, Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
    }

    /// One axis per keyword; an `anti-` prefix counts negatively.
    struct TopicEmbedder;

    const TOPICS: [&str; 4] = ["pasta", "sauce", "physics", "tomato"];

    impl Embedder for TopicEmbedder {
        fn dimension(&self) -> usize {
            TOPICS.len()
        }
        fn embed<'a>(&'a self, text: &'a str) -> ProviderFuture<'a, Vec<f32>> {
            let mut v = vec![0.0f32; TOPICS.len()];
            for word in text.split_whitespace() {
                let (sign, word) = match word.strip_prefix("anti-") {
                    Some(w) => (-1.0, w),
                    None => (1.0, word),
                };
                if let Some(i) = TOPICS.iter().position(|t| *t == word) {
                    v[i] += sign;
                }
            }
            Box::pin(async move { Ok(v) })
        }
    }

    struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate<'a>(&'a self, _prompt: &'a str) -> ProviderFuture<'a, String> {
            Box::pin(async {
                Err(ProviderError::Http {
                    status: 500,
                    body: "boom".into(),
                })
            })
        }
    }

    /// Index whose search always fails, to exercise the flat-scan fallback.
    struct BrokenSearchIndex(FlatIndex);

    impl VectorIndex for BrokenSearchIndex {
        fn insert(&mut self, id: usize, embedding: &[f32]) -> Result<(), IndexError> {
            self.0.insert(id, embedding)
        }
        fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<ScoredId>, IndexError> {
            Err(IndexError::Unavailable("offline".into()))
        }
        fn len(&self) -> usize {
            self.0.len()
        }
        fn clear(&mut self) {
            self.0.clear();
        }
    }

    fn store() -> ArchiveStore {
        ArchiveStore::new(Arc::new(FirstLine), Arc::new(HashingEmbedder::new(128))).unwrap()
    }

    #[test]
    fn prompt_embeds_text() {
        let prompt = summarization_prompt("the body");
        assert!(prompt.contains("the body"));
        assert!(prompt.ends_with("Summary:"));
    }

    #[test]
    fn zero_dimension_embedder_fails_construction() {
        let err = ArchiveStore::new(Arc::new(FirstLine), Arc::new(HashingEmbedder::new(0)))
            .unwrap_err();
        assert!(matches!(err, DistillError::Config(_)));
    }

    #[tokio::test]
    async fn store_returns_summary_and_keeps_original() {
        let mut archive = store();
        let summary = archive
            .store("Pasta notes\nBoil water, add salt, cook ten minutes.")
            .await
            .unwrap();
        assert_eq!(summary, "Pasta notes");
        let entry = archive.get("Pasta notes").unwrap();
        assert!(entry.original_text.contains("add salt"));
        assert_eq!(entry.embedding.len(), 128);
    }

    #[tokio::test]
    async fn duplicate_summary_is_not_stored_or_embedded_twice() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(64),
            calls: AtomicUsize::new(0),
        });
        let mut archive = ArchiveStore::new(Arc::new(FirstLine), embedder.clone()).unwrap();

        let a = archive.store("Same key\nfirst body").await.unwrap();
        let b = archive.store("Same key\nsecond body").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(archive.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(archive.get("Same key").unwrap().original_text, "Same key\nfirst body");
    }

    #[tokio::test]
    async fn batch_store_preserves_order() {
        let mut archive = store();
        let summaries = archive
            .batch_store(&["one\nx", "two\ny", "one\nz", "three\nw"])
            .await
            .unwrap();
        assert_eq!(summaries, vec!["one", "two", "one", "three"]);
        assert_eq!(archive.len(), 3);
    }

    #[tokio::test]
    async fn retrieve_on_empty_archive_is_empty() {
        let archive = store();
        for k in [0, 1, 10] {
            assert!(archive.retrieve("anything at all", k).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn blank_query_or_zero_k_is_empty() {
        let mut archive = store();
        archive.store("pasta\nbody").await.unwrap();
        assert!(archive.retrieve("   ", 3).await.unwrap().is_empty());
        assert!(archive.retrieve("pasta", 0).await.unwrap().is_empty());
    }

    fn topic_store() -> ArchiveStore {
        ArchiveStore::new(Arc::new(FirstLine), Arc::new(TopicEmbedder)).unwrap()
    }

    #[tokio::test]
    async fn retrieve_ranks_and_drops_unrelated() {
        let mut archive = topic_store();
        archive
            .store("cooking pasta in salted water\nrecipe body")
            .await
            .unwrap();
        archive
            .store("quantum physics and entanglement\nlecture body")
            .await
            .unwrap();

        let hits = archive.search("how do I boil pasta", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].original_text, "cooking pasta in salted water\nrecipe body");
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn retrieve_never_exceeds_unique_entries() {
        let mut archive = store();
        for _ in 0..3 {
            archive.store("notes on pasta\nbody").await.unwrap();
        }
        let hits = archive.retrieve("pasta", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn search_results_are_descending() {
        let mut archive = topic_store();
        archive.store("pasta\na").await.unwrap();
        archive.store("pasta sauce tomato\nb").await.unwrap();
        archive.store("pasta sauce\nc").await.unwrap();
        let hits = archive.search("pasta sauce", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].summary, "pasta sauce");
        assert_eq!(hits[2].summary, "pasta");
    }

    #[tokio::test]
    async fn negative_similarity_is_excluded() {
        let mut archive = topic_store();
        archive.store("anti-pasta\nbody").await.unwrap();
        let ranked = archive.flat_scan(&[1.0, 0.0, 0.0, 0.0], 5);
        assert!(ranked[0].score < 0.0);
        assert!(archive.retrieve("pasta", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_failure_falls_back_to_flat_scan() {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let mut archive = ArchiveStore::with_index(
            Arc::new(FirstLine),
            embedder,
            Box::new(BrokenSearchIndex(FlatIndex::new(64))),
        )
        .unwrap();
        archive.store("pasta recipes\nbody").await.unwrap();
        let hits = archive.retrieve("pasta", 1).await.unwrap();
        assert_eq!(hits, vec!["pasta recipes\nbody".to_string()]);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected_and_nothing_stored() {
        struct ShortEmbedder;
        impl Embedder for ShortEmbedder {
            fn dimension(&self) -> usize {
                8
            }
            fn embed<'a>(&'a self, _text: &'a str) -> ProviderFuture<'a, Vec<f32>> {
                Box::pin(async { Ok(vec![1.0; 3]) })
            }
        }
        let mut archive = ArchiveStore::new(Arc::new(FirstLine), Arc::new(ShortEmbedder)).unwrap();
        let err = archive.store("x\ny").await.unwrap_err();
        assert!(matches!(
            err,
            DistillError::DimensionMismatch { expected: 8, actual: 3 }
        ));
        assert!(archive.is_empty());
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let mut archive =
            ArchiveStore::new(Arc::new(FailingGenerator), Arc::new(HashingEmbedder::new(8)))
                .unwrap();
        let err = archive.store("text").await.unwrap_err();
        assert!(matches!(err, DistillError::Provider(_)));
        assert!(archive.is_empty());
    }

    #[tokio::test]
    async fn clear_discards_everything() {
        let mut archive = store();
        archive.store("a\nb").await.unwrap();
        archive.clear();
        assert!(archive.is_empty());
        assert!(archive.get("a").is_none());
        assert!(archive.retrieve("a", 1).await.unwrap().is_empty());
    }
}
