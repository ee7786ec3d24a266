//! Deterministic local embedder based on feature hashing.
//!
//! Each lowercase word is hashed (xxHash64) into one of `dimension` buckets
//! and counted; the vector is then L2-normalized. All components are
//! non-negative, so two texts score above zero exactly when they share a
//! word (up to bucket collisions). No network, no model, stable across runs.

use std::hash::Hasher;

use twox_hash::XxHash64;

use super::{Embedder, ProviderFuture};

/// Default dimension for local embeddings.
pub const DEFAULT_HASHING_DIMENSION: usize = 384;

const HASH_SEED: u64 = 0x5eed_d157;

/// Bag-of-words feature-hashing embedder.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous embedding; [`Embedder::embed`] wraps this.
    pub fn embed_now(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let mut hasher = XxHash64::with_seed(HASH_SEED);
            hasher.write(word.as_bytes());
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed<'a>(&'a self, text: &'a str) -> ProviderFuture<'a, Vec<f32>> {
        Box::pin(async move { Ok(self.embed_now(text)) })
    }
}
