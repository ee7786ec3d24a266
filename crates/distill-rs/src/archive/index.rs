//! Vector index backends for archive retrieval.
//!
//! [`VectorIndex`] is the seam for swapping the search structure. The
//! [`FlatIndex`] brute-force scan is the reference implementation: any
//! approximate backend must return the same ranking (descending cosine
//! similarity) within its own approximation error, and the archive falls
//! back to a flat scan whenever a backend's search fails.

use std::cmp::Ordering;

/// Errors raised by a [`VectorIndex`] backend.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector has dimension {actual}, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("id {0} is already indexed")]
    DuplicateId(usize),

    #[error("index backend unavailable: {0}")]
    Unavailable(String),
}

/// An entry id paired with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: usize,
    pub score: f32,
}

/// Searchable structure over archive embeddings.
///
/// Ids are dense positions in the archive's entry list. Implementations are
/// not expected to be internally synchronized beyond `Send + Sync`.
pub trait VectorIndex: Send + Sync {
    /// Add `embedding` under `id`. Must leave the index unchanged on error.
    fn insert(&mut self, id: usize, embedding: &[f32]) -> Result<(), IndexError>;

    /// The `k` ids most similar to `query`, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, IndexError>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every vector.
    fn clear(&mut self);
}

/// Exact brute-force cosine index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<(usize, Vec<f32>)>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: usize, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if self.vectors.iter().any(|(existing, _)| *existing == id) {
            return Err(IndexError::DuplicateId(id));
        }
        self.vectors.push((id, embedding.to_vec()));
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(rank_by_similarity(
            self.vectors.iter().map(|(id, v)| (*id, v.as_slice())),
            query,
            k,
        ))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn clear(&mut self) {
        self.vectors.clear();
    }
}

/// Cosine similarity of two vectors. Zero-norm or mismatched inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score every candidate against `query` and keep the best `k`.
///
/// Sort is stable, so equal scores keep candidate order. Used by
/// [`FlatIndex`] and by the archive's fallback scan.
pub fn rank_by_similarity<'a>(
    candidates: impl Iterator<Item = (usize, &'a [f32])>,
    query: &[f32],
    k: usize,
) -> Vec<ScoredId> {
    let mut scored: Vec<ScoredId> = candidates
        .map(|(id, v)| ScoredId {
            id,
            score: cosine_similarity(query, v),
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn flat_index_ranks_descending() {
        let mut index = FlatIndex::new(2);
        index.insert(0, &[0.0, 1.0]).unwrap();
        index.insert(1, &[1.0, 0.0]).unwrap();
        index.insert(2, &[1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.1], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn flat_index_truncates_to_k() {
        let mut index = FlatIndex::new(1);
        for id in 0..5 {
            index.insert(id, &[1.0]).unwrap();
        }
        assert_eq!(index.search(&[1.0], 2).unwrap().len(), 2);
        assert!(index.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let mut index = FlatIndex::new(2);
        index.insert(7, &[1.0, 0.0]).unwrap();
        index.insert(3, &[2.0, 0.0]).unwrap();
        let ids: Vec<usize> = index
            .search(&[1.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[test]
    fn flat_index_rejects_wrong_dimension_and_duplicates() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.insert(0, &[1.0]),
            Err(IndexError::Dimension { expected: 3, actual: 1 })
        ));
        index.insert(0, &[1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            index.insert(0, &[0.0, 1.0, 0.0]),
            Err(IndexError::DuplicateId(0))
        ));
        assert_eq!(index.len(), 1);
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn clear_empties_index() {
        let mut index = FlatIndex::new(1);
        index.insert(0, &[1.0]).unwrap();
        index.clear();
        assert!(index.is_empty());
    }
}
