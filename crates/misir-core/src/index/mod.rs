//! Vector Index (C2)
//!
//! Two-stage Matryoshka nearest-neighbor search: an HNSW index over
//! 384-dim prefilter vectors narrows candidates cheaply, then an exact
//! brute-force cosine pass over the full 768-dim vectors of those
//! candidates reranks for precision. [`SignalIndex`] abstracts the
//! storage-owned indexing so the store can swap implementations (or run
//! index-free in tests) without touching callers in [`crate::search`].

#[cfg(feature = "vector-search")]
mod usearch_index;

pub use crate::error::VectorSearchError;
#[cfg(feature = "vector-search")]
pub use usearch_index::{UsearchSignalIndex, VectorIndexConfig, VectorIndexStats};

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub signal_id: i64,
    pub similarity: f32,
}

/// Local copy of cosine similarity so this module has no dependency on the
/// `embeddings` feature — index math must work even when embeddings are
/// generated externally and only vectors are handed in.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Storage-owned approximate nearest-neighbor index over signal vectors.
///
/// Implementations are expected to be cheap to call from a single writer
/// thread; callers serialize access through the store's own locking.
pub trait SignalIndex: Send {
    fn dimensions(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn add(&mut self, signal_id: i64, vector: &[f32]) -> Result<(), VectorSearchError>;
    fn remove(&mut self, signal_id: i64) -> Result<bool, VectorSearchError>;
    fn contains(&self, signal_id: i64) -> bool;
    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>, VectorSearchError>;
}

/// Brute-force exact cosine search over 768-dim vectors, used for the
/// rerank stage of Matryoshka two-stage search and as the fallback
/// [`SignalIndex`] implementation when the `vector-search` feature is off.
pub struct ExactCosineIndex {
    dimensions: usize,
    vectors: Vec<(i64, Vec<f32>)>,
}

impl ExactCosineIndex {
    pub fn new(dimensions: usize) -> Self {
        ExactCosineIndex { dimensions, vectors: Vec::new() }
    }
}

impl SignalIndex for ExactCosineIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, signal_id: i64, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if let Some(entry) = self.vectors.iter_mut().find(|(id, _)| *id == signal_id) {
            entry.1 = vector.to_vec();
        } else {
            self.vectors.push((signal_id, vector.to_vec()));
        }
        Ok(())
    }

    fn remove(&mut self, signal_id: i64) -> Result<bool, VectorSearchError> {
        let before = self.vectors.len();
        self.vectors.retain(|(id, _)| *id != signal_id);
        Ok(self.vectors.len() != before)
    }

    fn contains(&self, signal_id: i64) -> bool {
        self.vectors.iter().any(|(id, _)| *id == signal_id)
    }

    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>, VectorSearchError> {
        if query.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let mut hits: Vec<IndexHit> = self
            .vectors
            .iter()
            .map(|(id, v)| IndexHit {
                signal_id: *id,
                similarity: cosine_similarity(query, v),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Candidates surviving Matryoshka two-stage search: the rerank stage's
/// exact similarity against the 768-dim vector, keyed by signal id.
pub fn rerank_exact(
    query_768: &[f32],
    candidates: &[(i64, Vec<f32>)],
    limit: usize,
) -> Vec<IndexHit> {
    let mut hits: Vec<IndexHit> = candidates
        .iter()
        .map(|(id, v)| IndexHit { signal_id: *id, similarity: cosine_similarity(query_768, v) })
        .collect();
    hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32) -> Vec<f32> {
        let norm = (x * x + y * y).sqrt();
        vec![x / norm, y / norm]
    }

    #[test]
    fn exact_index_add_and_search() {
        let mut idx = ExactCosineIndex::new(2);
        idx.add(1, &v(1.0, 0.0)).unwrap();
        idx.add(2, &v(0.0, 1.0)).unwrap();

        let hits = idx.search(&v(0.9, 0.1), 2).unwrap();
        assert_eq!(hits[0].signal_id, 1);
    }

    #[test]
    fn exact_index_rejects_wrong_dimension() {
        let mut idx = ExactCosineIndex::new(2);
        assert!(idx.add(1, &[1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn exact_index_update_on_readd() {
        let mut idx = ExactCosineIndex::new(2);
        idx.add(1, &v(1.0, 0.0)).unwrap();
        idx.add(1, &v(0.0, 1.0)).unwrap();
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn exact_index_remove() {
        let mut idx = ExactCosineIndex::new(2);
        idx.add(1, &v(1.0, 0.0)).unwrap();
        assert!(idx.remove(1).unwrap());
        assert!(!idx.contains(1));
    }

    #[test]
    fn rerank_exact_orders_by_similarity() {
        let candidates = vec![(1, v(0.0, 1.0)), (2, v(1.0, 0.0))];
        let hits = rerank_exact(&v(0.9, 0.1), &candidates, 2);
        assert_eq!(hits[0].signal_id, 2);
    }
}
