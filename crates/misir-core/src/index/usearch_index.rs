//! HNSW vector index backed by USearch.
//!
//! Used as the 384-dim prefilter stage: approximate, fast, good recall.
//! The 768-dim rerank stage uses [`super::ExactCosineIndex`] /
//! [`super::rerank_exact`] instead — HNSW's approximation is wasted once
//! the candidate set is already small.

#![cfg(feature = "vector-search")]

use std::collections::HashMap;
use std::path::Path;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{IndexHit, SignalIndex};
use crate::error::VectorSearchError;

pub const DEFAULT_CONNECTIVITY: usize = 16;
pub const DEFAULT_EXPANSION_ADD: usize = 128;
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    pub metric: MetricKind,
}

impl VectorIndexConfig {
    pub fn with_dimensions(dimensions: usize) -> Self {
        VectorIndexConfig {
            dimensions,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            metric: MetricKind::Cos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    pub total_vectors: usize,
    pub dimensions: usize,
    pub connectivity: usize,
    pub memory_bytes: usize,
}

/// HNSW index keyed by signal id, with cosine distance converted to
/// similarity (`1 - distance`) at the [`SignalIndex::search`] boundary.
pub struct UsearchSignalIndex {
    index: Index,
    config: VectorIndexConfig,
    present: HashMap<i64, ()>,
}

impl UsearchSignalIndex {
    pub fn new(dimensions: usize) -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::with_dimensions(dimensions))
    }

    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: config.metric,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        Ok(UsearchSignalIndex { index, config, present: HashMap::new() })
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorSearchError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorSearchError::IndexCreation(format!("reserve failed: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), VectorSearchError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".to_string()))?;
        self.index.save(path_str).map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let keys_path = path.with_extension("keys.json");
        let keys: Vec<i64> = self.present.keys().copied().collect();
        let json = serde_json::to_string(&keys)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        std::fs::write(&keys_path, json).map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Path, config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".to_string()))?;

        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: config.metric,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        index.load(path_str).map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let keys_path = path.with_extension("keys.json");
        let keys_str = std::fs::read_to_string(&keys_path)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        let keys: Vec<i64> = serde_json::from_str(&keys_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        let present = keys.into_iter().map(|k| (k, ())).collect();

        Ok(UsearchSignalIndex { index, config, present })
    }

    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.index.size(),
            dimensions: self.config.dimensions,
            connectivity: self.config.connectivity,
            memory_bytes: self.index.serialized_length(),
        }
    }
}

impl SignalIndex for UsearchSignalIndex {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn add(&mut self, signal_id: i64, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }

        let key = signal_id as u64;

        if self.present.contains_key(&signal_id) {
            self.index.remove(key).map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index.add(key, vector).map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            return Ok(());
        }

        let current_capacity = self.index.capacity();
        let current_size = self.index.size();
        if current_size >= current_capacity {
            let new_capacity = std::cmp::max(current_capacity * 2, 16);
            self.reserve(new_capacity)?;
        }

        self.index.add(key, vector).map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.present.insert(signal_id, ());
        Ok(())
    }

    fn remove(&mut self, signal_id: i64) -> Result<bool, VectorSearchError> {
        if self.present.remove(&signal_id).is_some() {
            self.index
                .remove(signal_id as u64)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn contains(&self, signal_id: i64) -> bool {
        self.present.contains_key(&signal_id)
    }

    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>, VectorSearchError> {
        if query.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        let results = self.index.search(query, limit).map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        Ok(results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(key, distance)| IndexHit { signal_id: *key as i64, similarity: 1.0 - distance })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vector(seed: f32, dims: usize) -> Vec<f32> {
        (0..dims).map(|i| ((i as f32 + seed) / dims as f32).sin()).collect()
    }

    #[test]
    fn creation_starts_empty() {
        let index = UsearchSignalIndex::new(384).unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), 384);
    }

    #[test]
    fn add_and_search() {
        let mut index = UsearchSignalIndex::new(384).unwrap();
        let v1 = test_vector(1.0, 384);
        let v2 = test_vector(2.0, 384);
        let v3 = test_vector(100.0, 384);

        index.add(1, &v1).unwrap();
        index.add(2, &v2).unwrap();
        index.add(3, &v3).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.contains(1));
        assert!(!index.contains(999));

        let results = index.search(&v1, 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].signal_id, 1);
    }

    #[test]
    fn remove_evicts_key() {
        let mut index = UsearchSignalIndex::new(384).unwrap();
        index.add(1, &test_vector(1.0, 384)).unwrap();
        assert!(index.remove(1).unwrap());
        assert!(!index.contains(1));
    }

    #[test]
    fn readd_updates_in_place() {
        let mut index = UsearchSignalIndex::new(384).unwrap();
        index.add(1, &test_vector(1.0, 384)).unwrap();
        index.add(1, &test_vector(2.0, 384)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = UsearchSignalIndex::new(384).unwrap();
        let wrong: Vec<f32> = vec![1.0, 2.0, 3.0];
        assert!(index.add(1, &wrong).is_err());
    }
}
