//! Local embedding generation via fastembed.
//!
//! The model is loaded once behind a [`OnceLock`] and shared across calls
//! (fastembed's `TextEmbedding` is not `Sync` on its own, hence the
//! `Mutex`). The full 768-dim vector for a given role-prefixed text is
//! cached in an LRU so that repeated requests at different Matryoshka
//! dimensions reuse one inference call.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;

use crate::error::EmbeddingError;

/// Native output dimension of the underlying model.
pub const NATIVE_DIMENSIONS: usize = 768;

/// Matryoshka dimensions the rest of the system is allowed to request.
pub const SUPPORTED_DIMENSIONS: [usize; 5] = [768, 384, 256, 128, 64];

/// Maximum text length for embedding (truncated if longer).
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for efficient embedding generation.
pub const BATCH_SIZE: usize = 32;

const QUERY_PREFIX: &str = "search_query: ";
const DOCUMENT_PREFIX: &str = "search_document: ";

const CACHE_CAPACITY: usize = 4096;

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "misir", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/misir/fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("failed to create embedding cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "failed to initialize nomic-embed-text-v1.5: {e}. \
                 ensure ONNX runtime is available and model files can be downloaded"
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// Apply Matryoshka truncation: truncate to `dim` and L2-normalize.
///
/// Nomic Embed v1.5 was trained with Matryoshka Representation Learning, so
/// the first `dim` components of the 768-dim output ARE a valid `dim`-sized
/// embedding with minimal quality loss.
#[inline]
pub fn matryoshka_truncate(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() > dim {
        vector.truncate(dim);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn truncate_text(text: &str) -> &str {
    if text.len() > MAX_TEXT_LENGTH {
        &text[..MAX_TEXT_LENGTH]
    } else {
        text
    }
}

fn validate_dim(dim: usize) -> Result<(), EmbeddingError> {
    if SUPPORTED_DIMENSIONS.contains(&dim) {
        Ok(())
    } else {
        Err(EmbeddingError::InvalidDimension(dim))
    }
}

/// Generates and caches embeddings for document and query text.
///
/// Document and query text get different role prefixes (nomic-embed-text's
/// asymmetric retrieval convention) so the same underlying string embeds
/// differently depending on which side of a search it's on. The LRU caches
/// the full 768-dim vector keyed by the prefixed text; every other
/// dimension is derived from that cached vector via
/// [`matryoshka_truncate`], so repeated calls at different dims never
/// re-run inference.
pub struct EmbeddingService {
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService {
    pub fn new() -> Self {
        EmbeddingService {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
        }
    }

    pub fn model_name(&self) -> &'static str {
        "nomic-ai/nomic-embed-text-v1.5"
    }

    pub fn is_ready(&self) -> bool {
        get_model().is_ok()
    }

    pub fn check_ready(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }

    fn embed_full(&self, prefixed_text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(cached) = self.cache.lock().unwrap().get(prefixed_text) {
            return Ok(cached.clone());
        }

        let mut model = get_model()?;
        let text = truncate_text(prefixed_text);
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let vector = embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".into()))?;

        self.cache.lock().unwrap().put(prefixed_text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Embeds `text` with the document role prefix at the given Matryoshka
    /// dimension. Used when ingesting artifact content.
    pub fn embed_document(&self, text: &str, dim: usize) -> Result<Vec<f32>, EmbeddingError> {
        validate_dim(dim)?;
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        let prefixed = format!("{DOCUMENT_PREFIX}{text}");
        let full = self.embed_full(&prefixed)?;
        Ok(matryoshka_truncate(full, dim))
    }

    /// Embeds `text` with the query role prefix at the given Matryoshka
    /// dimension. Used for search queries and intention text.
    pub fn embed_query(&self, text: &str, dim: usize) -> Result<Vec<f32>, EmbeddingError> {
        validate_dim(dim)?;
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        let prefixed = format!("{QUERY_PREFIX}{text}");
        let full = self.embed_full(&prefixed)?;
        Ok(matryoshka_truncate(full, dim))
    }

    /// Batch document embedding, one full-dim inference call per
    /// `BATCH_SIZE` chunk.
    pub fn embed_document_batch(
        &self,
        texts: &[&str],
        dim: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        validate_dim(dim)?;
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut out = Vec::with_capacity(texts.len());
        let mut uncached_idx = Vec::new();
        let mut uncached_text = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap();
            for (i, t) in texts.iter().enumerate() {
                let prefixed = format!("{DOCUMENT_PREFIX}{t}");
                if let Some(v) = cache.get(&prefixed) {
                    out.push(Some(v.clone()));
                } else {
                    out.push(None);
                    uncached_idx.push(i);
                    uncached_text.push(prefixed);
                }
            }
        }

        if !uncached_text.is_empty() {
            let mut model = get_model()?;
            for chunk_start in (0..uncached_text.len()).step_by(BATCH_SIZE) {
                let chunk_end = (chunk_start + BATCH_SIZE).min(uncached_text.len());
                let chunk: Vec<&str> =
                    uncached_text[chunk_start..chunk_end].iter().map(|s| truncate_text(s)).collect();

                let embeddings = model
                    .embed(chunk, None)
                    .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

                let mut cache = self.cache.lock().unwrap();
                for (offset, vector) in embeddings.into_iter().enumerate() {
                    let global_idx = uncached_idx[chunk_start + offset];
                    cache.put(uncached_text[chunk_start + offset].clone(), vector.clone());
                    out[global_idx] = Some(vector);
                }
            }
        }

        Ok(out
            .into_iter()
            .map(|v| matryoshka_truncate(v.expect("every text resolved"), dim))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matryoshka_truncate_is_unit_norm() {
        let v = vec![3.0, 4.0, 0.0, 0.0];
        let truncated = matryoshka_truncate(v, 2);
        assert_eq!(truncated.len(), 2);
        let norm = truncated.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn matryoshka_truncate_noop_when_dim_exceeds_len() {
        let v = vec![1.0, 0.0];
        let truncated = matryoshka_truncate(v.clone(), 768);
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-4);
    }

    #[test]
    fn cosine_similarity_opposite_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn euclidean_distance_zero_for_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!(euclidean_distance(&a, &a).abs() < 1e-4);
    }

    #[test]
    fn validate_dim_rejects_unsupported() {
        assert!(validate_dim(100).is_err());
        assert!(validate_dim(384).is_ok());
    }
}
