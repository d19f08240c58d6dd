//! Information Search Service (ISS, C6).
//!
//! Runs a query through the Matryoshka two-stage pipeline: a cheap 384-dim
//! HNSW prefilter narrows the candidate pool, then an exact 768-dim cosine
//! rerank produces the final ranking. Falls back gracefully when the ANN
//! index or the embedding service is unavailable.

use crate::embeddings::{EmbeddingService, NATIVE_DIMENSIONS};
use crate::error::CoreError;
use crate::index::{rerank_exact, ExactCosineIndex, IndexHit, SignalIndex};
use crate::store::SqliteStore;

/// Prefilter dimension used for the first HNSW stage.
pub const PREFILTER_DIMENSIONS: usize = 384;

/// A single ranked result, already hydrated with the owning artifact id.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub artifact_id: i64,
    pub signal_id: i64,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Two-stage Matryoshka: 384-dim prefilter then 768-dim exact rerank.
    Matryoshka,
    /// Single-stage exact search at native dimension — no prefilter index.
    SingleStageExact,
    /// No embeddings available at all: most recent signals, each reported
    /// with a sentinel similarity rather than a real ranking.
    RecentFallback,
}

pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub mode: SearchMode,
}

/// Sentinel similarity reported for [`SearchMode::RecentFallback`] results,
/// since no actual vector comparison was performed.
const FALLBACK_SENTINEL_SIMILARITY: f32 = 0.5;

/// Builds the 384-dim prefilter index: HNSW via `usearch` when the
/// `vector-search` feature is on, exact brute-force cosine otherwise. Either
/// way it's built fresh per query from the candidate pool returned by the
/// store — there's no persistent index to keep warm yet.
fn build_prefilter_index() -> Result<Box<dyn SignalIndex>, CoreError> {
    #[cfg(feature = "vector-search")]
    {
        let index = crate::index::UsearchSignalIndex::new(PREFILTER_DIMENSIONS).map_err(CoreError::from)?;
        Ok(Box::new(index))
    }
    #[cfg(not(feature = "vector-search"))]
    {
        Ok(Box::new(ExactCosineIndex::new(PREFILTER_DIMENSIONS)))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn search(
    store: &SqliteStore,
    embeddings: &EmbeddingService,
    user_id: &str,
    query_text: &str,
    space_id: i64,
    subspace_id: Option<i64>,
    k: usize,
    threshold: f32,
) -> Result<SearchOutcome, CoreError> {
    if !embeddings.is_ready() {
        return recent_fallback(store, user_id, k);
    }

    let query_768 = match embeddings.embed_query(query_text, NATIVE_DIMENSIONS) {
        Ok(v) => v,
        Err(_) => return recent_fallback(store, user_id, k),
    };

    match embeddings.embed_query(query_text, PREFILTER_DIMENSIONS) {
        Ok(query_384) => search_matryoshka(store, user_id, space_id, subspace_id, &query_384, &query_768, k, threshold),
        Err(_) => search_single_stage(store, user_id, space_id, subspace_id, &query_768, k, threshold),
    }
}

/// Two-stage search: prefilter candidates at 384 dims, then rerank the
/// survivors exactly at 768. `prefilter_k` is widened well past `k` so the
/// cheap stage rarely discards a true top result.
#[allow(clippy::too_many_arguments)]
fn search_matryoshka(
    store: &SqliteStore,
    user_id: &str,
    space_id: i64,
    subspace_id: Option<i64>,
    query_384: &[f32],
    query_768: &[f32],
    k: usize,
    threshold: f32,
) -> Result<SearchOutcome, CoreError> {
    let prefilter_k = (10 * k).max(100);

    let candidates_384 = store.search_candidates(user_id, space_id, subspace_id, PREFILTER_DIMENSIONS as i64)?;
    if candidates_384.is_empty() {
        return search_single_stage(store, user_id, space_id, subspace_id, query_768, k, threshold);
    }

    let mut index = build_prefilter_index()?;
    for (signal_id, _, vector) in &candidates_384 {
        index.add(*signal_id, vector).map_err(CoreError::from)?;
    }
    let prefiltered: Vec<IndexHit> = index.search(query_384, prefilter_k).map_err(CoreError::from)?;

    let candidates_768 = store.search_candidates(user_id, space_id, subspace_id, NATIVE_DIMENSIONS as i64)?;
    let artifact_by_signal: std::collections::HashMap<i64, i64> =
        candidates_384.iter().map(|(sid, aid, _)| (*sid, *aid)).collect();

    let surviving_ids: std::collections::HashSet<i64> = prefiltered.iter().map(|h| h.signal_id).collect();
    let exact_pool: Vec<(i64, Vec<f32>)> = candidates_768
        .into_iter()
        .filter(|(signal_id, _, _)| surviving_ids.contains(signal_id))
        .map(|(signal_id, _, v)| (signal_id, v))
        .collect();

    let hits = rerank_exact(query_768, &exact_pool, k);

    let results = hits
        .into_iter()
        .filter(|h| h.similarity >= threshold)
        .filter_map(|h| {
            artifact_by_signal.get(&h.signal_id).map(|artifact_id| SearchResult {
                artifact_id: *artifact_id,
                signal_id: h.signal_id,
                similarity: h.similarity,
            })
        })
        .collect();

    Ok(SearchOutcome { results, mode: SearchMode::Matryoshka })
}

#[allow(clippy::too_many_arguments)]
fn search_single_stage(
    store: &SqliteStore,
    user_id: &str,
    space_id: i64,
    subspace_id: Option<i64>,
    query_768: &[f32],
    k: usize,
    threshold: f32,
) -> Result<SearchOutcome, CoreError> {
    let candidates = store.search_candidates(user_id, space_id, subspace_id, NATIVE_DIMENSIONS as i64)?;
    let artifact_by_signal: std::collections::HashMap<i64, i64> =
        candidates.iter().map(|(sid, aid, _)| (*sid, *aid)).collect();
    let pool: Vec<(i64, Vec<f32>)> = candidates.into_iter().map(|(sid, _, v)| (sid, v)).collect();

    let hits = rerank_exact(query_768, &pool, k);
    let results = hits
        .into_iter()
        .filter(|h| h.similarity >= threshold)
        .filter_map(|h| {
            artifact_by_signal.get(&h.signal_id).map(|artifact_id| SearchResult {
                artifact_id: *artifact_id,
                signal_id: h.signal_id,
                similarity: h.similarity,
            })
        })
        .collect();

    Ok(SearchOutcome { results, mode: SearchMode::SingleStageExact })
}

fn recent_fallback(store: &SqliteStore, user_id: &str, k: usize) -> Result<SearchOutcome, CoreError> {
    let recent = store.recent_signals(user_id, k as i64)?;
    let results = recent
        .into_iter()
        .map(|(signal_id, artifact_id, _)| SearchResult {
            artifact_id,
            signal_id,
            similarity: FALLBACK_SENTINEL_SIMILARITY,
        })
        .collect();
    Ok(SearchOutcome { results, mode: SearchMode::RecentFallback })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_sentinel_is_mid_range() {
        assert!((0.0..=1.0).contains(&FALLBACK_SENTINEL_SIMILARITY));
    }

    #[test]
    fn prefilter_k_widens_past_requested_k() {
        let k = 3;
        let prefilter_k = (10 * k).max(100);
        assert_eq!(prefilter_k, 100);
        let k = 20;
        let prefilter_k = (10 * k).max(100);
        assert_eq!(prefilter_k, 200);
    }
}
