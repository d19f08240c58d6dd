//! System configuration cache.
//!
//! A TTL-refreshed, fail-soft cache over a small set of tunables that would
//! otherwise be scattered constants: embedding dimension, vector index
//! build params, reading-depth heuristics, and the centroid history logging
//! gate. Values are served from `moka`'s in-memory cache and refreshed from
//! the configured source on expiry; a failed refresh keeps serving the last
//! known value rather than erroring the caller.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    pub name: String,
    pub dimension: usize,
    pub context_length: usize,
}

impl Default for EmbeddingModelConfig {
    fn default() -> Self {
        EmbeddingModelConfig {
            name: "nomic-embed-text-v1.5".to_string(),
            dimension: 768,
            context_length: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VectorIndexParams {
    pub m: usize,
    pub ef_construction: usize,
}

impl Default for VectorIndexParams {
    fn default() -> Self {
        VectorIndexParams { m: 16, ef_construction: 128 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadingDepthConstants {
    pub avg_wpm: f32,
    pub time_weight: f32,
    pub scroll_weight: f32,
    pub max_ratio: f32,
}

impl Default for ReadingDepthConstants {
    fn default() -> Self {
        ReadingDepthConstants {
            avg_wpm: 200.0,
            time_weight: 0.6,
            scroll_weight: 0.4,
            max_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CentroidHistoryThreshold {
    pub distance_threshold: f32,
    pub min_signals_between_logs: u32,
}

impl Default for CentroidHistoryThreshold {
    fn default() -> Self {
        CentroidHistoryThreshold { distance_threshold: 0.05, min_signals_between_logs: 5 }
    }
}

/// The full set of live-tunable system defaults, mirroring the original
/// config cache's `DEFAULTS` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub embedding_model: EmbeddingModelConfig,
    pub vector_index_params: VectorIndexParams,
    pub reading_depth_constants: ReadingDepthConstants,
    pub centroid_history_threshold: CentroidHistoryThreshold,
    pub assignment_margin_threshold: f32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            embedding_model: EmbeddingModelConfig::default(),
            vector_index_params: VectorIndexParams::default(),
            reading_depth_constants: ReadingDepthConstants::default(),
            centroid_history_threshold: CentroidHistoryThreshold::default(),
            assignment_margin_threshold: 0.05,
        }
    }
}

const CONFIG_CACHE_KEY: &str = "system_config";

/// Fail-soft, TTL-refreshed handle onto [`SystemConfig`].
///
/// Reads never block on a slow or failing refresh source: a cache miss
/// (first call, or eviction after `ttl`) falls back to the last value this
/// handle ever successfully produced, and failing that, to
/// [`SystemConfig::default`].
pub struct ConfigHandle {
    cache: Cache<&'static str, Arc<SystemConfig>>,
    last_known: std::sync::Mutex<Option<Arc<SystemConfig>>>,
}

impl ConfigHandle {
    /// Builds a handle with the given refresh TTL. Entries are served stale
    /// (via `last_known`) whenever the configured source errors.
    pub fn new(ttl: Duration) -> Self {
        ConfigHandle {
            cache: Cache::builder().time_to_live(ttl).max_capacity(1).build(),
            last_known: std::sync::Mutex::new(None),
        }
    }

    /// Returns the current config, refreshing from `fetch` if the TTL has
    /// expired. `fetch` failures are swallowed and logged; the last known
    /// good value (or the compiled-in default) is returned instead.
    pub fn get_or_refresh<F>(&self, fetch: F) -> Arc<SystemConfig>
    where
        F: FnOnce() -> std::result::Result<SystemConfig, crate::error::ConfigError>,
    {
        if let Some(cfg) = self.cache.get(&CONFIG_CACHE_KEY) {
            return cfg;
        }
        match fetch() {
            Ok(cfg) => {
                let cfg = Arc::new(cfg);
                self.cache.insert(CONFIG_CACHE_KEY, cfg.clone());
                *self.last_known.lock().unwrap() = Some(cfg.clone());
                cfg
            }
            Err(err) => {
                tracing::warn!(error = %err, "config refresh failed, serving stale value");
                let fallback = self
                    .last_known
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Arc::new(SystemConfig::default()));
                self.cache.insert(CONFIG_CACHE_KEY, fallback.clone());
                fallback
            }
        }
    }

    /// Returns the currently cached value without attempting a refresh,
    /// falling back to defaults if nothing has ever been fetched.
    pub fn current(&self) -> Arc<SystemConfig> {
        self.cache
            .get(&CONFIG_CACHE_KEY)
            .or_else(|| self.last_known.lock().unwrap().clone())
            .unwrap_or_else(|| Arc::new(SystemConfig::default()))
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        ConfigHandle::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.embedding_model.dimension, 768);
        assert_eq!(cfg.vector_index_params.m, 16);
        assert_eq!(cfg.centroid_history_threshold.min_signals_between_logs, 5);
        assert_eq!(cfg.assignment_margin_threshold, 0.05);
    }

    #[test]
    fn refresh_failure_falls_back_to_default() {
        let handle = ConfigHandle::new(Duration::from_secs(60));
        let cfg = handle.get_or_refresh(|| {
            Err(crate::error::ConfigError::FetchFailed("unreachable".into()))
        });
        assert_eq!(cfg.embedding_model.dimension, 768);
    }

    #[test]
    fn refresh_failure_after_success_keeps_last_known() {
        let handle = ConfigHandle::new(Duration::from_millis(0));
        let mut first = SystemConfig::default();
        first.assignment_margin_threshold = 0.2;
        let got = handle.get_or_refresh(|| Ok(first.clone()));
        assert_eq!(got.assignment_margin_threshold, 0.2);

        let got2 = handle.get_or_refresh(|| {
            Err(crate::error::ConfigError::FetchFailed("down".into()))
        });
        assert_eq!(got2.assignment_margin_threshold, 0.2);
    }
}
