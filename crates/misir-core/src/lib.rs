//! # Misir Core
//!
//! Semantic orientation engine: learns where a user's attention lives
//! across personal knowledge spaces, without asking them to organize
//! anything by hand.
//!
//! - **Online Semantic Centroid Learning (OSCL)**: each subspace tracks an
//!   exponential moving average centroid over the embeddings of what the
//!   user has actually engaged with.
//! - **Assignment Margin Gating**: an artifact only moves a centroid when
//!   it's clearly closer to one subspace than the runner-up; ambiguous
//!   signals are recorded but don't blur the centroid they're closest to.
//! - **Matryoshka Two-Stage Search**: a cheap 384-dim HNSW prefilter over
//!   truncated embeddings narrows the field, then an exact 768-dim cosine
//!   pass reranks for precision.
//! - **Semantic Drift Detection (SDD)**: centroid movement, velocity, and
//!   batch coherence are tracked over time so a subspace that's quietly
//!   changing shape can be surfaced before it's unrecognizable.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use misir_core::{SqliteStore, CaptureArtifactCommand, EngagementLevel, ContentSource, SignalType};
//!
//! let store = SqliteStore::open_in_memory()?;
//! let embeddings = misir_core::embeddings::EmbeddingService::new();
//! let cfg = misir_core::config::SystemConfig::default();
//!
//! let space = store.create_space("user-1", "Research", Some("deep learning papers"))?;
//! let cmd = CaptureArtifactCommand::new(
//!     "user-1".into(), "https://example.com/paper".into(), Some("A Paper".into()), None,
//!     1200, 0.7, 0.6, 90_000, EngagementLevel::Discovered, ContentSource::Web,
//!     space.id, None, SignalType::Semantic,
//! )?;
//! let webhook_client = reqwest::Client::new();
//! let outcome = misir_core::assignment::capture_artifact(&store, &embeddings, &cfg, &webhook_client, cmd)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed
//! - `vector-search` (default): HNSW prefiltering with USearch
//! - `bundled-sqlite` (default): statically link SQLite rather than require
//!   a system library
//! - `metal`: Metal GPU acceleration for embedding inference on Apple Silicon

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod analytics;
pub mod config;
pub mod error;
pub mod margin;
pub mod model;
pub mod store;
pub mod webhook;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embeddings;

/// Online Semantic Centroid Learning: EMA centroid updates, drift
/// magnitude, velocity, and batch coherence.
pub mod centroid;

/// Vector index abstraction (HNSW prefilter + exact rerank).
pub mod index;

/// Artifact capture and subspace assignment (the 7-step ingest pipeline).
#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod assignment;

/// Matryoshka two-stage semantic search over captured signals.
#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod search;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Domain model
pub use model::{
    Artifact, ConfidenceSample, ContentSource, CentroidHistoryEntry, DriftEvent, EngagementLevel,
    Marker, MarkerLink, MarkerSource, Signal, SignalType, Space, Subspace, SubspaceLifecycle,
    VelocityMeasurement, MARKER_DECAY_RATE, MARKER_MIN_WEIGHT,
};

// Errors
pub use error::{
    ConfigError, CoreError, EmbeddingError as CoreEmbeddingError, Result, StorageError,
    ValidationError, VectorSearchError, WebhookError,
};

// Configuration
pub use config::{
    CentroidHistoryThreshold, ConfigHandle, EmbeddingModelConfig, ReadingDepthConstants,
    SystemConfig, VectorIndexParams,
};

// Assignment margin gate
pub use margin::{compute_margin, CentroidCandidate, MarginResult};

// OSCL centroid math
pub use centroid::{
    calculate_batch_coherence, calculate_drift, calculate_velocity, measure_drift, update_centroid,
    update_confidence, DriftMeasurement, DEFAULT_CONFIDENCE_LEARNING_RATE,
};

// Vector index
pub use index::{rerank_exact, ExactCosineIndex, IndexHit, SignalIndex};
#[cfg(feature = "vector-search")]
pub use index::{UsearchSignalIndex, VectorIndexConfig, VectorIndexStats};

// Storage
pub use store::SqliteStore;

// Webhook dispatch
pub use webhook::{deliver_with_retry, backoff_delay, WebhookEnvelope, WebhookSubscription};

// Embeddings (when feature enabled)
#[cfg(feature = "embeddings")]
pub use embeddings::{
    cosine_similarity, euclidean_distance, matryoshka_truncate, EmbeddingService,
    NATIVE_DIMENSIONS, SUPPORTED_DIMENSIONS,
};

// Assignment (when feature enabled)
#[cfg(feature = "embeddings")]
pub use assignment::{capture_artifact, CaptureArtifactCommand, CaptureOutcome};

// Search (when feature enabled)
#[cfg(feature = "embeddings")]
pub use search::{search, SearchMode, SearchOutcome, SearchResult};

// Analytics
pub use analytics::{
    confidence_series, drift_series, evaluate_alerts, global_analytics, margin_distribution,
    velocity_series, Alert, AlertSeverity, GlobalAnalytics, GlobalOverview, HeatmapDay,
    MarginDistribution, MarginStrength, SpacePace, SystemHealth, TimeAllocationEntry, Trend,
    WeakItem,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model: nomic-embed-text-v1.5, 768 dimensions,
/// Matryoshka-capable, 8192 token context.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Artifact, CentroidCandidate, ContentSource, CoreError, EngagementLevel, MarginResult,
        Result, Signal, SignalType, Space, SqliteStore, Subspace, SystemConfig,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::{CaptureArtifactCommand, EmbeddingService, capture_artifact, search};

    #[cfg(feature = "vector-search")]
    pub use crate::{UsearchSignalIndex, VectorIndexConfig};

    pub use crate::{
        evaluate_alerts, global_analytics, margin_distribution, Alert, GlobalAnalytics,
        MarginDistribution, Trend,
    };
}
