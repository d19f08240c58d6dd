//! Data Model
//!
//! Entities are user-scoped: every record carries `user_id` and the store
//! filters by it on every read. Types here are the shapes the core
//! operates on and returns to callers; persistence is the store's job
//! (see [`crate::store`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENGAGEMENT LATTICE
// ============================================================================

/// Engagement level, totally ordered `Latent < Discovered < Engaged < Saturated`.
///
/// Upserting an artifact only ever *upgrades* this value (see
/// [`EngagementLevel::upgrade`]); it is never downgraded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Latent,
    Discovered,
    Engaged,
    Saturated,
}

impl Default for EngagementLevel {
    fn default() -> Self {
        EngagementLevel::Latent
    }
}

impl EngagementLevel {
    /// Returns the higher of `self` and `other` per the lattice order.
    pub fn upgrade(self, other: EngagementLevel) -> EngagementLevel {
        self.max(other)
    }

    /// Normalizes legacy level names used by older clients.
    pub fn from_legacy(s: &str) -> Option<EngagementLevel> {
        match s {
            "ambient" => Some(EngagementLevel::Latent),
            "active" => Some(EngagementLevel::Engaged),
            "committed" => Some(EngagementLevel::Saturated),
            "latent" => Some(EngagementLevel::Latent),
            "discovered" => Some(EngagementLevel::Discovered),
            "engaged" => Some(EngagementLevel::Engaged),
            "saturated" => Some(EngagementLevel::Saturated),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngagementLevel::Latent => "latent",
            EngagementLevel::Discovered => "discovered",
            EngagementLevel::Engaged => "engaged",
            EngagementLevel::Saturated => "saturated",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latent" => Ok(EngagementLevel::Latent),
            "discovered" => Ok(EngagementLevel::Discovered),
            "engaged" => Ok(EngagementLevel::Engaged),
            "saturated" => Ok(EngagementLevel::Saturated),
            other => EngagementLevel::from_legacy(other)
                .ok_or_else(|| format!("unknown engagement level: {other}")),
        }
    }
}

// ============================================================================
// CONTENT SOURCE
// ============================================================================

/// Where a captured artifact's content came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Web,
    Pdf,
    Video,
    Chat,
    Note,
    Other,
}

impl Default for ContentSource {
    fn default() -> Self {
        ContentSource::Web
    }
}

impl ContentSource {
    /// Normalizes legacy source names used by older clients.
    pub fn from_legacy(s: &str) -> Option<ContentSource> {
        match s {
            "ai" => Some(ContentSource::Chat),
            "document" => Some(ContentSource::Pdf),
            "ebook" => Some(ContentSource::Pdf),
            "web" => Some(ContentSource::Web),
            "pdf" => Some(ContentSource::Pdf),
            "video" => Some(ContentSource::Video),
            "chat" => Some(ContentSource::Chat),
            "note" => Some(ContentSource::Note),
            "other" => Some(ContentSource::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentSource::Web => "web",
            ContentSource::Pdf => "pdf",
            ContentSource::Video => "video",
            ContentSource::Chat => "chat",
            ContentSource::Note => "note",
            ContentSource::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Kind of embedded event attached to an artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Semantic,
    Temporal,
    Behavioral,
}

impl Default for SignalType {
    fn default() -> Self {
        SignalType::Semantic
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalType::Semantic => "semantic",
            SignalType::Temporal => "temporal",
            SignalType::Behavioral => "behavioral",
        };
        write!(f, "{s}")
    }
}

/// Where a marker-to-subspace association came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSource {
    UserDefined,
    Suggested,
    Auto,
}

impl std::fmt::Display for MarkerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarkerSource::UserDefined => "user_defined",
            MarkerSource::Suggested => "suggested",
            MarkerSource::Auto => "auto",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MarkerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_defined" => Ok(MarkerSource::UserDefined),
            "suggested" => Ok(MarkerSource::Suggested),
            "auto" => Ok(MarkerSource::Auto),
            other => Err(format!("unknown marker source: {other}")),
        }
    }
}

// ============================================================================
// ARTIFACT
// ============================================================================

/// A single captured piece of content.
///
/// Identity is `id` plus the store-enforced `(user_id, normalized_url)`
/// uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: i64,
    pub user_id: String,
    pub url: String,
    pub normalized_url: String,
    pub domain: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub word_count: i64,
    pub engagement_level: EngagementLevel,
    pub content_source: ContentSource,
    pub dwell_time_ms: i64,
    pub scroll_depth: f32,
    pub reading_depth: f32,
    pub space_id: i64,
    pub subspace_id: Option<i64>,
    pub matched_marker_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Artifact {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ============================================================================
// SIGNAL
// ============================================================================

/// The atomic semantic event attached to an artifact — the unit of learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: i64,
    pub artifact_id: i64,
    pub user_id: String,
    pub vector: Vec<f32>,
    pub magnitude: f32,
    pub signal_type: SignalType,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub margin: Option<f32>,
    pub updates_centroid: bool,
    pub space_id: i64,
    pub subspace_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ============================================================================
// SPACE
// ============================================================================

/// A top-level container for subspaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub intention: Option<String>,
    pub intention_embedding: Option<Vec<f32>>,
    pub artifact_count: i64,
    /// Weighted average of child subspace confidences.
    pub evidence: f32,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ============================================================================
// SUBSPACE
// ============================================================================

/// A semantic cluster inside a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subspace {
    pub id: i64,
    pub user_id: String,
    pub space_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub centroid_embedding: Option<Vec<f32>>,
    pub centroid_updated_at: Option<DateTime<Utc>>,
    pub learning_rate: f32,
    pub artifact_count: i64,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Informational centroid lifecycle state, derived from `confidence` and
/// `artifact_count`. Never persisted as its own column; never changes
/// algorithm behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubspaceLifecycle {
    Uninitialized,
    Learning,
    Stable,
}

impl Subspace {
    /// Derives the informational lifecycle stage for this subspace.
    ///
    /// `Stable` once `confidence >= 0.8 && artifact_count >= 20`; terminal
    /// (soft-deleted) subspaces are reported as `Stable` too since this
    /// value never gates behavior — callers should check `deleted_at`
    /// themselves if the distinction matters.
    pub fn lifecycle(&self) -> SubspaceLifecycle {
        if self.centroid_embedding.is_none() {
            return SubspaceLifecycle::Uninitialized;
        }
        if self.confidence >= 0.8 && self.artifact_count >= 20 {
            SubspaceLifecycle::Stable
        } else {
            SubspaceLifecycle::Learning
        }
    }
}

// ============================================================================
// MARKER
// ============================================================================

/// A user-defined semantic anchor used to seed or rescue subspace assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: i64,
    pub user_id: String,
    pub label: String,
    pub embedding: Option<Vec<f32>>,
    pub weight: f32,
    pub created_at: DateTime<Utc>,
}

/// A weighted association linking a marker to a subspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerLink {
    pub subspace_id: i64,
    pub marker_id: i64,
    pub weight: f32,
    pub source: MarkerSource,
}

pub const MARKER_MIN_WEIGHT: f32 = 0.05;
pub const MARKER_DECAY_RATE: f32 = 0.02;

/// Applies one step of marker weight decay: `w <- max(w * (1 - gamma), w_min)`.
pub fn decay_marker_weight(weight: f32, gamma: f32, w_min: f32) -> f32 {
    (weight * (1.0 - gamma)).max(w_min)
}

// ============================================================================
// HISTORY / TIME SERIES
// ============================================================================

/// Append-only record of a centroid value at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentroidHistoryEntry {
    pub id: i64,
    pub subspace_id: i64,
    pub centroid: Vec<f32>,
    pub occurred_at: DateTime<Utc>,
}

/// A logged drift event; only written when `drift_magnitude` clears the
/// configured threshold (see [`crate::centroid`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftEvent {
    pub id: i64,
    pub subspace_id: i64,
    pub space_id: i64,
    pub drift_magnitude: f32,
    pub trigger_signal_id: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Scalar centroid speed sampled whenever a drift event is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityMeasurement {
    pub id: i64,
    pub subspace_id: i64,
    pub space_id: i64,
    pub velocity: f32,
    pub displacement: Vec<f32>,
    pub measured_at: DateTime<Utc>,
}

/// A batch-coherence confidence sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceSample {
    pub id: i64,
    pub subspace_id: i64,
    pub confidence: f32,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_lattice_is_totally_ordered() {
        assert!(EngagementLevel::Latent < EngagementLevel::Discovered);
        assert!(EngagementLevel::Discovered < EngagementLevel::Engaged);
        assert!(EngagementLevel::Engaged < EngagementLevel::Saturated);
    }

    #[test]
    fn upgrade_never_downgrades() {
        let engaged = EngagementLevel::Engaged;
        assert_eq!(engaged.upgrade(EngagementLevel::Latent), EngagementLevel::Engaged);
        assert_eq!(engaged.upgrade(EngagementLevel::Saturated), EngagementLevel::Saturated);
    }

    #[test]
    fn legacy_engagement_mapping() {
        assert_eq!(EngagementLevel::from_legacy("ambient"), Some(EngagementLevel::Latent));
        assert_eq!(EngagementLevel::from_legacy("active"), Some(EngagementLevel::Engaged));
        assert_eq!(EngagementLevel::from_legacy("committed"), Some(EngagementLevel::Saturated));
    }

    #[test]
    fn legacy_content_source_mapping() {
        assert_eq!(ContentSource::from_legacy("ai"), Some(ContentSource::Chat));
        assert_eq!(ContentSource::from_legacy("document"), Some(ContentSource::Pdf));
        assert_eq!(ContentSource::from_legacy("ebook"), Some(ContentSource::Pdf));
    }

    #[test]
    fn marker_weight_decays_but_floors_at_minimum() {
        let decayed = decay_marker_weight(0.5, MARKER_DECAY_RATE, MARKER_MIN_WEIGHT);
        assert!((decayed - 0.49).abs() < 1e-5);
        let floored = decay_marker_weight(MARKER_MIN_WEIGHT, MARKER_DECAY_RATE, MARKER_MIN_WEIGHT);
        assert_eq!(floored, MARKER_MIN_WEIGHT);
    }

    #[test]
    fn subspace_lifecycle_uninitialized_without_centroid() {
        let s = Subspace {
            id: 1,
            user_id: "u".into(),
            space_id: 1,
            name: "x".into(),
            description: None,
            centroid_embedding: None,
            centroid_updated_at: None,
            learning_rate: 0.1,
            artifact_count: 0,
            confidence: 0.0,
            created_at: Utc::now(),
            deleted_at: None,
        };
        assert_eq!(s.lifecycle(), SubspaceLifecycle::Uninitialized);
    }

    #[test]
    fn subspace_lifecycle_stable_thresholds() {
        let mut s = Subspace {
            id: 1,
            user_id: "u".into(),
            space_id: 1,
            name: "x".into(),
            description: None,
            centroid_embedding: Some(vec![1.0, 0.0]),
            centroid_updated_at: Some(Utc::now()),
            learning_rate: 0.1,
            artifact_count: 20,
            confidence: 0.8,
            created_at: Utc::now(),
            deleted_at: None,
        };
        assert_eq!(s.lifecycle(), SubspaceLifecycle::Stable);
        s.artifact_count = 19;
        assert_eq!(s.lifecycle(), SubspaceLifecycle::Learning);
    }
}
