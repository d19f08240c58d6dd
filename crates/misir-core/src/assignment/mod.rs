//! Artifact Capture & Assignment (C5).
//!
//! Orchestrates a single capture request end to end: validate the
//! command, embed the content, resolve which subspace it belongs to via
//! the margin service, persist atomically, and update centroid/drift
//! telemetry when the margin gate allows it. Webhook dispatch is
//! fire-and-forget and never fails the capture.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;
use crate::embeddings::EmbeddingService;
use crate::error::{CoreError, ValidationError};
use crate::margin::{self, CentroidCandidate};
use crate::model::{Artifact, ContentSource, EngagementLevel, SignalType};
use crate::store::SqliteStore;

/// Client-supplied engagement and reading telemetry for a capture request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureArtifactCommand {
    pub user_id: String,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub word_count: i64,
    pub reading_depth: f32,
    pub scroll_depth: f32,
    pub dwell_time_ms: i64,
    pub engagement_level: EngagementLevel,
    pub content_source: ContentSource,
    pub space_id: i64,
    pub subspace_hint_id: Option<i64>,
    pub signal_type: SignalType,
}

impl CaptureArtifactCommand {
    /// Total constructor: validates inputs and returns `Err` rather than
    /// panicking or constructing a command the handler would have to
    /// reject later.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        url: String,
        title: Option<String>,
        content: Option<String>,
        word_count: i64,
        reading_depth: f32,
        scroll_depth: f32,
        dwell_time_ms: i64,
        engagement_level: EngagementLevel,
        content_source: ContentSource,
        space_id: i64,
        subspace_hint_id: Option<i64>,
        signal_type: SignalType,
    ) -> Result<Self, ValidationError> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::InvalidInput("user_id must not be empty".into()));
        }
        if url.trim().is_empty() {
            return Err(ValidationError::InvalidInput("url must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&scroll_depth) {
            return Err(ValidationError::InvalidRange("scroll_depth must be in [0, 1]".into()));
        }
        if !(0.0..=1.5).contains(&reading_depth) {
            return Err(ValidationError::InvalidRange("reading_depth must be in [0, 1.5]".into()));
        }
        if dwell_time_ms < 0 {
            return Err(ValidationError::InvalidRange("dwell_time_ms must be >= 0".into()));
        }
        if word_count < 0 {
            return Err(ValidationError::InvalidRange("word_count must be >= 0".into()));
        }

        Ok(CaptureArtifactCommand {
            user_id,
            url,
            title,
            content,
            word_count,
            reading_depth,
            scroll_depth,
            dwell_time_ms,
            engagement_level,
            content_source,
            space_id,
            subspace_hint_id,
            signal_type,
        })
    }
}

/// Expected-vs-reported reading depth mismatch beyond this is logged as
/// suspicious but never rejects the capture — the store stays the sole
/// arbiter of what gets persisted.
const READING_DEPTH_SUSPICION_THRESHOLD: f32 = 0.20;

fn log_if_reading_depth_suspicious(cmd: &CaptureArtifactCommand, cfg: &SystemConfig) {
    if cmd.word_count == 0 {
        return;
    }
    let c = &cfg.reading_depth_constants;
    let expected_time_ms = (cmd.word_count as f32) * 60_000.0 / c.avg_wpm;
    if expected_time_ms <= 0.0 {
        return;
    }
    let time_ratio = (cmd.dwell_time_ms as f32 / expected_time_ms).min(c.max_ratio);
    let expected_depth = time_ratio * c.time_weight + cmd.scroll_depth * c.scroll_weight;

    if (expected_depth - cmd.reading_depth).abs() > READING_DEPTH_SUSPICION_THRESHOLD {
        tracing::warn!(
            user_id = %cmd.user_id,
            url = %cmd.url,
            expected_depth,
            reported_depth = cmd.reading_depth,
            "reading depth looks inconsistent with dwell time and scroll depth"
        );
    }
}

pub struct CaptureOutcome {
    pub artifact_id: i64,
    pub signal_id: i64,
    pub subspace_id: Option<i64>,
    pub margin: Option<f32>,
    pub updates_centroid: bool,
}

/// Best-effort legacy repair is bounded to this many affected subspaces per
/// capture so a pathological space can't turn one request into a scan of
/// the user's whole history.
const LEGACY_REPAIR_SUBSPACE_LIMIT: usize = 20;

/// Runs the full capture pipeline against an already-open store: embed
/// content, resolve the target subspace via the margin service (falling
/// back to marker hints and, as a last resort, legacy repair), persist
/// atomically — the store updates the winning subspace's centroid and
/// drift/velocity/confidence telemetry in the same transaction — and
/// fire any subscribed webhooks.
pub fn capture_artifact(
    store: &SqliteStore,
    embeddings: &EmbeddingService,
    cfg: &SystemConfig,
    webhook_client: &reqwest::Client,
    cmd: CaptureArtifactCommand,
) -> Result<CaptureOutcome, CoreError> {
    log_if_reading_depth_suspicious(&cmd, cfg);

    let text = cmd.content.as_deref().or(cmd.title.as_deref()).unwrap_or(&cmd.url);
    let dim = cfg.embedding_model.dimension;
    let vector = embeddings.embed_document(text, dim).map_err(CoreError::from)?;

    let candidates: Vec<CentroidCandidate> = store
        .centroid_candidates(cmd.space_id)
        .map_err(CoreError::from)?
        .into_iter()
        .map(|(subspace_id, centroid)| CentroidCandidate { subspace_id, centroid })
        .collect();

    let margin_result = margin::compute_margin(&vector, &candidates, cfg.assignment_margin_threshold);

    let (subspace_id, updates_centroid) =
        resolve_subspace(store, embeddings, cfg, &cmd, &vector, &margin_result);

    let (artifact, signal, is_new) = store
        .ingest_artifact_with_signal(
            &cmd.user_id,
            &cmd.url,
            cmd.title.as_deref(),
            cmd.content.as_deref(),
            cmd.word_count,
            cmd.engagement_level,
            cmd.content_source,
            cmd.dwell_time_ms,
            cmd.scroll_depth,
            cmd.reading_depth,
            cmd.space_id,
            subspace_id,
            &[],
            &vector,
            cmd.signal_type,
            embeddings.model_name(),
            Some(margin_result.margin),
            updates_centroid,
            cfg.centroid_history_threshold.distance_threshold,
            cfg.centroid_history_threshold.min_signals_between_logs,
            crate::centroid::DEFAULT_CONFIDENCE_LEARNING_RATE,
        )
        .map_err(CoreError::from)?;

    dispatch_webhooks_fire_and_forget(webhook_client, store, &cmd.user_id, &artifact, is_new);

    Ok(CaptureOutcome {
        artifact_id: artifact.id,
        signal_id: signal.id,
        subspace_id,
        margin: Some(margin_result.margin),
        updates_centroid,
    })
}

/// Resolves which subspace a capture belongs to and whether that
/// resolution is confident enough to move the subspace's centroid.
///
/// The margin service settles it whenever at least one subspace in the
/// space already has a centroid. When none do (a fresh space, or one
/// whose subspaces predate centroid seeding), marker hints take over:
/// score every marker link in the space against the captured text and
/// the signal's own embedding, and assign to the highest-scoring
/// subspace without trusting it to move a centroid. If no marker links
/// score at all, a bounded legacy repair pass regenerates missing marker
/// embeddings and seeds missing subspace centroids from their markers'
/// mean, then the marker-hint scoring is retried once. An explicit
/// client-supplied hint is the last resort.
fn resolve_subspace(
    store: &SqliteStore,
    embeddings: &EmbeddingService,
    cfg: &SystemConfig,
    cmd: &CaptureArtifactCommand,
    vector: &[f32],
    margin_result: &margin::MarginResult,
) -> (Option<i64>, bool) {
    if let Some(subspace_id) = margin_result.nearest_subspace_id {
        return (Some(subspace_id), margin_result.updates_centroid);
    }

    if let Some(subspace_id) = marker_hint_subspace(store, &cmd.user_id, cmd.space_id, cmd, vector) {
        return (Some(subspace_id), false);
    }

    if repair_legacy_subspaces(store, embeddings, cfg, &cmd.user_id, cmd.space_id) {
        if let Some(subspace_id) = marker_hint_subspace(store, &cmd.user_id, cmd.space_id, cmd, vector) {
            return (Some(subspace_id), false);
        }
    }

    (cmd.subspace_hint_id, cmd.subspace_hint_id.is_some() && margin_result.updates_centroid)
}

/// Lowercased alphanumeric tokens, for token-subset matching between a
/// marker label and a captured title/content.
fn normalize_tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Scores every marker link in the space against the capture's text and
/// embedding, weighted by the link's own weight, and returns the
/// highest-scoring subspace. A marker scores on two independent signals:
/// a substring/token match of its label against the title+content, and
/// the cosine similarity between its embedding (if generated) and the
/// signal vector. Either alone is enough to contribute a nonzero score.
fn marker_hint_subspace(
    store: &SqliteStore,
    user_id: &str,
    space_id: i64,
    cmd: &CaptureArtifactCommand,
    vector: &[f32],
) -> Option<i64> {
    let links = store.marker_links_for_space(user_id, space_id).ok()?;
    if links.is_empty() {
        return None;
    }

    let combined_text =
        format!("{} {}", cmd.title.as_deref().unwrap_or(""), cmd.content.as_deref().unwrap_or("")).to_lowercase();
    let haystack_tokens: HashSet<String> = normalize_tokens(&combined_text).into_iter().collect();

    let mut scores: HashMap<i64, f32> = HashMap::new();
    for (subspace_id, _marker_id, label, embedding, link_weight) in &links {
        let label_lower = label.to_lowercase();
        let label_tokens = normalize_tokens(&label_lower);
        let token_match = !label_tokens.is_empty() && label_tokens.iter().all(|t| haystack_tokens.contains(t));
        let substring_match = !label_lower.is_empty() && combined_text.contains(&label_lower);

        let mut score = 0.0f32;
        if token_match || substring_match {
            score += 1.0;
        }
        if let Some(embedding) = embedding {
            score += crate::embeddings::cosine_similarity(vector, embedding).max(0.0);
        }
        if score > 0.0 {
            *scores.entry(*subspace_id).or_insert(0.0) += score * link_weight;
        }
    }

    scores.into_iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)).map(|(id, _)| id)
}

/// Best-effort repair for subspaces whose markers predate embedding
/// generation or whose centroid was never seeded: regenerates any
/// missing marker embeddings and recomputes the centroid as the mean of
/// a subspace's marker embeddings. Bounded to
/// [`LEGACY_REPAIR_SUBSPACE_LIMIT`] subspaces and never raises — a
/// partial or failed repair just leaves the capture to fall through to
/// the next resolution step. Returns whether any subspace was repaired.
fn repair_legacy_subspaces(
    store: &SqliteStore,
    embeddings: &EmbeddingService,
    cfg: &SystemConfig,
    user_id: &str,
    space_id: i64,
) -> bool {
    let Ok(links) = store.marker_links_for_space(user_id, space_id) else {
        return false;
    };
    if links.is_empty() {
        return false;
    }

    let dim = cfg.embedding_model.dimension;
    let mut by_subspace: HashMap<i64, Vec<(i64, Option<Vec<f32>>, String)>> = HashMap::new();
    for (subspace_id, marker_id, label, embedding, _weight) in links {
        by_subspace.entry(subspace_id).or_default().push((marker_id, embedding, label));
    }

    let mut repaired_any = false;
    for (subspace_id, markers) in by_subspace.into_iter().take(LEGACY_REPAIR_SUBSPACE_LIMIT) {
        let mut marker_embeddings: Vec<Vec<f32>> = Vec::with_capacity(markers.len());
        for (marker_id, embedding, label) in markers {
            let embedding = match embedding {
                Some(e) => e,
                None => {
                    let Ok(generated) = embeddings.embed_document(&label, dim) else {
                        continue;
                    };
                    if store.update_marker_embedding(marker_id, &generated).is_err() {
                        continue;
                    }
                    generated
                }
            };
            marker_embeddings.push(embedding);
        }
        if marker_embeddings.is_empty() {
            continue;
        }

        let embed_dim = marker_embeddings[0].len();
        let mut sum = vec![0.0f32; embed_dim];
        let mut counted = 0usize;
        for e in &marker_embeddings {
            if e.len() != embed_dim {
                continue;
            }
            for (a, v) in sum.iter_mut().zip(e.iter()) {
                *a += v;
            }
            counted += 1;
        }
        if counted == 0 {
            continue;
        }
        let mean: Vec<f32> = sum.iter().map(|v| v / counted as f32).collect();
        let centroid = crate::centroid::normalize(&mean);
        if store.seed_subspace_centroid(subspace_id, &centroid).is_ok() {
            repaired_any = true;
        }
    }
    repaired_any
}

/// Fires `artifact.created`/`artifact.updated` to every subscription
/// listening for it. Fire-and-forget: dispatch never blocks or fails the
/// capture. Falls back to a no-op when there's no active tokio runtime
/// (e.g. synchronous tests) rather than panicking on `spawn`.
fn dispatch_webhooks_fire_and_forget(
    webhook_client: &reqwest::Client,
    store: &SqliteStore,
    user_id: &str,
    artifact: &Artifact,
    is_new: bool,
) {
    let event_type = if is_new { "artifact.created" } else { "artifact.updated" };

    let subscriptions = match store.list_active_webhook_subscriptions(user_id, event_type) {
        Ok(subs) => subs,
        Err(err) => {
            tracing::warn!(user_id, error = %err, "failed to load webhook subscriptions");
            return;
        }
    };
    if subscriptions.is_empty() {
        return;
    }

    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("no tokio runtime available, skipping webhook dispatch");
        return;
    };

    let client = webhook_client.clone();
    let artifact = artifact.clone();
    let event_id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let event_type = event_type.to_string();

    handle.spawn(async move {
        for subscription in subscriptions {
            if let Err(err) =
                crate::webhook::deliver_with_retry(&client, &subscription, &event_id, &event_type, &created_at, &artifact)
                    .await
            {
                tracing::warn!(subscription_id = subscription.id, error = %err, "webhook delivery failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cmd() -> CaptureArtifactCommand {
        CaptureArtifactCommand::new(
            "user-1".into(),
            "https://example.com/article".into(),
            Some("Title".into()),
            Some("Some content about rust programming".into()),
            500,
            0.8,
            0.9,
            60_000,
            EngagementLevel::Discovered,
            ContentSource::Web,
            1,
            None,
            SignalType::Semantic,
        )
        .unwrap()
    }

    #[test]
    fn command_validates_scroll_depth_range() {
        let result = CaptureArtifactCommand::new(
            "u".into(), "https://x.com".into(), None, None, 1, 0.5, 1.5, 0,
            EngagementLevel::Latent, ContentSource::Web, 1, None, SignalType::Semantic,
        );
        assert!(result.is_err());
    }

    #[test]
    fn command_validates_reading_depth_range() {
        let result = CaptureArtifactCommand::new(
            "u".into(), "https://x.com".into(), None, None, 1, 2.0, 0.5, 0,
            EngagementLevel::Latent, ContentSource::Web, 1, None, SignalType::Semantic,
        );
        assert!(result.is_err());
    }

    #[test]
    fn command_rejects_empty_user_id() {
        assert!(CaptureArtifactCommand::new(
            "".into(), "https://x.com".into(), None, None, 1, 0.5, 0.5, 0,
            EngagementLevel::Latent, ContentSource::Web, 1, None, SignalType::Semantic,
        ).is_err());
    }

    #[test]
    fn reading_depth_suspicion_does_not_panic_on_zero_words() {
        let mut cmd = sample_cmd();
        cmd.word_count = 0;
        log_if_reading_depth_suspicious(&cmd, &SystemConfig::default());
    }
}
