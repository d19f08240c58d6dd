//! Artifact capture, batch capture, and lifecycle handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use misir_core::{CaptureArtifactCommand, ContentSource, EngagementLevel, SignalType};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::problem::{ApiError, ApiResult};
use crate::state::SharedState;

/// Parses `EngagementLevel` from its raw string rather than deriving from
/// the enum's own `Deserialize` impl, which only matches current variant
/// names — legacy clients send names like `"ambient"`/`"active"` that only
/// `EngagementLevel::from_str`'s `from_legacy` fallback understands.
fn deserialize_engagement_level<'de, D>(deserializer: D) -> Result<EngagementLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    EngagementLevel::from_str(&raw).map_err(serde::de::Error::custom)
}

/// Same rationale as [`deserialize_engagement_level`], for `ContentSource`
/// (legacy names like `"ai"`/`"document"`/`"ebook"`).
fn deserialize_content_source<'de, D>(deserializer: D) -> Result<ContentSource, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    ContentSource::from_legacy(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown content source: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub word_count: i64,
    #[serde(default)]
    pub reading_depth: f32,
    #[serde(default)]
    pub scroll_depth: f32,
    #[serde(default)]
    pub dwell_time_ms: i64,
    #[serde(default, deserialize_with = "deserialize_engagement_level")]
    pub engagement_level: EngagementLevel,
    #[serde(default, deserialize_with = "deserialize_content_source")]
    pub content_source: ContentSource,
    pub space_id: i64,
    pub subspace_hint_id: Option<i64>,
    #[serde(default)]
    pub signal_type: SignalType,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub artifact_id: i64,
    pub signal_id: i64,
    pub subspace_id: Option<i64>,
    pub margin: Option<f32>,
    pub updates_centroid: bool,
}

pub async fn capture_artifact(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(req): Json<CaptureRequest>,
) -> ApiResult<Json<CaptureResponse>> {
    let cfg = state.system_config();
    let cmd = CaptureArtifactCommand::new(
        user.user_id,
        req.url,
        req.title,
        req.content,
        req.word_count,
        req.reading_depth,
        req.scroll_depth,
        req.dwell_time_ms,
        req.engagement_level,
        req.content_source,
        req.space_id,
        req.subspace_hint_id,
        req.signal_type,
    )
    .map_err(|e| ApiError(misir_core::CoreError::Validation(e)))?;

    let outcome =
        misir_core::capture_artifact(&state.store, &state.embeddings, &cfg, &state.webhook_client, cmd)?;

    Ok(Json(CaptureResponse {
        artifact_id: outcome.artifact_id,
        signal_id: outcome.signal_id,
        subspace_id: outcome.subspace_id,
        margin: outcome.margin,
        updates_centroid: outcome.updates_centroid,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchCaptureRequest {
    pub artifacts: Vec<CaptureRequest>,
}

#[derive(Debug, Serialize)]
pub struct BatchCaptureResponse {
    pub results: Vec<Result<CaptureResponse, String>>,
}

pub async fn batch_capture(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(req): Json<BatchCaptureRequest>,
) -> ApiResult<Json<BatchCaptureResponse>> {
    let cfg = state.system_config();
    let mut results = Vec::with_capacity(req.artifacts.len());

    for item in req.artifacts {
        let outcome = CaptureArtifactCommand::new(
            user.user_id.clone(),
            item.url,
            item.title,
            item.content,
            item.word_count,
            item.reading_depth,
            item.scroll_depth,
            item.dwell_time_ms,
            item.engagement_level,
            item.content_source,
            item.space_id,
            item.subspace_hint_id,
            item.signal_type,
        )
        .map_err(|e| e.to_string())
        .and_then(|cmd| {
            misir_core::capture_artifact(&state.store, &state.embeddings, &cfg, &state.webhook_client, cmd)
                .map_err(|e| e.to_string())
        })
        .map(|outcome| CaptureResponse {
            artifact_id: outcome.artifact_id,
            signal_id: outcome.signal_id,
            subspace_id: outcome.subspace_id,
            margin: outcome.margin,
            updates_centroid: outcome.updates_centroid,
        });

        results.push(outcome);
    }

    Ok(Json(BatchCaptureResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct ListArtifactsQuery {
    pub space_id: Option<i64>,
    pub subspace_id: Option<i64>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

pub async fn get_artifact(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(artifact_id): Path<i64>,
) -> ApiResult<Json<misir_core::Artifact>> {
    let artifact = state.store.get_artifact(&user.user_id, artifact_id)?;
    Ok(Json(artifact))
}

pub async fn list_artifacts(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Query(q): Query<ListArtifactsQuery>,
) -> ApiResult<Json<Vec<misir_core::Artifact>>> {
    let artifacts = state.store.list_artifacts(&user.user_id, q.space_id, q.subspace_id, q.limit)?;
    Ok(Json(artifacts))
}

#[derive(Debug, Deserialize)]
pub struct UpdateArtifactRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub engagement_level: Option<EngagementLevel>,
    pub subspace_id: Option<i64>,
}

pub async fn update_artifact(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(artifact_id): Path<i64>,
    Json(req): Json<UpdateArtifactRequest>,
) -> ApiResult<Json<misir_core::Artifact>> {
    let artifact = state.store.update_artifact(
        &user.user_id,
        artifact_id,
        req.title.as_deref(),
        req.content.as_deref(),
        req.engagement_level,
        req.subspace_id,
    )?;
    Ok(Json(artifact))
}

pub async fn delete_artifact(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(artifact_id): Path<i64>,
) -> ApiResult<()> {
    state.store.soft_delete_artifact(&user.user_id, artifact_id)?;
    Ok(())
}
