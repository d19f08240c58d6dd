//! Semantic search endpoint (§4.6, Matryoshka two-stage retrieval).

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::problem::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub space_id: i64,
    pub subspace_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_limit() -> usize {
    10
}

fn default_threshold() -> f32 {
    0.0
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub artifact_id: i64,
    pub signal_id: i64,
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub mode: &'static str,
}

pub async fn search(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let outcome = misir_core::search(
        &state.store,
        &state.embeddings,
        &user.user_id,
        &q.q,
        q.space_id,
        q.subspace_id,
        q.limit,
        q.threshold,
    )?;

    let mode = match outcome.mode {
        misir_core::SearchMode::Matryoshka => "matryoshka",
        misir_core::SearchMode::SingleStageExact => "single_stage_exact",
        misir_core::SearchMode::RecentFallback => "recent_fallback",
    };

    let results = outcome
        .results
        .into_iter()
        .map(|r| SearchResultItem { artifact_id: r.artifact_id, signal_id: r.signal_id, similarity: r.similarity })
        .collect();

    Ok(Json(SearchResponse { results, mode }))
}
