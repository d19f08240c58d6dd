//! Drift/velocity/confidence/margin-distribution/alerts and global rollups.

use axum::extract::{Path, Query, State};
use axum::Json;
use misir_core::{Alert, ConfidenceSample, DriftEvent, GlobalAnalytics, MarginDistribution, VelocityMeasurement};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::problem::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    #[serde(default = "default_series_limit")]
    pub limit: i64,
}

fn default_series_limit() -> i64 {
    50
}

pub async fn drift(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
    Query(q): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<DriftEvent>>> {
    let series = misir_core::drift_series(&state.store, subspace_id, q.limit)?;
    Ok(Json(series))
}

pub async fn velocity(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
    Query(q): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<VelocityMeasurement>>> {
    let series = misir_core::velocity_series(&state.store, subspace_id, q.limit)?;
    Ok(Json(series))
}

pub async fn confidence(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
    Query(q): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<ConfidenceSample>>> {
    let series = misir_core::confidence_series(&state.store, subspace_id, q.limit)?;
    Ok(Json(series))
}

#[derive(Debug, Deserialize)]
pub struct MarginDistributionQuery {
    #[serde(default = "default_sample_size")]
    pub sample_size: i64,
}

fn default_sample_size() -> i64 {
    200
}

pub async fn margin_distribution(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path((space_id, _subspace_id)): Path<(i64, i64)>,
    Query(q): Query<MarginDistributionQuery>,
) -> ApiResult<Json<MarginDistribution>> {
    let distribution = misir_core::margin_distribution(&state.store, space_id, q.sample_size)?;
    Ok(Json(distribution))
}

pub async fn alerts(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path((space_id, subspace_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = misir_core::evaluate_alerts(&state.store, subspace_id, space_id)?;
    Ok(Json(alerts))
}

pub async fn global(State(state): State<SharedState>, user: AuthenticatedUser) -> ApiResult<Json<GlobalAnalytics>> {
    let cfg = state.system_config();
    let analytics = misir_core::global_analytics(&state.store, &user.user_id, &cfg)?;
    Ok(Json(analytics))
}

