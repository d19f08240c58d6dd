//! Space and subspace CRUD handlers.

use axum::extract::{Path, State};
use axum::Json;
use misir_core::{CoreError, Space, Subspace};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::problem::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateSpaceRequest {
    pub name: String,
    pub intention: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpaceResponse {
    pub id: i64,
    pub name: String,
    pub intention: Option<String>,
    pub artifact_count: i64,
    pub evidence: f32,
}

impl From<Space> for SpaceResponse {
    fn from(s: Space) -> Self {
        SpaceResponse { id: s.id, name: s.name, intention: s.intention, artifact_count: s.artifact_count, evidence: s.evidence }
    }
}

pub async fn create_space(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateSpaceRequest>,
) -> ApiResult<Json<SpaceResponse>> {
    if req.name.trim().is_empty() {
        return Err(CoreError::Validation(misir_core::ValidationError::InvalidInput("name must not be empty".into())).into());
    }
    let space = state.store.create_space(&user.user_id, &req.name, req.intention.as_deref())?;
    Ok(Json(space.into()))
}

pub async fn list_spaces(State(state): State<SharedState>, user: AuthenticatedUser) -> ApiResult<Json<Vec<SpaceResponse>>> {
    let spaces = state.store.list_spaces(&user.user_id)?;
    Ok(Json(spaces.into_iter().map(SpaceResponse::from).collect()))
}

pub async fn get_space(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(space_id): Path<i64>,
) -> ApiResult<Json<SpaceResponse>> {
    let space = state.store.get_space(&user.user_id, space_id)?;
    Ok(Json(space.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpaceRequest {
    pub name: Option<String>,
    pub intention: Option<String>,
}

pub async fn update_space(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(space_id): Path<i64>,
    Json(req): Json<UpdateSpaceRequest>,
) -> ApiResult<Json<SpaceResponse>> {
    let space = state.store.update_space(&user.user_id, space_id, req.name.as_deref(), req.intention.as_deref())?;
    Ok(Json(space.into()))
}

pub async fn delete_space(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(space_id): Path<i64>,
) -> ApiResult<()> {
    state.store.soft_delete_space(&user.user_id, space_id)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateSubspaceRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
}

fn default_learning_rate() -> f32 {
    0.1
}

#[derive(Debug, Serialize)]
pub struct SubspaceResponse {
    pub id: i64,
    pub space_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub learning_rate: f32,
    pub artifact_count: i64,
    pub confidence: f32,
    pub lifecycle: String,
}

impl From<Subspace> for SubspaceResponse {
    fn from(s: Subspace) -> Self {
        let lifecycle = format!("{:?}", s.lifecycle()).to_lowercase();
        SubspaceResponse {
            id: s.id,
            space_id: s.space_id,
            name: s.name,
            description: s.description,
            learning_rate: s.learning_rate,
            artifact_count: s.artifact_count,
            confidence: s.confidence,
            lifecycle,
        }
    }
}

pub async fn create_subspace(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(space_id): Path<i64>,
    Json(req): Json<CreateSubspaceRequest>,
) -> ApiResult<Json<SubspaceResponse>> {
    if req.name.trim().is_empty() {
        return Err(CoreError::Validation(misir_core::ValidationError::InvalidInput("name must not be empty".into())).into());
    }
    let subspace = state.store.create_subspace(&user.user_id, space_id, &req.name, req.description.as_deref(), req.learning_rate)?;
    Ok(Json(subspace.into()))
}

pub async fn list_subspaces(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(space_id): Path<i64>,
) -> ApiResult<Json<Vec<SubspaceResponse>>> {
    let subspaces = state.store.list_subspaces(&user.user_id, space_id)?;
    Ok(Json(subspaces.into_iter().map(SubspaceResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubspaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub learning_rate: Option<f32>,
}

pub async fn update_subspace(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateSubspaceRequest>,
) -> ApiResult<Json<SubspaceResponse>> {
    let subspace = state.store.update_subspace(
        &user.user_id,
        subspace_id,
        req.name.as_deref(),
        req.description.as_deref(),
        req.learning_rate,
    )?;
    Ok(Json(subspace.into()))
}

pub async fn delete_subspace(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    state.store.soft_delete_subspace(&user.user_id, subspace_id)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct MergeSubspaceRequest {
    pub source_id: i64,
}

pub async fn merge_subspace(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path((_space_id, subspace_id)): Path<(i64, i64)>,
    Json(req): Json<MergeSubspaceRequest>,
) -> ApiResult<Json<SubspaceResponse>> {
    let merged = state.store.merge_subspaces(&user.user_id, subspace_id, req.source_id)?;
    Ok(Json(merged.into()))
}
