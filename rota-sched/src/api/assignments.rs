//! Assignment management endpoints
//!
//! Auto-assign, clear, swap, group fill/unfill and manual assign/unassign.
//! Every write honours the `x-mutation-token` header.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mutation_origin;
use crate::error::ApiResult;
use crate::services::orchestrator::{AssignOutcome, AutoAssignOutcome, FillOutcome, DEFAULT_STRATEGY};
use crate::AppState;

/// POST /events/:event_id/auto-assign request
#[derive(Debug, Default, Deserialize)]
pub struct AutoAssignRequest {
    #[serde(default)]
    pub strategy: Option<String>,
}

/// POST /events/:event_id/assignments/clear response
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub event_id: Uuid,
    pub removed: u64,
}

/// POST /assignments/swap request
#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub a: Uuid,
    pub b: Uuid,
    /// Versions the caller last saw, `[a, b]`
    #[serde(default)]
    pub versions: Option<(i64, i64)>,
}

#[derive(Debug, Serialize)]
pub struct SwapResponse {
    pub swapped: bool,
}

/// POST /shifts/:shift_id/fill-from-group request
#[derive(Debug, Deserialize)]
pub struct FillRequest {
    pub event_id: Uuid,
    pub group: String,
}

#[derive(Debug, Serialize)]
pub struct UnfillResponse {
    pub shift_id: Uuid,
    pub removed: u64,
}

/// POST /shifts/:shift_id/assignments request
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub volunteer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
    pub assignment_id: Uuid,
    pub removed: bool,
}

/// POST /events/:event_id/auto-assign
pub async fn auto_assign(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    request: Option<Json<AutoAssignRequest>>,
) -> ApiResult<Json<AutoAssignOutcome>> {
    let origin = mutation_origin(&headers)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let strategy = request.strategy.as_deref().unwrap_or(DEFAULT_STRATEGY);

    tracing::info!(event_id = %event_id, strategy, "Auto-assign requested");
    let outcome = state
        .orchestrator
        .with_origin(origin)
        .auto_assign(event_id, strategy)
        .await?;
    Ok(Json(outcome))
}

/// POST /events/:event_id/assignments/clear
pub async fn clear_assignments(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ClearResponse>> {
    let origin = mutation_origin(&headers)?;
    let removed = state
        .orchestrator
        .with_origin(origin)
        .clear_assignments(event_id)
        .await?;
    Ok(Json(ClearResponse { event_id, removed }))
}

/// POST /assignments/swap
pub async fn swap_assignments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SwapRequest>,
) -> ApiResult<Json<SwapResponse>> {
    let origin = mutation_origin(&headers)?;
    state
        .orchestrator
        .with_origin(origin)
        .swap_assignments(request.a, request.b, request.versions)
        .await?;
    Ok(Json(SwapResponse { swapped: true }))
}

/// POST /shifts/:shift_id/fill-from-group
pub async fn fill_from_group(
    State(state): State<AppState>,
    Path(shift_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<FillRequest>,
) -> ApiResult<Json<FillOutcome>> {
    let origin = mutation_origin(&headers)?;
    let outcome = state
        .orchestrator
        .with_origin(origin)
        .fill_shift_from_group(shift_id, &request.group, request.event_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /shifts/:shift_id/unfill
pub async fn unfill_shift(
    State(state): State<AppState>,
    Path(shift_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<UnfillResponse>> {
    let origin = mutation_origin(&headers)?;
    let removed = state
        .orchestrator
        .with_origin(origin)
        .unfill_shift(shift_id)
        .await?;
    Ok(Json(UnfillResponse { shift_id, removed }))
}

/// POST /shifts/:shift_id/assignments
pub async fn assign_volunteer(
    State(state): State<AppState>,
    Path(shift_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<AssignOutcome>> {
    let origin = mutation_origin(&headers)?;
    let outcome = state
        .orchestrator
        .with_origin(origin)
        .assign_volunteer(shift_id, request.volunteer_id)
        .await?;
    Ok(Json(outcome))
}

/// DELETE /assignments/:assignment_id
pub async fn unassign_volunteer(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<UnassignResponse>> {
    let origin = mutation_origin(&headers)?;
    state
        .orchestrator
        .with_origin(origin)
        .unassign_volunteer(assignment_id)
        .await?;
    Ok(Json(UnassignResponse {
        assignment_id,
        removed: true,
    }))
}

pub fn assignment_routes() -> Router<AppState> {
    Router::new()
        .route("/events/:event_id/auto-assign", post(auto_assign))
        .route("/events/:event_id/assignments/clear", post(clear_assignments))
        .route("/assignments/swap", post(swap_assignments))
        .route("/assignments/:assignment_id", delete(unassign_volunteer))
        .route("/shifts/:shift_id/fill-from-group", post(fill_from_group))
        .route("/shifts/:shift_id/unfill", post(unfill_shift))
        .route("/shifts/:shift_id/assignments", post(assign_volunteer))
}
