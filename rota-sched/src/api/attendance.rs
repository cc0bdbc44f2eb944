//! Attendance desk endpoints
//!
//! Direct check-in/out, asset issue/return, late list and activity feed.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rota_common::db::{ActivityEntry, Asset, Assignment};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mutation_origin;
use crate::error::ApiResult;
use crate::services::attendance::{LateAssignment, DEFAULT_ACTIVITY_LIMIT};
use crate::AppState;

/// Optional compare-and-swap version for desk writes
#[derive(Debug, Default, Deserialize)]
pub struct VersionedRequest {
    #[serde(default)]
    pub version: Option<i64>,
}

/// POST /assets/:asset_id/issue request
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub volunteer_id: Uuid,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub assignment_id: Uuid,
    pub late_dismissed: bool,
}

/// GET /events/:event_id/late query
#[derive(Debug, Deserialize)]
pub struct LateQuery {
    /// Evaluate at this instant instead of now
    pub at: Option<DateTime<Utc>>,
    /// Record warnings for newly late assignments
    #[serde(default)]
    pub warn: bool,
}

#[derive(Debug, Serialize)]
pub struct LateResponse {
    pub event_id: Uuid,
    pub late: Vec<LateAssignment>,
}

/// GET /events/:event_id/activity query
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// POST /assignments/:assignment_id/check-in
pub async fn check_in(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
    request: Option<Json<VersionedRequest>>,
) -> ApiResult<Json<Assignment>> {
    let origin = mutation_origin(&headers)?;
    let version = request.and_then(|Json(r)| r.version);
    let assignment = state
        .attendance
        .with_origin(origin)
        .check_in(assignment_id, version)
        .await?;
    Ok(Json(assignment))
}

/// POST /assignments/:assignment_id/check-out
pub async fn check_out(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
    request: Option<Json<VersionedRequest>>,
) -> ApiResult<Json<Assignment>> {
    let origin = mutation_origin(&headers)?;
    let version = request.and_then(|Json(r)| r.version);
    let assignment = state
        .attendance
        .with_origin(origin)
        .check_out(assignment_id, version)
        .await?;
    Ok(Json(assignment))
}

/// POST /assignments/:assignment_id/late/dismiss
pub async fn dismiss_late(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<DismissResponse>> {
    let origin = mutation_origin(&headers)?;
    state.attendance.with_origin(origin).dismiss_late(assignment_id).await?;
    Ok(Json(DismissResponse {
        assignment_id,
        late_dismissed: true,
    }))
}

/// POST /assignments/:assignment_id/late/undismiss
pub async fn undismiss_late(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<DismissResponse>> {
    let origin = mutation_origin(&headers)?;
    state.attendance.with_origin(origin).undismiss_late(assignment_id).await?;
    Ok(Json(DismissResponse {
        assignment_id,
        late_dismissed: false,
    }))
}

/// POST /assets/:asset_id/issue
pub async fn issue_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<IssueRequest>,
) -> ApiResult<Json<Asset>> {
    let origin = mutation_origin(&headers)?;
    let asset = state
        .attendance
        .with_origin(origin)
        .issue_asset(asset_id, request.volunteer_id, request.version)
        .await?;
    Ok(Json(asset))
}

/// POST /assets/:asset_id/return
pub async fn return_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Asset>> {
    let origin = mutation_origin(&headers)?;
    let asset = state.attendance.with_origin(origin).return_asset(asset_id).await?;
    Ok(Json(asset))
}

/// GET /events/:event_id/late
pub async fn late_list(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<LateQuery>,
) -> ApiResult<Json<LateResponse>> {
    let now = query.at.unwrap_or_else(Utc::now);
    let late = if query.warn {
        state.attendance.scan_late(event_id, now).await?
    } else {
        state.attendance.late_list(event_id, now).await?
    };
    Ok(Json(LateResponse { event_id, late }))
}

/// GET /events/:event_id/activity
pub async fn recent_activity(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<ActivityEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 500);
    Ok(Json(state.attendance.recent_activity(event_id, limit).await?))
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/assignments/:assignment_id/check-in", post(check_in))
        .route("/assignments/:assignment_id/check-out", post(check_out))
        .route("/assignments/:assignment_id/late/dismiss", post(dismiss_late))
        .route("/assignments/:assignment_id/late/undismiss", post(undismiss_late))
        .route("/assets/:asset_id/issue", post(issue_asset))
        .route("/assets/:asset_id/return", post(return_asset))
        .route("/events/:event_id/late", get(late_list))
        .route("/events/:event_id/activity", get(recent_activity))
}
