//! Conflict report endpoint
//!
//! GET /events/:event_id/conflicts

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult, SchedError};
use crate::services::conflict_analyzer::{analyze, ConflictReport};
use crate::services::fairness::{score_rosters, Fairness};
use crate::AppState;

/// GET /events/:event_id/conflicts response
#[derive(Debug, Serialize)]
pub struct ConflictsResponse {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub report: ConflictReport,
    /// Workload balance over all volunteers of the event
    pub fairness: Option<Fairness>,
}

/// GET /events/:event_id/conflicts
pub async fn get_conflicts(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<ConflictsResponse>> {
    if db::events::get_event(&state.db, event_id).await?.is_none() {
        return Err(ApiError::Sched(SchedError::NotFound(format!("Event {}", event_id))));
    }

    let mut conn = state.db.acquire().await.map_err(SchedError::from)?;
    let rosters = db::assignments::load_rosters(&mut *conn, event_id).await?;
    let volunteers: Vec<Uuid> = db::volunteers::list_for_event(&mut *conn, event_id)
        .await?
        .into_iter()
        .map(|v| v.id)
        .collect();
    drop(conn);

    let report = analyze(&rosters);
    let fairness = score_rosters(&rosters, &volunteers);

    tracing::debug!(
        event_id = %event_id,
        shifts = report.shifts.len(),
        conflicted = report.conflicts.len(),
        "Conflict report"
    );

    Ok(Json(ConflictsResponse {
        event_id,
        report,
        fairness,
    }))
}

pub fn conflict_routes() -> Router<AppState> {
    Router::new().route("/events/:event_id/conflicts", get(get_conflicts))
}
