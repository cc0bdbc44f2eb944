//! Kiosk endpoints
//!
//! Each on-site screen opens a session and drives it step by step:
//! search, select, action, transfer, assets, complete. Terminals live in
//! `AppState::kiosks` until deleted.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rota_common::db::Asset;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult, SchedError};
use crate::services::kiosk::{KioskAction, KioskSession, VolunteerSnapshot};
use crate::services::kiosk_engine::KioskReceipt;
use crate::services::KioskTerminal;
use crate::AppState;

/// POST /kiosk/sessions/:session_id/search request
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<VolunteerSnapshot>,
}

/// POST /kiosk/sessions/:session_id/select request
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub volunteer_id: Uuid,
}

/// POST /kiosk/sessions/:session_id/action request
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub assignment_id: Uuid,
    pub action: KioskAction,
}

/// POST /kiosk/sessions/:session_id/transfer request
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub transfer_assets: bool,
}

/// POST /kiosk/sessions/:session_id/assets request
#[derive(Debug, Deserialize)]
pub struct AssetsRequest {
    #[serde(default)]
    pub asset_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub receipt: KioskReceipt,
    pub session: KioskSession,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub session_id: Uuid,
    pub closed: bool,
}

async fn terminal(state: &AppState, session_id: Uuid) -> ApiResult<Arc<KioskTerminal>> {
    state
        .kiosks
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or_else(|| ApiError::Sched(SchedError::NotFound(format!("Kiosk session {}", session_id))))
}

/// POST /events/:event_id/kiosk/sessions
pub async fn open_session(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<KioskSession>> {
    if db::events::get_event(&state.db, event_id).await?.is_none() {
        return Err(ApiError::Sched(SchedError::NotFound(format!("Event {}", event_id))));
    }
    let terminal = Arc::new(KioskTerminal::new(
        state.kiosk_engine.clone(),
        event_id,
        state.config.kiosk_reset_delay(),
    ));
    let view = terminal.view().await;
    state.kiosks.write().await.insert(terminal.id(), terminal);

    tracing::info!(event_id = %event_id, session_id = %view.id, "Kiosk session opened");
    Ok(Json(view))
}

/// GET /kiosk/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<KioskSession>> {
    Ok(Json(terminal(&state, session_id).await?.view().await))
}

/// DELETE /kiosk/sessions/:session_id
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CloseResponse>> {
    let removed = state.kiosks.write().await.remove(&session_id);
    let closed = match removed {
        Some(terminal) => {
            terminal.reset().await;
            true
        }
        None => false,
    };
    Ok(Json(CloseResponse { session_id, closed }))
}

/// POST /kiosk/sessions/:session_id/search
pub async fn search(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let results = terminal(&state, session_id).await?.search(&request.query).await?;
    Ok(Json(SearchResponse { results }))
}

/// POST /kiosk/sessions/:session_id/select
pub async fn select_volunteer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<KioskSession>> {
    let session = terminal(&state, session_id)
        .await?
        .select_volunteer(request.volunteer_id)
        .await?;
    Ok(Json(session))
}

/// POST /kiosk/sessions/:session_id/action
pub async fn choose_action(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<Json<KioskSession>> {
    let session = terminal(&state, session_id)
        .await?
        .choose(request.assignment_id, request.action)
        .await?;
    Ok(Json(session))
}

/// POST /kiosk/sessions/:session_id/transfer
pub async fn set_transfer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<Json<KioskSession>> {
    let session = terminal(&state, session_id)
        .await?
        .set_transfer(request.transfer_assets)
        .await?;
    Ok(Json(session))
}

/// GET /kiosk/sessions/:session_id/assets
///
/// Assets that can be issued right now
pub async fn available_assets(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Asset>>> {
    let event_id = terminal(&state, session_id).await?.view().await.event_id;
    Ok(Json(db::assets::list_available(&state.db, event_id).await?))
}

/// POST /kiosk/sessions/:session_id/assets
pub async fn select_assets(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AssetsRequest>,
) -> ApiResult<Json<KioskSession>> {
    let session = terminal(&state, session_id)
        .await?
        .select_assets(request.asset_ids)
        .await?;
    Ok(Json(session))
}

/// POST /kiosk/sessions/:session_id/back
pub async fn back(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<KioskSession>> {
    Ok(Json(terminal(&state, session_id).await?.back().await?))
}

/// POST /kiosk/sessions/:session_id/complete
pub async fn complete(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CompleteResponse>> {
    let terminal = terminal(&state, session_id).await?;
    let receipt = terminal.complete().await?;
    let session = terminal.view().await;
    Ok(Json(CompleteResponse { receipt, session }))
}

/// POST /kiosk/sessions/:session_id/reset
pub async fn reset(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<KioskSession>> {
    Ok(Json(terminal(&state, session_id).await?.reset().await))
}

pub fn kiosk_routes() -> Router<AppState> {
    Router::new()
        .route("/events/:event_id/kiosk/sessions", post(open_session))
        .route("/kiosk/sessions/:session_id", get(get_session).delete(close_session))
        .route("/kiosk/sessions/:session_id/search", post(search))
        .route("/kiosk/sessions/:session_id/select", post(select_volunteer))
        .route("/kiosk/sessions/:session_id/action", post(choose_action))
        .route("/kiosk/sessions/:session_id/transfer", post(set_transfer))
        .route(
            "/kiosk/sessions/:session_id/assets",
            get(available_assets).post(select_assets),
        )
        .route("/kiosk/sessions/:session_id/back", post(back))
        .route("/kiosk/sessions/:session_id/complete", post(complete))
        .route("/kiosk/sessions/:session_id/reset", post(reset))
}
