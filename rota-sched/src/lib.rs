//! rota-sched library interface
//!
//! Conflict analysis, auto-assignment, kiosk check-in/out and attendance over
//! a SQLite assignment store, served over HTTP by the `rota-sched` binary.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult, SchedError, SchedResult};
pub use crate::store::{ChangeSet, Store};

use axum::Router;
use chrono::{DateTime, Utc};
use rota_common::config::RotaConfig;
use rota_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::services::{Attendance, KioskEngine, KioskTerminal, Orchestrator, SolverClient};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub store: Store,
    pub orchestrator: Orchestrator,
    pub kiosk_engine: KioskEngine,
    pub attendance: Attendance,
    /// Open kiosk terminals by session id
    pub kiosks: Arc<RwLock<HashMap<Uuid, Arc<KioskTerminal>>>>,
    pub config: Arc<RotaConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: RotaConfig) -> SchedResult<Self> {
        let store = Store::new(db.clone(), event_bus.clone());
        let solver = SolverClient::from_config(&config)?;
        let orchestrator = Orchestrator::new(store.clone(), solver, config.unlimited_hours_sentinel);
        let kiosk_engine = KioskEngine::new(store.clone(), config.kiosk_search_limit);
        let attendance = Attendance::from_config(store.clone(), &config);

        Ok(Self {
            db,
            event_bus,
            store,
            orchestrator,
            kiosk_engine,
            attendance,
            kiosks: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::conflict_routes())
        .merge(api::assignment_routes())
        .merge(api::kiosk_routes())
        .merge(api::attendance_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
