//! Shared fixtures for rota-sched integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use rota_common::db::{Asset, AssetStatus, Assignment, Event, Shift, Volunteer};
use rota_common::events::EventBus;
use rota_common::RequiredGroups;
use rota_sched::db;
use rota_sched::services::{Orchestrator, SolverClient};
use rota_sched::Store;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct Fixture {
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub store: Store,
    pub event_id: Uuid,
}

/// In-memory store with one event
pub async fn fixture() -> Fixture {
    let pool = rota_common::db::init_in_memory().await.unwrap();
    let bus = EventBus::new(256);
    let store = Store::new(pool.clone(), bus.clone());
    let event = Event {
        id: Uuid::new_v4(),
        name: "Summer Fest".into(),
    };
    db::events::insert_event(&pool, &event).await.unwrap();
    Fixture {
        pool,
        bus,
        store,
        event_id: event.id,
    }
}

/// 2026-06-01 at `hour:minute` UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, minute, 0).unwrap()
}

impl Fixture {
    pub async fn volunteer(&self, name: &str, group: Option<&str>, max_hours: Option<f64>) -> Volunteer {
        let volunteer = Volunteer {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            name: name.into(),
            group: group.map(str::to_string),
            max_hours,
        };
        db::volunteers::insert_volunteer(&self.pool, &volunteer).await.unwrap();
        volunteer
    }

    pub async fn shift(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        required: RequiredGroups,
    ) -> Shift {
        let shift = Shift::new(self.event_id, Some(name.into()), start, end, required).unwrap();
        db::shifts::insert_shift(&self.pool, &shift).await.unwrap();
        shift
    }

    pub async fn assign(&self, shift: &Shift, volunteer: &Volunteer) -> Assignment {
        let assignment = Assignment::new(shift.id, volunteer.id);
        db::assignments::insert_assignment(&self.pool, &assignment).await.unwrap();
        assignment
    }

    pub async fn asset(&self, name: &str) -> Asset {
        let asset = Asset {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            name: name.into(),
            category: "radio".into(),
            identifier: Some(format!("{}-001", name.to_uppercase())),
            status: AssetStatus::Available,
            volunteer_id: None,
            version: 0,
        };
        db::assets::insert_asset(&self.pool, &asset).await.unwrap();
        asset
    }

    pub fn orchestrator(&self, solver: &MockSolver) -> Orchestrator {
        let client =
            SolverClient::new(solver.url.clone(), None, Duration::from_millis(500)).unwrap();
        Orchestrator::new(self.store.clone(), client, 999.0)
    }

    /// (shift, volunteer) pairs currently stored for the event
    pub async fn pairs(&self) -> Vec<(Uuid, Uuid)> {
        let mut pairs: Vec<(Uuid, Uuid)> = db::assignments::list_for_event(&self.pool, self.event_id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.shift_id, a.volunteer_id))
            .collect();
        pairs.sort();
        pairs
    }
}

#[derive(Clone)]
struct SolverReply {
    status: StatusCode,
    body: Value,
    delay: Duration,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Local HTTP server standing in for the scheduling solver
pub struct MockSolver {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockSolver {
    /// Answer every POST with `status` and `body` after `delay`
    pub async fn start(status: u16, body: Value, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let reply = SolverReply {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            delay,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().route("/solve", post(answer)).with_state(reply);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/solve", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn answer(State(reply): State<SolverReply>, Json(request): Json<Value>) -> (StatusCode, Json<Value>) {
    reply.requests.lock().unwrap().push(request);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (reply.status, Json(reply.body))
}
