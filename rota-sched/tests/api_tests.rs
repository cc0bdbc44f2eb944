//! HTTP API tests

mod helpers;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::{at, fixture, Fixture, MockSolver};
use http_body_util::BodyExt;
use rota_common::config::RotaConfig;
use rota_common::events::{MutationToken, RotaEvent};
use rota_common::RequiredGroups;
use rota_sched::AppState;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

fn app(fx: &Fixture, solver_url: &str) -> Router {
    let config = RotaConfig {
        solver_url: solver_url.to_string(),
        solver_timeout_secs: 2,
        kiosk_reset_secs: 60,
        ..RotaConfig::default()
    };
    let state = AppState::new(fx.pool.clone(), fx.bus.clone(), config).unwrap();
    rota_sched::build_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let fx = fixture().await;
    let app = app(&fx, "http://127.0.0.1:9/solve");
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rota-sched");
}

#[tokio::test]
async fn test_conflicts_endpoint() {
    let fx = fixture().await;
    let vera = fx.volunteer("Vera", None, None).await;
    let a = fx.shift("A", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let b = fx.shift("B", at(11, 0), at(14, 0), RequiredGroups::new()).await;
    fx.assign(&a, &vera).await;
    fx.assign(&b, &vera).await;
    let app = app(&fx, "http://127.0.0.1:9/solve");

    let (status, body) = send(&app, "GET", &format!("/events/{}/conflicts", fx.event_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["conflicts"][a.id.to_string()][0],
        "Conflict: Vera is double-booked."
    );
    assert_eq!(body["shifts"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "GET", &format!("/events/{}/conflicts", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_auto_assign_with_mutation_token() {
    let fx = fixture().await;
    let vera = fx.volunteer("Vera", None, None).await;
    let a = fx.shift("A", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let solver = MockSolver::start(
        200,
        json!({ "assigned_shifts": { a.id.to_string(): [vera.id.to_string()] } }),
        Duration::ZERO,
    )
    .await;
    let app = app(&fx, &solver.url);

    let token = MutationToken::new();
    let mut rx = fx.bus.subscribe();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/events/{}/auto-assign", fx.event_id))
        .header("content-type", "application/json")
        .header("x-mutation-token", token.to_string())
        .body(Body::from(json!({ "strategy": "balanced" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["assigned"], 1);
    assert_eq!(body["partial"], false);

    let mut saw_change = false;
    while let Ok(event) = rx.try_recv() {
        if let RotaEvent::StoreChanged(change) = event {
            assert_eq!(change.origin, Some(token));
            saw_change = true;
        }
    }
    assert!(saw_change);
}

#[tokio::test]
async fn test_solver_failure_maps_to_bad_gateway() {
    let fx = fixture().await;
    fx.volunteer("Vera", None, None).await;
    fx.shift("A", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let solver = MockSolver::start(503, json!({ "error": "down" }), Duration::ZERO).await;
    let app = app(&fx, &solver.url);

    let (status, body) = send(&app, "POST", &format!("/events/{}/auto-assign", fx.event_id), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "SOLVER_ERROR");
}

#[tokio::test]
async fn test_bad_mutation_token_rejected() {
    let fx = fixture().await;
    let app = app(&fx, "http://127.0.0.1:9/solve");
    let request = Request::builder()
        .method("POST")
        .uri(format!("/events/{}/assignments/clear", fx.event_id))
        .header("x-mutation-token", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_kiosk_flow_over_http() {
    let fx = fixture().await;
    let vera = fx.volunteer("Vera", None, None).await;
    let a = fx.shift("A", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let assignment = fx.assign(&a, &vera).await;
    let radio = fx.asset("radio").await;
    let app = app(&fx, "http://127.0.0.1:9/solve");

    let (status, session) = send(&app, "POST", &format!("/events/{}/kiosk/sessions", fx.event_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let base = format!("/kiosk/sessions/{}", session["id"].as_str().unwrap());

    let (_, found) = send(&app, "POST", &format!("{}/search", base), Some(json!({ "query": "ver" }))).await;
    assert_eq!(found["results"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "POST", &format!("{}/select", base), Some(json!({ "volunteer_id": vera.id }))).await;
    assert_eq!(status, StatusCode::OK);

    // Checkout of a pending assignment is not allowed
    let (status, body) = send(
        &app,
        "POST",
        &format!("{}/action", base),
        Some(json!({ "assignment_id": assignment.id, "action": "checkout" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{}/action", base),
        Some(json!({ "assignment_id": assignment.id, "action": "checkin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"], "assets");

    let (_, available) = send(&app, "GET", &format!("{}/assets", base), None).await;
    assert_eq!(available.as_array().unwrap().len(), 1);
    send(&app, "POST", &format!("{}/assets", base), Some(json!({ "asset_ids": [radio.id] }))).await;

    let (status, done) = send(&app, "POST", &format!("{}/complete", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["receipt"]["message"], "Checked In!");
    assert_eq!(done["session"]["step"], "success");

    let (_, asset) = send(&app, "POST", &format!("/assets/{}/return", radio.id), None).await;
    assert_eq!(asset["status"], "available");

    let (_, feed) = send(&app, "GET", &format!("/events/{}/activity?limit=10", fx.event_id), None).await;
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 3);
    assert!(feed[0]["description"].as_str().unwrap().contains("returned"));
}
