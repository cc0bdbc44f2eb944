//! Auto-assignment against a local solver, plus manual assignment operations

mod helpers;

use std::time::Duration;

use helpers::{at, fixture, MockSolver};
use rota_common::events::{ChangeOp, MutationToken, RotaEvent, StoreTable};
use rota_common::RequiredGroups;
use rota_sched::db;
use rota_sched::SchedError;
use serde_json::{json, Value};

fn ok(body: Value) -> (u16, Value) {
    (200, body)
}

#[tokio::test]
async fn test_auto_assign_replaces_assignment_set() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", Some("Medical"), Some(10.0)).await;
    let bob = fx.volunteer("Bob", Some("Security"), None).await;
    let first = fx
        .shift("First Aid", at(9, 0), at(12, 0), RequiredGroups::new().with("Medical", 1))
        .await;
    let gate = fx
        .shift("Gate", at(12, 0), at(15, 0), RequiredGroups::new().with("Security", 1))
        .await;
    // Stale assignment the solver does not mention
    fx.assign(&gate, &ann).await;

    let (status, body) = ok(json!({
        "assigned_shifts": {
            first.id.to_string(): [ann.id.to_string(), ann.id.to_string()],
            gate.id.to_string(): [bob.id.to_string()],
        },
        "unfilled_shifts": [],
        "fairness_score": 88.5
    }));
    let solver = MockSolver::start(status, body, Duration::ZERO).await;
    let outcome = fx.orchestrator(&solver).auto_assign(fx.event_id, "").await.unwrap();

    assert_eq!(outcome.strategy, "balanced");
    assert_eq!(outcome.assigned, 2);
    assert_eq!(outcome.removed, 1);
    assert!(!outcome.partial);
    assert_eq!(outcome.message, "Auto-assignment completed successfully");
    assert_eq!(outcome.solver_fairness, Some(88.5));
    assert_eq!(outcome.fairness.unwrap().score, 100.0);

    let mut expected = vec![(first.id, ann.id), (gate.id, bob.id)];
    expected.sort();
    assert_eq!(fx.pairs().await, expected);

    let requests = solver.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["strategy"], "balanced");
    assert_eq!(requests[0]["volunteers"].as_array().unwrap().len(), 2);
    let bob_entry = requests[0]["volunteers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["name"] == "Bob")
        .unwrap();
    assert_eq!(bob_entry["max_hours"], 999.0);
    assert_eq!(requests[0]["shifts"][0]["start"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn test_partial_solve_creates_returned_pairs_only() {
    let fx = fixture().await;
    let vol1 = fx.volunteer("Vera", Some("Medical"), None).await;
    fx.volunteer("Walt", Some("Medical"), None).await;
    let shift_x = fx
        .shift("X", at(9, 0), at(12, 0), RequiredGroups::new().with("Medical", 1))
        .await;
    let shift_y = fx
        .shift("Y", at(13, 0), at(16, 0), RequiredGroups::new().with("Medical", 3))
        .await;

    let body = json!({
        "detail": {
            "assigned_shifts": { shift_x.id.to_string(): [vol1.id.to_string()] },
            "unfilled_shifts": [
                { "shift_id": shift_y.id.to_string(), "group": "Medical", "reasons": ["needs 2 more"] }
            ]
        }
    });
    let solver = MockSolver::start(422, body, Duration::ZERO).await;
    let outcome = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap();

    assert!(outcome.partial);
    assert_eq!(outcome.message, "Partial assignment completed - some shifts could not be filled");
    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.unfilled.len(), 1);
    assert_eq!(outcome.unfilled[0].shift_id, shift_y.id.to_string());
    assert_eq!(outcome.unfilled[0].group.as_deref(), Some("Medical"));
    assert_eq!(outcome.unfilled[0].reasons, vec!["needs 2 more".to_string()]);
    assert_eq!(fx.pairs().await, vec![(shift_x.id, vol1.id)]);
}

#[tokio::test]
async fn test_solver_error_leaves_store_untouched() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    fx.assign(&gate, &ann).await;

    let solver = MockSolver::start(500, json!({ "error": "boom" }), Duration::ZERO).await;
    let mut rx = fx.bus.subscribe();
    let err = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap_err();

    match err {
        SchedError::Solver { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("boom"));
        }
        other => panic!("expected solver error, got {:?}", other),
    }
    assert_eq!(fx.pairs().await, vec![(gate.id, ann.id)]);
    assert!(rx.try_recv().is_err(), "no notification expected");
}

#[tokio::test]
async fn test_solver_timeout_is_distinct() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    fx.assign(&gate, &ann).await;

    let solver = MockSolver::start(200, json!({ "assigned_shifts": {} }), Duration::from_secs(3)).await;
    let err = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap_err();
    assert!(matches!(err, SchedError::SolverTimeout(_)), "got {:?}", err);
    assert_eq!(fx.pairs().await, vec![(gate.id, ann.id)]);
}

#[tokio::test]
async fn test_missing_data_rejected_before_solver() {
    let fx = fixture().await;
    fx.volunteer("Ann", None, None).await;
    let solver = MockSolver::start(200, json!({ "assigned_shifts": {} }), Duration::ZERO).await;

    let err = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap_err();
    assert!(matches!(err, SchedError::NoData(_)));
    assert!(solver.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_ids_dropped_and_null_shift_partial() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let bar = fx.shift("Bar", at(13, 0), at(15, 0), RequiredGroups::new()).await;

    let body = json!({
        "assigned_shifts": {
            gate.id.to_string(): [ann.id.to_string(), "ghost"],
            "not-a-shift": [ann.id.to_string()],
            bar.id.to_string(): null
        }
    });
    let solver = MockSolver::start(200, body, Duration::ZERO).await;
    let outcome = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap();

    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.dropped, 2);
    assert_eq!(outcome.partially_filled, vec![bar.id]);
    assert!(outcome.partial);
    assert_eq!(fx.pairs().await, vec![(gate.id, ann.id)]);
}

#[tokio::test]
async fn test_failed_insert_rolls_back_delete() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let bar = fx.shift("Bar", at(13, 0), at(15, 0), RequiredGroups::new()).await;
    fx.assign(&gate, &ann).await;

    sqlx::query(
        "CREATE TRIGGER reject_insert BEFORE INSERT ON assignments BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&fx.pool)
    .await
    .unwrap();

    let body = json!({ "assigned_shifts": { bar.id.to_string(): [ann.id.to_string()] } });
    let solver = MockSolver::start(200, body, Duration::ZERO).await;
    let mut rx = fx.bus.subscribe();
    let err = fx.orchestrator(&solver).auto_assign(fx.event_id, "balanced").await.unwrap_err();

    assert!(matches!(err, SchedError::Persistence(_)), "got {:?}", err);
    assert_eq!(fx.pairs().await, vec![(gate.id, ann.id)]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_notifications_carry_origin() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let body = json!({ "assigned_shifts": { gate.id.to_string(): [ann.id.to_string()] } });
    let solver = MockSolver::start(200, body, Duration::ZERO).await;

    let token = MutationToken::new();
    let mut rx = fx.bus.subscribe();
    fx.orchestrator(&solver)
        .with_origin(Some(token))
        .auto_assign(fx.event_id, "balanced")
        .await
        .unwrap();

    let mut changes = Vec::new();
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            RotaEvent::StoreChanged(change) => changes.push(change),
            RotaEvent::AutoAssignCompleted { assigned, .. } => {
                assert_eq!(assigned, 1);
                completed = true;
            }
            _ => {}
        }
    }
    assert!(completed);
    assert!(changes.iter().all(|c| c.origin == Some(token)));
    assert!(changes
        .iter()
        .any(|c| c.table == StoreTable::Assignments && c.op == ChangeOp::Insert));
}

#[tokio::test]
async fn test_manual_assign_duplicate_and_overstaff() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let bob = fx.volunteer("Bob", None, None).await;
    let gate = fx
        .shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new().with("Security", 1))
        .await;
    let solver = MockSolver::start(200, json!({}), Duration::ZERO).await;
    let orchestrator = fx.orchestrator(&solver);

    let first = orchestrator.assign_volunteer(gate.id, ann.id).await.unwrap();
    assert!(first.warning.is_none());

    let err = orchestrator.assign_volunteer(gate.id, ann.id).await.unwrap_err();
    match err {
        SchedError::Validation(msg) => assert_eq!(msg, "This volunteer is already assigned to this shift."),
        other => panic!("got {:?}", other),
    }

    let second = orchestrator.assign_volunteer(gate.id, bob.id).await.unwrap();
    assert_eq!(
        second.warning.as_deref(),
        Some("This shift is now overstaffed. More volunteers are assigned than required.")
    );

    orchestrator.unassign_volunteer(first.assignment.id).await.unwrap();
    assert_eq!(fx.pairs().await, vec![(gate.id, bob.id)]);
}

#[tokio::test]
async fn test_swap_exchanges_volunteers() {
    let fx = fixture().await;
    let ann = fx.volunteer("Ann", None, None).await;
    let bob = fx.volunteer("Bob", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let bar = fx.shift("Bar", at(13, 0), at(15, 0), RequiredGroups::new()).await;
    let a = fx.assign(&gate, &ann).await;
    let b = fx.assign(&bar, &bob).await;
    let solver = MockSolver::start(200, json!({}), Duration::ZERO).await;
    let orchestrator = fx.orchestrator(&solver);

    let err = orchestrator.swap_assignments(a.id, b.id, Some((5, 0))).await.unwrap_err();
    assert!(matches!(err, SchedError::ConflictRetry(_)));

    orchestrator.swap_assignments(a.id, b.id, Some((0, 0))).await.unwrap();
    let mut expected = vec![(gate.id, bob.id), (bar.id, ann.id)];
    expected.sort();
    assert_eq!(fx.pairs().await, expected);
}

#[tokio::test]
async fn test_fill_from_group_and_unfill() {
    let fx = fixture().await;
    let light = fx.volunteer("Lena", Some("Medical"), None).await;
    let busy = fx.volunteer("Mia", Some("Medical"), None).await;
    let heavy = fx.volunteer("Nils", Some("Medical"), None).await;
    let capped = fx.volunteer("Olga", Some("Medical"), Some(2.0)).await;
    fx.volunteer("Pete", Some("Security"), None).await;

    let aid = fx
        .shift("First Aid", at(9, 0), at(12, 0), RequiredGroups::parse_str("Medical:2|Security"))
        .await;
    let overlap = fx.shift("Tent", at(10, 0), at(11, 0), RequiredGroups::new()).await;
    let evening = fx.shift("Evening", at(18, 0), at(22, 0), RequiredGroups::new()).await;
    fx.assign(&overlap, &busy).await;
    fx.assign(&evening, &heavy).await;

    let solver = MockSolver::start(200, json!({}), Duration::ZERO).await;
    let orchestrator = fx.orchestrator(&solver);

    let filled = orchestrator.fill_shift_from_group(aid.id, "Medical", fx.event_id).await.unwrap();
    assert_eq!(filled.added, 2);
    assert_eq!(filled.remaining, 0);

    let on_aid: Vec<_> = db::assignments::list_for_shift(&fx.pool, aid.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.volunteer_id)
        .collect();
    // Lena has no hours; Nils comes next; Mia overlaps; Olga would pass her cap
    assert!(on_aid.contains(&light.id));
    assert!(on_aid.contains(&heavy.id));
    assert!(!on_aid.contains(&busy.id));
    assert!(!on_aid.contains(&capped.id));

    let err = orchestrator.fill_shift_from_group(aid.id, "Kitchen", fx.event_id).await.unwrap_err();
    assert!(matches!(err, SchedError::Validation(_)));

    assert_eq!(orchestrator.unfill_shift(aid.id).await.unwrap(), 2);
    assert_eq!(orchestrator.clear_assignments(fx.event_id).await.unwrap(), 2);
    assert!(fx.pairs().await.is_empty());
}
