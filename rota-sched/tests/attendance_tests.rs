//! Attendance desk: check-in/out, asset loans, late warnings

mod helpers;

use helpers::{at, fixture};
use rota_common::db::{ActivityKind, AssetStatus, AttendanceStatus};
use rota_common::events::RotaEvent;
use rota_common::RequiredGroups;
use rota_sched::db;
use rota_sched::services::Attendance;
use rota_sched::SchedError;

#[tokio::test]
async fn test_check_in_and_out_write_activity() {
    let fx = fixture().await;
    let vol = fx.volunteer("Lou", None, None).await;
    let shift = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let assignment = fx.assign(&shift, &vol).await;
    let desk = Attendance::new(fx.store.clone(), 5, 15);

    let checked_in = desk.check_in(assignment.id, Some(0)).await.unwrap();
    assert_eq!(checked_in.attendance(), AttendanceStatus::Active);
    assert!(checked_in.checked_in_at.is_some());

    let err = desk.check_in(assignment.id, None).await.unwrap_err();
    assert!(matches!(err, SchedError::InvalidTransition(_)));

    let checked_out = desk.check_out(assignment.id, None).await.unwrap();
    assert!(!checked_out.checked_in);
    assert_eq!(checked_out.attendance(), AttendanceStatus::Completed);

    let feed = desk.recent_activity(fx.event_id, 50).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].kind, ActivityKind::CheckOut);
    assert_eq!(feed[0].description, "Lou checked out.");
    assert_eq!(feed[1].description, "Lou checked in.");
}

#[tokio::test]
async fn test_stale_version_is_conflict_retry() {
    let fx = fixture().await;
    let vol = fx.volunteer("Lou", None, None).await;
    let shift = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let assignment = fx.assign(&shift, &vol).await;
    let desk = Attendance::new(fx.store.clone(), 5, 15);

    desk.dismiss_late(assignment.id).await.unwrap();
    let err = desk.check_in(assignment.id, Some(0)).await.unwrap_err();
    assert!(matches!(err, SchedError::ConflictRetry(_)), "got {:?}", err);

    let stored = db::assignments::get_assignment(&fx.pool, assignment.id).await.unwrap().unwrap();
    assert!(!stored.checked_in);
}

#[tokio::test]
async fn test_issue_and_return_asset() {
    let fx = fixture().await;
    let vol = fx.volunteer("Lou", None, None).await;
    let other = fx.volunteer("Max", None, None).await;
    let radio = fx.asset("radio").await;
    let desk = Attendance::new(fx.store.clone(), 5, 15);

    let issued = desk.issue_asset(radio.id, vol.id, None).await.unwrap();
    assert_eq!(issued.status, AssetStatus::Assigned);
    assert_eq!(issued.volunteer_id, Some(vol.id));

    let err = desk.issue_asset(radio.id, other.id, None).await.unwrap_err();
    assert!(matches!(err, SchedError::InvalidTransition(_)));

    let returned = desk.return_asset(radio.id).await.unwrap();
    assert_eq!(returned.status, AssetStatus::Available);
    assert_eq!(returned.volunteer_id, None);

    let history = db::custody::history_for_asset(&fx.pool, radio.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_open());

    let feed = desk.recent_activity(fx.event_id, 50).await.unwrap();
    assert_eq!(feed[0].description, "radio returned by Lou.");
    assert_eq!(feed[1].description, "radio checked out to Lou.");

    let err = desk.return_asset(radio.id).await.unwrap_err();
    assert!(matches!(err, SchedError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_scan_late_warns_once() {
    let fx = fixture().await;
    let lou = fx.volunteer("Lou", None, None).await;
    let max = fx.volunteer("Max", None, None).await;
    let early = fx.shift("Early", at(7, 0), at(8, 55), RequiredGroups::new()).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let lou_early = fx.assign(&early, &lou).await;
    fx.assign(&gate, &lou).await;
    let max_gate = fx.assign(&gate, &max).await;

    let desk = Attendance::new(fx.store.clone(), 5, 15);
    desk.check_in(lou_early.id, None).await.unwrap();

    let mut rx = fx.bus.subscribe();
    let late = desk.scan_late(fx.event_id, at(9, 10)).await.unwrap();
    assert_eq!(late.len(), 1, "{:?}", late);
    assert_eq!(late[0].assignment_id, max_gate.id);
    assert_eq!(late[0].minutes_late, 10);

    let mut warnings = 0;
    while let Ok(event) = rx.try_recv() {
        if let RotaEvent::LateWarning { assignment_id, .. } = event {
            assert_eq!(assignment_id, max_gate.id);
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);

    // Still late, but already warned
    let again = desk.scan_late(fx.event_id, at(9, 20)).await.unwrap();
    assert_eq!(again.len(), 1);
    let feed = desk.recent_activity(fx.event_id, 50).await.unwrap();
    let logged: Vec<_> = feed.iter().filter(|e| e.kind == ActivityKind::LateWarning).collect();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].description, "Late Warning: Max is over 5 minutes late for Gate.");
}

#[tokio::test]
async fn test_dismissed_assignment_not_late() {
    let fx = fixture().await;
    let max = fx.volunteer("Max", None, None).await;
    let gate = fx.shift("Gate", at(9, 0), at(12, 0), RequiredGroups::new()).await;
    let assignment = fx.assign(&gate, &max).await;
    let desk = Attendance::new(fx.store.clone(), 5, 15);

    desk.dismiss_late(assignment.id).await.unwrap();
    assert!(desk.late_list(fx.event_id, at(10, 0)).await.unwrap().is_empty());

    desk.undismiss_late(assignment.id).await.unwrap();
    assert_eq!(desk.late_list(fx.event_id, at(10, 0)).await.unwrap().len(), 1);
}
