//! Attendance desk
//!
//! Admin-side counterparts of the kiosk: direct check-in/check-out, asset
//! issue/return, late detection and the activity feed. Each operation is one
//! transaction and writes one activity entry.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rota_common::config::RotaConfig;
use rota_common::db::{
    ActivityEntry, ActivityKind, Asset, AssetStatus, Assignment, AttendanceStatus, NewActivity,
    ShiftRoster,
};
use rota_common::events::{ChangeOp, MutationToken, RotaEvent, StoreTable};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{SchedError, SchedResult};
use crate::store::{ChangeSet, Store};

pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// An assignment whose volunteer has not shown up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LateAssignment {
    pub assignment_id: Uuid,
    pub volunteer_id: Uuid,
    pub volunteer_name: String,
    pub shift_id: Uuid,
    pub shift_name: String,
    pub start_time: DateTime<Utc>,
    pub minutes_late: i64,
}

/// Late assignments in `rosters` at `now`
///
/// Late: not checked in, not dismissed, and the shift started more than
/// `grace` ago. A volunteer whose own earlier shift ended at most `leeway`
/// before this one started is excused.
pub fn find_late(
    rosters: &[ShiftRoster],
    now: DateTime<Utc>,
    grace: Duration,
    leeway: Duration,
) -> Vec<LateAssignment> {
    let mut late = Vec::new();
    for roster in rosters {
        let start = roster.shift.start_time;
        if now - start <= grace {
            continue;
        }
        for entry in &roster.assignments {
            let a = &entry.assignment;
            if a.checked_in || a.checked_in_at.is_some() || a.late_dismissed {
                continue;
            }
            let back_to_back = rosters.iter().any(|other| {
                other.shift.id != roster.shift.id
                    && other.shift.end_time <= start
                    && start - other.shift.end_time <= leeway
                    && other
                        .assignments
                        .iter()
                        .any(|o| o.volunteer.id == entry.volunteer.id)
            });
            if back_to_back {
                continue;
            }
            late.push(LateAssignment {
                assignment_id: a.id,
                volunteer_id: entry.volunteer.id,
                volunteer_name: entry.volunteer.name.clone(),
                shift_id: roster.shift.id,
                shift_name: roster.shift.display_name(),
                start_time: start,
                minutes_late: (now - start).num_minutes(),
            });
        }
    }
    late.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.volunteer_name.cmp(&b.volunteer_name))
    });
    late
}

#[derive(Clone)]
pub struct Attendance {
    store: Store,
    grace: Duration,
    leeway: Duration,
}

impl Attendance {
    pub fn new(store: Store, grace_minutes: i64, leeway_minutes: i64) -> Self {
        Self {
            store,
            grace: Duration::minutes(grace_minutes),
            leeway: Duration::minutes(leeway_minutes),
        }
    }

    pub fn from_config(store: Store, config: &RotaConfig) -> Self {
        Self::new(store, config.late_grace_minutes, config.late_leeway_minutes)
    }

    pub fn with_origin(&self, origin: Option<MutationToken>) -> Self {
        Self {
            store: self.store.with_origin(origin),
            grace: self.grace,
            leeway: self.leeway,
        }
    }

    /// Mark a volunteer present on one assignment
    pub async fn check_in(
        &self,
        assignment_id: Uuid,
        expected_version: Option<i64>,
    ) -> SchedResult<Assignment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let (assignment, event_id, name) = load_context(&mut *tx, assignment_id).await?;
        if assignment.attendance() == AttendanceStatus::Active {
            return Err(SchedError::InvalidTransition(format!(
                "{} is already checked in",
                name
            )));
        }
        let version = expected_version.unwrap_or(assignment.version);
        if !db::assignments::mark_checked_in(&mut *tx, assignment_id, now, Some(version)).await? {
            return Err(SchedError::ConflictRetry(format!(
                "Assignment {} changed since it was loaded",
                assignment_id
            )));
        }
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(event_id, ActivityKind::CheckIn, format!("{} checked in.", name))
                .volunteer(assignment.volunteer_id)
                .metadata(json!({ "assignment_id": assignment_id })),
        )
        .await?;
        let updated = db::assignments::get_assignment(&mut *tx, assignment_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", assignment_id)))?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Update, event_id, vec![assignment_id]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;

        info!(assignment_id = %assignment_id, "Checked in at desk");
        Ok(updated)
    }

    /// Close an active assignment
    pub async fn check_out(
        &self,
        assignment_id: Uuid,
        expected_version: Option<i64>,
    ) -> SchedResult<Assignment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let (assignment, event_id, name) = load_context(&mut *tx, assignment_id).await?;
        if assignment.attendance() != AttendanceStatus::Active {
            return Err(SchedError::InvalidTransition(format!(
                "{} is not checked in",
                name
            )));
        }
        let version = expected_version.unwrap_or(assignment.version);
        if !db::assignments::mark_checked_out(&mut *tx, assignment_id, now, true, Some(version))
            .await?
        {
            return Err(SchedError::ConflictRetry(format!(
                "Assignment {} changed since it was loaded",
                assignment_id
            )));
        }
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(event_id, ActivityKind::CheckOut, format!("{} checked out.", name))
                .volunteer(assignment.volunteer_id)
                .metadata(json!({ "assignment_id": assignment_id })),
        )
        .await?;
        let updated = db::assignments::get_assignment(&mut *tx, assignment_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", assignment_id)))?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Update, event_id, vec![assignment_id]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;

        info!(assignment_id = %assignment_id, "Checked out at desk");
        Ok(updated)
    }

    /// Lend an available asset to a volunteer
    pub async fn issue_asset(
        &self,
        asset_id: Uuid,
        volunteer_id: Uuid,
        expected_version: Option<i64>,
    ) -> SchedResult<Asset> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let asset = db::assets::get_asset(&mut *tx, asset_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Asset {}", asset_id)))?;
        let volunteer = db::volunteers::get_volunteer(&mut *tx, volunteer_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Volunteer {}", volunteer_id)))?;
        if volunteer.event_id != asset.event_id {
            return Err(SchedError::Validation(
                "Asset and volunteer belong to different events".to_string(),
            ));
        }
        if asset.status != AssetStatus::Available {
            return Err(SchedError::InvalidTransition(format!(
                "{} is {} and cannot be issued",
                asset.name,
                asset.status.as_str()
            )));
        }

        let version = expected_version.unwrap_or(asset.version);
        if !db::assets::mark_assigned(&mut *tx, asset_id, volunteer_id, version).await? {
            return Err(SchedError::ConflictRetry(format!(
                "{} changed since it was loaded",
                asset.name
            )));
        }
        let record = db::custody::open_custody(&mut *tx, asset_id, volunteer_id, now).await?;
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                asset.event_id,
                ActivityKind::AssetOut,
                format!("{} checked out to {}.", asset.name, volunteer.name),
            )
            .volunteer(volunteer_id)
            .metadata(json!({ "asset_id": asset_id })),
        )
        .await?;
        let updated = db::assets::get_asset(&mut *tx, asset_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Asset {}", asset_id)))?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assets, ChangeOp::Update, asset.event_id, vec![asset_id]);
        changes.push(StoreTable::AssetCustody, ChangeOp::Insert, asset.event_id, vec![record.id]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, asset.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;
        Ok(updated)
    }

    /// Take an asset back from whoever holds it
    pub async fn return_asset(&self, asset_id: Uuid) -> SchedResult<Asset> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let asset = db::assets::get_asset(&mut *tx, asset_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Asset {}", asset_id)))?;
        if asset.status != AssetStatus::Assigned {
            return Err(SchedError::InvalidTransition(format!(
                "{} is not on loan",
                asset.name
            )));
        }

        let holder = match asset.volunteer_id {
            Some(id) => db::volunteers::get_volunteer(&mut *tx, id).await?,
            None => None,
        };
        let holder_name = holder.as_ref().map_or("Unknown", |v| v.name.as_str()).to_string();

        db::custody::close_for_asset(&mut *tx, asset_id, None, now).await?;
        db::assets::mark_available(&mut *tx, asset_id).await?;
        let mut activity = NewActivity::new(
            asset.event_id,
            ActivityKind::AssetIn,
            format!("{} returned by {}.", asset.name, holder_name),
        )
        .metadata(json!({ "asset_id": asset_id }));
        if let Some(holder) = &holder {
            activity = activity.volunteer(holder.id);
        }
        let entry = db::activity::append(&mut *tx, activity).await?;
        let updated = db::assets::get_asset(&mut *tx, asset_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Asset {}", asset_id)))?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assets, ChangeOp::Update, asset.event_id, vec![asset_id]);
        changes.push(StoreTable::AssetCustody, ChangeOp::Update, asset.event_id, Vec::new());
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, asset.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;
        Ok(updated)
    }

    /// Late assignments of an event at `now` (read only)
    pub async fn late_list(&self, event_id: Uuid, now: DateTime<Utc>) -> SchedResult<Vec<LateAssignment>> {
        let mut conn = self.store.pool().acquire().await?;
        let rosters = db::assignments::load_rosters(&mut *conn, event_id).await?;
        Ok(find_late(&rosters, now, self.grace, self.leeway))
    }

    /// Late assignments at `now`; warns (activity entry + bus event) once per assignment
    pub async fn scan_late(&self, event_id: Uuid, now: DateTime<Utc>) -> SchedResult<Vec<LateAssignment>> {
        let mut tx = self.store.begin().await?;
        let rosters = db::assignments::load_rosters(&mut *tx, event_id).await?;
        let late = find_late(&rosters, now, self.grace, self.leeway);
        let warned: HashSet<Uuid> = db::assignments::late_warned_ids(&mut *tx, event_id).await?;

        let mut changes = ChangeSet::new();
        let mut fresh = Vec::new();
        for item in late.iter().filter(|l| !warned.contains(&l.assignment_id)) {
            if !db::assignments::mark_late_warned(&mut *tx, item.assignment_id).await? {
                continue;
            }
            let entry = db::activity::append(
                &mut *tx,
                NewActivity::new(
                    event_id,
                    ActivityKind::LateWarning,
                    format!(
                        "Late Warning: {} is over {} minutes late for {}.",
                        item.volunteer_name,
                        self.grace.num_minutes(),
                        item.shift_name
                    ),
                )
                .volunteer(item.volunteer_id)
                .metadata(json!({ "assignment_id": item.assignment_id })),
            )
            .await?;
            changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
            fresh.push(item);
        }
        self.store.commit(tx, changes).await?;

        for item in &fresh {
            self.store.bus().emit_lossy(RotaEvent::LateWarning {
                event_id,
                assignment_id: item.assignment_id,
                volunteer_id: item.volunteer_id,
                timestamp: now,
            });
        }
        if !fresh.is_empty() {
            info!(event_id = %event_id, warned = fresh.len(), late = late.len(), "Late warnings issued");
        }
        Ok(late)
    }

    pub async fn dismiss_late(&self, assignment_id: Uuid) -> SchedResult<()> {
        self.set_late_dismissed(assignment_id, true).await
    }

    pub async fn undismiss_late(&self, assignment_id: Uuid) -> SchedResult<()> {
        self.set_late_dismissed(assignment_id, false).await
    }

    async fn set_late_dismissed(&self, assignment_id: Uuid, dismissed: bool) -> SchedResult<()> {
        let mut tx = self.store.begin().await?;
        let (_, event_id, _) = load_context(&mut *tx, assignment_id).await?;
        db::assignments::set_late_dismissed(&mut *tx, assignment_id, dismissed).await?;
        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Update, event_id, vec![assignment_id]);
        self.store.commit(tx, changes).await
    }

    /// Newest entries first
    pub async fn recent_activity(&self, event_id: Uuid, limit: usize) -> SchedResult<Vec<ActivityEntry>> {
        Ok(db::activity::recent(self.store.pool(), event_id, limit).await?)
    }
}

/// Assignment plus its event id and volunteer name
async fn load_context(
    conn: &mut sqlx::SqliteConnection,
    assignment_id: Uuid,
) -> SchedResult<(Assignment, Uuid, String)> {
    let assignment = db::assignments::get_assignment(&mut *conn, assignment_id)
        .await?
        .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", assignment_id)))?;
    let shift = db::shifts::get_shift(&mut *conn, assignment.shift_id)
        .await?
        .ok_or_else(|| SchedError::NotFound(format!("Shift {}", assignment.shift_id)))?;
    let name = db::volunteers::get_volunteer(&mut *conn, assignment.volunteer_id)
        .await?
        .map(|v| v.name)
        .unwrap_or_else(|| "Volunteer".to_string());
    Ok((assignment, shift.event_id, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rota_common::db::{RosterEntry, Shift, Volunteer};
    use rota_common::RequiredGroups;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, hour, minute, 0).unwrap()
    }

    fn roster(start: DateTime<Utc>, end: DateTime<Utc>, volunteers: &[&Volunteer]) -> ShiftRoster {
        let shift = Shift::new(Uuid::nil(), Some("Gate".into()), start, end, RequiredGroups::new())
            .unwrap();
        let assignments = volunteers
            .iter()
            .map(|v| RosterEntry {
                assignment: Assignment::new(shift.id, v.id),
                volunteer: (*v).clone(),
            })
            .collect();
        ShiftRoster { shift, assignments }
    }

    fn volunteer(name: &str) -> Volunteer {
        Volunteer {
            id: Uuid::new_v4(),
            event_id: Uuid::nil(),
            name: name.into(),
            group: None,
            max_hours: None,
        }
    }

    fn rules() -> (Duration, Duration) {
        (Duration::minutes(5), Duration::minutes(15))
    }

    #[test]
    fn test_late_after_grace_only() {
        let v = volunteer("Lou");
        let rosters = vec![roster(at(9, 0), at(12, 0), &[&v])];
        let (grace, leeway) = rules();

        assert!(find_late(&rosters, at(9, 5), grace, leeway).is_empty());
        let late = find_late(&rosters, at(9, 6), grace, leeway);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].minutes_late, 6);
    }

    #[test]
    fn test_back_to_back_shift_excuses() {
        let v = volunteer("Lou");
        let w = volunteer("Max");
        let rosters = vec![
            roster(at(7, 0), at(8, 50), &[&v]),
            roster(at(9, 0), at(12, 0), &[&v, &w]),
        ];
        let (grace, leeway) = rules();

        let late = find_late(&rosters, at(9, 10), grace, leeway);
        // Lou's previous shift (and Lou on it) counts too: started 7:00, not checked in
        let on_nine: Vec<_> = late.iter().filter(|l| l.start_time == at(9, 0)).collect();
        assert_eq!(on_nine.len(), 1);
        assert_eq!(on_nine[0].volunteer_name, "Max");
    }

    #[test]
    fn test_gap_longer_than_leeway_is_late() {
        let v = volunteer("Lou");
        let rosters = vec![
            roster(at(7, 0), at(8, 30), &[&v]),
            roster(at(9, 0), at(12, 0), &[&v]),
        ];
        let (grace, leeway) = rules();
        let late = find_late(&rosters, at(9, 10), grace, leeway);
        assert!(late.iter().any(|l| l.start_time == at(9, 0)));
    }

    #[test]
    fn test_checked_in_or_dismissed_not_late() {
        let v = volunteer("Lou");
        let w = volunteer("Max");
        let mut r = roster(at(9, 0), at(12, 0), &[&v, &w]);
        r.assignments[0].assignment.checked_in = true;
        r.assignments[0].assignment.checked_in_at = Some(at(9, 1));
        r.assignments[1].assignment.late_dismissed = true;
        let (grace, leeway) = rules();
        assert!(find_late(&[r], at(10, 0), grace, leeway).is_empty());
    }
}
