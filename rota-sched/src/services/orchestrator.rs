//! Auto-Assignment Orchestrator
//!
//! Builds a solver request from an event's volunteers and shifts, calls the
//! solver and reconciles its answer into the store. Reconciliation (delete
//! the event's assignments, insert the solver's set) runs in one transaction:
//! a failed insert leaves the previous assignment set in place.
//!
//! Also hosts the manual assignment operations (swap, clear, fill, unfill,
//! assign, unassign).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rota_common::db::{ActivityKind, Assignment, NewActivity, Shift, Volunteer};
use rota_common::events::{ChangeOp, MutationToken, RotaEvent, StoreTable};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{SchedError, SchedResult};
use crate::services::fairness::{self, Fairness};
use crate::services::solver_client::{SolverClient, SolverOutcome, SolverRequest, UnfilledShift};
use crate::services::solver_messages;
use crate::store::{ChangeSet, Store};

pub const DEFAULT_STRATEGY: &str = "balanced";

const PARTIAL_MESSAGE: &str = "Partial assignment completed - some shifts could not be filled";
const COMPLETE_MESSAGE: &str = "Auto-assignment completed successfully";
const DUPLICATE_MESSAGE: &str = "This volunteer is already assigned to this shift.";
const OVERSTAFFED_MESSAGE: &str =
    "This shift is now overstaffed. More volunteers are assigned than required.";

/// Result of `auto_assign`
#[derive(Debug, Clone, Serialize)]
pub struct AutoAssignOutcome {
    pub event_id: Uuid,
    pub strategy: String,
    /// Assignments created
    pub assigned: usize,
    /// Assignments the reconciliation replaced
    pub removed: u64,
    pub partial: bool,
    pub message: String,
    pub unfilled: Vec<UnfilledShift>,
    /// Shifts the solver answered with `null`
    pub partially_filled: Vec<Uuid>,
    /// Solver explanations with numeric variants collapsed
    pub conflicts: Vec<String>,
    pub fairness: Option<Fairness>,
    /// Score reported by the solver itself, if any
    pub solver_fairness: Option<f64>,
    /// Pairs ignored because they named unknown shifts or volunteers
    pub dropped: usize,
}

/// Result of `fill_shift_from_group`
#[derive(Debug, Clone, Serialize)]
pub struct FillOutcome {
    pub shift_id: Uuid,
    pub group: String,
    pub added: usize,
    pub assignment_ids: Vec<Uuid>,
    /// Requirement for the group still open after the fill
    pub remaining: u32,
}

/// Result of `assign_volunteer`
#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub assignment: Assignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Solver pairs mapped onto the event's records
#[derive(Debug, Default, PartialEq)]
pub struct ResolvedPairs {
    /// (shift, volunteer), unique, in solver order
    pub pairs: Vec<(Uuid, Uuid)>,
    pub partially_filled: Vec<Uuid>,
    pub dropped: usize,
}

/// Keep only pairs naming this event's shifts and volunteers, collapsing duplicates
pub fn resolve_pairs(
    outcome: &SolverOutcome,
    shifts: &HashSet<Uuid>,
    volunteers: &HashSet<Uuid>,
) -> ResolvedPairs {
    let mut resolved = ResolvedPairs::default();
    let mut seen = HashSet::new();

    for (raw_shift, raw_volunteers) in &outcome.assigned {
        let shift_id = match Uuid::parse_str(raw_shift) {
            Ok(id) if shifts.contains(&id) => id,
            _ => {
                warn!(shift_id = %raw_shift, "Solver assigned an unknown shift, dropped");
                resolved.dropped += raw_volunteers.len();
                continue;
            }
        };
        for raw_volunteer in raw_volunteers {
            match Uuid::parse_str(raw_volunteer) {
                Ok(volunteer_id) if volunteers.contains(&volunteer_id) => {
                    if seen.insert((shift_id, volunteer_id)) {
                        resolved.pairs.push((shift_id, volunteer_id));
                    }
                }
                _ => {
                    warn!(
                        shift_id = %shift_id,
                        volunteer_id = %raw_volunteer,
                        "Solver assigned an unknown volunteer, dropped"
                    );
                    resolved.dropped += 1;
                }
            }
        }
    }

    for raw_shift in &outcome.partially_filled {
        match Uuid::parse_str(raw_shift) {
            Ok(id) if shifts.contains(&id) => resolved.partially_filled.push(id),
            _ => warn!(shift_id = %raw_shift, "Solver flagged an unknown shift, ignored"),
        }
    }

    resolved
}

/// Hours per volunteer for a set of (shift, volunteer) pairs
fn pair_hours(pairs: &[(Uuid, Uuid)], shifts: &[Shift], volunteers: &[Volunteer]) -> Vec<f64> {
    let durations: HashMap<Uuid, f64> = shifts.iter().map(|s| (s.id, s.duration_hours())).collect();
    let mut hours: HashMap<Uuid, f64> = volunteers.iter().map(|v| (v.id, 0.0)).collect();
    for (shift_id, volunteer_id) in pairs {
        *hours.entry(*volunteer_id).or_insert(0.0) += durations.get(shift_id).copied().unwrap_or(0.0);
    }
    hours.into_values().collect()
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    solver: SolverClient,
    unlimited_hours: f64,
}

impl Orchestrator {
    pub fn new(store: Store, solver: SolverClient, unlimited_hours: f64) -> Self {
        Self {
            store,
            solver,
            unlimited_hours,
        }
    }

    /// Copy whose writes are tagged with `origin`
    pub fn with_origin(&self, origin: Option<MutationToken>) -> Self {
        Self {
            store: self.store.with_origin(origin),
            solver: self.solver.clone(),
            unlimited_hours: self.unlimited_hours,
        }
    }

    /// Ask the solver for an assignment set and make it the event's assignment set
    pub async fn auto_assign(&self, event_id: Uuid, strategy: &str) -> SchedResult<AutoAssignOutcome> {
        let strategy = match strategy.trim() {
            "" => DEFAULT_STRATEGY,
            s => s,
        };

        let volunteers = db::volunteers::list_for_event(self.store.pool(), event_id).await?;
        let shifts = db::shifts::list_for_event(self.store.pool(), event_id).await?;
        if volunteers.is_empty() {
            return Err(SchedError::NoData(format!("Event {} has no volunteers", event_id)));
        }
        if shifts.is_empty() {
            return Err(SchedError::NoData(format!("Event {} has no shifts", event_id)));
        }

        let request = SolverRequest::build(&volunteers, &shifts, strategy, self.unlimited_hours);
        let outcome = match self.solver.solve(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "Solver call failed, assignments untouched");
                return Err(e);
            }
        };

        let shift_ids: HashSet<Uuid> = shifts.iter().map(|s| s.id).collect();
        let volunteer_ids: HashSet<Uuid> = volunteers.iter().map(|v| v.id).collect();
        let resolved = resolve_pairs(&outcome, &shift_ids, &volunteer_ids);
        let partial = outcome.is_partial();

        let removed = match self.reconcile(event_id, strategy, &resolved, &outcome).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(
                    event_id = %event_id,
                    error = %e,
                    "Reconciliation failed, previous assignments kept"
                );
                return Err(e);
            }
        };

        let fairness = fairness::score_hours(&pair_hours(&resolved.pairs, &shifts, &volunteers));
        let result = AutoAssignOutcome {
            event_id,
            strategy: strategy.to_string(),
            assigned: resolved.pairs.len(),
            removed,
            partial,
            message: if partial { PARTIAL_MESSAGE } else { COMPLETE_MESSAGE }.to_string(),
            unfilled: outcome.unfilled.clone(),
            partially_filled: resolved.partially_filled.clone(),
            conflicts: solver_messages::dedupe(&outcome.conflicts),
            fairness,
            solver_fairness: outcome.fairness_score,
            dropped: resolved.dropped,
        };

        info!(
            event_id = %event_id,
            assigned = result.assigned,
            removed,
            unfilled = result.unfilled.len(),
            partial,
            fairness = ?result.fairness.map(|f| f.score),
            "Auto-assign completed"
        );

        self.store.bus().emit_lossy(RotaEvent::AutoAssignCompleted {
            event_id,
            assigned: result.assigned,
            unfilled: result.unfilled.len() + result.partially_filled.len(),
            partial,
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    async fn reconcile(
        &self,
        event_id: Uuid,
        strategy: &str,
        resolved: &ResolvedPairs,
        outcome: &SolverOutcome,
    ) -> SchedResult<u64> {
        let mut tx = self.store.begin().await?;
        let mut changes = ChangeSet::new();

        let removed = db::assignments::delete_for_event(&mut *tx, event_id).await?;
        changes.push(StoreTable::Assignments, ChangeOp::Delete, event_id, Vec::new());

        let mut inserted = Vec::with_capacity(resolved.pairs.len());
        for (shift_id, volunteer_id) in &resolved.pairs {
            let assignment = Assignment::new(*shift_id, *volunteer_id);
            db::assignments::insert_assignment(&mut *tx, &assignment).await?;
            inserted.push(assignment.id);
        }

        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                event_id,
                ActivityKind::AutoAssign,
                format!(
                    "Auto-assigned {} slot(s) using the {} strategy",
                    inserted.len(),
                    strategy
                ),
            )
            .metadata(json!({
                "strategy": strategy,
                "assigned": inserted.len(),
                "removed": removed,
                "unfilled": outcome.unfilled.len(),
                "partial": outcome.is_partial(),
            })),
        )
        .await?;

        changes.push(StoreTable::Assignments, ChangeOp::Insert, event_id, inserted);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;
        Ok(removed)
    }

    /// Exchange the volunteers of two assignments
    ///
    /// `expected_versions` are the versions the caller last saw; a mismatch is
    /// `ConflictRetry`.
    pub async fn swap_assignments(
        &self,
        a: Uuid,
        b: Uuid,
        expected_versions: Option<(i64, i64)>,
    ) -> SchedResult<()> {
        if a == b {
            return Err(SchedError::Validation(
                "Cannot swap an assignment with itself".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let first = db::assignments::get_assignment(&mut *tx, a)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", a)))?;
        let second = db::assignments::get_assignment(&mut *tx, b)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", b)))?;

        let (first_version, second_version) =
            expected_versions.unwrap_or((first.version, second.version));
        if first.version != first_version || second.version != second_version {
            return Err(SchedError::ConflictRetry(
                "Assignments changed since they were loaded".to_string(),
            ));
        }

        if first.shift_id == second.shift_id || first.volunteer_id == second.volunteer_id {
            // Same pairs either way
            self.store.commit(tx, ChangeSet::new()).await?;
            return Ok(());
        }

        for (volunteer, shift) in [
            (second.volunteer_id, first.shift_id),
            (first.volunteer_id, second.shift_id),
        ] {
            if db::assignments::find_pair(&mut *tx, volunteer, shift).await?.is_some() {
                return Err(SchedError::Validation(DUPLICATE_MESSAGE.to_string()));
            }
        }

        if !db::assignments::set_volunteer(&mut *tx, first.id, second.volunteer_id, first_version)
            .await?
            || !db::assignments::set_volunteer(&mut *tx, second.id, first.volunteer_id, second_version)
                .await?
        {
            return Err(SchedError::ConflictRetry(
                "Assignment changed during swap".to_string(),
            ));
        }

        let shift = db::shifts::get_shift(&mut *tx, first.shift_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Shift {}", first.shift_id)))?;
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                shift.event_id,
                ActivityKind::AssignmentChange,
                "Swapped volunteers between two assignments",
            )
            .metadata(json!({ "assignments": [first.id, second.id] })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(
            StoreTable::Assignments,
            ChangeOp::Update,
            shift.event_id,
            vec![first.id, second.id],
        );
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, shift.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;

        info!(a = %first.id, b = %second.id, "Assignments swapped");
        Ok(())
    }

    /// Delete every assignment of the event; returns the number removed
    pub async fn clear_assignments(&self, event_id: Uuid) -> SchedResult<u64> {
        let mut tx = self.store.begin().await?;
        let removed = db::assignments::delete_for_event(&mut *tx, event_id).await?;
        let mut changes = ChangeSet::new();
        if removed > 0 {
            let entry = db::activity::append(
                &mut *tx,
                NewActivity::new(
                    event_id,
                    ActivityKind::AssignmentChange,
                    format!("Cleared {} assignment(s)", removed),
                ),
            )
            .await?;
            changes.push(StoreTable::Assignments, ChangeOp::Delete, event_id, Vec::new());
            changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
        }
        self.store.commit(tx, changes).await?;

        info!(event_id = %event_id, removed, "Assignments cleared");
        Ok(removed)
    }

    /// Assign idle members of `group` up to the shift's open requirement for it
    ///
    /// Idle means not on this shift, not on an overlapping shift and not
    /// pushed past their hour cap. Members with fewer assigned hours go first.
    pub async fn fill_shift_from_group(
        &self,
        shift_id: Uuid,
        group: &str,
        event_id: Uuid,
    ) -> SchedResult<FillOutcome> {
        let group = group.trim();
        if group.is_empty() {
            return Err(SchedError::Validation("Group must not be empty".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let shift = db::shifts::get_shift(&mut *tx, shift_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Shift {}", shift_id)))?;
        if shift.event_id != event_id {
            return Err(SchedError::Validation(format!(
                "Shift {} does not belong to event {}",
                shift_id, event_id
            )));
        }
        if shift.excluded_groups.iter().any(|g| g == group) {
            return Err(SchedError::Validation(format!(
                "Group {} is excluded from this shift",
                group
            )));
        }
        let required = shift.required_groups.get(group);
        if required == 0 {
            return Err(SchedError::Validation(format!(
                "Shift has no requirement for group {}",
                group
            )));
        }

        let rosters = db::assignments::load_rosters(&mut *tx, event_id).await?;
        let mut busy: HashSet<Uuid> = HashSet::new();
        let mut already = 0u32;
        for roster in &rosters {
            let same = roster.shift.id == shift.id;
            let overlaps = rota_common::time::intervals_overlap(
                roster.shift.start_time,
                roster.shift.end_time,
                shift.start_time,
                shift.end_time,
            );
            for entry in &roster.assignments {
                if same && entry.volunteer.group.as_deref() == Some(group) {
                    already += 1;
                }
                if same || overlaps {
                    busy.insert(entry.volunteer.id);
                }
            }
        }

        let remaining = required.saturating_sub(already);
        if remaining == 0 {
            self.store.commit(tx, ChangeSet::new()).await?;
            return Ok(FillOutcome {
                shift_id,
                group: group.to_string(),
                added: 0,
                assignment_ids: Vec::new(),
                remaining: 0,
            });
        }

        let hours = fairness::hours_by_volunteer(&rosters, &[]);
        let duration = shift.duration_hours();
        let mut candidates: Vec<(f64, Volunteer)> =
            db::volunteers::list_by_group(&mut *tx, event_id, group)
                .await?
                .into_iter()
                .filter(|v| !busy.contains(&v.id))
                .map(|v| (hours.get(&v.id).copied().unwrap_or(0.0), v))
                .filter(|(h, v)| v.max_hours.map_or(true, |cap| h + duration <= cap))
                .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignment_ids = Vec::new();
        for (_, volunteer) in candidates.into_iter().take(remaining as usize) {
            let assignment = Assignment::new(shift_id, volunteer.id);
            db::assignments::insert_assignment(&mut *tx, &assignment).await?;
            assignment_ids.push(assignment.id);
        }

        let added = assignment_ids.len();
        let mut changes = ChangeSet::new();
        if added > 0 {
            let entry = db::activity::append(
                &mut *tx,
                NewActivity::new(
                    event_id,
                    ActivityKind::AssignmentChange,
                    format!("Filled {} with {} {} volunteer(s)", shift.display_name(), added, group),
                )
                .metadata(json!({ "shift_id": shift_id, "group": group, "added": added })),
            )
            .await?;
            changes.push(StoreTable::Assignments, ChangeOp::Insert, event_id, assignment_ids.clone());
            changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, event_id, vec![entry.id]);
        }
        self.store.commit(tx, changes).await?;

        let remaining = remaining - added as u32;
        info!(shift_id = %shift_id, group, added, remaining, "Shift filled from group");
        Ok(FillOutcome {
            shift_id,
            group: group.to_string(),
            added,
            assignment_ids,
            remaining,
        })
    }

    /// Remove every assignment of one shift
    pub async fn unfill_shift(&self, shift_id: Uuid) -> SchedResult<u64> {
        let mut tx = self.store.begin().await?;
        let shift = db::shifts::get_shift(&mut *tx, shift_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Shift {}", shift_id)))?;
        let removed = db::assignments::delete_for_shift(&mut *tx, shift_id).await?;

        let mut changes = ChangeSet::new();
        if removed > 0 {
            let entry = db::activity::append(
                &mut *tx,
                NewActivity::new(
                    shift.event_id,
                    ActivityKind::AssignmentChange,
                    format!("Removed {} assignment(s) from {}", removed, shift.display_name()),
                )
                .metadata(json!({ "shift_id": shift_id })),
            )
            .await?;
            changes.push(StoreTable::Assignments, ChangeOp::Delete, shift.event_id, Vec::new());
            changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, shift.event_id, vec![entry.id]);
        }
        self.store.commit(tx, changes).await?;
        Ok(removed)
    }

    /// Manually put a volunteer on a shift
    ///
    /// Rejects a duplicate pair. Warns, but still assigns, when the shift
    /// already meets its requirement.
    pub async fn assign_volunteer(
        &self,
        shift_id: Uuid,
        volunteer_id: Uuid,
    ) -> SchedResult<AssignOutcome> {
        let mut tx = self.store.begin().await?;
        let shift = db::shifts::get_shift(&mut *tx, shift_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Shift {}", shift_id)))?;
        let volunteer = db::volunteers::get_volunteer(&mut *tx, volunteer_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Volunteer {}", volunteer_id)))?;
        if volunteer.event_id != shift.event_id {
            return Err(SchedError::Validation(
                "Volunteer and shift belong to different events".to_string(),
            ));
        }
        if db::assignments::find_pair(&mut *tx, volunteer_id, shift_id)
            .await?
            .is_some()
        {
            return Err(SchedError::Validation(DUPLICATE_MESSAGE.to_string()));
        }

        let current = db::assignments::list_for_shift(&mut *tx, shift_id).await?.len();
        let required = shift.required_groups.total() as usize;
        let warning = (required > 0 && current >= required).then(|| OVERSTAFFED_MESSAGE.to_string());

        let assignment = Assignment::new(shift_id, volunteer_id);
        db::assignments::insert_assignment(&mut *tx, &assignment).await?;
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                shift.event_id,
                ActivityKind::AssignmentChange,
                format!("Assigned {} to {}", volunteer.name, shift.display_name()),
            )
            .volunteer(volunteer_id)
            .metadata(json!({ "shift_id": shift_id, "assignment_id": assignment.id })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Insert, shift.event_id, vec![assignment.id]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, shift.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;

        if warning.is_some() {
            warn!(shift_id = %shift_id, current = current + 1, required, "Shift overstaffed");
        }
        Ok(AssignOutcome { assignment, warning })
    }

    /// Remove one assignment
    pub async fn unassign_volunteer(&self, assignment_id: Uuid) -> SchedResult<()> {
        let mut tx = self.store.begin().await?;
        let assignment = db::assignments::get_assignment(&mut *tx, assignment_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", assignment_id)))?;
        let shift = db::shifts::get_shift(&mut *tx, assignment.shift_id)
            .await?
            .ok_or_else(|| SchedError::NotFound(format!("Shift {}", assignment.shift_id)))?;

        db::assignments::delete_assignment(&mut *tx, assignment_id).await?;
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                shift.event_id,
                ActivityKind::AssignmentChange,
                format!("Unassigned volunteer from {}", shift.display_name()),
            )
            .volunteer(assignment.volunteer_id)
            .metadata(json!({ "shift_id": shift.id, "assignment_id": assignment_id })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Delete, shift.event_id, vec![assignment_id]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, shift.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await?;
        Ok(())
    }
}
