//! Kiosk session state machine
//!
//! `Search -> Confirm -> {Transfer ->} Assets -> Success -> Search`
//!
//! Pure: holds the selection a volunteer builds up at the terminal and turns
//! it into a [`KioskPlan`] for the engine. Illegal moves are
//! `SchedError::InvalidTransition`.

use rota_common::db::{Assignment, AttendanceStatus, Shift, Volunteer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SchedError, SchedResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KioskStep {
    Search,
    Confirm,
    Transfer,
    Assets,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KioskAction {
    #[serde(alias = "check_in")]
    Checkin,
    #[serde(alias = "check_out")]
    Checkout,
}

impl KioskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            KioskAction::Checkin => "checkin",
            KioskAction::Checkout => "checkout",
        }
    }
}

/// An assignment with its shift, as listed on the Confirm screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentView {
    pub assignment: Assignment,
    pub shift: Shift,
    pub status: AttendanceStatus,
}

/// An asset currently on loan to the volunteer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeldAsset {
    pub asset_id: Uuid,
    pub custody_id: Uuid,
    pub name: String,
    pub identifier: Option<String>,
}

/// Volunteer as seen by the kiosk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolunteerSnapshot {
    pub volunteer: Volunteer,
    /// Chronological by shift start
    pub assignments: Vec<AssignmentView>,
    pub held_assets: Vec<HeldAsset>,
}

impl VolunteerSnapshot {
    pub fn new(volunteer: Volunteer, mut assignments: Vec<AssignmentView>, held_assets: Vec<HeldAsset>) -> Self {
        assignments.sort_by(|a, b| {
            a.shift
                .start_time
                .cmp(&b.shift.start_time)
                .then_with(|| a.assignment.id.cmp(&b.assignment.id))
        });
        Self {
            volunteer,
            assignments,
            held_assets,
        }
    }

    pub fn assignment(&self, id: Uuid) -> Option<&AssignmentView> {
        self.assignments.iter().find(|a| a.assignment.id == id)
    }

    /// First active assignment other than `except`
    pub fn active_other_than(&self, except: Uuid) -> Option<&AssignmentView> {
        self.assignments
            .iter()
            .find(|a| a.status == AttendanceStatus::Active && a.assignment.id != except)
    }
}

/// Mutations a completed kiosk interaction asks for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KioskPlan {
    pub event_id: Uuid,
    pub volunteer_id: Uuid,
    pub volunteer_name: String,
    pub action: KioskAction,
    pub target: Uuid,
    pub target_version: i64,
    pub target_shift: String,
    /// Active assignment to close first, with the version last seen
    pub previous: Option<(Uuid, i64)>,
    pub transfer_assets: bool,
    pub issue_assets: Vec<Uuid>,
    pub return_assets: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KioskSession {
    pub id: Uuid,
    pub event_id: Uuid,
    step: KioskStep,
    volunteer: Option<VolunteerSnapshot>,
    target: Option<Uuid>,
    previous: Option<Uuid>,
    action: Option<KioskAction>,
    transfer_assets: bool,
    selected_assets: Vec<Uuid>,
    message: Option<String>,
}

fn invalid(step: KioskStep, what: &str) -> SchedError {
    SchedError::InvalidTransition(format!("Cannot {} in step {:?}", what, step))
}

impl KioskSession {
    pub fn new(event_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            step: KioskStep::Search,
            volunteer: None,
            target: None,
            previous: None,
            action: None,
            transfer_assets: false,
            selected_assets: Vec::new(),
            message: None,
        }
    }

    pub fn step(&self) -> KioskStep {
        self.step
    }

    pub fn volunteer(&self) -> Option<&VolunteerSnapshot> {
        self.volunteer.as_ref()
    }

    pub fn action(&self) -> Option<KioskAction> {
        self.action
    }

    pub fn previous(&self) -> Option<Uuid> {
        self.previous
    }

    pub fn transfer_assets(&self) -> bool {
        self.transfer_assets
    }

    pub fn selected_assets(&self) -> &[Uuid] {
        &self.selected_assets
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Search -> Confirm
    pub fn select_volunteer(&mut self, snapshot: VolunteerSnapshot) -> SchedResult<()> {
        if self.step != KioskStep::Search {
            return Err(invalid(self.step, "select a volunteer"));
        }
        if snapshot.volunteer.event_id != self.event_id {
            return Err(SchedError::Validation(
                "Volunteer belongs to another event".to_string(),
            ));
        }
        self.volunteer = Some(snapshot);
        self.step = KioskStep::Confirm;
        Ok(())
    }

    /// Replace the snapshot without moving (after a partial failure)
    pub fn refresh_volunteer(&mut self, snapshot: VolunteerSnapshot) {
        self.volunteer = Some(snapshot);
    }

    /// Confirm -> Transfer | Assets
    ///
    /// `checkin` needs a pending assignment, `checkout` an active one. Checking
    /// in while another assignment is active closes that one first; if the
    /// volunteer also holds assets the Transfer question comes next.
    pub fn choose(&mut self, assignment_id: Uuid, action: KioskAction) -> SchedResult<KioskStep> {
        if self.step != KioskStep::Confirm {
            return Err(invalid(self.step, "choose a shift"));
        }
        let snapshot = self
            .volunteer
            .as_ref()
            .ok_or_else(|| invalid(self.step, "choose a shift without a volunteer"))?;
        let view = snapshot.assignment(assignment_id).ok_or_else(|| {
            SchedError::NotFound(format!("Assignment {} for this volunteer", assignment_id))
        })?;

        let next = match (action, view.status) {
            (KioskAction::Checkin, AttendanceStatus::Pending) => {
                let previous = snapshot.active_other_than(assignment_id).map(|a| a.assignment.id);
                let next = if previous.is_some() && !snapshot.held_assets.is_empty() {
                    KioskStep::Transfer
                } else {
                    KioskStep::Assets
                };
                self.previous = previous;
                next
            }
            (KioskAction::Checkout, AttendanceStatus::Active) => {
                self.previous = None;
                KioskStep::Assets
            }
            (action, status) => {
                return Err(SchedError::InvalidTransition(format!(
                    "Cannot {} an assignment that is {:?}",
                    action.as_str(),
                    status
                )))
            }
        };

        self.target = Some(assignment_id);
        self.action = Some(action);
        self.transfer_assets = false;
        self.selected_assets.clear();
        self.step = next;
        Ok(next)
    }

    /// Transfer -> Assets
    pub fn set_transfer(&mut self, transfer_assets: bool) -> SchedResult<()> {
        if self.step != KioskStep::Transfer {
            return Err(invalid(self.step, "answer the transfer question"));
        }
        self.transfer_assets = transfer_assets;
        self.step = KioskStep::Assets;
        Ok(())
    }

    /// Pick assets to issue on check-in (replaces any earlier pick)
    pub fn select_assets(&mut self, asset_ids: Vec<Uuid>) -> SchedResult<()> {
        if self.step != KioskStep::Assets {
            return Err(invalid(self.step, "select assets"));
        }
        if self.action != Some(KioskAction::Checkin) {
            return Err(SchedError::InvalidTransition(
                "Checkout returns every held asset; nothing to select".to_string(),
            ));
        }
        let mut unique = Vec::with_capacity(asset_ids.len());
        for id in asset_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        self.selected_assets = unique;
        Ok(())
    }

    /// Transfer | Assets -> Confirm, dropping the shift choice
    pub fn back(&mut self) -> SchedResult<()> {
        if !matches!(self.step, KioskStep::Transfer | KioskStep::Assets) {
            return Err(invalid(self.step, "go back"));
        }
        self.target = None;
        self.previous = None;
        self.action = None;
        self.transfer_assets = false;
        self.selected_assets.clear();
        self.step = KioskStep::Confirm;
        Ok(())
    }

    /// The mutations to run for the current selection (Assets step only)
    pub fn plan(&self) -> SchedResult<KioskPlan> {
        if self.step != KioskStep::Assets {
            return Err(invalid(self.step, "complete"));
        }
        let (Some(snapshot), Some(target), Some(action)) =
            (self.volunteer.as_ref(), self.target, self.action)
        else {
            return Err(invalid(self.step, "complete without a selection"));
        };
        let view = snapshot
            .assignment(target)
            .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", target)))?;
        let previous = match self.previous {
            Some(id) => {
                let prev = snapshot
                    .assignment(id)
                    .ok_or_else(|| SchedError::NotFound(format!("Assignment {}", id)))?;
                Some((id, prev.assignment.version))
            }
            None => None,
        };

        let (issue_assets, return_assets) = match action {
            KioskAction::Checkin => (self.selected_assets.clone(), Vec::new()),
            KioskAction::Checkout => (
                Vec::new(),
                snapshot.held_assets.iter().map(|h| h.asset_id).collect(),
            ),
        };

        Ok(KioskPlan {
            event_id: self.event_id,
            volunteer_id: snapshot.volunteer.id,
            volunteer_name: snapshot.volunteer.name.clone(),
            action,
            target,
            target_version: view.assignment.version,
            target_shift: view.shift.display_name(),
            previous,
            transfer_assets: self.transfer_assets,
            issue_assets,
            return_assets,
        })
    }

    /// Assets -> Success
    pub fn succeed(&mut self, message: impl Into<String>) -> SchedResult<()> {
        if self.step != KioskStep::Assets {
            return Err(invalid(self.step, "finish"));
        }
        self.message = Some(message.into());
        self.step = KioskStep::Success;
        Ok(())
    }

    /// Back to Confirm with a fresh snapshot after a sequence stopped midway
    pub fn recover(&mut self, snapshot: VolunteerSnapshot) {
        self.volunteer = Some(snapshot);
        self.target = None;
        self.previous = None;
        self.action = None;
        self.transfer_assets = false;
        self.selected_assets.clear();
        self.step = KioskStep::Confirm;
    }

    /// Any step -> Search, clearing everything
    pub fn reset(&mut self) {
        let id = self.id;
        *self = Self::new(self.event_id);
        self.id = id;
    }
}
