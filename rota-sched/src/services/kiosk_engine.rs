//! Kiosk Session Engine
//!
//! Runs a [`KioskPlan`] against the store as an ordered list of steps:
//!
//! 1. close the previous assignment (returning held assets unless they transfer)
//! 2. check in to the target assignment
//! 3. issue newly selected assets
//! 4. check out of the target assignment
//! 5. return held assets
//!
//! (1-3 on check-in, 4-5 on check-out.) Each step is one transaction, so a
//! custody record and its asset's status always move together. The first
//! failing step stops the sequence; steps already committed stay applied and
//! are reported in `SchedError::PartialFailure`.

use chrono::{DateTime, Utc};
use rota_common::db::{ActivityKind, AssetStatus, NewActivity};
use rota_common::events::{ChangeOp, RotaEvent, StoreTable};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{SchedError, SchedResult};
use crate::services::kiosk::{AssignmentView, HeldAsset, KioskAction, KioskPlan, VolunteerSnapshot};
use crate::store::{ChangeSet, Store};

pub const STEP_CLOSE_PREVIOUS: &str = "close previous assignment";
pub const STEP_CHECK_IN: &str = "check in";
pub const STEP_ISSUE_ASSETS: &str = "issue assets";
pub const STEP_CHECK_OUT: &str = "check out";
pub const STEP_RETURN_ASSETS: &str = "return assets";

/// What a completed transaction did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KioskReceipt {
    pub action: KioskAction,
    pub steps: Vec<String>,
    pub issued_assets: Vec<Uuid>,
    pub returned_assets: Vec<Uuid>,
    pub message: String,
}

#[derive(Clone)]
pub struct KioskEngine {
    store: Store,
    search_limit: usize,
}

impl KioskEngine {
    pub fn new(store: Store, search_limit: usize) -> Self {
        Self {
            store,
            search_limit,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Case-insensitive name search; an empty query matches nobody
    pub async fn search(&self, event_id: Uuid, query: &str) -> SchedResult<Vec<VolunteerSnapshot>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.store.pool().acquire().await?;
        let volunteers =
            db::volunteers::search_by_name(&mut *conn, event_id, query, self.search_limit).await?;

        let mut results = Vec::with_capacity(volunteers.len());
        for volunteer in volunteers {
            results.push(load_snapshot(&mut conn, volunteer.id).await?);
        }
        Ok(results)
    }

    /// Current view of one volunteer
    pub async fn snapshot(&self, volunteer_id: Uuid) -> SchedResult<VolunteerSnapshot> {
        let mut conn = self.store.pool().acquire().await?;
        load_snapshot(&mut conn, volunteer_id).await
    }

    /// Run `plan` step by step
    pub async fn execute(&self, plan: &KioskPlan) -> SchedResult<KioskReceipt> {
        let mut receipt = KioskReceipt {
            action: plan.action,
            steps: Vec::new(),
            issued_assets: Vec::new(),
            returned_assets: Vec::new(),
            message: match plan.action {
                KioskAction::Checkin => "Checked In!".to_string(),
                KioskAction::Checkout => "Checked Out!".to_string(),
            },
        };

        let result = self.run_steps(plan, &mut receipt).await;

        let success = result.is_ok();
        self.store.bus().emit_lossy(RotaEvent::KioskTransactionCompleted {
            event_id: plan.event_id,
            volunteer_id: plan.volunteer_id,
            action: plan.action.as_str().to_string(),
            steps_applied: receipt.steps.len(),
            success,
            timestamp: Utc::now(),
        });

        match result {
            Ok(()) => {
                info!(
                    volunteer_id = %plan.volunteer_id,
                    action = plan.action.as_str(),
                    steps = receipt.steps.len(),
                    "Kiosk transaction completed"
                );
                Ok(receipt)
            }
            Err((step, e)) if receipt.steps.is_empty() => {
                warn!(volunteer_id = %plan.volunteer_id, step, error = %e, "Kiosk transaction failed");
                Err(e)
            }
            Err((step, e)) => {
                warn!(
                    volunteer_id = %plan.volunteer_id,
                    step,
                    completed = ?receipt.steps,
                    error = %e,
                    "Kiosk transaction partially applied"
                );
                Err(SchedError::PartialFailure {
                    completed: receipt.steps,
                    failed_step: step.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn run_steps(
        &self,
        plan: &KioskPlan,
        receipt: &mut KioskReceipt,
    ) -> Result<(), (&'static str, SchedError)> {
        let at = Utc::now();
        match plan.action {
            KioskAction::Checkin => {
                if let Some((previous, version)) = plan.previous {
                    let returned = self
                        .close_previous(plan, previous, version, at)
                        .await
                        .map_err(|e| (STEP_CLOSE_PREVIOUS, e))?;
                    receipt.returned_assets.extend(returned);
                    receipt.steps.push(STEP_CLOSE_PREVIOUS.to_string());
                }

                self.check_in(plan, at).await.map_err(|e| (STEP_CHECK_IN, e))?;
                receipt.steps.push(STEP_CHECK_IN.to_string());

                if !plan.issue_assets.is_empty() {
                    self.issue_assets(plan, at)
                        .await
                        .map_err(|e| (STEP_ISSUE_ASSETS, e))?;
                    receipt.issued_assets = plan.issue_assets.clone();
                    receipt.steps.push(STEP_ISSUE_ASSETS.to_string());
                }
            }
            KioskAction::Checkout => {
                self.check_out(plan, at).await.map_err(|e| (STEP_CHECK_OUT, e))?;
                receipt.steps.push(STEP_CHECK_OUT.to_string());

                if !plan.return_assets.is_empty() {
                    let returned = self
                        .return_assets(plan, at)
                        .await
                        .map_err(|e| (STEP_RETURN_ASSETS, e))?;
                    receipt.returned_assets.extend(returned);
                    receipt.steps.push(STEP_RETURN_ASSETS.to_string());
                }
            }
        }
        Ok(())
    }

    async fn close_previous(
        &self,
        plan: &KioskPlan,
        previous: Uuid,
        version: i64,
        at: DateTime<Utc>,
    ) -> SchedResult<Vec<Uuid>> {
        let mut tx = self.store.begin().await?;
        let mut changes = ChangeSet::new();

        if !db::assignments::mark_checked_out(&mut *tx, previous, at, false, Some(version)).await? {
            return Err(SchedError::ConflictRetry(format!(
                "Assignment {} changed since it was loaded",
                previous
            )));
        }
        changes.push(StoreTable::Assignments, ChangeOp::Update, plan.event_id, vec![previous]);

        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                plan.event_id,
                ActivityKind::CheckOut,
                format!("{} checked out of previous shift", plan.volunteer_name),
            )
            .volunteer(plan.volunteer_id)
            .metadata(json!({ "assignment_id": previous, "source": "kiosk" })),
        )
        .await?;
        let mut log_ids = vec![entry.id];

        let mut returned = Vec::new();
        if !plan.transfer_assets {
            returned = db::custody::close_all_for_volunteer(&mut tx, plan.volunteer_id, at).await?;
            for asset_id in &returned {
                db::assets::mark_available(&mut *tx, *asset_id).await?;
            }
            if !returned.is_empty() {
                let entry = db::activity::append(
                    &mut *tx,
                    NewActivity::new(
                        plan.event_id,
                        ActivityKind::AssetIn,
                        format!("{} returned {} asset(s)", plan.volunteer_name, returned.len()),
                    )
                    .volunteer(plan.volunteer_id)
                    .metadata(json!({ "asset_ids": returned, "source": "kiosk" })),
                )
                .await?;
                log_ids.push(entry.id);
                changes.push(StoreTable::AssetCustody, ChangeOp::Update, plan.event_id, Vec::new());
                changes.push(StoreTable::Assets, ChangeOp::Update, plan.event_id, returned.clone());
            }
        }

        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, plan.event_id, log_ids);
        self.store.commit(tx, changes).await?;
        Ok(returned)
    }

    async fn check_in(&self, plan: &KioskPlan, at: DateTime<Utc>) -> SchedResult<()> {
        let mut tx = self.store.begin().await?;
        if !db::assignments::mark_checked_in(&mut *tx, plan.target, at, Some(plan.target_version))
            .await?
        {
            return Err(SchedError::ConflictRetry(format!(
                "Assignment {} changed since it was loaded",
                plan.target
            )));
        }
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                plan.event_id,
                ActivityKind::CheckIn,
                format!("{} checked in to {}", plan.volunteer_name, plan.target_shift),
            )
            .volunteer(plan.volunteer_id)
            .metadata(json!({ "assignment_id": plan.target, "source": "kiosk" })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Update, plan.event_id, vec![plan.target]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, plan.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await
    }

    async fn issue_assets(&self, plan: &KioskPlan, at: DateTime<Utc>) -> SchedResult<()> {
        let mut tx = self.store.begin().await?;
        let mut names = Vec::with_capacity(plan.issue_assets.len());
        let mut custody_ids = Vec::with_capacity(plan.issue_assets.len());

        for asset_id in &plan.issue_assets {
            let asset = db::assets::get_asset(&mut *tx, *asset_id)
                .await?
                .filter(|a| a.event_id == plan.event_id)
                .ok_or_else(|| SchedError::NotFound(format!("Asset {}", asset_id)))?;
            if asset.status != AssetStatus::Available
                || !db::assets::mark_assigned(&mut *tx, asset.id, plan.volunteer_id, asset.version)
                    .await?
            {
                return Err(SchedError::ConflictRetry(format!(
                    "Asset {} is no longer available",
                    asset.name
                )));
            }
            let record = db::custody::open_custody(&mut *tx, asset.id, plan.volunteer_id, at).await?;
            custody_ids.push(record.id);
            names.push(asset.name);
        }

        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                plan.event_id,
                ActivityKind::AssetOut,
                format!("{} received {}", plan.volunteer_name, names.join(", ")),
            )
            .volunteer(plan.volunteer_id)
            .metadata(json!({ "asset_ids": plan.issue_assets, "source": "kiosk" })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assets, ChangeOp::Update, plan.event_id, plan.issue_assets.clone());
        changes.push(StoreTable::AssetCustody, ChangeOp::Insert, plan.event_id, custody_ids);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, plan.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await
    }

    async fn check_out(&self, plan: &KioskPlan, at: DateTime<Utc>) -> SchedResult<()> {
        let mut tx = self.store.begin().await?;
        if !db::assignments::mark_checked_out(&mut *tx, plan.target, at, true, Some(plan.target_version))
            .await?
        {
            return Err(SchedError::ConflictRetry(format!(
                "Assignment {} changed since it was loaded",
                plan.target
            )));
        }
        let entry = db::activity::append(
            &mut *tx,
            NewActivity::new(
                plan.event_id,
                ActivityKind::CheckOut,
                format!("{} checked out of {}", plan.volunteer_name, plan.target_shift),
            )
            .volunteer(plan.volunteer_id)
            .metadata(json!({ "assignment_id": plan.target, "source": "kiosk" })),
        )
        .await?;

        let mut changes = ChangeSet::new();
        changes.push(StoreTable::Assignments, ChangeOp::Update, plan.event_id, vec![plan.target]);
        changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, plan.event_id, vec![entry.id]);
        self.store.commit(tx, changes).await
    }

    async fn return_assets(&self, plan: &KioskPlan, at: DateTime<Utc>) -> SchedResult<Vec<Uuid>> {
        let mut tx = self.store.begin().await?;
        let mut returned = Vec::with_capacity(plan.return_assets.len());

        for asset_id in &plan.return_assets {
            if db::custody::close_for_asset(&mut *tx, *asset_id, Some(plan.volunteer_id), at).await? {
                db::assets::mark_available(&mut *tx, *asset_id).await?;
                returned.push(*asset_id);
            } else {
                warn!(asset_id = %asset_id, volunteer_id = %plan.volunteer_id, "Asset not on loan to volunteer, skipped");
            }
        }

        let mut changes = ChangeSet::new();
        if !returned.is_empty() {
            let entry = db::activity::append(
                &mut *tx,
                NewActivity::new(
                    plan.event_id,
                    ActivityKind::AssetIn,
                    format!("{} returned {} asset(s)", plan.volunteer_name, returned.len()),
                )
                .volunteer(plan.volunteer_id)
                .metadata(json!({ "asset_ids": returned, "source": "kiosk" })),
            )
            .await?;
            changes.push(StoreTable::Assets, ChangeOp::Update, plan.event_id, returned.clone());
            changes.push(StoreTable::AssetCustody, ChangeOp::Update, plan.event_id, Vec::new());
            changes.push(StoreTable::ActivityLogs, ChangeOp::Insert, plan.event_id, vec![entry.id]);
        }
        self.store.commit(tx, changes).await?;
        Ok(returned)
    }
}

/// Volunteer with every assignment (and its shift) plus held assets
pub async fn load_snapshot(
    conn: &mut SqliteConnection,
    volunteer_id: Uuid,
) -> SchedResult<VolunteerSnapshot> {
    let volunteer = db::volunteers::get_volunteer(&mut *conn, volunteer_id)
        .await?
        .ok_or_else(|| SchedError::NotFound(format!("Volunteer {}", volunteer_id)))?;

    let mut assignments = Vec::new();
    for assignment in db::assignments::list_for_volunteer(&mut *conn, volunteer_id).await? {
        let Some(shift) = db::shifts::get_shift(&mut *conn, assignment.shift_id).await? else {
            continue;
        };
        assignments.push(AssignmentView {
            status: assignment.attendance(),
            assignment,
            shift,
        });
    }

    let held_assets = db::custody::held_assets(&mut *conn, volunteer_id)
        .await?
        .into_iter()
        .map(|(record, asset)| HeldAsset {
            asset_id: asset.id,
            custody_id: record.id,
            name: asset.name,
            identifier: asset.identifier,
        })
        .collect();

    Ok(VolunteerSnapshot::new(volunteer, assignments, held_assets))
}
