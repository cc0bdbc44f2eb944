//! Kiosk terminal
//!
//! One on-site screen: a [`KioskSession`] plus the auto-reset timer that
//! returns a finished screen to Search. The timer is a tokio task watching a
//! `CancellationToken`; a manual reset or a new transaction cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SchedError, SchedResult};
use crate::services::kiosk::{KioskAction, KioskSession, KioskStep, VolunteerSnapshot};
use crate::services::kiosk_engine::{KioskEngine, KioskReceipt};

pub struct KioskTerminal {
    id: Uuid,
    session: Arc<Mutex<KioskSession>>,
    engine: KioskEngine,
    reset_delay: Duration,
    reset_timer: Mutex<Option<CancellationToken>>,
}

impl KioskTerminal {
    pub fn new(engine: KioskEngine, event_id: Uuid, reset_delay: Duration) -> Self {
        let session = KioskSession::new(event_id);
        Self {
            id: session.id,
            session: Arc::new(Mutex::new(session)),
            engine,
            reset_delay,
            reset_timer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Copy of the current session state
    pub async fn view(&self) -> KioskSession {
        self.session.lock().await.clone()
    }

    pub async fn step(&self) -> KioskStep {
        self.session.lock().await.step()
    }

    /// Name search (Search step only)
    pub async fn search(&self, query: &str) -> SchedResult<Vec<VolunteerSnapshot>> {
        let (step, event_id) = {
            let session = self.session.lock().await;
            (session.step(), session.event_id)
        };
        if step != KioskStep::Search {
            return Err(SchedError::InvalidTransition(format!(
                "Cannot search in step {:?}",
                step
            )));
        }
        self.engine.search(event_id, query).await
    }

    pub async fn select_volunteer(&self, volunteer_id: Uuid) -> SchedResult<KioskSession> {
        let snapshot = self.engine.snapshot(volunteer_id).await?;
        let mut session = self.session.lock().await;
        session.select_volunteer(snapshot)?;
        Ok(session.clone())
    }

    pub async fn choose(&self, assignment_id: Uuid, action: KioskAction) -> SchedResult<KioskSession> {
        let mut session = self.session.lock().await;
        session.choose(assignment_id, action)?;
        Ok(session.clone())
    }

    pub async fn set_transfer(&self, transfer_assets: bool) -> SchedResult<KioskSession> {
        let mut session = self.session.lock().await;
        session.set_transfer(transfer_assets)?;
        Ok(session.clone())
    }

    pub async fn select_assets(&self, asset_ids: Vec<Uuid>) -> SchedResult<KioskSession> {
        let mut session = self.session.lock().await;
        session.select_assets(asset_ids)?;
        Ok(session.clone())
    }

    pub async fn back(&self) -> SchedResult<KioskSession> {
        let mut session = self.session.lock().await;
        session.back()?;
        Ok(session.clone())
    }

    /// Run the selected transaction
    ///
    /// On success the screen moves to Success and the auto-reset is armed.
    /// When the sequence stopped after applying some steps the screen returns
    /// to Confirm with a fresh snapshot of the volunteer.
    pub async fn complete(&self) -> SchedResult<KioskReceipt> {
        let mut session = self.session.lock().await;
        let plan = session.plan()?;
        self.cancel_reset().await;
        match self.engine.execute(&plan).await {
            Ok(receipt) => {
                session.succeed(receipt.message.clone())?;
                drop(session);
                self.schedule_reset().await;
                Ok(receipt)
            }
            Err(err @ SchedError::PartialFailure { .. }) => {
                if let Ok(snapshot) = self.engine.snapshot(plan.volunteer_id).await {
                    session.recover(snapshot);
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Back to Search now, cancelling any pending auto-reset
    pub async fn reset(&self) -> KioskSession {
        self.cancel_reset().await;
        let mut session = self.session.lock().await;
        session.reset();
        session.clone()
    }

    async fn cancel_reset(&self) {
        if let Some(token) = self.reset_timer.lock().await.take() {
            token.cancel();
        }
    }

    async fn schedule_reset(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.reset_timer.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let session = Arc::clone(&self.session);
        let delay = self.reset_delay;
        let terminal_id = self.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(terminal_id = %terminal_id, "Kiosk auto-reset cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let mut session = session.lock().await;
                    if session.step() == KioskStep::Success {
                        session.reset();
                        debug!(terminal_id = %terminal_id, "Kiosk auto-reset");
                    }
                }
            }
        });
    }
}
