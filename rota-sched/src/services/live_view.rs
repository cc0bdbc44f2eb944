//! Live Personnel View
//!
//! Watches the event bus for store changes and asks its owner to refresh,
//! debounced so a bulk write (clear all, auto-assign) causes one refresh.
//!
//! Local mutations are bracketed by a [`MutationToken`]: the owner calls
//! [`LiveView::begin_mutation`] before writing and passes the token to the
//! store as the change origin. The echo of that write clears the token
//! without a refresh. While any token is pending, refreshes that fall due are
//! held back and run once the last token clears.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rota_common::events::{ChangeOp, EventBus, MutationToken, RotaEvent, StoreChange};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Echoed tokens remembered so later notifications of the same write stay quiet
const ECHO_MEMORY: usize = 64;

/// Why a refresh fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    /// Remote notifications folded into this refresh
    pub changes: usize,
    /// The subscriber fell behind and missed notifications
    pub lagged: bool,
}

#[derive(Default)]
struct LiveState {
    pending: HashSet<MutationToken>,
    echoed: VecDeque<MutationToken>,
    /// Notifications seen since the last refresh
    batched: usize,
    lagged: bool,
    /// A refresh fell due while tokens were pending
    deferred: bool,
}

impl LiveState {
    fn remember_echo(&mut self, token: MutationToken) {
        if self.echoed.len() == ECHO_MEMORY {
            self.echoed.pop_front();
        }
        self.echoed.push_back(token);
    }

    fn take_refresh(&mut self) -> Refresh {
        let refresh = Refresh {
            changes: self.batched,
            lagged: self.lagged,
        };
        self.batched = 0;
        self.lagged = false;
        self.deferred = false;
        refresh
    }
}

pub struct LiveView {
    state: Arc<Mutex<LiveState>>,
    released: Arc<Notify>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveView {
    /// Start watching `bus`
    ///
    /// `event_filter` limits attention to one event's rows; notifications
    /// without an event id always pass.
    pub fn spawn<F>(bus: &EventBus, event_filter: Option<Uuid>, debounce: Duration, refresh: F) -> Self
    where
        F: Fn(Refresh) + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(LiveState::default()));
        let released = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(watch(
            bus.subscribe(),
            event_filter,
            debounce,
            Arc::clone(&state),
            Arc::clone(&released),
            shutdown.clone(),
            refresh,
        ));

        Self {
            state,
            released,
            shutdown,
            task,
        }
    }

    /// Register a local mutation about to be written
    pub fn begin_mutation(&self) -> MutationToken {
        let token = MutationToken::new();
        self.lock().pending.insert(token);
        token
    }

    /// Release a token whose mutation failed and will never be echoed
    pub fn abandon(&self, token: MutationToken) {
        let mut state = self.lock();
        if state.pending.remove(&token) && state.pending.is_empty() && state.deferred {
            self.released.notify_one();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Stop watching; no refresh fires afterwards
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.task).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Observed {
    Ignored,
    Echo { release: bool },
    Remote,
}

fn observe(state: &mut LiveState, change: &StoreChange, event_filter: Option<Uuid>) -> Observed {
    if let (Some(filter), Some(event_id)) = (event_filter, change.event_id) {
        if filter != event_id {
            return Observed::Ignored;
        }
    }
    if let Some(origin) = change.origin {
        if state.pending.remove(&origin) {
            state.remember_echo(origin);
            return Observed::Echo {
                release: state.pending.is_empty() && state.deferred,
            };
        }
        if state.echoed.contains(&origin) {
            return Observed::Echo { release: false };
        }
    }
    if change.op == ChangeOp::Noop {
        return Observed::Ignored;
    }
    state.batched += 1;
    Observed::Remote
}

async fn watch<F>(
    mut rx: broadcast::Receiver<RotaEvent>,
    event_filter: Option<Uuid>,
    debounce: Duration,
    state: Arc<Mutex<LiveState>>,
    released: Arc<Notify>,
    shutdown: CancellationToken,
    refresh: F,
) where
    F: Fn(Refresh) + Send + Sync + 'static,
{
    let lock = || state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut due: Option<Instant> = None;

    loop {
        let deadline = due;
        tokio::select! {
            _ = shutdown.cancelled() => break,

            received = rx.recv() => match received {
                Ok(RotaEvent::StoreChanged(change)) => {
                    let observed = observe(&mut lock(), &change, event_filter);
                    match observed {
                        Observed::Ignored => {}
                        Observed::Echo { release } => {
                            debug!(origin = ?change.origin, "Local mutation echoed");
                            if release {
                                let r = lock().take_refresh();
                                refresh(r);
                            }
                        }
                        Observed::Remote => {
                            due = Some(Instant::now() + debounce);
                        }
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live view lagged behind the event bus");
                    lock().lagged = true;
                    due = Some(Instant::now() + debounce);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                due = None;
                let fired = {
                    let mut s = lock();
                    if s.pending.is_empty() {
                        Some(s.take_refresh())
                    } else {
                        debug!(pending = s.pending.len(), "Refresh deferred for local mutations");
                        s.deferred = true;
                        None
                    }
                };
                if let Some(r) = fired {
                    refresh(r);
                }
            }

            _ = released.notified() => {
                let fired = {
                    let mut s = lock();
                    (s.deferred && s.pending.is_empty()).then(|| s.take_refresh())
                };
                if let Some(r) = fired {
                    refresh(r);
                }
            }
        }
    }
}
