//! Frozen watcher table and the transport-facing delivery handle.
//!
//! While a session is `Idle` its watchers live in the orchestrator. On
//! start they move into a [`WatcherTable`] that is published once and never
//! mutated again, so deliveries and ticks only ever lock the single watcher
//! they touch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::time::Instant;
use tracing::trace;

use crate::models::{FeedMessage, SessionState, WatcherSnapshot};
use crate::watch::TimeoutWatcher;
use crate::{AppError, Result};

/// Read-only collection of running watchers, in registration order.
#[derive(Debug)]
pub(crate) struct WatcherTable {
    ids: Vec<String>,
    slots: Vec<Mutex<TimeoutWatcher>>,
    index: HashMap<String, usize>,
}

impl WatcherTable {
    pub(crate) fn new(watchers: Vec<TimeoutWatcher>) -> Self {
        let ids: Vec<String> = watchers.iter().map(|w| w.stream_id().to_owned()).collect();
        let index = ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.clone(), slot))
            .collect();
        Self {
            ids,
            slots: watchers.into_iter().map(Mutex::new).collect(),
            index,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, stream_id: &str) -> Option<usize> {
        self.index.get(stream_id).copied()
    }

    pub(crate) fn stream_id(&self, slot: usize) -> &str {
        &self.ids[slot]
    }

    /// Lock one watcher. A poisoned lock still yields the state: counters
    /// are plain integers and stay meaningful after a panicking hook.
    pub(crate) fn lock(&self, slot: usize) -> MutexGuard<'_, TimeoutWatcher> {
        self.slots[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshots(&self) -> Vec<WatcherSnapshot> {
        (0..self.len()).map(|slot| self.lock(slot).snapshot()).collect()
    }
}

/// State shared between an orchestrator, its running session, and sinks.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) table: OnceLock<Arc<WatcherTable>>,
    state: Mutex<SessionState>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            table: OnceLock::new(),
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a lifecycle transition, rejecting illegal ones.
    pub(crate) fn transition(&self, next: SessionState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(AppError::SessionState(format!(
                "cannot move session from {:?} to {next:?}",
                *state
            )));
        }
        *state = next;
        Ok(())
    }
}

/// Cloneable handle through which a transport delivers messages.
///
/// Obtain one from [`TestOrchestrator::sink`](super::TestOrchestrator::sink)
/// before starting the session; deliveries are accepted only while the
/// session is running.
#[derive(Debug, Clone)]
pub struct FeedSink {
    shared: Arc<SessionShared>,
}

impl FeedSink {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Deliver `message` for `stream_id`, received at `arrival`.
    ///
    /// # Errors
    ///
    /// * [`AppError::SessionState`] if the session is not running.
    /// * [`AppError::NotFound`] if no watcher monitors `stream_id`.
    pub fn deliver(&self, stream_id: &str, message: &FeedMessage, arrival: Instant) -> Result<()> {
        let state = self.shared.state();
        if state != SessionState::Running {
            return Err(AppError::SessionState(format!(
                "session is {state:?}, not accepting messages"
            )));
        }
        let table = self
            .shared
            .table
            .get()
            .ok_or_else(|| AppError::SessionState("session has not started".into()))?;
        let slot = table
            .slot(stream_id)
            .ok_or_else(|| AppError::NotFound(format!("stream {stream_id} is not monitored")))?;

        table.lock(slot).on_message_received(message, arrival);
        trace!(stream_id, bytes = message.len(), "message delivered");
        Ok(())
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Live snapshots of every watcher, empty before the session starts.
    #[must_use]
    pub fn snapshots(&self) -> Vec<WatcherSnapshot> {
        self.shared
            .table
            .get()
            .map(|table| table.snapshots())
            .unwrap_or_default()
    }
}
