//! Event glue between the host application and the session.
//!
//! Three background tasks drive reconciliation:
//!
//! - the signal listener, which reacts to `terminal-settings-updated`
//! - the staff listener, which reacts to staff id changes from `set_staff`
//! - the terminal monitor, which periodically re-checks the terminal id
//!
//! All three hold an `Arc<ShiftSession>` and stop when [`EventTasks`] is
//! dropped or shut down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::reconcile::TerminalCheck;
use crate::session::ShiftSession;

pub const TERMINAL_SETTINGS_UPDATED: &str = "terminal-settings-updated";

/// Signals published by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionSignal {
    TerminalSettingsUpdated,
}

impl SessionSignal {
    pub fn name(&self) -> &'static str {
        match self {
            SessionSignal::TerminalSettingsUpdated => TERMINAL_SETTINGS_UPDATED,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            TERMINAL_SETTINGS_UPDATED => Some(SessionSignal::TerminalSettingsUpdated),
            _ => None,
        }
    }
}

/// Handles for the spawned listeners.
pub struct EventTasks {
    handles: Vec<JoinHandle<()>>,
}

impl EventTasks {
    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for EventTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Spawns every listener. Must be called inside a tokio runtime.
pub fn spawn_event_tasks(session: &Arc<ShiftSession>) -> EventTasks {
    let interval = session.config().terminal_monitor_interval();
    EventTasks {
        handles: vec![
            spawn_signal_listener(session),
            spawn_staff_listener(session),
            spawn_terminal_monitor(session, interval),
        ],
    }
}

pub fn spawn_signal_listener(session: &Arc<ShiftSession>) -> JoinHandle<()> {
    let session = Arc::clone(session);
    let mut signals = session.subscribe_signals();
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(SessionSignal::TerminalSettingsUpdated) => {
                    debug!(signal = TERMINAL_SETTINGS_UPDATED, "Session signal received");
                    session.on_settings_updated().await;
                }
                // Missed signals collapse into one settings check.
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session signal listener lagged");
                    session.on_settings_updated().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub fn spawn_staff_listener(session: &Arc<ShiftSession>) -> JoinHandle<()> {
    let session = Arc::clone(session);
    let mut staff = session.subscribe_staff();
    tokio::spawn(async move {
        while staff.changed().await.is_ok() {
            let staff_id = staff.borrow_and_update().clone();
            session.on_staff_changed(staff_id).await;
        }
    })
}

/// Re-checks the terminal id every `period`. A changed terminal clears the
/// session and then looks for a shift on the new terminal.
pub fn spawn_terminal_monitor(session: &Arc<ShiftSession>, period: Duration) -> JoinHandle<()> {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already checked.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let TerminalCheck::Changed { current, .. } = session.check_terminal_identity().await
            {
                info!(terminal_id = %current, "Restoring session for new terminal");
                session.on_settings_updated().await;
            }
        }
    })
}
