//! The injectable session store.
//!
//! [`ShiftSession`] owns the authoritative `(staff, active_shift)` pair and
//! its durable cache. Collaborators read it through the accessors below and
//! mutate it only through the session API (`set_staff`,
//! `refresh_active_shift`, `set_active_shift_immediate`, `clear_shift`).
//! Reconciliation passes live in [`crate::reconcile`].
//!
//! # Sequencing
//!
//! Every pass takes a sequence number when it starts and may only commit its
//! result while no newer pass or direct mutation has completed. Starting a
//! pass only moves the phase to `Restoring`; it does not claim the commit
//! slot, so an older pass that finishes first still lands. A slow pass that
//! finishes after a newer one has its result discarded. Direct mutations
//! always take a fresh number, so they supersede any pass still in flight.
//!
//! The state lock is a plain `Mutex` and is never held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use shiftkeeper_protocol::{ActiveShift, Staff};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cache::{SessionCache, SessionSnapshot};
use crate::config::SessionConfig;
use crate::credentials::{FileCredentialCache, TerminalCredentialCache};
use crate::error::Result;
use crate::events::SessionSignal;
use crate::http::HttpShiftAuthority;
use crate::identity::{ConfigService, IdentityContext, TerminalIdentityResolver};
use crate::lookup::{ShiftAuthority, ShiftLookup, UnconfiguredAuthority};
use crate::settings::FileConfigService;
use crate::storage::StorageConfig;
use crate::transition::{next_state, SessionPhase, SessionState, Transition};

const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// External services the session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigService>,
    pub authority: Arc<dyn ShiftAuthority>,
    pub credentials: Arc<dyn TerminalCredentialCache>,
}

pub(crate) struct Inner {
    pub(crate) state: SessionState,
    pub(crate) cache: SessionCache,
    committed_seq: u64,
}

impl Inner {
    /// Applies a transition and writes changed fields through to the cache.
    fn apply(&mut self, transition: Transition) {
        let force_write = matches!(transition, Transition::Clear);
        let next = next_state(&self.state, transition);

        let staff_changed = force_write || next.staff != self.state.staff;
        let shift_changed = force_write || next.active_shift != self.state.active_shift;
        if staff_changed {
            self.cache.set_staff(next.staff.as_ref());
        }
        if shift_changed {
            self.cache.set_active_shift(next.active_shift.as_ref());
        }
        self.state = next;

        if staff_changed || shift_changed {
            if let Err(err) = self.cache.flush() {
                warn!(error = %err, "Failed to persist session snapshot");
            }
        }
    }
}

pub struct ShiftSession {
    inner: Mutex<Inner>,
    pub(crate) resolver: TerminalIdentityResolver,
    pub(crate) lookup: ShiftLookup,
    pub(crate) credentials: Arc<dyn TerminalCredentialCache>,
    pub(crate) config: SessionConfig,
    next_seq: AtomicU64,
    staff_tx: watch::Sender<Option<String>>,
    signal_tx: broadcast::Sender<SessionSignal>,
}

impl ShiftSession {
    /// Builds the session around a loaded cache.
    ///
    /// The persisted pair is adopted as-is (non-active shifts are evicted by
    /// the cache); call [`ShiftSession::start`] to validate it.
    pub fn new(
        mut cache: SessionCache,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> Self {
        let snapshot = cache.snapshot();
        let staff_id = snapshot.staff.as_ref().map(|staff| staff.staff_id.clone());
        let (staff_tx, _) = watch::channel(staff_id);
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);

        debug!(
            staff_id = ?snapshot.staff.as_ref().map(|s| s.staff_id.as_str()),
            shift_id = ?snapshot.active_shift.as_ref().map(|s| s.id.as_str()),
            "Session cache loaded"
        );

        Self {
            inner: Mutex::new(Inner {
                state: SessionState {
                    phase: SessionPhase::Uninitialized,
                    staff: snapshot.staff,
                    active_shift: snapshot.active_shift,
                },
                cache,
                committed_seq: 0,
            }),
            resolver: TerminalIdentityResolver::new(collaborators.config),
            lookup: ShiftLookup::new(collaborators.authority, config.lookup_timeout()),
            credentials: collaborators.credentials,
            config,
            next_seq: AtomicU64::new(0),
            staff_tx,
            signal_tx,
        }
    }

    /// Opens a session over the files under `storage`.
    ///
    /// Without an `authority_url` every remote lookup is unavailable, so the
    /// cached session is kept as-is.
    pub fn open(storage: &StorageConfig, config: SessionConfig) -> Result<Self> {
        let cache = SessionCache::load(&storage.session_cache_file())?;
        let credentials: Arc<dyn TerminalCredentialCache> =
            Arc::new(FileCredentialCache::new(&storage.credentials_file()));

        let authority: Arc<dyn ShiftAuthority> = match config.authority_url.as_deref() {
            Some(url) => Arc::new(
                HttpShiftAuthority::new(url, config.lookup_timeout())
                    .with_credentials(Arc::clone(&credentials)),
            ),
            None => {
                warn!("No shift authority configured; remote lookups disabled");
                Arc::new(UnconfiguredAuthority)
            }
        };

        let collaborators = Collaborators {
            config: Arc::new(FileConfigService::new(&storage.terminal_settings_file())),
            authority,
            credentials,
        };
        Ok(Self::new(cache, collaborators, config))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Surface
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn staff(&self) -> Option<Staff> {
        self.lock().state.staff.clone()
    }

    pub fn active_shift(&self) -> Option<ActiveShift> {
        self.lock().state.active_shift.clone()
    }

    pub fn is_shift_active(&self) -> bool {
        self.lock().state.is_shift_active()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().state.phase
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.lock();
        SessionSnapshot {
            staff: inner.state.staff.clone(),
            active_shift: inner.state.active_shift.clone(),
            last_known_terminal_id: inner.cache.last_known_terminal_id(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Replaces the staff record. `None` is a logout: the shift stays.
    pub fn set_staff(&self, staff: Option<Staff>) {
        let staff_id = staff.as_ref().map(|staff| staff.staff_id.clone());
        info!(staff_id = ?staff_id, "Staff set");
        self.mutate(Transition::SetStaff(staff));
        self.publish_staff_id(staff_id);
    }

    /// Installs a shift decided elsewhere (e.g. check-in or checkout flows),
    /// bypassing reconciliation.
    pub fn set_active_shift_immediate(&self, shift: Option<ActiveShift>) {
        info!(
            shift_id = ?shift.as_ref().map(|s| s.id.as_str()),
            status = ?shift.as_ref().map(|s| s.status.as_str()),
            "Active shift set directly"
        );
        self.mutate(Transition::SetShift(shift));
    }

    /// Evicts staff, shift and their persisted copies.
    pub fn clear_shift(&self) {
        info!("Clearing shift session");
        self.mutate(Transition::Clear);
        self.publish_staff_id(None);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────────

    /// Receives the staff id whenever it changes.
    pub fn subscribe_staff(&self) -> watch::Receiver<Option<String>> {
        self.staff_tx.subscribe()
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signal_tx.subscribe()
    }

    /// Handle for external publishers of session signals.
    pub fn signal_sender(&self) -> broadcast::Sender<SessionSignal> {
        self.signal_tx.clone()
    }

    /// Publishes a signal; returns false when nobody is listening.
    pub fn publish(&self, signal: SessionSignal) -> bool {
        self.signal_tx.send(signal).is_ok()
    }

    fn publish_staff_id(&self, staff_id: Option<String>) {
        self.staff_tx.send_if_modified(|current| {
            if *current == staff_id {
                return false;
            }
            *current = staff_id;
            true
        });
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sequencing
    // ─────────────────────────────────────────────────────────────────────────────

    pub(crate) fn begin_pass(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Enters `Restoring` for pass `seq` unless a newer pass has already
    /// completed. Leaves the commit slot alone.
    pub(crate) fn begin_restore(&self, seq: u64) {
        let mut inner = self.lock();
        if seq > inner.committed_seq {
            inner.apply(Transition::BeginRestore);
        }
    }

    /// Applies `transition` on behalf of pass `seq`. Returns false (and
    /// changes nothing) when a newer pass has already completed.
    pub(crate) fn commit(&self, seq: u64, transition: Transition) -> bool {
        let mut inner = self.lock();
        if seq < inner.committed_seq {
            debug!(
                seq,
                committed_seq = inner.committed_seq,
                "Discarding result of superseded reconciliation pass"
            );
            return false;
        }
        inner.committed_seq = seq;
        inner.apply(transition);
        true
    }

    /// Applies a transition that is safe regardless of pass ordering.
    pub(crate) fn apply_unsequenced(&self, transition: Transition) {
        self.lock().apply(transition);
    }

    fn mutate(&self, transition: Transition) {
        let seq = self.begin_pass();
        self.commit(seq, transition);
    }

    pub(crate) fn identity_context(&self) -> IdentityContext {
        let mut inner = self.lock();
        IdentityContext {
            staff: inner.state.staff.clone(),
            persisted_staff: inner.cache.staff(),
            legacy_user: inner.cache.legacy_user(),
        }
    }
}
