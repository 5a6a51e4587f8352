//! Reconciliation passes.
//!
//! Each pass compares what the session holds with what the remote authority
//! says and commits one transition. A pass never blocks the caller on a
//! failing authority: every lookup is bounded by the configured timeout and
//! failures are folded into [`ReconcileOutcome::Unconfirmed`].
//!
//! Staff-scoped validation runs first when a staff id is known, then the
//! strict and loose terminal lookups. If nothing is adopted the previous
//! shift is evicted only when some lookup was a definitive miss; otherwise
//! prior state is kept.

use serde::Serialize;
use shiftkeeper_protocol::{ActiveShift, Staff};
use tracing::{debug, info, warn};

use crate::identity::IdentityField;
use crate::lookup::LookupStrategy;
use crate::normalize::{normalize, normalize_opt};
use crate::session::ShiftSession;
use crate::transition::Transition;

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Adopted {
        shift_id: String,
        strategy: &'static str,
    },
    /// The authority confirmed there is no active shift.
    NoActiveShift,
    /// Nothing could be confirmed; prior state was kept.
    Unconfirmed,
    /// The terminal's shift belongs to another organization; the session
    /// was cleared.
    OrganizationConflict,
    /// A newer pass committed first and this result was discarded.
    Superseded,
    /// The trigger did not require a pass.
    Skipped,
}

/// Result of comparing the resolved terminal id with the last one seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "check", content = "terminal_id", rename_all = "snake_case")]
pub enum TerminalCheck {
    Unresolved,
    /// First terminal id seen; recorded.
    Recorded(String),
    Unchanged(String),
    /// The terminal changed; the session was cleared.
    Changed { previous: String, current: String },
}

impl ShiftSession {
    /// Startup: terminal identity check, then restore.
    pub async fn start(&self) -> ReconcileOutcome {
        self.check_terminal_identity().await;
        self.restore().await
    }

    /// Validates the cached shift, or restores one from the terminal when
    /// nothing is cached.
    pub async fn restore(&self) -> ReconcileOutcome {
        let seq = self.begin_pass();
        let (staff_id, cached_shift) = {
            let inner = self.lock();
            (
                inner.state.staff.as_ref().map(|staff| staff.staff_id.clone()),
                inner.state.active_shift.clone(),
            )
        };
        self.begin_restore(seq);

        match cached_shift {
            Some(shift) => {
                info!(
                    shift_id = %shift.id,
                    staff_id = %shift.staff_id,
                    "Validating cached shift"
                );
                let staff_id = staff_id.or_else(|| Some(shift.staff_id.clone()));
                self.reconcile_staff(seq, staff_id).await
            }
            None => {
                info!("No cached shift; restoring from terminal");
                self.restore_from_terminal(seq, false).await
            }
        }
    }

    /// Staff id changed. `None` (logout) keeps the shift.
    pub async fn on_staff_changed(&self, staff_id: Option<String>) -> ReconcileOutcome {
        let Some(staff_id) = staff_id else {
            debug!("Staff cleared; keeping shift until it is closed");
            return ReconcileOutcome::Skipped;
        };
        let seq = self.begin_pass();
        self.begin_restore(seq);
        let outcome = self.reconcile_staff(seq, Some(staff_id)).await;
        if !matches!(outcome, ReconcileOutcome::Adopted { .. }) {
            self.hydrate_organization().await;
        }
        outcome
    }

    /// Terminal settings changed. Only relevant while no shift is active.
    pub async fn on_settings_updated(&self) -> ReconcileOutcome {
        if self.is_shift_active() {
            debug!("Terminal settings updated while a shift is active; ignoring");
            return ReconcileOutcome::Skipped;
        }
        let seq = self.begin_pass();
        self.begin_restore(seq);
        self.restore_from_terminal(seq, false).await
    }

    /// Re-queries the authority for a staff member's shift.
    ///
    /// Uses `staff_id` when given, otherwise the current staff. A confirmed
    /// shift is adopted, a definitive miss clears it, and an unreachable
    /// authority leaves state untouched.
    pub async fn refresh_active_shift(&self, staff_id: Option<&str>) -> ReconcileOutcome {
        let staff_id = match staff_id.and_then(normalize) {
            Some(id) => Some(id),
            None => self.staff().map(|staff| staff.staff_id),
        };
        let Some(staff_id) = staff_id else {
            debug!("No staff to refresh a shift for");
            let seq = self.begin_pass();
            return self.settle(
                seq,
                Transition::SetShift(None),
                ReconcileOutcome::NoActiveShift,
            );
        };
        if self.config.is_pseudo_staff(&staff_id) {
            debug!(staff_id = %staff_id, "Local-only login; nothing to refresh");
            return ReconcileOutcome::Unconfirmed;
        }
        let seq = self.begin_pass();

        let report = self
            .lookup
            .first_active(&[LookupStrategy::StaffScoped {
                staff_id: staff_id.clone(),
            }])
            .await;
        match report.found {
            Some((strategy, shift)) => self.adopt(seq, strategy.name(), shift, None).await,
            None if report.definitive_miss => {
                info!(staff_id = %staff_id, "No active shift for staff");
                self.settle(seq, Transition::Evict, ReconcileOutcome::NoActiveShift)
            }
            None => self.settle(seq, Transition::Fail, ReconcileOutcome::Unconfirmed),
        }
    }

    /// Compares the resolved terminal id with the last one recorded and
    /// clears the session when it changed.
    pub async fn check_terminal_identity(&self) -> TerminalCheck {
        let context = self.identity_context();
        let Some(current) = self
            .resolver
            .resolve_field(IdentityField::Terminal, &context)
            .await
        else {
            debug!("Terminal id unresolved; skipping identity check");
            return TerminalCheck::Unresolved;
        };

        let previous = {
            let mut inner = self.lock();
            normalize_opt(inner.cache.last_known_terminal_id().as_deref())
        };

        let check = match previous {
            Some(previous) if previous != current => {
                warn!(
                    previous_terminal_id = %previous,
                    terminal_id = %current,
                    "Terminal identity changed; clearing session"
                );
                self.clear_shift();
                TerminalCheck::Changed {
                    previous,
                    current: current.clone(),
                }
            }
            Some(_) => TerminalCheck::Unchanged(current.clone()),
            None => TerminalCheck::Recorded(current.clone()),
        };

        if !matches!(check, TerminalCheck::Unchanged(_)) {
            let mut inner = self.lock();
            inner.cache.set_last_known_terminal_id(&current);
            if let Err(err) = inner.cache.flush() {
                warn!(error = %err, "Failed to persist last known terminal id");
            }
        }
        check
    }

    /// Backfills the staff record's missing organization.
    ///
    /// Sources in order: the active shift, cached credentials, refreshed
    /// credentials. Returns the organization that was merged, if any.
    pub async fn hydrate_organization(&self) -> Option<String> {
        let (staff_id, shift_org) = {
            let inner = self.lock();
            let staff = inner.state.staff.as_ref()?;
            if normalize_opt(staff.organization_id.as_deref()).is_some() {
                return None;
            }
            (
                staff.staff_id.clone(),
                inner
                    .state
                    .active_shift
                    .as_ref()
                    .and_then(|shift| normalize_opt(shift.organization_id.as_deref())),
            )
        };

        let cached = || {
            self.credentials
                .get_cached()
                .and_then(|credentials| normalize_opt(credentials.organization_id.as_deref()))
        };
        let organization_id = match shift_org.or_else(cached) {
            Some(org) => org,
            None => match self.credentials.refresh().await {
                Ok(credentials) => normalize_opt(credentials.organization_id.as_deref())?,
                Err(err) => {
                    debug!(error = %err, "Credential refresh failed; organization stays unset");
                    return None;
                }
            },
        };

        debug!(
            staff_id = %staff_id,
            organization_id = %organization_id,
            "Hydrated staff organization"
        );
        self.apply_unsequenced(Transition::MergeOrganization {
            staff_id,
            organization_id: organization_id.clone(),
        });
        Some(organization_id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pass internals
    // ─────────────────────────────────────────────────────────────────────────────

    async fn reconcile_staff(&self, seq: u64, staff_id: Option<String>) -> ReconcileOutcome {
        let mut definitive_miss = false;

        match staff_id.as_deref().and_then(normalize) {
            Some(id) if self.config.is_pseudo_staff(&id) => {
                debug!(staff_id = %id, "Local-only login; skipping staff-scoped lookup");
            }
            Some(id) => {
                let report = self
                    .lookup
                    .first_active(&[LookupStrategy::StaffScoped {
                        staff_id: id.clone(),
                    }])
                    .await;
                if let Some((strategy, shift)) = report.found {
                    return self.adopt(seq, strategy.name(), shift, None).await;
                }
                definitive_miss = report.definitive_miss;
            }
            None => {}
        }

        self.restore_from_terminal(seq, definitive_miss).await
    }

    async fn restore_from_terminal(&self, seq: u64, definitive_miss: bool) -> ReconcileOutcome {
        let context = self.identity_context();
        let identity = self.resolver.resolve(&context).await;
        let strategies = LookupStrategy::terminal_chain(&identity);

        if strategies.is_empty() {
            info!(
                branch_id = ?identity.branch_id,
                terminal_id = ?identity.terminal_id,
                "Terminal identity unresolved; terminal restore skipped"
            );
            return self.settle_without_shift(seq, definitive_miss);
        }

        let report = self.lookup.first_active(&strategies).await;
        let Some((strategy, shift)) = report.found else {
            info!(
                branch_id = ?identity.branch_id,
                terminal_id = ?identity.terminal_id,
                attempts = report.attempts,
                "No active shift found for terminal"
            );
            return self.settle_without_shift(seq, definitive_miss || report.definitive_miss);
        };

        let shift_org = normalize_opt(shift.organization_id.as_deref());
        if let (Some(expected), Some(actual)) = (identity.organization_id.as_deref(), shift_org) {
            if expected != actual {
                warn!(
                    shift_id = %shift.id,
                    expected_organization_id = %expected,
                    organization_id = %actual,
                    "Shift belongs to another organization; clearing session"
                );
                self.clear_shift();
                return ReconcileOutcome::OrganizationConflict;
            }
        }

        let synthesized = self.synthesize_staff(&shift);
        self.adopt(seq, strategy.name(), shift, synthesized).await
    }

    async fn adopt(
        &self,
        seq: u64,
        strategy: &'static str,
        shift: ActiveShift,
        synthesized_staff: Option<Staff>,
    ) -> ReconcileOutcome {
        let shift_id = shift.id.clone();
        info!(
            shift_id = %shift_id,
            staff_id = %shift.staff_id,
            branch_id = %shift.branch_id,
            terminal_id = %shift.terminal_id,
            strategy,
            "Adopting active shift"
        );
        let transition = Transition::Adopt {
            shift,
            synthesized_staff,
        };
        if !self.commit(seq, transition) {
            return ReconcileOutcome::Superseded;
        }
        self.hydrate_organization().await;
        ReconcileOutcome::Adopted { shift_id, strategy }
    }

    fn settle_without_shift(&self, seq: u64, definitive_miss: bool) -> ReconcileOutcome {
        if definitive_miss {
            self.settle(seq, Transition::Evict, ReconcileOutcome::NoActiveShift)
        } else {
            self.settle(seq, Transition::Fail, ReconcileOutcome::Unconfirmed)
        }
    }

    fn settle(
        &self,
        seq: u64,
        transition: Transition,
        outcome: ReconcileOutcome,
    ) -> ReconcileOutcome {
        if self.commit(seq, transition) {
            outcome
        } else {
            ReconcileOutcome::Superseded
        }
    }

    /// Staff record for a shift adopted without a logged-in staff member.
    /// `None` when staff is already set.
    fn synthesize_staff(&self, shift: &ActiveShift) -> Option<Staff> {
        let mut inner = self.lock();
        if inner.state.staff.is_some() {
            return None;
        }
        let name = normalize_opt(shift.staff_name.as_deref())
            .or_else(|| inner.cache.staff_name(&shift.staff_id))
            .unwrap_or_else(|| self.config.placeholder_staff_name.clone());

        Some(Staff {
            staff_id: shift.staff_id.clone(),
            name,
            role: shift.role_type.clone(),
            branch_id: shift.branch_id.clone(),
            terminal_id: shift.terminal_id.clone(),
            organization_id: normalize_opt(shift.organization_id.as_deref()),
        })
    }
}
