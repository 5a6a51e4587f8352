//! Session state machine.
//!
//! Every change to the in-memory `(staff, active_shift)` pair goes through
//! [`next_state`]. The reconciliation passes decide *which* transition to
//! apply; this function only decides what that transition means. A shift
//! that is not `active` is never held as current.

use serde::Serialize;
use shiftkeeper_protocol::{ActiveShift, Staff};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Restoring,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub staff: Option<Staff>,
    pub active_shift: Option<ActiveShift>,
}

impl SessionState {
    pub fn is_shift_active(&self) -> bool {
        self.active_shift
            .as_ref()
            .map(ActiveShift::is_active)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A restore pass started.
    BeginRestore,
    /// Adopt a shift. `synthesized_staff` is used only when no staff is set.
    Adopt {
        shift: ActiveShift,
        synthesized_staff: Option<Staff>,
    },
    /// The authority definitively reported no active shift.
    Evict,
    /// Nothing could be confirmed; keep whatever was adopted before.
    Fail,
    SetStaff(Option<Staff>),
    SetShift(Option<ActiveShift>),
    /// Backfill a missing organization on the current staff.
    MergeOrganization {
        staff_id: String,
        organization_id: String,
    },
    Clear,
}

fn settled(shift: &Option<ActiveShift>) -> SessionPhase {
    if shift.is_some() {
        SessionPhase::Active
    } else {
        SessionPhase::Inactive
    }
}

pub fn next_state(current: &SessionState, transition: Transition) -> SessionState {
    match transition {
        Transition::BeginRestore => SessionState {
            phase: SessionPhase::Restoring,
            ..current.clone()
        },
        Transition::Adopt { shift, .. } if !shift.is_active() => {
            next_state(current, Transition::Evict)
        }
        Transition::Adopt {
            shift,
            synthesized_staff,
        } => SessionState {
            phase: SessionPhase::Active,
            staff: current.staff.clone().or(synthesized_staff),
            active_shift: Some(shift),
        },
        Transition::Evict => SessionState {
            phase: SessionPhase::Inactive,
            staff: current.staff.clone(),
            active_shift: None,
        },
        Transition::Fail => SessionState {
            phase: settled(&current.active_shift),
            ..current.clone()
        },
        Transition::SetStaff(staff) => {
            let phase = match current.phase {
                SessionPhase::Uninitialized | SessionPhase::Restoring => current.phase,
                _ => settled(&current.active_shift),
            };
            SessionState {
                phase,
                staff,
                active_shift: current.active_shift.clone(),
            }
        }
        Transition::SetShift(shift) => {
            let shift = shift.filter(ActiveShift::is_active);
            SessionState {
                phase: settled(&shift),
                staff: current.staff.clone(),
                active_shift: shift,
            }
        }
        Transition::MergeOrganization {
            staff_id,
            organization_id,
        } => {
            let mut next = current.clone();
            if let Some(staff) = next.staff.as_mut() {
                if staff.staff_id == staff_id && staff.organization_id.is_none() {
                    staff.organization_id = Some(organization_id);
                }
            }
            next
        }
        Transition::Clear => SessionState {
            phase: SessionPhase::Inactive,
            staff: None,
            active_shift: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftkeeper_protocol::ShiftStatus;

    fn staff(id: &str) -> Staff {
        Staff {
            staff_id: id.to_string(),
            name: "Ana".to_string(),
            role: "cashier".to_string(),
            branch_id: "B1".to_string(),
            terminal_id: "T1".to_string(),
            organization_id: None,
        }
    }

    fn shift(status: ShiftStatus) -> ActiveShift {
        ActiveShift {
            id: "shift-1".to_string(),
            staff_id: "S1".to_string(),
            branch_id: "B1".to_string(),
            terminal_id: "T1".to_string(),
            organization_id: Some("O1".to_string()),
            role_type: "cashier".to_string(),
            status,
            staff_name: None,
            check_in_time: None,
        }
    }

    fn active_state() -> SessionState {
        SessionState {
            phase: SessionPhase::Active,
            staff: Some(staff("S1")),
            active_shift: Some(shift(ShiftStatus::Active)),
        }
    }

    #[test]
    fn begin_restore_keeps_data() {
        let next = next_state(&active_state(), Transition::BeginRestore);
        assert_eq!(next.phase, SessionPhase::Restoring);
        assert!(next.is_shift_active());
    }

    #[test]
    fn adopt_uses_synthesized_staff_only_when_none_set() {
        let empty = SessionState::default();
        let next = next_state(
            &empty,
            Transition::Adopt {
                shift: shift(ShiftStatus::Active),
                synthesized_staff: Some(staff("S1")),
            },
        );
        assert_eq!(next.phase, SessionPhase::Active);
        assert_eq!(next.staff.as_ref().map(|s| s.staff_id.as_str()), Some("S1"));

        let kept = next_state(
            &SessionState {
                staff: Some(staff("S9")),
                ..SessionState::default()
            },
            Transition::Adopt {
                shift: shift(ShiftStatus::Active),
                synthesized_staff: Some(staff("S1")),
            },
        );
        assert_eq!(kept.staff.map(|s| s.staff_id), Some("S9".to_string()));
    }

    #[test]
    fn adopt_of_non_active_shift_evicts() {
        let next = next_state(
            &active_state(),
            Transition::Adopt {
                shift: shift(ShiftStatus::Closed),
                synthesized_staff: None,
            },
        );
        assert_eq!(next.phase, SessionPhase::Inactive);
        assert!(next.active_shift.is_none());
    }

    #[test]
    fn evict_keeps_staff() {
        let next = next_state(&active_state(), Transition::Evict);
        assert!(next.active_shift.is_none());
        assert!(next.staff.is_some());
        assert_eq!(next.phase, SessionPhase::Inactive);
    }

    #[test]
    fn fail_preserves_adopted_shift() {
        let restoring = next_state(&active_state(), Transition::BeginRestore);
        let next = next_state(&restoring, Transition::Fail);
        assert_eq!(next.phase, SessionPhase::Active);
        assert_eq!(next.active_shift, active_state().active_shift);
    }

    #[test]
    fn fail_without_shift_is_inactive() {
        let next = next_state(&SessionState::default(), Transition::Fail);
        assert_eq!(next.phase, SessionPhase::Inactive);
    }

    #[test]
    fn logout_keeps_active_shift() {
        let next = next_state(&active_state(), Transition::SetStaff(None));
        assert!(next.staff.is_none());
        assert!(next.is_shift_active());
        assert_eq!(next.phase, SessionPhase::Active);
    }

    #[test]
    fn set_staff_does_not_settle_an_uninitialized_session() {
        let next = next_state(&SessionState::default(), Transition::SetStaff(Some(staff("S1"))));
        assert_eq!(next.phase, SessionPhase::Uninitialized);
    }

    #[test]
    fn set_shift_drops_non_active_status() {
        let next = next_state(
            &active_state(),
            Transition::SetShift(Some(shift(ShiftStatus::Abandoned))),
        );
        assert!(next.active_shift.is_none());
        assert_eq!(next.phase, SessionPhase::Inactive);
    }

    #[test]
    fn merge_organization_only_fills_missing_value_for_same_staff() {
        let merged = next_state(
            &active_state(),
            Transition::MergeOrganization {
                staff_id: "S1".into(),
                organization_id: "O1".into(),
            },
        );
        assert_eq!(
            merged.staff.as_ref().and_then(|s| s.organization_id.as_deref()),
            Some("O1")
        );

        let other = next_state(
            &active_state(),
            Transition::MergeOrganization {
                staff_id: "S2".into(),
                organization_id: "O1".into(),
            },
        );
        assert_eq!(other.staff.and_then(|s| s.organization_id), None);

        let again = next_state(
            &merged,
            Transition::MergeOrganization {
                staff_id: "S1".into(),
                organization_id: "O2".into(),
            },
        );
        assert_eq!(again.staff.and_then(|s| s.organization_id), Some("O1".into()));
    }

    #[test]
    fn clear_drops_everything() {
        let next = next_state(&active_state(), Transition::Clear);
        assert_eq!(next, SessionState {
            phase: SessionPhase::Inactive,
            staff: None,
            active_shift: None,
        });
    }
}
