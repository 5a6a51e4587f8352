//! Remote shift lookup.
//!
//! The authority answers three query shapes: by staff, by terminal (strict
//! branch + terminal match) and by terminal only (loose, tolerating branch
//! drift between local and remote records). [`ShiftLookup`] wraps an
//! authority with a timeout and folds every response into a
//! [`LookupOutcome`], so reconciliation walks an ordered strategy list
//! instead of nesting error handling.
//!
//! | Response                                   | Outcome        |
//! |--------------------------------------------|----------------|
//! | active shift (bare or `success: true`)     | `Found`        |
//! | shift with another status                  | `Inactive`     |
//! | `null`, `success: false`, no `data`        | `Absent`       |
//! | transport/parse error, timeout             | `Unavailable`  |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shiftkeeper_protocol::{ActiveShift, Envelope, ShiftStatus};
use tracing::{debug, warn};

use crate::error::{Result, ShiftError};
use crate::identity::TerminalIdentity;

/// Remote authority for shift records. All calls are idempotent reads.
#[async_trait]
pub trait ShiftAuthority: Send + Sync {
    async fn get_active(&self, staff_id: &str) -> Result<Option<Envelope<ActiveShift>>>;

    async fn get_active_by_terminal(
        &self,
        branch_id: &str,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>>;

    async fn get_active_by_terminal_loose(
        &self,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>>;
}

/// Authority used when no remote endpoint is configured. Every lookup is
/// unavailable, so cached state is preserved.
#[derive(Debug, Default)]
pub struct UnconfiguredAuthority;

#[async_trait]
impl ShiftAuthority for UnconfiguredAuthority {
    async fn get_active(&self, _staff_id: &str) -> Result<Option<Envelope<ActiveShift>>> {
        Err(ShiftError::AuthorityNotConfigured)
    }

    async fn get_active_by_terminal(
        &self,
        _branch_id: &str,
        _terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        Err(ShiftError::AuthorityNotConfigured)
    }

    async fn get_active_by_terminal_loose(
        &self,
        _terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        Err(ShiftError::AuthorityNotConfigured)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStrategy {
    StaffScoped {
        staff_id: String,
    },
    StrictTerminal {
        branch_id: String,
        terminal_id: String,
    },
    LooseTerminal {
        terminal_id: String,
    },
}

impl LookupStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LookupStrategy::StaffScoped { .. } => "staff_scoped",
            LookupStrategy::StrictTerminal { .. } => "strict_terminal",
            LookupStrategy::LooseTerminal { .. } => "loose_terminal",
        }
    }

    /// Strict then loose terminal lookups. Empty unless branch and terminal
    /// both resolved.
    pub fn terminal_chain(identity: &TerminalIdentity) -> Vec<LookupStrategy> {
        match identity.terminal_pair() {
            Some((branch_id, terminal_id)) => vec![
                LookupStrategy::StrictTerminal {
                    branch_id: branch_id.to_string(),
                    terminal_id: terminal_id.to_string(),
                },
                LookupStrategy::LooseTerminal {
                    terminal_id: terminal_id.to_string(),
                },
            ],
            None => Vec::new(),
        }
    }
}

impl fmt::Display for LookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupStrategy::StaffScoped { staff_id } => write!(f, "staff_scoped({})", staff_id),
            LookupStrategy::StrictTerminal {
                branch_id,
                terminal_id,
            } => write!(f, "strict_terminal({}/{})", branch_id, terminal_id),
            LookupStrategy::LooseTerminal { terminal_id } => {
                write!(f, "loose_terminal({})", terminal_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(ActiveShift),
    Inactive(ShiftStatus),
    Absent,
    Unavailable(String),
}

impl LookupOutcome {
    /// True when the authority actually answered.
    pub fn is_definitive(&self) -> bool {
        !matches!(self, LookupOutcome::Unavailable(_))
    }
}

/// Result of walking a strategy list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupReport {
    pub found: Option<(LookupStrategy, ActiveShift)>,
    /// At least one strategy got a definitive "no active shift" answer.
    pub definitive_miss: bool,
    pub attempts: usize,
}

pub struct ShiftLookup {
    authority: Arc<dyn ShiftAuthority>,
    timeout: Duration,
}

impl ShiftLookup {
    pub fn new(authority: Arc<dyn ShiftAuthority>, timeout: Duration) -> Self {
        Self { authority, timeout }
    }

    pub async fn query(&self, strategy: &LookupStrategy) -> LookupOutcome {
        let call = async {
            match strategy {
                LookupStrategy::StaffScoped { staff_id } => {
                    self.authority.get_active(staff_id).await
                }
                LookupStrategy::StrictTerminal {
                    branch_id,
                    terminal_id,
                } => {
                    self.authority
                        .get_active_by_terminal(branch_id, terminal_id)
                        .await
                }
                LookupStrategy::LooseTerminal { terminal_id } => {
                    self.authority
                        .get_active_by_terminal_loose(terminal_id)
                        .await
                }
            }
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ShiftError::Timeout {
                strategy: strategy.to_string(),
                after: self.timeout,
            }),
        };

        let outcome = match result {
            Ok(envelope) => match envelope.and_then(Envelope::into_data) {
                Some(shift) if shift.is_active() => LookupOutcome::Found(shift),
                Some(shift) => LookupOutcome::Inactive(shift.status),
                None => LookupOutcome::Absent,
            },
            Err(err) => {
                warn!(
                    strategy = %strategy,
                    error = %err,
                    "Shift lookup failed; treating as not found"
                );
                LookupOutcome::Unavailable(err.to_string())
            }
        };

        debug!(
            strategy = %strategy,
            outcome = outcome_label(&outcome),
            "Shift lookup finished"
        );
        outcome
    }

    /// Tries each strategy in order and stops at the first active shift.
    pub async fn first_active(&self, strategies: &[LookupStrategy]) -> LookupReport {
        let mut report = LookupReport::default();
        for strategy in strategies {
            report.attempts += 1;
            match self.query(strategy).await {
                LookupOutcome::Found(shift) => {
                    report.found = Some((strategy.clone(), shift));
                    return report;
                }
                LookupOutcome::Inactive(_) | LookupOutcome::Absent => {
                    report.definitive_miss = true;
                }
                LookupOutcome::Unavailable(_) => {}
            }
        }
        report
    }
}

fn outcome_label(outcome: &LookupOutcome) -> &'static str {
    match outcome {
        LookupOutcome::Found(_) => "found",
        LookupOutcome::Inactive(_) => "inactive",
        LookupOutcome::Absent => "absent",
        LookupOutcome::Unavailable(_) => "unavailable",
    }
}
