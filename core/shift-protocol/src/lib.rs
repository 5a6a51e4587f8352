//! Shared data model and response envelope for shiftkeeper.
//!
//! This crate is shared by the session core and its clients to prevent schema
//! drift. The remote shift authority stays the source of truth for shift
//! records; these types only describe the fields reconciliation needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shift Records
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a shift as reported by the authority.
///
/// Statuses this client does not know about deserialize to `Unknown` and are
/// never treated as current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Active,
    Closed,
    Abandoned,
    #[serde(other)]
    Unknown,
}

impl ShiftStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ShiftStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Active => "active",
            ShiftStatus::Closed => "closed",
            ShiftStatus::Abandoned => "abandoned",
            ShiftStatus::Unknown => "unknown",
        }
    }
}

/// A work session for one staff member on one terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveShift {
    pub id: String,
    pub staff_id: String,
    pub branch_id: String,
    pub terminal_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub role_type: String,
    pub status: ShiftStatus,
    /// Display name of the checked-in staff member, when the authority includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_time: Option<DateTime<Utc>>,
}

impl ActiveShift {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_field(&self.id, "id")?;
        require_field(&self.staff_id, "staff_id")?;
        require_field(&self.terminal_id, "terminal_id")?;
        Ok(())
    }
}

/// The logged-in operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub staff_id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub branch_id: String,
    #[serde(default)]
    pub terminal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// Terminal credential material provisioned for this device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalCredentials {
    #[serde(default)]
    pub terminal_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Response Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// Lookup responses arrive either as a bare record or wrapped as
/// `{ "success": bool, "data": T }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<T>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope::Wrapped {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Envelope::Wrapped {
            success: false,
            data: None,
            error: Some(Value::String(message.into())),
        }
    }

    /// Unwraps the payload. A `success: false` envelope yields `None`,
    /// exactly like an absent record.
    pub fn into_data(self) -> Option<T> {
        match self {
            Envelope::Wrapped { success: false, .. } => None,
            Envelope::Wrapped { data, .. } => data,
            Envelope::Bare(data) => Some(data),
        }
    }
}

/// Parses a raw shift lookup body. `null` means no shift.
pub fn parse_shift_payload(value: Value) -> Result<Option<Envelope<ActiveShift>>, ErrorInfo> {
    if value.is_null() {
        return Ok(None);
    }

    let envelope: Envelope<ActiveShift> = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_payload",
            format!("shift payload is not a shift or envelope: {}", err),
        )
    })?;

    if let Envelope::Bare(shift)
    | Envelope::Wrapped {
        data: Some(shift), ..
    } = &envelope
    {
        shift.validate()?;
    }

    Ok(Some(envelope))
}

fn require_field(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "invalid_shift",
            format!("{} is required", field),
        ));
    }
    Ok(())
}
