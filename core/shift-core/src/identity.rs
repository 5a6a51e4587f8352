//! Terminal identity resolution.
//!
//! Answers "which branch, terminal and organization is this device?" by
//! walking an ordered list of sources per field:
//!
//! 1. live configuration getter
//! 2. settings-store getter (`terminal` category)
//! 3. the in-memory staff record
//! 4. the persisted staff snapshot
//! 5. the legacy `user` record (branch and terminal only)
//!
//! Every value passes through [`normalize`](crate::normalize::normalize), so a
//! placeholder at one level falls through to the next. Source failures are
//! logged and treated as unresolved; resolution itself never fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use shiftkeeper_protocol::Staff;
use tracing::debug;

use crate::cache::LegacyUser;
use crate::error::Result;
use crate::normalize::normalize_opt;

/// Settings category holding terminal identity keys.
pub const TERMINAL_SETTINGS_CATEGORY: &str = "terminal";

/// External configuration service.
#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn get_branch_id(&self) -> Result<Option<String>>;
    async fn get_terminal_id(&self) -> Result<Option<String>>;
    async fn get_organization_id(&self) -> Result<Option<String>>;
    async fn get_setting(&self, category: &str, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Branch,
    Terminal,
    Organization,
}

impl IdentityField {
    pub fn setting_key(&self) -> &'static str {
        match self {
            IdentityField::Branch => "branch_id",
            IdentityField::Terminal => "terminal_id",
            IdentityField::Organization => "organization_id",
        }
    }

    fn from_staff<'a>(&self, staff: &'a Staff) -> Option<&'a str> {
        match self {
            IdentityField::Branch => Some(staff.branch_id.as_str()),
            IdentityField::Terminal => Some(staff.terminal_id.as_str()),
            IdentityField::Organization => staff.organization_id.as_deref(),
        }
    }

    fn from_legacy_user<'a>(&self, user: &'a LegacyUser) -> Option<&'a str> {
        match self {
            IdentityField::Branch => user.branch_id.as_deref(),
            IdentityField::Terminal => user.terminal_id.as_deref(),
            IdentityField::Organization => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TerminalIdentity {
    pub branch_id: Option<String>,
    pub terminal_id: Option<String>,
    pub organization_id: Option<String>,
}

impl TerminalIdentity {
    /// Branch and terminal, when both resolved.
    pub fn terminal_pair(&self) -> Option<(&str, &str)> {
        Some((self.branch_id.as_deref()?, self.terminal_id.as_deref()?))
    }
}

/// Local records consulted after the configuration service.
///
/// Captured before resolution starts so no lock is held across the async
/// configuration calls.
#[derive(Debug, Clone, Default)]
pub struct IdentityContext {
    pub staff: Option<Staff>,
    pub persisted_staff: Option<Staff>,
    pub legacy_user: Option<LegacyUser>,
}

pub struct TerminalIdentityResolver {
    config: Arc<dyn ConfigService>,
}

impl TerminalIdentityResolver {
    pub fn new(config: Arc<dyn ConfigService>) -> Self {
        Self { config }
    }

    pub async fn resolve(&self, context: &IdentityContext) -> TerminalIdentity {
        TerminalIdentity {
            branch_id: self.resolve_field(IdentityField::Branch, context).await,
            terminal_id: self.resolve_field(IdentityField::Terminal, context).await,
            organization_id: self
                .resolve_field(IdentityField::Organization, context)
                .await,
        }
    }

    pub async fn resolve_field(
        &self,
        field: IdentityField,
        context: &IdentityContext,
    ) -> Option<String> {
        let live = match field {
            IdentityField::Branch => self.config.get_branch_id().await,
            IdentityField::Terminal => self.config.get_terminal_id().await,
            IdentityField::Organization => self.config.get_organization_id().await,
        };
        if let Some(value) = accept(field, "live_config", live) {
            return Some(value);
        }

        let setting = self
            .config
            .get_setting(TERMINAL_SETTINGS_CATEGORY, field.setting_key())
            .await;
        if let Some(value) = accept(field, "settings_store", setting) {
            return Some(value);
        }

        let staff_value = |staff: &Option<Staff>| {
            staff
                .as_ref()
                .and_then(|staff| normalize_opt(field.from_staff(staff)))
        };

        staff_value(&context.staff)
            .or_else(|| staff_value(&context.persisted_staff))
            .or_else(|| {
                context
                    .legacy_user
                    .as_ref()
                    .and_then(|user| normalize_opt(field.from_legacy_user(user)))
            })
    }
}

fn accept(field: IdentityField, source: &str, result: Result<Option<String>>) -> Option<String> {
    match result {
        Ok(value) => normalize_opt(value.as_deref()),
        Err(err) => {
            debug!(
                field = field.setting_key(),
                source,
                error = %err,
                "Identity source failed; trying next"
            );
            None
        }
    }
}
