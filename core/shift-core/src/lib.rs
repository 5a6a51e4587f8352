//! # shift-core
//!
//! Shift-session reconciliation for a point-of-sale terminal. Decides which
//! staff member and shift the terminal is working under by reconciling a
//! local cache, the terminal's configured identity and a remote shift
//! authority.
//!
//! ## Design Principles
//!
//! - **Cache first**: the persisted session is adopted immediately and
//!   validated in the background.
//! - **Never block on the network**: every lookup is bounded by a timeout,
//!   and an unreachable authority never discards a cached shift.
//! - **Explicit transitions**: all state changes go through
//!   [`transition::next_state`].
//! - **Latest pass wins**: a slow reconciliation pass cannot overwrite the
//!   result of a newer one.
//! - **Logout is not checkout**: clearing staff keeps the active shift.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shift_core::{load_session_config, spawn_event_tasks, ShiftSession, StorageConfig};
//!
//! let storage = StorageConfig::from_home()?;
//! let session = Arc::new(ShiftSession::open(&storage, load_session_config(&storage))?);
//! session.start().await;
//! let _tasks = spawn_event_tasks(&session);
//! ```

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod http;
pub mod identity;
pub mod lookup;
pub mod normalize;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod storage;
pub mod transition;

pub use cache::{LegacyUser, SessionCache, SessionSnapshot};
pub use config::*;
pub use credentials::{FileCredentialCache, TerminalCredentialCache};
pub use error::{Result, ShiftError};
pub use events::{spawn_event_tasks, EventTasks, SessionSignal};
pub use http::HttpShiftAuthority;
pub use identity::{ConfigService, IdentityField, TerminalIdentity, TerminalIdentityResolver};
pub use lookup::{
    LookupOutcome, LookupReport, LookupStrategy, ShiftAuthority, ShiftLookup,
    UnconfiguredAuthority,
};
pub use normalize::{normalize, normalize_opt};
pub use reconcile::{ReconcileOutcome, TerminalCheck};
pub use session::{Collaborators, ShiftSession};
pub use settings::FileConfigService;
pub use storage::StorageConfig;
pub use transition::{SessionPhase, SessionState};

pub use shiftkeeper_protocol::{ActiveShift, ShiftStatus, Staff, TerminalCredentials};
