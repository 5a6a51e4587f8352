//! Error types for shift-core operations.
//!
//! Reconciliation never surfaces these to collaborators: passes log them and
//! fall through to the next source. They exist so the collaborator traits and
//! the persistence layer can report *why* a step failed.

use std::path::PathBuf;
use std::time::Duration;

/// All errors that can occur in shift-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ShiftError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration source unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Remote Lookup Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Shift authority not configured")]
    AuthorityNotConfigured,

    #[error("Shift lookup failed: {strategy}: {details}")]
    Lookup { strategy: String, details: String },

    #[error("Shift lookup timed out after {after:?}: {strategy}")]
    Timeout { strategy: String, after: Duration },

    #[error("Terminal credentials unavailable: {0}")]
    Credentials(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("In-memory cache has no backing file")]
    NoBackingFile,
}

impl ShiftError {
    pub fn lookup(strategy: impl Into<String>, details: impl Into<String>) -> Self {
        ShiftError::Lookup {
            strategy: strategy.into(),
            details: details.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ShiftError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ShiftError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;
