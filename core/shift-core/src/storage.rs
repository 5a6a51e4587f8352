//! Storage configuration and path management for shiftkeeper.
//!
//! All file paths used by the session core are decided here so tests can
//! inject a temp root with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

use crate::error::{Result, ShiftError};

const ROOT_DIR_NAME: &str = ".shiftkeeper";

/// Central configuration for all shiftkeeper storage paths.
///
/// Production code uses [`StorageConfig::from_home`], which points to
/// `~/.shiftkeeper/`. Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ShiftError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(ROOT_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Durable session cache (staff, active shift, last known terminal).
    pub fn session_cache_file(&self) -> PathBuf {
        self.root.join("session-cache.json")
    }

    /// Session configuration (authority URL, timeouts, pseudo-session ids).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Terminal settings written by the provisioning flow.
    pub fn terminal_settings_file(&self) -> PathBuf {
        self.root.join("terminal.json")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
