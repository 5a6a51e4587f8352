//! Session configuration loading and saving.
//!
//! A missing or malformed `config.json` yields defaults; the terminal must be
//! able to start (and show the check-in prompt) without any configuration.

use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ShiftError};
use crate::storage::StorageConfig;

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_TERMINAL_MONITOR_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PLACEHOLDER_STAFF_NAME: &str = "Staff";
/// Staff id used by the offline PIN login, which has no backend identity.
pub const LOCAL_PIN_STAFF_ID: &str = "local-simple-pin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the remote shift authority. `None` disables remote lookups.
    pub authority_url: Option<String>,
    pub lookup_timeout_ms: u64,
    /// Staff ids that mark a local-only login.
    pub pseudo_staff_ids: Vec<String>,
    /// Display name for synthesized staff when no cached name exists.
    pub placeholder_staff_name: String,
    pub terminal_monitor_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authority_url: None,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            pseudo_staff_ids: vec![LOCAL_PIN_STAFF_ID.to_string()],
            placeholder_staff_name: DEFAULT_PLACEHOLDER_STAFF_NAME.to_string(),
            terminal_monitor_interval_secs: DEFAULT_TERMINAL_MONITOR_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms.max(1))
    }

    pub fn terminal_monitor_interval(&self) -> Duration {
        Duration::from_secs(self.terminal_monitor_interval_secs.max(1))
    }

    pub fn is_pseudo_staff(&self, staff_id: &str) -> bool {
        self.pseudo_staff_ids.iter().any(|id| id == staff_id)
    }
}

/// Loads the session configuration, returning defaults if the file is missing
/// or cannot be parsed.
pub fn load_session_config(storage: &StorageConfig) -> SessionConfig {
    let path = storage.config_file();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return SessionConfig::default()
        }
        Err(err) => {
            warn!(error = %err, "Failed to read session config; using defaults");
            return SessionConfig::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                error = %err,
                path = %path.display(),
                "Session config malformed; using defaults"
            );
            SessionConfig::default()
        }
    }
}

/// Saves the session configuration to disk.
pub fn save_session_config(storage: &StorageConfig, config: &SessionConfig) -> Result<()> {
    let path = storage.config_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ShiftError::io("Failed to create config directory", err))?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|err| ShiftError::json("Failed to serialize config", err))?;
    fs::write(&path, content).map_err(|err| ShiftError::io("Failed to write config", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        assert_eq!(load_session_config(&storage), SessionConfig::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(storage.config_file(), "{not json").unwrap();
        assert_eq!(load_session_config(&storage), SessionConfig::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(
            storage.config_file(),
            r#"{"authority_url":"http://pos.local/api","lookup_timeout_ms":2500}"#,
        )
        .unwrap();

        let config = load_session_config(&storage);
        assert_eq!(config.authority_url.as_deref(), Some("http://pos.local/api"));
        assert_eq!(config.lookup_timeout(), Duration::from_millis(2500));
        assert!(config.is_pseudo_staff(LOCAL_PIN_STAFF_ID));
    }

    #[test]
    fn save_then_load_preserves_config() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("nested"));
        let config = SessionConfig {
            pseudo_staff_ids: vec!["offline-pin".to_string()],
            ..SessionConfig::default()
        };
        save_session_config(&storage, &config).unwrap();
        assert_eq!(load_session_config(&storage), config);
    }
}
