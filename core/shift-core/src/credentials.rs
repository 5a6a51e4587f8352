//! Terminal credential cache.
//!
//! Used to backfill a staff record's missing organization. `get_cached` is a
//! cheap in-memory read; `refresh` goes back to the source.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use fs_err as fs;
use shiftkeeper_protocol::TerminalCredentials;
use tracing::debug;

use crate::error::{Result, ShiftError};

#[async_trait]
pub trait TerminalCredentialCache: Send + Sync {
    fn get_cached(&self) -> Option<TerminalCredentials>;
    async fn refresh(&self) -> Result<TerminalCredentials>;
}

/// Credentials read from `credentials.json`, kept in memory between refreshes.
#[derive(Debug)]
pub struct FileCredentialCache {
    path: PathBuf,
    cached: Mutex<Option<TerminalCredentials>>,
}

impl FileCredentialCache {
    /// Creates the cache and primes it from disk when the file exists.
    pub fn new(path: &Path) -> Self {
        let cached = match read_credentials(path) {
            Ok(credentials) => Some(credentials),
            Err(err) => {
                debug!(error = %err, "Terminal credentials not loaded at startup");
                None
            }
        };
        Self {
            path: path.to_path_buf(),
            cached: Mutex::new(cached),
        }
    }
}

#[async_trait]
impl TerminalCredentialCache for FileCredentialCache {
    fn get_cached(&self) -> Option<TerminalCredentials> {
        self.cached
            .lock()
            .map(|cached| cached.clone())
            .unwrap_or_default()
    }

    async fn refresh(&self) -> Result<TerminalCredentials> {
        let credentials = read_credentials(&self.path)?;
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(credentials.clone());
        }
        Ok(credentials)
    }
}

fn read_credentials(path: &Path) -> Result<TerminalCredentials> {
    let content = fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ShiftError::Credentials("terminal not provisioned".to_string())
        } else {
            ShiftError::io("Failed to read terminal credentials", err)
        }
    })?;
    serde_json::from_str(&content)
        .map_err(|err| ShiftError::Credentials(format!("malformed credentials: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_has_no_cached_value_and_refresh_fails() {
        let temp = tempdir().unwrap();
        let cache = FileCredentialCache::new(&temp.path().join("credentials.json"));
        assert!(cache.get_cached().is_none());
        assert!(matches!(cache.refresh().await, Err(ShiftError::Credentials(_))));
    }

    #[tokio::test]
    async fn refresh_picks_up_new_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("credentials.json");
        std::fs::write(&path, r#"{"terminalId":"T1"}"#).unwrap();
        let cache = FileCredentialCache::new(&path);
        assert_eq!(cache.get_cached().and_then(|c| c.organization_id), None);

        std::fs::write(&path, r#"{"terminalId":"T1","organizationId":"O1","apiKey":"k"}"#)
            .unwrap();
        let refreshed = cache.refresh().await.unwrap();
        assert_eq!(refreshed.organization_id.as_deref(), Some("O1"));
        assert_eq!(
            cache.get_cached().and_then(|c| c.api_key).as_deref(),
            Some("k")
        );
    }
}
