//! File-backed terminal settings.
//!
//! `terminal.json` is written by the provisioning flow and may change while
//! the session is running, so every getter re-reads it. A missing file is not
//! an error (the terminal has simply not been provisioned yet).
//!
//! ```json
//! {
//!   "branch_id": "B1",
//!   "terminal_id": "T1",
//!   "organization_id": "O1",
//!   "settings": { "terminal": { "branch_id": "B1" } }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs_err as fs;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ShiftError};
use crate::identity::ConfigService;

#[derive(Debug, Default, Deserialize)]
struct TerminalSettingsFile {
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default)]
    terminal_id: Option<String>,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    settings: HashMap<String, HashMap<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct FileConfigService {
    path: PathBuf,
}

impl FileConfigService {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn read(&self) -> Result<TerminalSettingsFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TerminalSettingsFile::default())
            }
            Err(err) => return Err(ShiftError::io("Failed to read terminal settings", err)),
        };
        if content.trim().is_empty() {
            return Ok(TerminalSettingsFile::default());
        }
        serde_json::from_str(&content).map_err(|err| ShiftError::ConfigMalformed {
            path: self.path.clone(),
            details: err.to_string(),
        })
    }
}

#[async_trait]
impl ConfigService for FileConfigService {
    async fn get_branch_id(&self) -> Result<Option<String>> {
        Ok(self.read()?.branch_id)
    }

    async fn get_terminal_id(&self) -> Result<Option<String>> {
        Ok(self.read()?.terminal_id)
    }

    async fn get_organization_id(&self) -> Result<Option<String>> {
        Ok(self.read()?.organization_id)
    }

    async fn get_setting(&self, category: &str, key: &str) -> Result<Option<String>> {
        let mut file = self.read()?;
        let value = file
            .settings
            .get_mut(category)
            .and_then(|values| values.remove(key));
        Ok(match value {
            Some(Value::String(text)) => Some(text),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_resolves_nothing() {
        let temp = tempdir().unwrap();
        let service = FileConfigService::new(&temp.path().join("terminal.json"));
        assert_eq!(service.get_terminal_id().await.unwrap(), None);
        assert_eq!(service.get_setting("terminal", "branch_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_top_level_and_category_values() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("terminal.json");
        std::fs::write(
            &path,
            r#"{"terminal_id":"T1","settings":{"terminal":{"branch_id":"B1","register":7}}}"#,
        )
        .unwrap();

        let service = FileConfigService::new(&path);
        assert_eq!(service.get_terminal_id().await.unwrap().as_deref(), Some("T1"));
        assert_eq!(service.get_branch_id().await.unwrap(), None);
        assert_eq!(
            service.get_setting("terminal", "branch_id").await.unwrap().as_deref(),
            Some("B1")
        );
        assert_eq!(
            service.get_setting("terminal", "register").await.unwrap().as_deref(),
            Some("7")
        );
    }

    #[tokio::test]
    async fn observes_rewrites_between_calls() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("terminal.json");
        std::fs::write(&path, r#"{"terminal_id":"T1"}"#).unwrap();
        let service = FileConfigService::new(&path);
        assert_eq!(service.get_terminal_id().await.unwrap().as_deref(), Some("T1"));

        std::fs::write(&path, r#"{"terminal_id":"T2"}"#).unwrap();
        assert_eq!(service.get_terminal_id().await.unwrap().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("terminal.json");
        std::fs::write(&path, "{oops").unwrap();
        let service = FileConfigService::new(&path);
        assert!(matches!(
            service.get_terminal_id().await,
            Err(ShiftError::ConfigMalformed { .. })
        ));
    }
}
