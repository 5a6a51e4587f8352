//! File-backed durable session cache.
//!
//! A small key/value store that survives restarts. Values are JSON; the keys
//! the session core relies on are `staff`, `activeShift` and
//! `lastKnownTerminalId`. Two read-only fallbacks live here as well: the
//! legacy `user` record written by older builds and the `staffDirectory` map
//! used to put a name on synthesized staff.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "staff": { "staffId": "S1", ... },
//!     "activeShift": { "id": "shift-1", "status": "active", ... },
//!     "lastKnownTerminalId": "T1"
//!   }
//! }
//! ```
//!
//! # Recovery
//!
//! - Empty or corrupt files load as an empty cache (logged, never fatal)
//! - Entries that fail to deserialize are dropped on read
//! - A cached shift whose status is not `active` is evicted on read and never written
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write never leaves a torn file.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shiftkeeper_protocol::{ActiveShift, Staff};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, ShiftError};

pub const STAFF_KEY: &str = "staff";
pub const ACTIVE_SHIFT_KEY: &str = "activeShift";
pub const LAST_KNOWN_TERMINAL_KEY: &str = "lastKnownTerminalId";
pub const LEGACY_USER_KEY: &str = "user";
pub const STAFF_DIRECTORY_KEY: &str = "staffDirectory";

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, Value>,
}

/// Login record written by builds that predate the staff record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUser {
    #[serde(default, alias = "branch_id")]
    pub branch_id: Option<String>,
    #[serde(default, alias = "terminal_id")]
    pub terminal_id: Option<String>,
}

/// The persisted session pair plus the terminal it was recorded on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub staff: Option<Staff>,
    pub active_shift: Option<ActiveShift>,
    pub last_known_terminal_id: Option<String>,
}

/// In-memory view of the cache, optionally backed by a file.
///
/// Create with [`SessionCache::load`] to read from disk, or
/// [`SessionCache::new_in_memory`] for tests.
#[derive(Debug)]
pub struct SessionCache {
    entries: BTreeMap<String, Value>,
    file_path: Option<PathBuf>,
}

impl SessionCache {
    pub fn new_in_memory() -> Self {
        SessionCache {
            entries: BTreeMap::new(),
            file_path: None,
        }
    }

    pub fn new(file_path: &Path) -> Self {
        SessionCache {
            entries: BTreeMap::new(),
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn load(file_path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionCache::new(file_path))
            }
            Err(err) => return Err(ShiftError::io("Failed to read session cache", err)),
        };

        if content.trim().is_empty() {
            warn!(path = %file_path.display(), "Empty session cache file, starting empty");
            return Ok(SessionCache::new(file_path));
        }

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.version == CACHE_VERSION => Ok(SessionCache {
                entries: file.entries,
                file_path: Some(file_path.to_path_buf()),
            }),
            Ok(file) => {
                warn!(
                    version = file.version,
                    expected = CACHE_VERSION,
                    "Unsupported session cache version, starting empty"
                );
                Ok(SessionCache::new(file_path))
            }
            Err(err) => {
                warn!(error = %err, "Failed to parse session cache, starting empty");
                Ok(SessionCache::new(file_path))
            }
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn save(&self) -> Result<()> {
        let file_path = self.file_path.as_ref().ok_or(ShiftError::NoBackingFile)?;

        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|err| ShiftError::json("Failed to serialize session cache", err))?;

        let parent_dir = file_path
            .parent()
            .ok_or_else(|| ShiftError::ConfigUnavailable("cache path has no parent".into()))?;
        fs::create_dir_all(parent_dir)
            .map_err(|err| ShiftError::io("Failed to create cache directory", err))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|err| ShiftError::io("Failed to create temp cache file", err))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|err| ShiftError::io("Failed to write temp cache file", err))?;
        temp_file
            .flush()
            .map_err(|err| ShiftError::io("Failed to flush temp cache file", err))?;
        temp_file
            .persist(file_path)
            .map_err(|err| ShiftError::io("Failed to replace session cache", err.error))?;

        Ok(())
    }

    /// Write-through hook: saves file-backed caches, no-op for in-memory ones.
    pub fn flush(&self) -> Result<()> {
        if self.file_path.is_none() {
            return Ok(());
        }
        self.save()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Raw Access
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set_raw(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn read_typed<T: for<'de> Deserialize<'de>>(&mut self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(key, error = %err, "Dropping unreadable cache entry");
                self.entries.remove(key);
                None
            }
        }
    }

    fn write_typed<T: Serialize>(&mut self, key: &str, value: Option<&T>) {
        match value.map(serde_json::to_value) {
            Some(Ok(json)) => {
                self.entries.insert(key.to_string(), json);
            }
            Some(Err(err)) => {
                warn!(key, error = %err, "Failed to serialize cache entry");
            }
            None => {
                self.entries.remove(key);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session Entries
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn staff(&mut self) -> Option<Staff> {
        self.read_typed(STAFF_KEY)
    }

    pub fn set_staff(&mut self, staff: Option<&Staff>) {
        if let Some(staff) = staff {
            self.remember_staff_name(&staff.staff_id, &staff.name);
        }
        self.write_typed(STAFF_KEY, staff);
    }

    /// Returns the cached shift if it is active. Any other status is evicted.
    pub fn active_shift(&mut self) -> Option<ActiveShift> {
        let shift: ActiveShift = self.read_typed(ACTIVE_SHIFT_KEY)?;
        if shift.is_active() {
            return Some(shift);
        }
        debug!(
            shift_id = %shift.id,
            status = shift.status.as_str(),
            "Evicting non-active cached shift"
        );
        self.entries.remove(ACTIVE_SHIFT_KEY);
        None
    }

    /// Stores an active shift. Non-active shifts evict the entry instead.
    pub fn set_active_shift(&mut self, shift: Option<&ActiveShift>) {
        self.write_typed(ACTIVE_SHIFT_KEY, shift.filter(|shift| shift.is_active()));
    }

    pub fn last_known_terminal_id(&mut self) -> Option<String> {
        self.read_typed(LAST_KNOWN_TERMINAL_KEY)
    }

    pub fn set_last_known_terminal_id(&mut self, terminal_id: &str) {
        self.set_raw(LAST_KNOWN_TERMINAL_KEY, Value::String(terminal_id.to_string()));
    }

    pub fn legacy_user(&mut self) -> Option<LegacyUser> {
        self.read_typed(LEGACY_USER_KEY)
    }

    /// Cached display name for a staff id, from the directory or the
    /// persisted staff record.
    pub fn staff_name(&mut self, staff_id: &str) -> Option<String> {
        let directory: Option<HashMap<String, String>> = self.read_typed(STAFF_DIRECTORY_KEY);
        if let Some(name) = directory.and_then(|mut names| names.remove(staff_id)) {
            if !name.trim().is_empty() {
                return Some(name);
            }
        }
        self.staff()
            .filter(|staff| staff.staff_id == staff_id && !staff.name.trim().is_empty())
            .map(|staff| staff.name)
    }

    pub fn remember_staff_name(&mut self, staff_id: &str, name: &str) {
        if staff_id.trim().is_empty() || name.trim().is_empty() {
            return;
        }
        let mut directory: HashMap<String, String> =
            self.read_typed(STAFF_DIRECTORY_KEY).unwrap_or_default();
        directory.insert(staff_id.to_string(), name.to_string());
        self.write_typed(STAFF_DIRECTORY_KEY, Some(&directory));
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        SessionSnapshot {
            staff: self.staff(),
            active_shift: self.active_shift(),
            last_known_terminal_id: self.last_known_terminal_id(),
        }
    }
}
