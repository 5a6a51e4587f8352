//! Fakes shared by the session integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shift_core::{
    ActiveShift, Collaborators, ConfigService, Result, SessionCache, SessionConfig, ShiftAuthority,
    ShiftError, ShiftSession, ShiftStatus, Staff, TerminalCredentialCache, TerminalCredentials,
};
use shiftkeeper_protocol::Envelope;
use tempfile::TempDir;

pub fn shift(id: &str, staff_id: &str, status: ShiftStatus) -> ActiveShift {
    ActiveShift {
        id: id.to_string(),
        staff_id: staff_id.to_string(),
        branch_id: "B1".to_string(),
        terminal_id: "T1".to_string(),
        organization_id: Some("O1".to_string()),
        role_type: "cashier".to_string(),
        status,
        staff_name: None,
        check_in_time: None,
    }
}

pub fn active(id: &str, staff_id: &str) -> ActiveShift {
    shift(id, staff_id, ShiftStatus::Active)
}

pub fn staff(staff_id: &str, name: &str) -> Staff {
    Staff {
        staff_id: staff_id.to_string(),
        name: name.to_string(),
        role: "cashier".to_string(),
        branch_id: "B1".to_string(),
        terminal_id: "T1".to_string(),
        organization_id: Some("O1".to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authority
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Answer {
    /// `{ "success": true, "data": shift }`
    Wrapped(ActiveShift),
    /// The record itself, no envelope.
    Bare(ActiveShift),
    /// `{ "success": false }`
    Rejected,
    Absent,
    Fail,
    Slow(Duration, Box<Answer>),
}

impl Answer {
    pub fn slow(millis: u64, answer: Answer) -> Self {
        Answer::Slow(Duration::from_millis(millis), Box::new(answer))
    }
}

pub struct FakeAuthority {
    by_staff: Mutex<HashMap<String, Answer>>,
    strict: Mutex<Answer>,
    loose: Mutex<Answer>,
    calls: Mutex<Vec<String>>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            by_staff: Mutex::new(HashMap::new()),
            strict: Mutex::new(Answer::Absent),
            loose: Mutex::new(Answer::Absent),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn answer_staff(&self, staff_id: &str, answer: Answer) {
        self.by_staff
            .lock()
            .unwrap()
            .insert(staff_id.to_string(), answer);
    }

    pub fn answer_strict(&self, answer: Answer) {
        *self.strict.lock().unwrap() = answer;
    }

    pub fn answer_loose(&self, answer: Answer) {
        *self.loose.lock().unwrap() = answer;
    }

    /// Every call fails, as if the authority were unreachable.
    pub fn go_offline(&self) {
        self.by_staff.lock().unwrap().clear();
        self.answer_strict(Answer::Fail);
        self.answer_loose(Answer::Fail);
        self.answer_staff("*", Answer::Fail);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn reply(&self, call: String, answer: Answer) -> Result<Option<Envelope<ActiveShift>>> {
        self.calls.lock().unwrap().push(call);
        let mut answer = answer;
        loop {
            match answer {
                Answer::Slow(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    answer = *inner;
                }
                Answer::Wrapped(shift) => return Ok(Some(Envelope::ok(shift))),
                Answer::Bare(shift) => return Ok(Some(Envelope::Bare(shift))),
                Answer::Rejected => return Ok(Some(Envelope::failure("not found"))),
                Answer::Absent => return Ok(None),
                Answer::Fail => return Err(ShiftError::lookup("fake", "connection refused")),
            }
        }
    }
}

#[async_trait]
impl ShiftAuthority for FakeAuthority {
    async fn get_active(&self, staff_id: &str) -> Result<Option<Envelope<ActiveShift>>> {
        let answer = {
            let answers = self.by_staff.lock().unwrap();
            answers
                .get(staff_id)
                .or_else(|| answers.get("*"))
                .cloned()
                .unwrap_or(Answer::Absent)
        };
        self.reply(format!("staff:{}", staff_id), answer).await
    }

    async fn get_active_by_terminal(
        &self,
        branch_id: &str,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        let answer = self.strict.lock().unwrap().clone();
        self.reply(format!("strict:{}/{}", branch_id, terminal_id), answer)
            .await
    }

    async fn get_active_by_terminal_loose(
        &self,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        let answer = self.loose.lock().unwrap().clone();
        self.reply(format!("loose:{}", terminal_id), answer).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Terminal configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticConfig {
    values: Mutex<HashMap<&'static str, String>>,
}

impl StaticConfig {
    pub fn terminal(branch_id: &str, terminal_id: &str, organization_id: &str) -> Self {
        let config = Self::default();
        config.set("branch_id", branch_id);
        config.set("terminal_id", terminal_id);
        config.set("organization_id", organization_id);
        config
    }

    pub fn set(&self, key: &'static str, value: &str) {
        self.values.lock().unwrap().insert(key, value.to_string());
    }

    pub fn unset(&self, key: &'static str) {
        self.values.lock().unwrap().remove(key);
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }
}

#[async_trait]
impl ConfigService for StaticConfig {
    async fn get_branch_id(&self) -> Result<Option<String>> {
        self.get("branch_id")
    }

    async fn get_terminal_id(&self) -> Result<Option<String>> {
        self.get("terminal_id")
    }

    async fn get_organization_id(&self) -> Result<Option<String>> {
        self.get("organization_id")
    }

    async fn get_setting(&self, _category: &str, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticCredentials {
    pub cached: Option<TerminalCredentials>,
    pub refreshed: Option<TerminalCredentials>,
    refreshes: AtomicUsize,
}

impl StaticCredentials {
    pub fn with_organization(cached: Option<&str>, refreshed: Option<&str>) -> Self {
        let credentials = |org: &str| TerminalCredentials {
            terminal_id: Some("T1".to_string()),
            organization_id: Some(org.to_string()),
            api_key: None,
        };
        Self {
            cached: cached.map(credentials),
            refreshed: refreshed.map(credentials),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalCredentialCache for StaticCredentials {
    fn get_cached(&self) -> Option<TerminalCredentials> {
        self.cached.clone()
    }

    async fn refresh(&self) -> Result<TerminalCredentials> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.refreshed
            .clone()
            .ok_or_else(|| ShiftError::Credentials("terminal not provisioned".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub session: Arc<ShiftSession>,
    pub authority: Arc<FakeAuthority>,
    pub config: Arc<StaticConfig>,
    pub credentials: Arc<StaticCredentials>,
    pub cache_path: PathBuf,
    _dir: TempDir,
}

pub struct HarnessBuilder {
    authority: FakeAuthority,
    config: StaticConfig,
    credentials: StaticCredentials,
    session_config: SessionConfig,
    cached_staff: Option<Staff>,
    cached_shift: Option<ActiveShift>,
    last_known_terminal: Option<String>,
    seed: Vec<(String, serde_json::Value)>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            authority: FakeAuthority::new(),
            config: StaticConfig::terminal("B1", "T1", "O1"),
            credentials: StaticCredentials::default(),
            session_config: SessionConfig::default(),
            cached_staff: None,
            cached_shift: None,
            last_known_terminal: None,
            seed: Vec::new(),
        }
    }

    /// Reads the persisted cache back from disk.
    pub fn persisted(&self) -> SessionCache {
        SessionCache::load(&self.cache_path).unwrap()
    }
}

impl HarnessBuilder {
    pub fn authority(mut self, configure: impl FnOnce(&FakeAuthority)) -> Self {
        configure(&self.authority);
        self
    }

    pub fn config(mut self, config: StaticConfig) -> Self {
        self.config = config;
        self
    }

    pub fn credentials(mut self, credentials: StaticCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn cached_staff(mut self, staff: Staff) -> Self {
        self.cached_staff = Some(staff);
        self
    }

    pub fn cached_shift(mut self, shift: ActiveShift) -> Self {
        self.cached_shift = Some(shift);
        self
    }

    pub fn last_known_terminal(mut self, terminal_id: &str) -> Self {
        self.last_known_terminal = Some(terminal_id.to_string());
        self
    }

    pub fn seed(mut self, key: &str, value: serde_json::Value) -> Self {
        self.seed.push((key.to_string(), value));
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("session-cache.json");

        let mut cache = SessionCache::new(&cache_path);
        cache.set_staff(self.cached_staff.as_ref());
        cache.set_active_shift(self.cached_shift.as_ref());
        if let Some(terminal_id) = &self.last_known_terminal {
            cache.set_last_known_terminal_id(terminal_id);
        }
        for (key, value) in self.seed {
            cache.set_raw(&key, value);
        }
        cache.save().unwrap();

        let authority = Arc::new(self.authority);
        let config = Arc::new(self.config);
        let credentials = Arc::new(self.credentials);
        let collaborators = Collaborators {
            config: config.clone(),
            authority: authority.clone(),
            credentials: credentials.clone(),
        };
        let session = ShiftSession::new(
            SessionCache::load(&cache_path).unwrap(),
            collaborators,
            self.session_config,
        );

        Harness {
            session: Arc::new(session),
            authority,
            config,
            credentials,
            cache_path,
            _dir: dir,
        }
    }
}
