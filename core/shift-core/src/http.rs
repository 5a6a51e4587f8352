//! HTTP transport for the remote shift authority.
//!
//! Endpoints (all `GET`, relative to the configured base URL):
//!
//! - `shifts/active?staff_id=`
//! - `shifts/active/terminal?branch_id=&terminal_id=`
//! - `shifts/active/terminal-loose?terminal_id=`
//!
//! `404` means "no shift"; any other non-2xx status is a lookup error. Bodies
//! are parsed with [`parse_shift_payload`], so bare records, envelopes and
//! `null` are all accepted. Requests run on tokio's blocking pool because
//! the agent is synchronous.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shiftkeeper_protocol::{parse_shift_payload, ActiveShift, Envelope};

use crate::credentials::TerminalCredentialCache;
use crate::error::{Result, ShiftError};
use crate::lookup::ShiftAuthority;

const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpShiftAuthority {
    base_url: String,
    agent: ureq::Agent,
    credentials: Option<Arc<dyn TerminalCredentialCache>>,
}

impl HttpShiftAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            credentials: None,
        }
    }

    /// Sends the cached terminal API key with every request.
    pub fn with_credentials(mut self, credentials: Arc<dyn TerminalCredentialCache>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    async fn fetch(
        &self,
        strategy: &'static str,
        path: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        let url = format!("{}/{}", self.base_url, path);
        let agent = self.agent.clone();
        let api_key = self
            .credentials
            .as_ref()
            .and_then(|credentials| credentials.get_cached())
            .and_then(|credentials| credentials.api_key);

        let body = tokio::task::spawn_blocking(move || -> Result<Option<Value>> {
            let mut request = agent.get(&url);
            for (name, value) in &query {
                request = request.query(name, value);
            }
            if let Some(key) = api_key.as_deref() {
                request = request.set(API_KEY_HEADER, key);
            }

            match request.call() {
                Ok(response) => response.into_json::<Value>().map(Some).map_err(|err| {
                    ShiftError::lookup(strategy, format!("invalid JSON body: {}", err))
                }),
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(ureq::Error::Status(code, _)) => {
                    Err(ShiftError::lookup(strategy, format!("HTTP {}", code)))
                }
                Err(err) => Err(ShiftError::lookup(strategy, err.to_string())),
            }
        })
        .await
        .map_err(|err| ShiftError::lookup(strategy, format!("lookup task failed: {}", err)))??;

        match body {
            Some(value) => parse_shift_payload(value)
                .map_err(|err| ShiftError::lookup(strategy, err.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ShiftAuthority for HttpShiftAuthority {
    async fn get_active(&self, staff_id: &str) -> Result<Option<Envelope<ActiveShift>>> {
        self.fetch(
            "staff_scoped",
            "shifts/active",
            vec![("staff_id", staff_id.to_string())],
        )
        .await
    }

    async fn get_active_by_terminal(
        &self,
        branch_id: &str,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        self.fetch(
            "strict_terminal",
            "shifts/active/terminal",
            vec![
                ("branch_id", branch_id.to_string()),
                ("terminal_id", terminal_id.to_string()),
            ],
        )
        .await
    }

    async fn get_active_by_terminal_loose(
        &self,
        terminal_id: &str,
    ) -> Result<Option<Envelope<ActiveShift>>> {
        self.fetch(
            "loose_terminal",
            "shifts/active/terminal-loose",
            vec![("terminal_id", terminal_id.to_string())],
        )
        .await
    }
}
