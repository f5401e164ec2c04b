//! User actions: bot start/stop, agent and paper-trading toggles, votes.
//!
//! None of these return errors. Every outcome becomes a `Notice` the UI
//! shows briefly; a failed toggle also reverts to the last confirmed value.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::api::DashboardApi;
use crate::error::FetchError;
use crate::types::{ActionAck, HealthStatus, Snapshot, VoteDirection, VoteRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Transient user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }

    /// Expired sessions get a sign-in prompt instead of `text`
    fn from_failure(text: String, e: &FetchError) -> Self {
        if e.needs_reauth() {
            Self {
                level: NoticeLevel::Warning,
                text: e.to_string(),
            }
        } else {
            Self::error(text)
        }
    }

    pub fn is_error(&self) -> bool {
        self.level != NoticeLevel::Success
    }
}

/// Bot lifecycle actions
pub struct Controls<A: DashboardApi> {
    api: Arc<A>,
}

impl<A: DashboardApi> Controls<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    pub async fn start(&self) -> Notice {
        acknowledge("Start trading", self.api.post_start().await)
    }

    pub async fn stop(&self) -> Notice {
        acknowledge("Stop trading", self.api.post_stop().await)
    }

    pub async fn emergency_stop(&self) -> Notice {
        warn!("Emergency stop requested");
        acknowledge("Emergency stop", self.api.emergency_stop().await)
    }

    /// Submit a sentiment vote; confidence is clamped to [0, 1]
    pub async fn vote(&self, symbol: &str, direction: VoteDirection, confidence: f64) -> Notice {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let request = VoteRequest {
            symbol: symbol.trim().to_uppercase(),
            direction,
            confidence,
        };
        match self.api.submit_vote(&request).await {
            Ok(receipt) => Notice::success(format!(
                "Vote recorded for {}, +{} points",
                request.symbol, receipt.points_awarded
            )),
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "Vote rejected");
                Notice::from_failure(format!("Vote failed: {e}"), &e)
            }
        }
    }
}

fn acknowledge(action: &str, result: Result<ActionAck, FetchError>) -> Notice {
    match result {
        Ok(ack) => {
            info!(action = action, status = %ack.status, "Action acknowledged");
            if ack.status.trim().is_empty() {
                Notice::success(format!("{action}: ok"))
            } else {
                Notice::success(format!("{action}: {}", ack.status))
            }
        }
        Err(e) => {
            warn!(action = action, error = %e, "Action failed");
            Notice::from_failure(format!("{action} failed: {e}"), &e)
        }
    }
}

/// Confirmed backend value plus an optimistic one while a request is out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flag {
    confirmed: Option<bool>,
    pending: Option<bool>,
}

impl Flag {
    fn shown(&self) -> Option<bool> {
        self.pending.or(self.confirmed)
    }

    fn resolve(&mut self, target: bool, acknowledged: Option<bool>) {
        if let Some(value) = acknowledged {
            self.confirmed = Some(value);
        }
        if self.pending == Some(target) {
            self.pending = None;
        }
    }
}

fn verb(enabled: bool) -> &'static str {
    if enabled {
        "enable"
    } else {
        "disable"
    }
}

/// Per-agent enable switches
#[derive(Debug, Default)]
pub struct AgentToggles {
    flags: Mutex<HashMap<String, Flag>>,
}

impl AgentToggles {
    pub fn new() -> Self {
        Self::default()
    }

    fn flags(&self) -> MutexGuard<'_, HashMap<String, Flag>> {
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value to display: optimistic while pending, else confirmed
    pub fn value(&self, agent_id: &str) -> Option<bool> {
        self.flags().get(agent_id).and_then(Flag::shown)
    }

    pub fn is_pending(&self, agent_id: &str) -> bool {
        self.flags()
            .get(agent_id)
            .is_some_and(|f| f.pending.is_some())
    }

    /// Take confirmed values from a fresh snapshot; optimistic values stay
    pub fn sync_from(&self, snapshot: &Snapshot) {
        let mut flags = self.flags();
        for agent in &snapshot.agents {
            if let Some(enabled) = agent.enabled {
                flags.entry(agent.id.clone()).or_default().confirmed = Some(enabled);
            }
        }
    }

    /// Flip an agent optimistically and confirm with the backend
    pub async fn toggle<A: DashboardApi + ?Sized>(
        &self,
        api: &A,
        agent_id: &str,
        target: bool,
    ) -> Notice {
        self.flags().entry(agent_id.to_string()).or_default().pending = Some(target);

        let result = api.set_agent_enabled(agent_id, target).await;

        let mut flags = self.flags();
        let flag = flags.entry(agent_id.to_string()).or_default();
        match result {
            Ok(ack) => {
                let value = ack.enabled.unwrap_or(target);
                flag.resolve(target, Some(value));
                info!(agent = agent_id, enabled = value, "Agent toggle confirmed");
                Notice::success(format!("Agent {agent_id} {}d", verb(value)))
            }
            Err(e) => {
                flag.resolve(target, None);
                warn!(
                    agent = agent_id,
                    requested = target,
                    reverted_to = ?flag.confirmed,
                    error = %e,
                    "Agent toggle failed"
                );
                Notice::from_failure(
                    format!("Could not {} agent {agent_id}: {e}", verb(target)),
                    &e,
                )
            }
        }
    }
}

/// Paper-trading mode switch
#[derive(Debug, Default)]
pub struct PaperTradingToggle {
    flag: Mutex<Flag>,
}

impl PaperTradingToggle {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, Flag> {
        self.flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn value(&self) -> Option<bool> {
        self.flag().shown()
    }

    pub fn is_pending(&self) -> bool {
        self.flag().pending.is_some()
    }

    /// `/healthz` reports the mode the backend is actually in
    pub fn sync_from(&self, health: &HealthStatus) {
        self.flag().confirmed = Some(health.paper_trading);
    }

    pub async fn toggle<A: DashboardApi + ?Sized>(&self, api: &A, target: bool) -> Notice {
        self.flag().pending = Some(target);

        let result = api.set_paper_trading(target).await;

        let mut flag = self.flag();
        match result {
            Ok(ack) => {
                let value = ack.enabled.unwrap_or(target);
                flag.resolve(target, Some(value));
                info!(enabled = value, "Paper trading toggle confirmed");
                Notice::success(format!("Paper trading {}d", verb(value)))
            }
            Err(e) => {
                flag.resolve(target, None);
                warn!(requested = target, error = %e, "Paper trading toggle failed");
                Notice::from_failure(
                    format!("Could not {} paper trading: {e}", verb(target)),
                    &e,
                )
            }
        }
    }
}
