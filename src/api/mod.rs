//! Backend API
//!
//! `DashboardApi` is the seam between the sync layer and the network. The
//! poller and the control actions only ever talk to this trait; `ApiClient`
//! is the HTTP implementation.

mod rest;

pub use rest::ApiClient;

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::{
    ActionAck, Agent, AgentMetrics, DashboardPayload, HealthStatus, SentimentSummary, ToggleAck,
    Trade, VoteReceipt, VoteRequest,
};

pub const HEALTH_PATH: &[&str] = &["healthz"];
pub const DASHBOARD_PATH: &[&str] = &["api", "dashboard"];
pub const TRADES_PATH: &[&str] = &["api", "trades"];
pub const AGENTS_PATH: &[&str] = &["api", "agents"];
pub const AGENT_METRICS_PATH: &[&str] = &["api", "agents", "metrics"];
pub const VOTE_PATH: &[&str] = &["api", "vote"];
pub const START_PATH: &[&str] = &["api", "start"];
pub const STOP_PATH: &[&str] = &["api", "stop"];
pub const EMERGENCY_STOP_PATH: &[&str] = &["api", "emergency-stop"];
pub const PAPER_TRADING_PATH: &[&str] = &["api", "paper-trading"];
pub const ERROR_LOG_PATH: &[&str] = &["api", "logs", "error"];

/// Typed access to the trading backend
#[async_trait]
pub trait DashboardApi: Send + Sync + 'static {
    /// Base URL requests are sent to
    fn base_url(&self) -> &str;

    /// GET /healthz
    async fn fetch_health(&self) -> FetchResult<HealthStatus>;

    /// GET /api/dashboard, left un-normalized
    async fn fetch_dashboard(&self) -> FetchResult<DashboardPayload>;

    /// GET /api/trades?limit=
    async fn fetch_trade_history(&self, limit: usize) -> FetchResult<Vec<Trade>>;

    /// GET /api/agents
    async fn fetch_agent_performance(&self) -> FetchResult<Vec<Agent>>;

    /// GET /api/agents/metrics[?agent_id=]
    async fn fetch_agent_metrics(&self, agent_id: Option<&str>) -> FetchResult<Vec<AgentMetrics>>;

    /// GET /api/sentiment/{symbol}
    async fn fetch_sentiment(&self, symbol: &str) -> FetchResult<SentimentSummary>;

    /// POST /api/vote (authenticated)
    async fn submit_vote(&self, vote: &VoteRequest) -> FetchResult<VoteReceipt>;

    async fn post_start(&self) -> FetchResult<ActionAck>;

    async fn post_stop(&self) -> FetchResult<ActionAck>;

    async fn emergency_stop(&self) -> FetchResult<ActionAck>;

    /// POST /api/agents/{id}/toggle
    async fn set_agent_enabled(&self, agent_id: &str, enabled: bool) -> FetchResult<ToggleAck>;

    /// POST /api/paper-trading
    async fn set_paper_trading(&self, enabled: bool) -> FetchResult<ToggleAck>;
}
