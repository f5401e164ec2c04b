//! Scriptable in-memory backend for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::DashboardApi;
use crate::error::{FetchError, FetchResult};
use crate::types::{
    ActionAck, Agent, AgentMetrics, DashboardPayload, HealthStatus, SentimentSummary, ToggleAck,
    Trade, VoteReceipt, VoteRequest,
};

pub(crate) fn dashboard_with_balance(balance: f64) -> DashboardPayload {
    serde_json::from_value(serde_json::json!({ "portfolio": { "balance": balance } })).unwrap()
}

pub(crate) struct FakeState {
    pub health: FetchResult<HealthStatus>,
    pub health_delay: Duration,
    /// Consumed one per call before falling back to `dashboard`
    pub dashboard_script: VecDeque<(Duration, FetchResult<DashboardPayload>)>,
    pub dashboard: FetchResult<DashboardPayload>,
    pub metrics: FetchResult<Vec<AgentMetrics>>,
    pub sentiment: FetchResult<SentimentSummary>,
    pub action: FetchResult<ActionAck>,
    pub toggle: FetchResult<ToggleAck>,
    pub toggle_delay: Duration,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            health: Ok(HealthStatus {
                running: true,
                ..Default::default()
            }),
            health_delay: Duration::ZERO,
            dashboard_script: VecDeque::new(),
            dashboard: Ok(dashboard_with_balance(1000.0)),
            metrics: Ok(Vec::new()),
            sentiment: Ok(SentimentSummary::default()),
            action: Ok(ActionAck {
                status: "ok".to_string(),
            }),
            toggle: Ok(ToggleAck::default()),
            toggle_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeApi {
    pub fn with(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    fn hit(&self, endpoint: &'static str) {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
    }

    async fn delayed<T>(delay: Duration, result: FetchResult<T>) -> FetchResult<T> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    fn base_url(&self) -> &str {
        "http://fake.backend"
    }

    async fn fetch_health(&self) -> FetchResult<HealthStatus> {
        self.hit("health");
        let (delay, result) = {
            let state = self.state.lock().unwrap();
            (state.health_delay, state.health.clone())
        };
        Self::delayed(delay, result).await
    }

    async fn fetch_dashboard(&self) -> FetchResult<DashboardPayload> {
        self.hit("dashboard");
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            match state.dashboard_script.pop_front() {
                Some(step) => step,
                None => (Duration::ZERO, state.dashboard.clone()),
            }
        };
        Self::delayed(delay, result).await
    }

    async fn fetch_trade_history(&self, _limit: usize) -> FetchResult<Vec<Trade>> {
        self.hit("trades");
        Ok(Vec::new())
    }

    async fn fetch_agent_performance(&self) -> FetchResult<Vec<Agent>> {
        self.hit("agents");
        Ok(Vec::new())
    }

    async fn fetch_agent_metrics(&self, _agent_id: Option<&str>) -> FetchResult<Vec<AgentMetrics>> {
        self.hit("metrics");
        self.state.lock().unwrap().metrics.clone()
    }

    async fn fetch_sentiment(&self, _symbol: &str) -> FetchResult<SentimentSummary> {
        self.hit("sentiment");
        self.state.lock().unwrap().sentiment.clone()
    }

    async fn submit_vote(&self, _vote: &VoteRequest) -> FetchResult<VoteReceipt> {
        self.hit("vote");
        Err(FetchError::Unauthorized)
    }

    async fn post_start(&self) -> FetchResult<ActionAck> {
        self.hit("start");
        self.state.lock().unwrap().action.clone()
    }

    async fn post_stop(&self) -> FetchResult<ActionAck> {
        self.hit("stop");
        self.state.lock().unwrap().action.clone()
    }

    async fn emergency_stop(&self) -> FetchResult<ActionAck> {
        self.hit("emergency_stop");
        self.state.lock().unwrap().action.clone()
    }

    async fn set_agent_enabled(&self, _agent_id: &str, enabled: bool) -> FetchResult<ToggleAck> {
        self.hit("toggle_agent");
        let (delay, result) = {
            let state = self.state.lock().unwrap();
            (state.toggle_delay, state.toggle.clone())
        };
        Self::delayed(delay, result).await.map(|ack| ToggleAck {
            enabled: ack.enabled.or(Some(enabled)),
            ..ack
        })
    }

    async fn set_paper_trading(&self, enabled: bool) -> FetchResult<ToggleAck> {
        self.hit("paper_trading");
        self.state
            .lock()
            .unwrap()
            .toggle
            .clone()
            .map(|ack| ToggleAck {
                enabled: ack.enabled.or(Some(enabled)),
                ..ack
            })
    }
}
