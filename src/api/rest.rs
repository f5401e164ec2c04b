//! REST client for the trading backend
//!
//! Every response goes through `read_json`, which folds transport failures,
//! non-2xx statuses and undecodable bodies into `FetchError`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, Response, StatusCode, Url,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    DashboardApi, AGENTS_PATH, AGENT_METRICS_PATH, DASHBOARD_PATH, EMERGENCY_STOP_PATH,
    ERROR_LOG_PATH, HEALTH_PATH, PAPER_TRADING_PATH, START_PATH, STOP_PATH, TRADES_PATH,
    VOTE_PATH,
};
use crate::boundary::{ErrorReport, ErrorSink};
use crate::config::AppConfig;
use crate::error::{FetchError, FetchResult};
use crate::types::{
    ActionAck, Agent, AgentMetrics, AgentMetricsResponse, DashboardPayload, HealthStatus, RawAgent,
    RawTrade, SentimentSummary, ToggleAck, Trade, VoteReceipt, VoteRequest,
};

/// Longest error body kept in `FetchError::Status`
const MAX_ERROR_BODY_CHARS: usize = 200;

/// HTTP client for the dashboard endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Create a new client; `timeout` applies to every request
    pub fn new(base_url: &str, timeout: Duration, auth_token: Option<String>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .with_context(|| format!("Invalid backend base URL: {base_url}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Backend base URL cannot carry a path: {base_url}");
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            base_url,
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(&cfg.base_url(), cfg.timeout(), cfg.api.auth_token.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).query(query).send().await?;
        Self::read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        authenticated: bool,
    ) -> FetchResult<T> {
        debug!(url = %url, "POST");
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if authenticated {
            let token = self.auth_token.as_deref().ok_or(FetchError::Unauthorized)?;
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> FetchResult<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized);
        }

        let text = response.text().await?;
        if !status.is_success() {
            let body: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(status = status.as_u16(), body = %body, "Backend request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Acknowledgment endpoints sometimes answer 200 with no body
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }
}

#[async_trait]
impl DashboardApi for ApiClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_health(&self) -> FetchResult<HealthStatus> {
        self.get_json(self.endpoint(HEALTH_PATH), &[]).await
    }

    async fn fetch_dashboard(&self) -> FetchResult<DashboardPayload> {
        self.get_json(self.endpoint(DASHBOARD_PATH), &[]).await
    }

    async fn fetch_trade_history(&self, limit: usize) -> FetchResult<Vec<Trade>> {
        let raw: Vec<serde_json::Value> = self
            .get_json(self.endpoint(TRADES_PATH), &[("limit", limit.to_string())])
            .await?;
        let mut trades: Vec<Trade> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RawTrade>(v).ok())
            .map(RawTrade::normalize)
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn fetch_agent_performance(&self) -> FetchResult<Vec<Agent>> {
        let raw: Vec<serde_json::Value> = self.get_json(self.endpoint(AGENTS_PATH), &[]).await?;
        Ok(raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RawAgent>(v).ok())
            .filter_map(RawAgent::normalize)
            .collect())
    }

    async fn fetch_agent_metrics(&self, agent_id: Option<&str>) -> FetchResult<Vec<AgentMetrics>> {
        let query: Vec<(&str, String)> = agent_id
            .map(|id| vec![("agent_id", id.to_string())])
            .unwrap_or_default();
        let response: AgentMetricsResponse = self
            .get_json(self.endpoint(AGENT_METRICS_PATH), &query)
            .await?;
        Ok(response.into_vec())
    }

    async fn fetch_sentiment(&self, symbol: &str) -> FetchResult<SentimentSummary> {
        self.get_json(self.endpoint(&["api", "sentiment", symbol]), &[])
            .await
    }

    async fn submit_vote(&self, vote: &VoteRequest) -> FetchResult<VoteReceipt> {
        self.post_json(self.endpoint(VOTE_PATH), vote, true).await
    }

    async fn post_start(&self) -> FetchResult<ActionAck> {
        self.post_json(self.endpoint(START_PATH), &serde_json::json!({}), false)
            .await
    }

    async fn post_stop(&self) -> FetchResult<ActionAck> {
        self.post_json(self.endpoint(STOP_PATH), &serde_json::json!({}), false)
            .await
    }

    async fn emergency_stop(&self) -> FetchResult<ActionAck> {
        self.post_json(
            self.endpoint(EMERGENCY_STOP_PATH),
            &serde_json::json!({}),
            false,
        )
        .await
    }

    async fn set_agent_enabled(&self, agent_id: &str, enabled: bool) -> FetchResult<ToggleAck> {
        self.post_json(
            self.endpoint(&["api", "agents", agent_id, "toggle"]),
            &serde_json::json!({ "enabled": enabled }),
            false,
        )
        .await
    }

    async fn set_paper_trading(&self, enabled: bool) -> FetchResult<ToggleAck> {
        self.post_json(
            self.endpoint(PAPER_TRADING_PATH),
            &serde_json::json!({ "enabled": enabled }),
            false,
        )
        .await
    }
}

#[async_trait]
impl ErrorSink for ApiClient {
    async fn report(&self, report: ErrorReport) {
        let result: FetchResult<serde_json::Value> = self
            .post_json(self.endpoint(ERROR_LOG_PATH), &report, false)
            .await;
        if let Err(e) = result {
            debug!(error = %e, report_id = %report.id, "Error report not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let client =
            ApiClient::new("https://host.example.com/backend/", Duration::from_secs(1), None)
                .unwrap();
        assert_eq!(client.base_url(), "https://host.example.com/backend");
        assert_eq!(
            client.endpoint(DASHBOARD_PATH).as_str(),
            "https://host.example.com/backend/api/dashboard"
        );
        assert_eq!(
            client.endpoint(&["api", "agents", "a/b c", "toggle"]).as_str(),
            "https://host.example.com/backend/api/agents/a%2Fb%20c/toggle"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(ApiClient::new("not a url", Duration::from_secs(1), None).is_err());
        assert!(ApiClient::new("mailto:ops@example.com", Duration::from_secs(1), None).is_err());
    }

    #[tokio::test]
    async fn vote_without_token_is_unauthorized() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1), None).unwrap();
        let vote = VoteRequest {
            symbol: "BTC".to_string(),
            direction: crate::types::VoteDirection::Bullish,
            confidence: 0.7,
        };
        assert_eq!(client.submit_vote(&vote).await, Err(FetchError::Unauthorized));
    }
}
