//! Configuration management for TradeWatch
//!
//! Loads from config files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Used when neither an override nor a hostname-based default applies
pub const FALLBACK_API_URL: &str = "http://localhost:8080";

const LOCAL_HOSTNAMES: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub metrics: MetricsConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Explicit override; wins over everything else
    #[serde(default)]
    pub base_url: Option<String>,
    /// Hostname the dashboard is served from (falls back to `$HOSTNAME`)
    #[serde(default)]
    pub hostname: Option<String>,
    /// Backend URL when running on a local host
    pub local_url: String,
    /// Backend URL for any other host
    #[serde(default)]
    pub production_url: Option<String>,
    /// Last resort
    pub fallback_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Bearer token for authenticated endpoints (voting)
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub health_interval_secs: u64,
    pub dashboard_interval_secs: u64,
    pub metrics_interval_secs: u64,
    pub sentiment_interval_secs: u64,
    /// Poll `/api/agents/metrics`
    pub metrics_enabled: bool,
    /// Symbols to poll sentiment for; empty disables sentiment polling
    #[serde(default)]
    pub sentiment_symbols: Vec<String>,
    /// Consecutive health/dashboard failures before the store reports disconnected
    pub disconnect_after_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// ROI denominator when the backend does not report an allocation
    pub default_capital_base: f64,
    /// Trades retained client-side
    pub max_recent_trades: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Subscribe to the push feed in addition to polling
    pub enabled: bool,
    /// Full ws:// URL; derived from the API base URL when unset
    #[serde(default)]
    pub url: Option<String>,
    pub path: String,
    /// Reconnect when nothing useful arrived for this long
    pub silence_secs: u64,
    pub ping_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as `load`, with an extra config file layered on top of the defaults
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        // Override with environment variables (TRADEWATCH__*)
        let builder = builder.add_source(
            Environment::with_prefix("TRADEWATCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("polling.sentiment_symbols")
                .try_parsing(true),
        );

        let app_config = Self::from_builder(builder)?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Builder with every default set and no external sources
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // API defaults
            .set_default("api.local_url", "http://localhost:8080")?
            .set_default("api.fallback_url", FALLBACK_API_URL)?
            .set_default("api.timeout_ms", 10_000)?
            // Polling defaults
            .set_default("polling.health_interval_secs", 5)?
            .set_default("polling.dashboard_interval_secs", 10)?
            .set_default("polling.metrics_interval_secs", 5)?
            .set_default("polling.sentiment_interval_secs", 10)?
            .set_default("polling.metrics_enabled", true)?
            .set_default("polling.sentiment_symbols", Vec::<String>::new())?
            .set_default("polling.disconnect_after_failures", 1)?
            // Metrics defaults
            .set_default("metrics.default_capital_base", 100.0)?
            .set_default("metrics.max_recent_trades", 50)?
            // WebSocket defaults
            .set_default("websocket.enabled", false)?
            .set_default("websocket.path", "/ws")?
            .set_default("websocket.silence_secs", 30)?
            .set_default("websocket.ping_interval_secs", 15)?;
        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject values that would make the poller spin or divide by zero
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("polling.health_interval_secs", self.polling.health_interval_secs),
            ("polling.dashboard_interval_secs", self.polling.dashboard_interval_secs),
            ("polling.metrics_interval_secs", self.polling.metrics_interval_secs),
            ("polling.sentiment_interval_secs", self.polling.sentiment_interval_secs),
        ];
        for (key, value) in intervals {
            if value == 0 {
                bail!("{} must be greater than zero", key);
            }
        }
        if self.api.timeout_ms == 0 {
            bail!("api.timeout_ms must be greater than zero");
        }
        if !(self.metrics.default_capital_base.is_finite() && self.metrics.default_capital_base > 0.0)
        {
            bail!(
                "metrics.default_capital_base must be a positive number, got {}",
                self.metrics.default_capital_base
            );
        }
        if self.polling.disconnect_after_failures == 0 {
            bail!("polling.disconnect_after_failures must be at least 1");
        }
        Ok(())
    }

    /// Backend base URL in effect
    pub fn base_url(&self) -> String {
        let env_host = std::env::var("HOSTNAME").ok();
        resolve_base_url(&self.api, env_host.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    /// Push-feed URL: explicit setting, else the base URL with a ws scheme
    pub fn websocket_url(&self) -> String {
        match self.websocket.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => derive_ws_url(&self.base_url(), &self.websocket.path),
        }
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "api={} timeout_ms={} health={}s dashboard={}s metrics={}s sentiment={:?} ws={} capital_base={:.2} auth={}",
            self.base_url(),
            self.api.timeout_ms,
            self.polling.health_interval_secs,
            self.polling.dashboard_interval_secs,
            self.polling.metrics_interval_secs,
            self.polling.sentiment_symbols,
            self.websocket.enabled,
            self.metrics.default_capital_base,
            if self.api.auth_token.is_some() { "set" } else { "none" },
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Resolve the backend URL: explicit override, else hostname-based default,
/// else the hardcoded fallback.
pub fn resolve_base_url(api: &ApiConfig, env_hostname: Option<&str>) -> String {
    let non_empty = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(url) = non_empty(api.base_url.as_deref()) {
        return url.trim_end_matches('/').to_string();
    }

    let hostname = non_empty(api.hostname.as_deref()).or_else(|| non_empty(env_hostname));
    let by_host = hostname.and_then(|host| {
        if LOCAL_HOSTNAMES.contains(&host.to_lowercase().as_str()) {
            non_empty(Some(api.local_url.as_str()))
        } else {
            non_empty(api.production_url.as_deref())
        }
    });

    by_host
        .or_else(|| non_empty(Some(api.fallback_url.as_str())))
        .unwrap_or_else(|| FALLBACK_API_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn derive_ws_url(base_url: &str, path: &str) -> String {
    let base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
