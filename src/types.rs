//! Core types shared by the client, the store and the metrics layer
//!
//! Backend payloads land in `Raw*` types where every field is optional.
//! `DashboardPayload::normalize` is the single place where missing values
//! are replaced by defaults; everything downstream works on the fully
//! populated `Snapshot`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Glyph used when an agent id is not in the directory
pub const DEFAULT_AGENT_EMOJI: &str = "🤖";

/// Static identity table: (agent id, display name, emoji)
const AGENT_DIRECTORY: &[(&str, &str, &str)] = &[
    ("claude", "Claude", "🧠"),
    ("gpt", "GPT", "🟢"),
    ("gemini", "Gemini", "♊"),
    ("grok", "Grok", "⚡"),
    ("deepseek", "DeepSeek", "🐋"),
    ("qwen", "Qwen", "🐉"),
    ("llama", "Llama", "🦙"),
    ("mistral", "Mistral", "🌬️"),
];

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

impl Side {
    /// Parse the loose spellings the backend uses ("BUY", "long", "short", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "long" | "bid" => Some(Side::Buy),
            "sell" | "short" | "ask" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Normalized entities
// ─────────────────────────────────────────────────────────────────

/// `/healthz` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    #[serde(deserialize_with = "lenient::bool_or_default")]
    pub running: bool,
    #[serde(deserialize_with = "lenient::bool_or_default")]
    pub paper_trading: bool,
    #[serde(deserialize_with = "lenient::string")]
    pub last_error: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub service: Option<String>,
}

impl HealthStatus {
    /// Healthy means the backend reports itself running without an error
    pub fn is_healthy(&self) -> bool {
        self.running && self.last_error.as_deref().map_or(true, |e| e.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub leverage: f64,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub balance: f64,
    pub total_exposure: f64,
    /// Open positions keyed by symbol (`SYMBOL@agent` when two agents hold the same symbol)
    pub positions: BTreeMap<String, Position>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    pub status: String,
    pub total_pnl: f64,
    pub total_trades: u64,
    /// Fraction in [0, 1]; only the display layer converts to percent
    pub win_rate: f64,
    pub positions: Vec<Position>,
    pub performance: Vec<PerformancePoint>,
    /// Capital the backend allocated to this agent, when reported
    pub allocation: Option<f64>,
    pub enabled: Option<bool>,
}

impl Agent {
    /// Display name from the static directory, else the backend name, else the id
    pub fn display_name(&self) -> &str {
        match directory_entry(&self.id) {
            Some(entry) => entry.1,
            None if self.name.is_empty() => self.id.as_str(),
            None => self.name.as_str(),
        }
    }

    pub fn emoji(&self) -> &'static str {
        directory_entry(&self.id)
            .map(|entry| entry.2)
            .unwrap_or(DEFAULT_AGENT_EMOJI)
    }
}

fn directory_entry(id: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    let key = id.trim().to_lowercase();
    AGENT_DIRECTORY.iter().find(|(known, _, _)| *known == key)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub notional: f64,
    pub agent_id: Option<String>,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub status: String,
}

impl Trade {
    /// Identity used to drop duplicates when the socket replays a trade
    pub fn dedup_key(&self) -> (i64, &str, Option<&str>) {
        (self.timestamp, self.symbol.as_str(), self.agent_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub services: BTreeMap<String, String>,
    pub cache_connected: bool,
    pub backend_connected: bool,
    pub timestamp: i64,
}

/// Everything one `/api/dashboard` fetch yields, with defaults filled in
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub portfolio: PortfolioSnapshot,
    pub agents: Vec<Agent>,
    /// Newest first
    pub recent_trades: Vec<Trade>,
    pub system_status: SystemStatus,
    pub targets: BTreeMap<String, f64>,
}

/// Store-side view of the snapshot
#[derive(Debug, Clone, Default)]
pub enum SnapshotState {
    /// Nothing fetched successfully yet
    #[default]
    Unavailable,
    Ready(Arc<Snapshot>),
}

impl SnapshotState {
    pub fn ready(&self) -> Option<&Snapshot> {
        match self {
            SnapshotState::Ready(snapshot) => Some(snapshot),
            SnapshotState::Unavailable => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SnapshotState::Ready(_))
    }
}

/// `/api/agents/metrics` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMetrics {
    #[serde(deserialize_with = "lenient::string_or_default")]
    pub agent_id: String,
    #[serde(deserialize_with = "lenient::numeric_map")]
    pub latency: BTreeMap<String, f64>,
    #[serde(deserialize_with = "lenient::numeric_map")]
    pub inference: BTreeMap<String, f64>,
    #[serde(deserialize_with = "lenient::numeric_map")]
    pub performance: BTreeMap<String, f64>,
    #[serde(deserialize_with = "lenient::timestamp_ms_or_default")]
    pub timestamp: i64,
}

/// The metrics endpoint returns one object when filtered by agent and a list otherwise
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AgentMetricsResponse {
    Many(Vec<AgentMetrics>),
    One(AgentMetrics),
}

impl AgentMetricsResponse {
    pub fn into_vec(self) -> Vec<AgentMetrics> {
        match self {
            AgentMetricsResponse::Many(list) => list,
            AgentMetricsResponse::One(single) => vec![single],
        }
    }
}

/// `/api/sentiment/{symbol}` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentSummary {
    #[serde(deserialize_with = "lenient::f64_or_default")]
    pub bullish_pct: f64,
    #[serde(deserialize_with = "lenient::f64_or_default")]
    pub bearish_pct: f64,
    #[serde(deserialize_with = "lenient::f64_or_default")]
    pub neutral_pct: f64,
    #[serde(deserialize_with = "lenient::u64_or_default")]
    pub vote_count: u64,
    #[serde(deserialize_with = "lenient::f64_or_default")]
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl VoteDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bullish" | "bull" | "up" => Some(VoteDirection::Bullish),
            "bearish" | "bear" | "down" => Some(VoteDirection::Bearish),
            "neutral" | "flat" => Some(VoteDirection::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteRequest {
    pub symbol: String,
    pub direction: VoteDirection,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoteReceipt {
    pub points_awarded: i64,
}

/// Acknowledgment for start/stop/emergency-stop
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActionAck {
    pub status: String,
}

/// Acknowledgment for the boolean toggles
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToggleAck {
    pub enabled: Option<bool>,
    pub status: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Raw wire payloads
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPosition {
    #[serde(deserialize_with = "lenient::string")]
    pub symbol: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub side: Option<String>,
    #[serde(alias = "quantity", deserialize_with = "lenient::f64")]
    pub size: Option<f64>,
    #[serde(deserialize_with = "lenient::f64")]
    pub entry_price: Option<f64>,
    #[serde(alias = "mark_price", deserialize_with = "lenient::f64")]
    pub current_price: Option<f64>,
    #[serde(alias = "unrealized_pnl", deserialize_with = "lenient::f64")]
    pub pnl: Option<f64>,
    #[serde(deserialize_with = "lenient::f64")]
    pub pnl_percent: Option<f64>,
    #[serde(deserialize_with = "lenient::f64")]
    pub leverage: Option<f64>,
    #[serde(alias = "agent", deserialize_with = "lenient::string")]
    pub agent_id: Option<String>,
}

impl RawPosition {
    fn normalize(self, fallback_symbol: Option<&str>) -> Position {
        let symbol = self
            .symbol
            .or_else(|| fallback_symbol.map(str::to_string))
            .unwrap_or_default();
        let entry_price = self.entry_price.unwrap_or(0.0);
        let pnl_percent = self.pnl_percent.unwrap_or_else(|| {
            match (self.pnl, self.size) {
                (Some(pnl), Some(size)) if entry_price > 0.0 && size != 0.0 => {
                    pnl / (entry_price * size.abs()) * 100.0
                }
                _ => 0.0,
            }
        });
        Position {
            symbol,
            side: self.side.as_deref().and_then(Side::parse).unwrap_or_default(),
            size: self.size.unwrap_or(0.0),
            entry_price,
            current_price: self.current_price.unwrap_or(entry_price),
            pnl: self.pnl.unwrap_or(0.0),
            pnl_percent,
            leverage: self.leverage.unwrap_or(1.0),
            agent_id: self.agent_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPositions {
    Map(HashMap<String, RawPosition>),
    List(Vec<RawPosition>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPortfolio {
    #[serde(alias = "total_balance", deserialize_with = "lenient::f64")]
    pub balance: Option<f64>,
    #[serde(alias = "exposure", deserialize_with = "lenient::f64")]
    pub total_exposure: Option<f64>,
    #[serde(deserialize_with = "lenient::tolerant")]
    pub positions: Option<RawPositions>,
    #[serde(deserialize_with = "lenient::tolerant")]
    pub alerts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPerformancePoint {
    #[serde(alias = "ts", alias = "time", deserialize_with = "lenient::timestamp_ms")]
    pub timestamp: Option<i64>,
    #[serde(alias = "pnl", alias = "equity", deserialize_with = "lenient::f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAgent {
    #[serde(alias = "agent_id", deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub model: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(alias = "pnl", deserialize_with = "lenient::f64")]
    pub total_pnl: Option<f64>,
    #[serde(alias = "trades", deserialize_with = "lenient::u64")]
    pub total_trades: Option<u64>,
    #[serde(deserialize_with = "lenient::f64")]
    pub win_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::tolerant_vec")]
    pub positions: Vec<RawPosition>,
    #[serde(deserialize_with = "lenient::tolerant_vec")]
    pub performance: Vec<RawPerformancePoint>,
    #[serde(alias = "capital", deserialize_with = "lenient::f64")]
    pub allocation: Option<f64>,
    #[serde(deserialize_with = "lenient::bool")]
    pub enabled: Option<bool>,
}

impl RawAgent {
    /// Agents without an id cannot be keyed or toggled and are dropped
    pub fn normalize(self) -> Option<Agent> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        let mut performance: Vec<PerformancePoint> = self
            .performance
            .into_iter()
            .filter_map(|p| {
                Some(PerformancePoint {
                    timestamp: p.timestamp?,
                    value: p.value?,
                })
            })
            .collect();
        performance.sort_by_key(|p| p.timestamp);

        Some(Agent {
            name: self.name.unwrap_or_else(|| id.clone()),
            model: self.model.unwrap_or_default(),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            total_pnl: self.total_pnl.unwrap_or(0.0),
            total_trades: self.total_trades.unwrap_or(0),
            win_rate: normalize_win_rate(self.win_rate),
            positions: self
                .positions
                .into_iter()
                .map(|p| p.normalize(None))
                .collect(),
            performance,
            allocation: self.allocation.filter(|a| *a > 0.0),
            enabled: self.enabled,
            id,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTrade {
    #[serde(deserialize_with = "lenient::string")]
    pub symbol: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub side: Option<String>,
    #[serde(deserialize_with = "lenient::f64")]
    pub price: Option<f64>,
    #[serde(alias = "size", alias = "qty", deserialize_with = "lenient::f64")]
    pub quantity: Option<f64>,
    #[serde(alias = "value", deserialize_with = "lenient::f64")]
    pub notional: Option<f64>,
    #[serde(alias = "agent", deserialize_with = "lenient::string")]
    pub agent_id: Option<String>,
    #[serde(alias = "ts", alias = "time", deserialize_with = "lenient::timestamp_ms")]
    pub timestamp: Option<i64>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
}

impl RawTrade {
    pub fn normalize(self) -> Trade {
        let price = self.price.unwrap_or(0.0);
        let quantity = self.quantity.unwrap_or(0.0);
        Trade {
            symbol: self.symbol.unwrap_or_default(),
            side: self.side.as_deref().and_then(Side::parse).unwrap_or_default(),
            price,
            quantity,
            notional: self.notional.unwrap_or(price * quantity.abs()),
            agent_id: self.agent_id,
            timestamp: self.timestamp.unwrap_or(0),
            status: self.status.unwrap_or_else(|| "filled".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSystemStatus {
    #[serde(deserialize_with = "lenient::tolerant")]
    pub services: Option<HashMap<String, serde_json::Value>>,
    #[serde(
        alias = "redis_connected",
        alias = "cache",
        deserialize_with = "lenient::bool"
    )]
    pub cache_connected: Option<bool>,
    #[serde(alias = "connected", deserialize_with = "lenient::bool")]
    pub backend_connected: Option<bool>,
    #[serde(deserialize_with = "lenient::timestamp_ms")]
    pub timestamp: Option<i64>,
}

impl RawSystemStatus {
    fn normalize(self) -> SystemStatus {
        let services = self
            .services
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let status = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Bool(true) => "ok".to_string(),
                    serde_json::Value::Bool(false) => "down".to_string(),
                    other => other.to_string(),
                };
                (name, status)
            })
            .collect();
        SystemStatus {
            services,
            cache_connected: self.cache_connected.unwrap_or(false),
            backend_connected: self.backend_connected.unwrap_or(false),
            timestamp: self.timestamp.unwrap_or(0),
        }
    }
}

/// `/api/dashboard` aggregate payload, exactly as loose as the backend sends it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardPayload {
    #[serde(deserialize_with = "lenient::tolerant")]
    pub portfolio: Option<RawPortfolio>,
    #[serde(deserialize_with = "lenient::tolerant_vec")]
    pub positions: Vec<RawPosition>,
    #[serde(alias = "trades", deserialize_with = "lenient::tolerant_vec")]
    pub recent_trades: Vec<RawTrade>,
    #[serde(deserialize_with = "lenient::tolerant_vec")]
    pub agents: Vec<RawAgent>,
    #[serde(deserialize_with = "lenient::tolerant")]
    pub system_status: Option<RawSystemStatus>,
    #[serde(deserialize_with = "lenient::numeric_map")]
    pub targets: BTreeMap<String, f64>,
}

impl DashboardPayload {
    /// Fill every gap with its documented default.
    ///
    /// Positions come from `portfolio.positions` when present, otherwise from
    /// the top-level `positions` list. Trades are sorted newest first and cut
    /// to `max_trades`.
    pub fn normalize(self, max_trades: usize) -> Snapshot {
        let raw_portfolio = self.portfolio.unwrap_or_default();

        let mut positions = BTreeMap::new();
        match raw_portfolio.positions {
            Some(RawPositions::Map(map)) if !map.is_empty() => {
                for (symbol, raw) in map {
                    let position = raw.normalize(Some(&symbol));
                    positions.insert(symbol, position);
                }
            }
            Some(RawPositions::List(list)) if !list.is_empty() => {
                insert_positions(&mut positions, list);
            }
            _ => insert_positions(&mut positions, self.positions),
        }

        let total_exposure = raw_portfolio.total_exposure.unwrap_or_else(|| {
            positions
                .values()
                .map(|p| (p.size * p.current_price).abs())
                .sum()
        });

        let mut recent_trades: Vec<Trade> =
            self.recent_trades.into_iter().map(RawTrade::normalize).collect();
        recent_trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent_trades.truncate(max_trades);

        Snapshot {
            portfolio: PortfolioSnapshot {
                balance: raw_portfolio.balance.unwrap_or(0.0),
                total_exposure,
                positions,
                alerts: raw_portfolio.alerts.unwrap_or_default(),
            },
            agents: self.agents.into_iter().filter_map(RawAgent::normalize).collect(),
            recent_trades,
            system_status: self.system_status.unwrap_or_default().normalize(),
            targets: self.targets,
        }
    }
}

/// Keys are the symbol, then `symbol@agent`, then a `#n` suffix, so no
/// position is overwritten
fn insert_positions(out: &mut BTreeMap<String, Position>, list: Vec<RawPosition>) {
    for raw in list {
        let position = raw.normalize(None);
        let mut key = match (&position.agent_id, out.contains_key(&position.symbol)) {
            (Some(agent), true) => format!("{}@{}", position.symbol, agent),
            _ => position.symbol.clone(),
        };
        if out.contains_key(&key) {
            let base = key;
            let mut n = 2;
            while out.contains_key(&format!("{base}#{n}")) {
                n += 1;
            }
            key = format!("{base}#{n}");
            tracing::debug!(symbol = %position.symbol, key = %key, "Duplicate position key");
        }
        out.insert(key, position);
    }
}

/// Win rates are stored as fractions. Backends that report percentages
/// (anything above 1.0) are scaled down once here.
pub fn normalize_win_rate(raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() && v > 1.0 => (v / 100.0).clamp(0.0, 1.0),
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Epoch values below 10^12 are seconds
pub fn normalize_epoch_millis(ts: i64) -> i64 {
    if ts > 0 && ts < 1_000_000_000_000 {
        ts.saturating_mul(1000)
    } else {
        ts
    }
}

/// Deserializers that never fail on a bad field; they produce `None` instead
pub(crate) mod lenient {
    use chrono::{DateTime, NaiveDateTime};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn value_to_f64(v: &Value) -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|x| x.is_finite())
    }

    fn value_to_timestamp(v: &Value) -> Option<i64> {
        match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(super::normalize_epoch_millis),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(n) = s.parse::<i64>() {
                    return Some(super::normalize_epoch_millis(n));
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.timestamp_millis());
                }
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .ok()
                    .map(|naive| naive.and_utc().timestamp_millis())
            }
            _ => None,
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(value_to_f64))
    }

    pub fn f64_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(f64(d)?.unwrap_or(0.0))
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref()
            .and_then(value_to_f64)
            .filter(|x| *x >= 0.0)
            .map(|x| x as u64))
    }

    pub fn u64_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(u64(d)?.unwrap_or(0))
    }

    /// Booleans, `"true"`/`"false"`-style strings and 0/1
    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::Number(n)) => n.as_f64().map(|x| x != 0.0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn bool_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(bool(d)?.unwrap_or(false))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn string_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(string(d)?.unwrap_or_default())
    }

    pub fn timestamp_ms<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(value_to_timestamp))
    }

    pub fn timestamp_ms_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(timestamp_ms(d)?.unwrap_or(0))
    }

    /// Keep only the numeric entries of an object
    pub fn numeric_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, f64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| value_to_f64(&v).map(|f| (k, f)))
                .collect(),
            _ => BTreeMap::new(),
        })
    }

    /// A sub-object of the wrong shape becomes `None` instead of failing the payload
    pub fn tolerant<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.and_then(|v| match serde_json::from_value::<T>(v) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed payload section");
                None
            }
        }))
    }

    /// Malformed list items are skipped, the rest are kept
    pub fn tolerant_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<T>(item).ok())
                .collect(),
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(_, item)| serde_json::from_value::<T>(item).ok())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        })
    }
}
