//! Display-only values derived from the snapshot.
//!
//! Everything here is a pure function of its inputs and is recomputed on
//! every store update; nothing is written back into the store.

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::types::{Agent, Position, Snapshot};

/// ROI denominator used when the backend reports no allocation
pub const DEFAULT_CAPITAL_BASE: f64 = 100.0;

/// Return on investment in percent. A non-positive or non-finite base yields 0.
pub fn roi_percent(pnl: f64, capital_base: f64) -> f64 {
    if !capital_base.is_finite() || capital_base <= 0.0 || !pnl.is_finite() {
        return 0.0;
    }
    pnl / capital_base * 100.0
}

/// Capital an agent's ROI is measured against
pub fn capital_base(agent: &Agent, default_base: f64) -> f64 {
    match agent.allocation {
        Some(allocation) if allocation.is_finite() && allocation > 0.0 => allocation,
        _ => default_base,
    }
}

/// `0.625` -> `"62.5%"`. The only place a win rate becomes a percentage.
pub fn win_rate_display(fraction: f64) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{:.1}%", fraction * 100.0)
}

/// Sum of unrealized pnl across positions
pub fn aggregate_pnl<'a, I>(positions: I) -> f64
where
    I: IntoIterator<Item = &'a Position>,
{
    positions
        .into_iter()
        .map(|p| p.pnl)
        .filter(|pnl| pnl.is_finite())
        .sum()
}

/// `+$12.34` / `-$5.00`
pub fn format_signed_usd(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("{}${:.2}", sign, value.abs())
}

/// Relative age of an epoch-millisecond timestamp.
///
/// Under a minute shows seconds, under an hour shows minutes, anything older
/// shows the local wall-clock time. Timestamps in the future read `0s ago`,
/// missing ones (zero or negative) read `--`.
pub fn time_ago(timestamp_ms: i64, now_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "--".to_string();
    }
    let secs = now_ms.saturating_sub(timestamp_ms).max(0) / 1000;
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        local_clock(timestamp_ms)
    }
}

/// `time_ago` against the current time
pub fn time_ago_now(timestamp_ms: i64) -> String {
    time_ago(timestamp_ms, chrono::Utc::now().timestamp_millis())
}

fn local_clock(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub balance: f64,
    pub total_exposure: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub open_positions: usize,
    pub active_agents: usize,
    pub alerts: usize,
}

impl PortfolioSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            balance: snapshot.portfolio.balance,
            total_exposure: snapshot.portfolio.total_exposure,
            unrealized_pnl: aggregate_pnl(snapshot.portfolio.positions.values()),
            realized_pnl: snapshot
                .agents
                .iter()
                .map(|a| a.total_pnl)
                .filter(|pnl| pnl.is_finite())
                .sum(),
            open_positions: snapshot.portfolio.positions.len(),
            active_agents: snapshot
                .agents
                .iter()
                .filter(|a| a.enabled.unwrap_or(true))
                .count(),
            alerts: snapshot.portfolio.alerts.len(),
        }
    }
}

/// What an agent panel shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCard {
    pub id: String,
    pub name: String,
    pub emoji: &'static str,
    pub status: String,
    pub total_pnl: f64,
    pub roi_percent: f64,
    pub win_rate: String,
    pub total_trades: u64,
    pub open_positions: usize,
    pub enabled: bool,
}

impl AgentCard {
    pub fn from_agent(agent: &Agent, default_base: f64) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.display_name().to_string(),
            emoji: agent.emoji(),
            status: agent.status.clone(),
            total_pnl: agent.total_pnl,
            roi_percent: roi_percent(agent.total_pnl, capital_base(agent, default_base)),
            win_rate: win_rate_display(agent.win_rate),
            total_trades: agent.total_trades,
            open_positions: agent.positions.len(),
            enabled: agent.enabled.unwrap_or(true),
        }
    }
}

/// Cards for every agent, best performer first
pub fn agent_cards(snapshot: &Snapshot, default_base: f64) -> Vec<AgentCard> {
    let mut cards: Vec<AgentCard> = snapshot
        .agents
        .iter()
        .map(|agent| AgentCard::from_agent(agent, default_base))
        .collect();
    cards.sort_by(|a, b| b.roi_percent.total_cmp(&a.roi_percent));
    cards
}
