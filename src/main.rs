//! Headless monitor and control CLI for the trading backend

use anyhow::{bail, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tradewatch::boundary::ErrorBoundary;
use tradewatch::controls::{AgentToggles, Controls, Notice, PaperTradingToggle};
use tradewatch::metrics::{self, AgentCard, PortfolioSummary};
use tradewatch::store::StoreState;
use tradewatch::types::{Snapshot, SnapshotState, VoteDirection};
use tradewatch::{ApiClient, AppConfig, Job, Poller};

#[derive(Parser)]
#[command(name = "tradewatch", version, about = "Live monitor for the automated-trading backend")]
struct Cli {
    /// Extra config file layered over config/default and config/local
    #[arg(long, env = "TRADEWATCH_CONFIG")]
    config: Option<String>,

    /// Backend base URL, overrides every other source
    #[arg(long)]
    api_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the backend and log every change (default)
    Watch {
        /// Fetch health and dashboard once, print the summary and exit
        #[arg(long)]
        once: bool,
    },
    /// Start the trading bot
    Start,
    /// Stop the trading bot
    Stop,
    /// Halt trading and flatten positions immediately
    EmergencyStop,
    /// Enable or disable one agent
    ToggleAgent {
        agent_id: String,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
    /// Switch paper-trading mode
    PaperTrading {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
    /// Cast a sentiment vote (needs api.auth_token)
    Vote {
        symbol: String,
        #[arg(value_parser = parse_direction)]
        direction: VoteDirection,
        #[arg(long, default_value_t = 0.7)]
        confidence: f64,
    },
}

fn parse_direction(s: &str) -> std::result::Result<VoteDirection, String> {
    VoteDirection::parse(s).ok_or_else(|| format!("unknown direction '{s}', use bullish/bearish/neutral"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut cfg = AppConfig::load_from(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        cfg.api.base_url = Some(url);
    }
    info!(config = %cfg, "Configuration loaded");

    let api = Arc::new(ApiClient::from_config(&cfg)?);

    match cli.command.unwrap_or(Command::Watch { once: false }) {
        Command::Watch { once } => watch(api, &cfg, once).await,
        Command::Start => report(Controls::new(api).start().await),
        Command::Stop => report(Controls::new(api).stop().await),
        Command::EmergencyStop => report(Controls::new(api).emergency_stop().await),
        Command::ToggleAgent { agent_id, enabled } => {
            report(AgentToggles::new().toggle(api.as_ref(), &agent_id, enabled).await)
        }
        Command::PaperTrading { enabled } => {
            report(PaperTradingToggle::new().toggle(api.as_ref(), enabled).await)
        }
        Command::Vote {
            symbol,
            direction,
            confidence,
        } => report(Controls::new(api).vote(&symbol, direction, confidence).await),
    }
}

fn report(notice: Notice) -> Result<()> {
    if notice.is_error() {
        bail!("{}", notice.text);
    }
    info!("{}", notice.text);
    Ok(())
}

async fn watch(api: Arc<ApiClient>, cfg: &AppConfig, once: bool) -> Result<()> {
    let boundary = ErrorBoundary::new(api.clone());
    let capital_base = cfg.metrics.default_capital_base;
    let mut poller = Poller::from_config(api, cfg);
    let mut reader = poller.reader();

    if once {
        poller.refresh(Job::Health).await;
        poller.refresh(Job::Dashboard).await;
        let state = reader.latest();
        log_state(&boundary, &state, capital_base);
        if !state.connected {
            bail!(
                "Backend unreachable: {}",
                state.last_error().unwrap_or("no response")
            );
        }
        return Ok(());
    }

    poller.start();
    let mut last_snapshot: Option<Arc<Snapshot>> = None;
    let mut was_connected = false;

    loop {
        tokio::select! {
            alive = reader.changed() => {
                if !alive {
                    warn!("Store closed");
                    break;
                }
                let state = reader.latest();
                let snapshot = match &state.snapshot {
                    SnapshotState::Ready(snapshot) => Some(snapshot.clone()),
                    SnapshotState::Unavailable => None,
                };
                let fresh = match (&snapshot, &last_snapshot) {
                    (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
                    (new, _) => new.is_some(),
                };
                if fresh || state.connected != was_connected {
                    log_state(&boundary, &state, capital_base);
                } else {
                    debug!(version = state.version, "Store updated");
                }
                last_snapshot = snapshot;
                was_connected = state.connected;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    poller.stop();
    Ok(())
}

/// One summary line for the portfolio and one per agent
fn log_state(boundary: &ErrorBoundary, state: &StoreState, capital_base: f64) {
    if !state.connected {
        warn!(
            base_url = %state.base_url,
            error = state.last_error().unwrap_or("no response yet"),
            "Backend disconnected"
        );
    }
    if let Some(error) = state.backend_error() {
        warn!(error = %error, "Backend reports an error");
    }
    let Some(snapshot) = state.snapshot() else {
        info!("Waiting for first snapshot");
        return;
    };
    let updated = state
        .updated_at
        .map(metrics::time_ago_now)
        .unwrap_or_else(|| "never".to_string());

    let rendered = boundary.render("portfolio", || {
        Ok::<_, String>(PortfolioSummary::from_snapshot(snapshot))
    });
    if let Ok(summary) = rendered {
        info!(
            balance = summary.balance,
            exposure = summary.total_exposure,
            unrealized = %metrics::format_signed_usd(summary.unrealized_pnl),
            realized = %metrics::format_signed_usd(summary.realized_pnl),
            positions = summary.open_positions,
            agents = summary.active_agents,
            connected = state.connected,
            updated = %updated,
            "Portfolio"
        );
    }

    let rendered = boundary.render("agents", || {
        Ok::<_, String>(metrics::agent_cards(snapshot, capital_base))
    });
    for card in rendered.unwrap_or_default() {
        log_agent(&card);
    }
}

fn log_agent(card: &AgentCard) {
    info!(
        agent = %card.id,
        status = %card.status,
        pnl = %metrics::format_signed_usd(card.total_pnl),
        roi = %format!("{:.2}%", card.roi_percent),
        win_rate = %card.win_rate,
        trades = card.total_trades,
        enabled = card.enabled,
        "{} {}",
        card.emoji,
        card.name
    );
}
