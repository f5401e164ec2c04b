//! Push feed
//!
//! Optional websocket subscription that runs next to polling. Messages are
//! JSON objects tagged by `type`:
//! - `dashboard`: full payload, replaces the snapshot
//! - `health`: `/healthz` body
//! - `trade`: one trade, prepended to the recent trades
//! - `heartbeat`: keeps the watchdog quiet
//!
//! The feed reconnects forever with capped exponential backoff until the
//! poller signals shutdown.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::store::{Resource, StoreWriter};
use crate::types::{DashboardPayload, HealthStatus, RawTrade};

const SOCKET_BASE_BACKOFF_SECS: u64 = 1;
const SOCKET_MAX_BACKOFF_SECS: u64 = 60;
const SOCKET_BACKOFF_JITTER_RATIO: f64 = 0.20;
const SOCKET_WATCHDOG_TICK_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct SocketSettings {
    pub url: String,
    pub ping_interval: Duration,
    pub silence: Duration,
}

fn should_reconnect_due_to_silence(last_useful_message: Instant, silence: Duration) -> bool {
    last_useful_message.elapsed() >= silence
}

fn backoff_with_jitter_secs(attempt: u32) -> u64 {
    let capped_attempt = attempt.min(16);
    let base = SOCKET_BASE_BACKOFF_SECS.saturating_mul(1u64 << capped_attempt);
    let bounded = base.min(SOCKET_MAX_BACKOFF_SECS).max(1);
    let jitter = 1.0
        + rand::thread_rng().gen_range(-SOCKET_BACKOFF_JITTER_RATIO..=SOCKET_BACKOFF_JITTER_RATIO);
    ((bounded as f64) * jitter)
        .round()
        .clamp(1.0, SOCKET_MAX_BACKOFF_SECS as f64) as u64
}

/// Websocket subscription that writes into the store
pub struct SocketFeed {
    settings: SocketSettings,
    writer: Arc<StoreWriter>,
    shutdown: watch::Receiver<bool>,
}

impl SocketFeed {
    pub fn new(
        settings: SocketSettings,
        writer: Arc<StoreWriter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            writer,
            shutdown,
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Record a socket failure against the store
    fn record_failure(&self, reason: &str) {
        let ticket = self.writer.begin(Resource::Socket);
        self.writer.fail(&ticket, reason);
    }

    /// Wait out the backoff; returns false if shutdown arrived meanwhile
    async fn back_off(&mut self, attempt: u32, reason: &str) -> bool {
        let sleep_secs = backoff_with_jitter_secs(attempt);
        warn!(
            source = "socket",
            reason = reason,
            attempt = attempt,
            sleep_secs = sleep_secs,
            "Push feed reconnect scheduled"
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => true,
            _ = self.shutdown.changed() => false,
        }
    }

    /// Connect, consume, reconnect; returns once shutdown is signalled
    pub async fn run(mut self) {
        let mut reconnect_attempt: u32 = 0;
        while !self.stopping() {
            info!(
                source = "socket",
                url = %self.settings.url,
                attempt = reconnect_attempt + 1,
                "Connecting push feed"
            );

            let stream = match connect_async(self.settings.url.as_str()).await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(source = "socket", error = %e, "Push feed connect failed");
                    self.record_failure(&format!("Push feed unavailable: {e}"));
                    reconnect_attempt = reconnect_attempt.saturating_add(1);
                    if !self.back_off(reconnect_attempt, "connect_failed").await {
                        break;
                    }
                    continue;
                }
            };

            info!(source = "socket", "Push feed connected");
            reconnect_attempt = 0;
            let (mut write, mut read) = stream.split();

            let mut ping_interval =
                tokio::time::interval(self.settings.ping_interval.max(Duration::from_secs(1)));
            ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut watchdog_interval =
                tokio::time::interval(Duration::from_secs(SOCKET_WATCHDOG_TICK_SECS));
            watchdog_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last_useful_message = Instant::now();
            let reason: &'static str = 'socket: loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => match self.handle_message(&text) {
                                Ok(true) => last_useful_message = Instant::now(),
                                Ok(false) => {}
                                Err(e) => warn!(source = "socket", error = %e, "Bad push feed message"),
                            },
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Pong(_))) => last_useful_message = Instant::now(),
                            Some(Ok(Message::Close(_))) => break 'socket "remote_close",
                            Some(Err(e)) => {
                                warn!(source = "socket", error = %e, "Push feed stream error");
                                break 'socket "stream_error";
                            }
                            None => break 'socket "stream_ended",
                            _ => {}
                        }
                    }

                    _ = ping_interval.tick() => {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            warn!(source = "socket", error = %e, "Push feed ping failed");
                            break 'socket "ping_send_failed";
                        }
                    }

                    _ = watchdog_interval.tick() => {
                        if should_reconnect_due_to_silence(last_useful_message, self.settings.silence) {
                            warn!(
                                source = "socket",
                                silence_secs = self.settings.silence.as_secs(),
                                "Push feed silent, reconnecting"
                            );
                            let _ = write.send(Message::Close(None)).await;
                            break 'socket "watchdog_timeout";
                        }
                    }

                    _ = self.shutdown.changed() => {
                        let _ = write.send(Message::Close(None)).await;
                        break 'socket "shutdown";
                    }
                }
            };

            if reason == "shutdown" || self.stopping() {
                break;
            }
            self.record_failure(&format!("Push feed disconnected ({reason})"));
            reconnect_attempt = reconnect_attempt.saturating_add(1);
            if !self.back_off(reconnect_attempt, reason).await {
                break;
            }
        }
        info!(source = "socket", "Push feed stopped");
    }

    /// Apply one text frame. Returns whether it counts as liveness.
    fn handle_message(&self, text: &str) -> Result<bool> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("push feed frame is not JSON")?;
        let Some(kind) = value
            .get("type")
            .or_else(|| value.get("event_type"))
            .and_then(|v| v.as_str())
        else {
            debug!(source = "socket", "Untagged push feed message ignored");
            return Ok(false);
        };
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);

        match kind {
            "dashboard" => {
                let payload: DashboardPayload = serde_json::from_value(data)?;
                let ticket = self.writer.begin(Resource::Socket);
                self.writer.apply_dashboard(&ticket, payload);
                Ok(true)
            }
            "health" => {
                let health: HealthStatus = serde_json::from_value(data)?;
                let ticket = self.writer.begin(Resource::Socket);
                self.writer.apply_health(&ticket, health);
                Ok(true)
            }
            "trade" => {
                let trade = serde_json::from_value::<RawTrade>(data)?.normalize();
                debug!(source = "socket", symbol = %trade.symbol, side = %trade.side, "Trade pushed");
                let ticket = self.writer.begin(Resource::Socket);
                self.writer.push_trade(&ticket, trade);
                Ok(true)
            }
            "heartbeat" | "pong" => Ok(true),
            other => {
                debug!(source = "socket", kind = other, "Unknown push feed message");
                Ok(false)
            }
        }
    }
}
