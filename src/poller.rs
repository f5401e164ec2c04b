//! Polling controller
//!
//! One task per resource ticks on a fixed interval (no backoff) and fetches
//! through `DashboardApi`. Each tick's fetch runs as its own task, so a slow
//! response never delays the schedule; the store's tickets decide which
//! completion wins. Every fetch is bounded by the request timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::config::AppConfig;
use crate::error::{FetchError, FetchResult};
use crate::store::{self, Resource, StoreOptions, StoreReader, StoreWriter};
use crate::websocket::{SocketFeed, SocketSettings};

/// `interval` panics on a zero period
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A recurring fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Health,
    Dashboard,
    AgentMetrics,
    Sentiment(String),
}

impl Job {
    pub fn resource(&self) -> Resource {
        match self {
            Job::Health => Resource::Health,
            Job::Dashboard => Resource::Dashboard,
            Job::AgentMetrics => Resource::AgentMetrics,
            Job::Sentiment(symbol) => Resource::Sentiment(symbol.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub health_interval: Duration,
    pub dashboard_interval: Duration,
    pub metrics_interval: Duration,
    pub sentiment_interval: Duration,
    pub request_timeout: Duration,
    pub metrics_enabled: bool,
    pub sentiment_symbols: Vec<String>,
    /// Push feed; `None` means polling only
    pub socket: Option<SocketSettings>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(5),
            dashboard_interval: Duration::from_secs(10),
            metrics_interval: Duration::from_secs(5),
            sentiment_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            metrics_enabled: true,
            sentiment_symbols: Vec::new(),
            socket: None,
        }
    }
}

impl PollerConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        let socket = cfg.websocket.enabled.then(|| SocketSettings {
            url: cfg.websocket_url(),
            ping_interval: Duration::from_secs(cfg.websocket.ping_interval_secs.max(1)),
            silence: Duration::from_secs(cfg.websocket.silence_secs.max(1)),
        });
        Self {
            health_interval: Duration::from_secs(cfg.polling.health_interval_secs),
            dashboard_interval: Duration::from_secs(cfg.polling.dashboard_interval_secs),
            metrics_interval: Duration::from_secs(cfg.polling.metrics_interval_secs),
            sentiment_interval: Duration::from_secs(cfg.polling.sentiment_interval_secs),
            request_timeout: cfg.timeout(),
            metrics_enabled: cfg.polling.metrics_enabled,
            sentiment_symbols: cfg
                .polling
                .sentiment_symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            socket,
        }
    }

    /// Every recurring job with its interval
    pub fn schedule(&self) -> Vec<(Job, Duration)> {
        let mut jobs = vec![
            (Job::Health, self.health_interval),
            (Job::Dashboard, self.dashboard_interval),
        ];
        if self.metrics_enabled {
            jobs.push((Job::AgentMetrics, self.metrics_interval));
        }
        for symbol in &self.sentiment_symbols {
            jobs.push((Job::Sentiment(symbol.clone()), self.sentiment_interval));
        }
        jobs
    }
}

/// Owns the polling tasks and the store writer
pub struct Poller<A: DashboardApi> {
    api: Arc<A>,
    writer: Arc<StoreWriter>,
    config: PollerConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<A: DashboardApi> Poller<A> {
    pub fn new(api: Arc<A>, writer: StoreWriter, config: PollerConfig) -> Self {
        Self {
            api,
            writer: Arc::new(writer),
            config,
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Build the store from config and wrap it
    pub fn from_config(api: Arc<A>, cfg: &AppConfig) -> Self {
        let options = StoreOptions {
            max_recent_trades: cfg.metrics.max_recent_trades,
            disconnect_after_failures: cfg.polling.disconnect_after_failures,
        };
        let (writer, _) = store::channel(api.base_url(), options);
        Self::new(api, writer, PollerConfig::from_app(cfg))
    }

    pub fn reader(&self) -> StoreReader {
        self.writer.reader()
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Spawn the polling tasks. Must run inside a tokio runtime; a second
    /// call while running does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Poller already running");
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let schedule = self.config.schedule();
        info!(
            jobs = schedule.len(),
            timeout_ms = self.config.request_timeout.as_millis() as u64,
            socket = self.config.socket.is_some(),
            "Polling started"
        );
        for (job, every) in schedule {
            self.tasks.push(tokio::spawn(poll_loop(
                self.api.clone(),
                self.writer.clone(),
                job,
                every,
                self.config.request_timeout,
                shutdown_rx.clone(),
            )));
        }

        if let Some(settings) = self.config.socket.clone() {
            let feed = SocketFeed::new(settings, self.writer.clone(), shutdown_rx.clone());
            self.tasks.push(tokio::spawn(feed.run()));
        }

        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Stop every task. Responses still in flight are discarded.
    pub fn stop(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        let _ = shutdown_tx.send(true);
        self.writer.cancel_outstanding();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Polling stopped");
    }

    /// Fetch one resource now, outside the schedule
    pub async fn refresh(&self, job: Job) -> bool {
        run_once(
            self.api.as_ref(),
            &self.writer,
            &job,
            self.config.request_timeout,
        )
        .await
    }
}

impl<A: DashboardApi> Drop for Poller<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<A: DashboardApi>(
    api: Arc<A>,
    writer: Arc<StoreWriter>,
    job: Job,
    every: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if every < MIN_POLL_INTERVAL {
        warn!(job = %job.resource(), "Zero poll interval, using 1ms");
    }
    let mut ticker = tokio::time::interval(every.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Dropping the set aborts whatever is still in flight
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (api, writer, job) = (api.clone(), writer.clone(), job.clone());
                in_flight.spawn(async move {
                    run_once(api.as_ref(), &writer, &job, timeout).await;
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!(job = %job.resource(), "Poll loop exited");
}

async fn guarded<T, F>(timeout: Duration, request: F) -> FetchResult<T>
where
    F: Future<Output = FetchResult<T>>,
{
    tokio::time::timeout(timeout, request)
        .await
        .unwrap_or_else(|_| Err(FetchError::Timeout))
}

/// One fetch-and-apply cycle. Returns whether the store took the result.
pub async fn run_once<A: DashboardApi + ?Sized>(
    api: &A,
    writer: &StoreWriter,
    job: &Job,
    timeout: Duration,
) -> bool {
    let ticket = writer.begin(job.resource());
    let outcome = match job {
        Job::Health => guarded(timeout, api.fetch_health())
            .await
            .map(|health| writer.apply_health(&ticket, health)),
        Job::Dashboard => guarded(timeout, api.fetch_dashboard())
            .await
            .map(|payload| writer.apply_dashboard(&ticket, payload)),
        Job::AgentMetrics => guarded(timeout, api.fetch_agent_metrics(None))
            .await
            .map(|metrics| writer.apply_agent_metrics(&ticket, metrics)),
        Job::Sentiment(symbol) => guarded(timeout, api.fetch_sentiment(symbol))
            .await
            .map(|summary| writer.apply_sentiment(&ticket, summary)),
    };

    match outcome {
        Ok(applied) => applied,
        Err(e) => {
            warn!(
                resource = %job.resource(),
                base_url = %api.base_url(),
                error = %e,
                "Fetch failed"
            );
            writer.fail(&ticket, e.to_string());
            false
        }
    }
}
