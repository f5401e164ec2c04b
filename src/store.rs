//! Shared state store
//!
//! One `StoreWriter` (held by the poller) publishes `StoreState` values
//! through a `watch` channel; any number of `StoreReader`s observe them.
//!
//! Every fetch takes a `Ticket` before it starts; tickets share one issue
//! order across resources. A success is applied only if it is newer than the
//! last success for its resource, and data that several sources replace (the
//! snapshot, health) only if it is newer than whatever filled it last. A
//! failure is recorded only if nothing newer has completed. Tickets from an
//! earlier generation are dropped, so nothing lands after the poller stops.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::types::{
    AgentMetrics, DashboardPayload, HealthStatus, SentimentSummary, Snapshot, SnapshotState, Trade,
};

/// Something the store tracks fetch status for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Resource {
    Health,
    Dashboard,
    AgentMetrics,
    Sentiment(String),
    Socket,
}

impl Resource {
    /// A success on this resource proves the backend is reachable
    pub fn marks_connected(&self) -> bool {
        matches!(self, Resource::Health | Resource::Dashboard | Resource::Socket)
    }

    /// Failures on this resource can flip the store to disconnected.
    /// The socket is excluded: polling keeps running while it reconnects.
    pub fn can_disconnect(&self) -> bool {
        matches!(self, Resource::Health | Resource::Dashboard)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Health => write!(f, "health"),
            Resource::Dashboard => write!(f, "dashboard"),
            Resource::AgentMetrics => write!(f, "agent_metrics"),
            Resource::Sentiment(symbol) => write!(f, "sentiment:{}", symbol),
            Resource::Socket => write!(f, "socket"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FetchPhase {
    #[default]
    Idle,
    Fetching,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStatus {
    pub phase: FetchPhase,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Epoch milliseconds
    pub last_success_at: Option<i64>,
}

/// What every widget reads
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub snapshot: SnapshotState,
    pub health: Option<HealthStatus>,
    /// Whether the latest health/dashboard cycle succeeded
    pub connected: bool,
    pub base_url: String,
    pub agent_metrics: BTreeMap<String, AgentMetrics>,
    pub sentiment: BTreeMap<String, SentimentSummary>,
    pub resources: BTreeMap<Resource, ResourceStatus>,
    /// Epoch milliseconds of the last successful write
    pub updated_at: Option<i64>,
    /// Bumped on every applied write
    pub version: u64,
}

impl StoreState {
    pub fn status(&self, resource: &Resource) -> ResourceStatus {
        self.resources.get(resource).cloned().unwrap_or_default()
    }

    /// First error among the connectivity-driving resources
    pub fn last_error(&self) -> Option<&str> {
        self.resources
            .iter()
            .filter(|(resource, _)| resource.marks_connected())
            .find_map(|(_, status)| status.last_error.as_deref())
    }

    /// Error text the health endpoint itself reports
    pub fn backend_error(&self) -> Option<&str> {
        self.health
            .as_ref()
            .and_then(|h| h.last_error.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.ready()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub max_recent_trades: usize,
    pub disconnect_after_failures: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_recent_trades: 50,
            disconnect_after_failures: 1,
        }
    }
}

/// Claim on one in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    resource: Resource,
    seq: u64,
    generation: u64,
}

impl Ticket {
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}

/// Store data that more than one resource can replace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Snapshot,
    Health,
}

#[derive(Debug, Default)]
struct Ledger {
    generation: u64,
    /// Issue order shared by every resource
    last_seq: u64,
    pending: HashMap<Resource, u32>,
    succeeded: HashMap<Resource, u64>,
    failed: HashMap<Resource, u64>,
    /// Newest ticket whose data landed in each slot, whichever resource wrote it
    slots: HashMap<Slot, u64>,
}

impl Ledger {
    /// Retire one in-flight request; returns whether others remain
    fn finish(&mut self, resource: &Resource) -> bool {
        match self.pending.get_mut(resource) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count > 0
            }
            None => false,
        }
    }
}

/// How a completion is taken into the store
#[derive(Debug, Clone, Copy)]
struct Verdict {
    /// Carries data (or an error) newer than what the store holds
    fresh: bool,
    /// A success newer than the last recorded failure
    clears_error: bool,
    still_fetching: bool,
}

fn set_phase(state: &mut Arc<StoreState>, resource: &Resource, still_fetching: bool) -> bool {
    let phase = if still_fetching {
        FetchPhase::Fetching
    } else {
        FetchPhase::Idle
    };
    if state.resources.get(resource).map(|s| s.phase).unwrap_or_default() == phase {
        return false;
    }
    Arc::make_mut(state)
        .resources
        .entry(resource.clone())
        .or_default()
        .phase = phase;
    true
}

/// Create a store; the writer goes to the poller, readers to widgets
pub fn channel(base_url: impl Into<String>, options: StoreOptions) -> (StoreWriter, StoreReader) {
    let state = StoreState {
        base_url: base_url.into(),
        ..StoreState::default()
    };
    let (tx, rx) = watch::channel(Arc::new(state));
    (
        StoreWriter {
            tx,
            ledger: Mutex::new(Ledger::default()),
            options,
        },
        StoreReader { rx },
    )
}

/// The only handle that can change the store
pub struct StoreWriter {
    tx: watch::Sender<Arc<StoreState>>,
    ledger: Mutex<Ledger>,
    options: StoreOptions,
}

impl fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWriter")
            .field("options", &self.options)
            .finish()
    }
}

impl StoreWriter {
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // Ledger updates are single assignments, a poisoned lock is still consistent
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a request that is about to start
    pub fn begin(&self, resource: Resource) -> Ticket {
        let ticket = {
            let mut ledger = self.ledger();
            ledger.last_seq += 1;
            *ledger.pending.entry(resource.clone()).or_insert(0) += 1;
            Ticket {
                resource,
                seq: ledger.last_seq,
                generation: ledger.generation,
            }
        };
        let resource = ticket.resource.clone();
        self.tx
            .send_if_modified(|state| set_phase(state, &resource, true));
        ticket
    }

    /// Judge a successful completion.
    ///
    /// Data is taken if the ticket is newer than the last success for its
    /// resource and, for shared slots, newer than whatever filled the slot.
    fn settle_success(&self, ticket: &Ticket, slot: Option<Slot>) -> Option<Verdict> {
        let mut ledger = self.ledger();
        if ticket.generation != ledger.generation {
            debug!(resource = %ticket.resource, "Discarding response from a stopped poller");
            return None;
        }
        let still_fetching = ledger.finish(&ticket.resource);
        let newest = ledger.succeeded.get(&ticket.resource).copied().unwrap_or(0);
        if ticket.seq <= newest {
            debug!(
                resource = %ticket.resource,
                seq = ticket.seq,
                newest = newest,
                "Discarding out-of-order response"
            );
            return Some(Verdict {
                fresh: false,
                clears_error: false,
                still_fetching,
            });
        }
        ledger.succeeded.insert(ticket.resource.clone(), ticket.seq);
        let clears_error = ticket.seq > ledger.failed.get(&ticket.resource).copied().unwrap_or(0);
        let fresh = match slot {
            Some(slot) => {
                let filled = ledger.slots.entry(slot).or_insert(0);
                if ticket.seq > *filled {
                    *filled = ticket.seq;
                    true
                } else {
                    debug!(
                        resource = %ticket.resource,
                        seq = ticket.seq,
                        newest = *filled,
                        "Newer data already written by another source"
                    );
                    false
                }
            }
            None => true,
        };
        Some(Verdict {
            fresh,
            clears_error,
            still_fetching,
        })
    }

    /// Judge a failed completion. Failures older than a success or a newer
    /// failure only settle the phase.
    fn settle_failure(&self, ticket: &Ticket) -> Option<Verdict> {
        let mut ledger = self.ledger();
        if ticket.generation != ledger.generation {
            debug!(resource = %ticket.resource, "Discarding failure from a stopped poller");
            return None;
        }
        let still_fetching = ledger.finish(&ticket.resource);
        let succeeded = ledger.succeeded.get(&ticket.resource).copied().unwrap_or(0);
        let failed = ledger.failed.get(&ticket.resource).copied().unwrap_or(0);
        let fresh = ticket.seq > succeeded && ticket.seq > failed;
        if fresh {
            ledger.failed.insert(ticket.resource.clone(), ticket.seq);
        } else {
            debug!(resource = %ticket.resource, seq = ticket.seq, "Discarding stale failure");
        }
        Some(Verdict {
            fresh,
            clears_error: false,
            still_fetching,
        })
    }

    fn commit<F>(&self, ticket: &Ticket, slot: Option<Slot>, apply: F) -> bool
    where
        F: FnOnce(&mut StoreState),
    {
        let Some(verdict) = self.settle_success(ticket, slot) else {
            return false;
        };
        let now = chrono::Utc::now().timestamp_millis();
        let resource = ticket.resource.clone();
        self.tx.send_if_modified(|state| {
            if !verdict.fresh && !verdict.clears_error {
                return set_phase(state, &resource, verdict.still_fetching);
            }
            let state = Arc::make_mut(state);
            if verdict.fresh {
                apply(state);
                state.updated_at = Some(now);
            }
            let status = state.resources.entry(resource.clone()).or_default();
            status.phase = if verdict.still_fetching {
                FetchPhase::Fetching
            } else {
                FetchPhase::Idle
            };
            status.last_success_at = Some(now);
            if verdict.clears_error {
                let was_failing = status.consecutive_failures > 0;
                status.last_error = None;
                status.consecutive_failures = 0;
                if resource.marks_connected() {
                    if !state.connected || was_failing {
                        info!(resource = %resource, "Backend reachable");
                    }
                    state.connected = true;
                }
            }
            state.version += 1;
            true
        });
        verdict.fresh
    }

    pub fn apply_health(&self, ticket: &Ticket, health: HealthStatus) -> bool {
        self.commit(ticket, Some(Slot::Health), |state| {
            state.health = Some(health)
        })
    }

    /// Replace the snapshot wholesale. Polling and the push feed share one
    /// ordering here, so the newest issued request wins whichever source it came from.
    pub fn apply_dashboard(&self, ticket: &Ticket, payload: DashboardPayload) -> bool {
        let snapshot = payload.normalize(self.options.max_recent_trades);
        self.commit(ticket, Some(Slot::Snapshot), |state| {
            state.snapshot = SnapshotState::Ready(Arc::new(snapshot))
        })
    }

    pub fn apply_agent_metrics(&self, ticket: &Ticket, metrics: Vec<AgentMetrics>) -> bool {
        self.commit(ticket, None, |state| {
            state.agent_metrics = metrics
                .into_iter()
                .map(|m| (m.agent_id.clone(), m))
                .collect();
        })
    }

    pub fn apply_sentiment(&self, ticket: &Ticket, summary: SentimentSummary) -> bool {
        let Resource::Sentiment(symbol) = ticket.resource.clone() else {
            warn!(resource = %ticket.resource, "Sentiment applied with a non-sentiment ticket");
            return false;
        };
        self.commit(ticket, None, |state| {
            state.sentiment.insert(symbol, summary);
        })
    }

    /// Prepend a pushed trade to the current snapshot.
    ///
    /// Duplicates are dropped, the list stays capped. Without a snapshot the
    /// trade is ignored; the next dashboard fetch carries it anyway.
    pub fn push_trade(&self, ticket: &Ticket, trade: Trade) -> bool {
        let max = self.options.max_recent_trades;
        self.commit(ticket, None, |state| {
            let SnapshotState::Ready(snapshot) = &mut state.snapshot else {
                debug!(symbol = %trade.symbol, "Trade before first snapshot, ignored");
                return;
            };
            let snapshot = Arc::make_mut(snapshot);
            if snapshot
                .recent_trades
                .iter()
                .any(|t| t.dedup_key() == trade.dedup_key())
            {
                return;
            }
            let at = snapshot
                .recent_trades
                .iter()
                .position(|t| t.timestamp <= trade.timestamp)
                .unwrap_or(snapshot.recent_trades.len());
            snapshot.recent_trades.insert(at, trade);
            snapshot.recent_trades.truncate(max);
        })
    }

    /// Record a failed request. Data stays as it was.
    pub fn fail(&self, ticket: &Ticket, message: impl Into<String>) -> bool {
        let Some(verdict) = self.settle_failure(ticket) else {
            return false;
        };
        let resource = ticket.resource.clone();
        if !verdict.fresh {
            self.tx
                .send_if_modified(|state| set_phase(state, &resource, verdict.still_fetching));
            return false;
        }
        let still_fetching = verdict.still_fetching;
        let message = message.into();
        let threshold = self.options.disconnect_after_failures.max(1);
        self.tx.send_modify(|state| {
            let state = Arc::make_mut(state);
            let status = state.resources.entry(resource.clone()).or_default();
            status.phase = if still_fetching {
                FetchPhase::Fetching
            } else {
                FetchPhase::Idle
            };
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            status.last_error = Some(message.clone());
            let failures = status.consecutive_failures;
            if resource.can_disconnect() && failures >= threshold && state.connected {
                warn!(
                    resource = %resource,
                    failures = failures,
                    error = %message,
                    "Backend unreachable, keeping last snapshot"
                );
                state.connected = false;
            }
            state.version += 1;
        });
        true
    }

    /// Make every outstanding ticket stale. Used when polling stops.
    pub fn cancel_outstanding(&self) {
        {
            let mut ledger = self.ledger();
            ledger.generation += 1;
            ledger.pending.clear();
        }
        self.tx.send_if_modified(|state| {
            if state
                .resources
                .values()
                .all(|s| s.phase == FetchPhase::Idle)
            {
                return false;
            }
            for status in Arc::make_mut(state).resources.values_mut() {
                status.phase = FetchPhase::Idle;
            }
            true
        });
    }
}

/// Read-only view for widgets
#[derive(Debug, Clone)]
pub struct StoreReader {
    rx: watch::Receiver<Arc<StoreState>>,
}

impl StoreReader {
    pub fn current(&self) -> Arc<StoreState> {
        self.rx.borrow().clone()
    }

    /// Wait for the next write. Returns false once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Latest state, marking it as seen
    pub fn latest(&mut self) -> Arc<StoreState> {
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(balance: f64) -> DashboardPayload {
        serde_json::from_value(serde_json::json!({ "portfolio": { "balance": balance } }))
            .unwrap()
    }

    fn balance(reader: &StoreReader) -> Option<f64> {
        reader
            .current()
            .snapshot()
            .map(|s| s.portfolio.balance)
    }

    #[test]
    fn starts_unavailable_and_disconnected() {
        let (_writer, reader) = channel("http://backend", StoreOptions::default());
        let state = reader.current();
        assert!(!state.snapshot.is_ready());
        assert!(!state.connected);
        assert_eq!(state.base_url, "http://backend");
    }

    #[test]
    fn older_response_never_overwrites_newer() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let slow = writer.begin(Resource::Dashboard);
        let fast = writer.begin(Resource::Dashboard);

        assert!(writer.apply_dashboard(&fast, payload(200.0)));
        assert!(!writer.apply_dashboard(&slow, payload(100.0)));
        assert_eq!(balance(&reader), Some(200.0));
        assert_eq!(
            reader.current().status(&Resource::Dashboard).phase,
            FetchPhase::Idle
        );
    }

    #[test]
    fn phase_stays_fetching_while_newer_request_in_flight() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let first = writer.begin(Resource::Health);
        let _second = writer.begin(Resource::Health);
        writer.apply_health(&first, HealthStatus::default());
        assert_eq!(
            reader.current().status(&Resource::Health).phase,
            FetchPhase::Fetching
        );
    }

    #[test]
    fn failure_keeps_snapshot_and_flips_connectivity() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let ok = writer.begin(Resource::Dashboard);
        writer.apply_dashboard(&ok, payload(3000.0));
        assert!(reader.current().connected);

        let bad = writer.begin(Resource::Dashboard);
        writer.fail(&bad, "Request timed out");

        let state = reader.current();
        assert!(!state.connected);
        assert_eq!(balance(&reader), Some(3000.0));
        assert_eq!(state.last_error(), Some("Request timed out"));
        assert_eq!(state.status(&Resource::Dashboard).consecutive_failures, 1);
    }

    #[test]
    fn success_clears_error() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let bad = writer.begin(Resource::Health);
        writer.fail(&bad, "connection refused");
        let ok = writer.begin(Resource::Health);
        writer.apply_health(
            &ok,
            HealthStatus {
                running: true,
                ..Default::default()
            },
        );

        let state = reader.current();
        assert!(state.connected);
        assert!(state.last_error().is_none());
        assert!(state.backend_error().is_none());
    }

    #[test]
    fn disconnect_threshold_is_respected() {
        let options = StoreOptions {
            disconnect_after_failures: 3,
            ..Default::default()
        };
        let (writer, reader) = channel("http://backend", options);
        let ok = writer.begin(Resource::Health);
        writer.apply_health(&ok, HealthStatus::default());

        for _ in 0..2 {
            let t = writer.begin(Resource::Health);
            writer.fail(&t, "timeout");
        }
        assert!(reader.current().connected);

        let t = writer.begin(Resource::Health);
        writer.fail(&t, "timeout");
        assert!(!reader.current().connected);
    }

    #[test]
    fn side_resources_do_not_touch_connectivity() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let ok = writer.begin(Resource::Health);
        writer.apply_health(&ok, HealthStatus::default());

        let t = writer.begin(Resource::Sentiment("BTC".to_string()));
        writer.fail(&t, "HTTP 404");
        assert!(reader.current().connected);
    }

    #[test]
    fn cancelled_tickets_are_discarded() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let in_flight = writer.begin(Resource::Dashboard);
        writer.cancel_outstanding();

        assert!(!writer.apply_dashboard(&in_flight, payload(1.0)));
        assert!(!writer.fail(&in_flight, "late"));
        let state = reader.current();
        assert!(!state.snapshot.is_ready());
        assert_eq!(state.version, 0);
        assert_eq!(state.status(&Resource::Dashboard).phase, FetchPhase::Idle);

        // A new generation writes normally
        let fresh = writer.begin(Resource::Dashboard);
        assert!(writer.apply_dashboard(&fresh, payload(5.0)));
        assert_eq!(balance(&reader), Some(5.0));
    }

    #[test]
    fn pushed_trades_are_ordered_deduplicated_and_capped() {
        let options = StoreOptions {
            max_recent_trades: 3,
            ..Default::default()
        };
        let (writer, reader) = channel("http://backend", options);
        let t = writer.begin(Resource::Dashboard);
        writer.apply_dashboard(&t, payload(10.0));

        let trade = |ts: i64| Trade {
            symbol: "BTC".to_string(),
            timestamp: ts,
            ..Default::default()
        };
        for ts in [100, 300, 200, 300, 400] {
            let t = writer.begin(Resource::Socket);
            writer.push_trade(&t, trade(ts));
        }

        let state = reader.current();
        let stamps: Vec<i64> = state
            .snapshot()
            .unwrap()
            .recent_trades
            .iter()
            .map(|t| t.timestamp)
            .collect();
        assert_eq!(stamps, vec![400, 300, 200]);
    }

    #[test]
    fn polled_snapshot_older_than_pushed_one_is_discarded() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let poll = writer.begin(Resource::Dashboard);
        let push = writer.begin(Resource::Socket);

        assert!(writer.apply_dashboard(&push, payload(2.0)));
        assert!(!writer.apply_dashboard(&poll, payload(1.0)));

        let state = reader.current();
        assert_eq!(balance(&reader), Some(2.0));
        // The poll still proves the backend answered
        assert!(state.connected);
        assert_eq!(state.status(&Resource::Dashboard).phase, FetchPhase::Idle);
        assert!(state.status(&Resource::Dashboard).last_success_at.is_some());
    }

    #[test]
    fn pushed_health_older_than_polled_one_is_discarded() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let push = writer.begin(Resource::Socket);
        let poll = writer.begin(Resource::Health);

        writer.apply_health(
            &poll,
            HealthStatus {
                paper_trading: true,
                ..Default::default()
            },
        );
        assert!(!writer.apply_health(&push, HealthStatus::default()));
        assert!(reader.current().health.as_ref().unwrap().paper_trading);
    }

    #[test]
    fn late_success_after_newer_failure_still_lands() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let first = writer.begin(Resource::Dashboard);
        writer.apply_dashboard(&first, payload(1.0));

        let slow = writer.begin(Resource::Dashboard);
        let broken = writer.begin(Resource::Dashboard);
        writer.fail(&broken, "Request timed out");
        assert!(writer.apply_dashboard(&slow, payload(2.0)));

        let state = reader.current();
        assert_eq!(balance(&reader), Some(2.0));
        // The newer failure still stands
        assert!(!state.connected);
        assert_eq!(state.last_error(), Some("Request timed out"));
        assert_eq!(state.status(&Resource::Dashboard).phase, FetchPhase::Idle);
    }

    #[test]
    fn failure_older_than_a_success_is_not_recorded() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let slow = writer.begin(Resource::Health);
        let fast = writer.begin(Resource::Health);
        writer.apply_health(&fast, HealthStatus::default());

        assert!(!writer.fail(&slow, "connection reset"));
        let state = reader.current();
        assert!(state.connected);
        assert!(state.last_error().is_none());
        assert_eq!(state.status(&Resource::Health).phase, FetchPhase::Idle);
    }

    #[test]
    fn trade_without_snapshot_is_ignored() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let t = writer.begin(Resource::Socket);
        writer.push_trade(&t, Trade::default());
        assert!(!reader.current().snapshot.is_ready());
    }

    #[test]
    fn sentiment_keyed_by_symbol() {
        let (writer, reader) = channel("http://backend", StoreOptions::default());
        let t = writer.begin(Resource::Sentiment("ETH".to_string()));
        writer.apply_sentiment(
            &t,
            SentimentSummary {
                bullish_pct: 60.0,
                vote_count: 12,
                ..Default::default()
            },
        );
        assert_eq!(reader.current().sentiment["ETH"].vote_count, 12);
    }

    #[tokio::test]
    async fn readers_are_notified_of_writes() {
        let (writer, mut reader) = channel("http://backend", StoreOptions::default());
        reader.latest();
        let t = writer.begin(Resource::Health);
        writer.apply_health(&t, HealthStatus::default());
        assert!(reader.changed().await);
        assert!(reader.latest().health.is_some());

        drop(writer);
        assert!(!reader.changed().await);
    }
}
