//! End-to-end tests against an in-process fake backend

use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use tradewatch::boundary::{ErrorBoundary, ErrorCategory};
use tradewatch::controls::{AgentToggles, Controls, NoticeLevel};
use tradewatch::store::{self, Resource, StoreOptions};
use tradewatch::types::{Agent, Snapshot, VoteDirection};
use tradewatch::{ApiClient, DashboardApi, FetchError, Job, Poller, PollerConfig};

type Reports = Arc<Mutex<Vec<Value>>>;

const TOKEN: &str = "secret-token";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn healthy_backend(reports: Reports) -> Router {
    Router::new()
        .route(
            "/healthz",
            get(|| async { Json(json!({ "running": true, "paper_trading": true, "last_error": null })) }),
        )
        .route(
            "/api/dashboard",
            get(|| async {
                Json(json!({
                    "portfolio": { "balance": 3000.0, "positions": { "BTCUSDT": { "side": "long", "size": 0.1, "entry_price": 60000, "pnl": 12.5 } } },
                    "agents": [ { "id": "claude", "total_pnl": 90, "win_rate": 62.5, "enabled": true } ],
                    "recent_trades": [ { "symbol": "BTCUSDT", "side": "buy", "price": 60000, "quantity": 0.1, "timestamp": 1700000000 } ]
                }))
            }),
        )
        .route(
            "/api/agents/metrics",
            get(|| async { Json(json!([{ "agent_id": "claude", "latency": { "p50_ms": 110 } }])) }),
        )
        .route(
            "/api/sentiment/:symbol",
            get(|Path(symbol): Path<String>| async move {
                Json(json!({ "symbol": symbol, "bullish_pct": 55.0, "vote_count": 20 }))
            }),
        )
        .route(
            "/api/trades",
            get(|| async {
                Json(json!([
                    { "symbol": "ETH", "side": "sell", "price": "2500", "quantity": 1, "timestamp": 1700000100 },
                    "garbage",
                    { "symbol": "BTC", "side": "buy", "price": 60000, "quantity": 0.1, "timestamp": 1700000300 },
                    42,
                    { "symbol": "SOL", "side": "buy", "price": 150, "quantity": 3, "timestamp": 1700000200 }
                ]))
            }),
        )
        .route(
            "/api/agents",
            get(|| async {
                Json(json!([
                    { "id": "gpt", "total_pnl": 10, "win_rate": 0.5 },
                    { "name": "nameless" },
                    { "id": "claude", "total_pnl": "90", "win_rate": 70, "enabled": "true" },
                    7
                ]))
            }),
        )
        .route("/api/vote", post(vote))
        .route("/api/start", post(|| async { Json(json!({ "status": "started" })) }))
        .route("/api/stop", post(|| async { StatusCode::OK }))
        .route("/api/agents/:id/toggle", post(toggle))
        .route("/api/logs/error", post(log_error))
        .with_state(reports)
}

async fn vote(headers: HeaderMap, Json(_body): Json<Value>) -> Response {
    let expected = format!("Bearer {TOKEN}");
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(auth) if auth == expected => Json(json!({ "points_awarded": 5 })).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn toggle(Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "agent locked").into_response();
    }
    Json(json!({ "enabled": body["enabled"], "status": "ok" })).into_response()
}

async fn log_error(State(reports): State<Reports>, Json(body): Json<Value>) -> StatusCode {
    reports.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

fn broken_backend() -> Router {
    Router::new()
        .route(
            "/healthz",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database down") }),
        )
        .route("/api/dashboard", get(|| async { "<html>not json" }))
        .route(
            "/api/agents/metrics",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        )
}

fn client(addr: SocketAddr, token: Option<&str>) -> ApiClient {
    ApiClient::new(
        &format!("http://{addr}/"),
        Duration::from_millis(500),
        token.map(str::to_string),
    )
    .unwrap()
}

fn poller(api: ApiClient) -> Poller<ApiClient> {
    let (writer, _) = store::channel(api.base_url(), StoreOptions::default());
    let config = PollerConfig {
        health_interval: Duration::from_millis(50),
        dashboard_interval: Duration::from_millis(50),
        metrics_enabled: false,
        request_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    Poller::new(Arc::new(api), writer, config)
}

#[tokio::test]
async fn healthy_backend_populates_store() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let poller = poller(client(addr, None));

    assert!(poller.refresh(Job::Health).await);
    assert!(poller.refresh(Job::Dashboard).await);
    assert!(poller.refresh(Job::AgentMetrics).await);
    assert!(poller.refresh(Job::Sentiment("BTC".to_string())).await);

    let state = poller.reader().current();
    assert!(state.connected);
    assert_eq!(state.base_url, format!("http://{addr}"));
    assert!(state.health.as_ref().unwrap().paper_trading);

    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.portfolio.balance, 3000.0);
    assert_eq!(snapshot.portfolio.positions.len(), 1);
    assert_eq!(snapshot.agents[0].win_rate, 0.625);
    assert_eq!(snapshot.recent_trades[0].timestamp, 1_700_000_000_000);
    assert_eq!(state.agent_metrics["claude"].latency["p50_ms"], 110.0);
    assert_eq!(state.sentiment["BTC"].vote_count, 20);
}

#[tokio::test]
async fn started_poller_fills_store_and_stops_cleanly() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let mut poller = poller(client(addr, None));
    let mut reader = poller.reader();
    poller.start();

    let ready = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if reader.latest().snapshot.is_ready() {
                break;
            }
            reader.changed().await;
        }
    })
    .await;
    assert_ok!(ready);
    assert!(reader.current().connected);

    poller.stop();
    assert!(!poller.is_running());
}

#[tokio::test]
async fn trade_history_is_newest_first_capped_and_skips_malformed() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let api = client(addr, None);

    let trades = assert_ok!(api.fetch_trade_history(2).await);
    let symbols: Vec<&str> = trades.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTC", "SOL"]);
    assert_eq!(trades[0].timestamp, 1_700_000_300_000);

    let all = assert_ok!(api.fetch_trade_history(50).await);
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].symbol, "ETH");
    assert_eq!(all[2].price, 2500.0);
}

#[tokio::test]
async fn agent_performance_drops_agents_without_id() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let api = client(addr, None);

    let agents = assert_ok!(api.fetch_agent_performance().await);
    let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["gpt", "claude"]);
    assert_eq!(agents[1].total_pnl, 90.0);
    assert_eq!(agents[1].win_rate, 0.7);
    assert_eq!(agents[1].enabled, Some(true));
}

#[tokio::test]
async fn failures_map_to_fetch_errors() {
    let addr = serve(broken_backend()).await;
    let api = client(addr, None);

    match api.fetch_health().await {
        Err(FetchError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(matches!(
        api.fetch_dashboard().await,
        Err(FetchError::Decode(_))
    ));
    assert_eq!(
        api.fetch_agent_metrics(None).await,
        Err(FetchError::Timeout)
    );
}

#[tokio::test]
async fn broken_backend_keeps_store_disconnected_with_error() {
    let addr = serve(broken_backend()).await;
    let poller = poller(client(addr, None));

    assert!(!poller.refresh(Job::Health).await);
    assert!(!poller.refresh(Job::Dashboard).await);

    let state = poller.reader().current();
    assert!(!state.connected);
    assert!(!state.snapshot.is_ready());
    let error = state.status(&Resource::Dashboard).last_error.unwrap();
    assert!(error.starts_with("Unexpected response from backend"));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let api = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(500), None).unwrap();
    let result = api.fetch_health().await;
    assert_err!(&result);
    assert!(matches!(
        result,
        Err(FetchError::Transport(_)) | Err(FetchError::Timeout)
    ));
}

#[tokio::test]
async fn vote_requires_valid_token() {
    let addr = serve(healthy_backend(Reports::default())).await;

    let anonymous = Controls::new(Arc::new(client(addr, Some("wrong"))));
    let notice = anonymous.vote("btc", VoteDirection::Bearish, 0.9).await;
    assert_eq!(notice.level, NoticeLevel::Warning);

    let signed_in = Controls::new(Arc::new(client(addr, Some(TOKEN))));
    let notice = signed_in.vote("btc", VoteDirection::Bearish, 0.9).await;
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.text, "Vote recorded for BTC, +5 points");
}

#[tokio::test]
async fn control_actions_accept_empty_acknowledgement() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let controls = Controls::new(Arc::new(client(addr, None)));

    assert_eq!(controls.start().await.text, "Start trading: started");
    assert_eq!(controls.stop().await.level, NoticeLevel::Success);
    // No route: 404 becomes an error notice
    assert_eq!(controls.emergency_stop().await.level, NoticeLevel::Error);
}

#[tokio::test]
async fn failed_toggle_reverts_optimistic_value() {
    let addr = serve(healthy_backend(Reports::default())).await;
    let api = client(addr, None);
    let toggles = AgentToggles::new();
    let snapshot = Snapshot {
        agents: ["claude", "broken"]
            .iter()
            .map(|id| Agent {
                id: id.to_string(),
                enabled: Some(true),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    toggles.sync_from(&snapshot);

    let ok = toggles.toggle(&api, "claude", false).await;
    assert_eq!(ok.level, NoticeLevel::Success);
    assert_eq!(toggles.value("claude"), Some(false));

    let failed = toggles.toggle(&api, "broken", false).await;
    assert_eq!(failed.level, NoticeLevel::Error);
    assert!(failed.text.contains("HTTP 500"));
    assert_eq!(toggles.value("broken"), Some(true));
}

#[tokio::test]
async fn boundary_reports_to_backend_log() {
    let reports = Reports::default();
    let addr = serve(healthy_backend(reports.clone())).await;
    let boundary = ErrorBoundary::new(Arc::new(client(addr, None)));

    let fallback = boundary
        .render("positions", || Err::<(), _>("JSON parse error: unexpected token"))
        .unwrap_err();
    assert_eq!(fallback.category, ErrorCategory::Data);

    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(report) = reports.lock().unwrap().first().cloned() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(delivered["widget"], "positions");
    assert_eq!(delivered["category"], "data");
    assert_eq!(delivered["id"], fallback.report_id.to_string());
}

#[tokio::test]
async fn failed_error_report_is_swallowed() {
    let addr = serve(broken_backend()).await;
    let boundary = ErrorBoundary::new(Arc::new(client(addr, None)));

    let fallback = boundary
        .render("chart", || -> Result<(), String> { panic!("chart render exploded") })
        .unwrap_err();
    assert_eq!(fallback.category, ErrorCategory::Render);
    tokio::time::sleep(Duration::from_millis(100)).await;
}
