//! Widget error boundary
//!
//! Wraps a widget render so that a failure (returned error or panic) turns
//! into a `Fallback` for that widget alone. The failure is classified by
//! matching keywords in its message and stack. This is a best-effort
//! heuristic: error messages are not a stable contract, so a category is a
//! hint for the recovery text and nothing more.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Auth,
    Data,
    Render,
    Unknown,
}

const AUTH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "session expired",
    "sign in again",
    "access token",
    "jwt",
    "401",
    "403",
];
const NETWORK_KEYWORDS: &[&str] = &[
    "fetch",
    "network",
    "timeout",
    "timed out",
    "connection",
    "econnrefused",
    "socket",
    "dns",
    "offline",
    "backend returned",
    "unreachable",
    "unavailable",
];
const DATA_KEYWORDS: &[&str] = &[
    "json",
    "parse",
    "deserialize",
    "unexpected token",
    "undefined",
    "null",
    "cannot read propert",
    "invalid data",
    "missing field",
];
const RENDER_KEYWORDS: &[&str] = &["render", "component", "widget", "layout", "chart"];

/// Guess the category of a failure from its message and stack
pub fn classify(message: &str, stack: Option<&str>) -> ErrorCategory {
    let haystack = format!("{} {}", message, stack.unwrap_or_default()).to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| haystack.contains(k));

    if hit(AUTH_KEYWORDS) {
        ErrorCategory::Auth
    } else if hit(NETWORK_KEYWORDS) {
        ErrorCategory::Network
    } else if hit(DATA_KEYWORDS) {
        ErrorCategory::Data
    } else if hit(RENDER_KEYWORDS) {
        ErrorCategory::Render
    } else {
        ErrorCategory::Unknown
    }
}

pub fn recovery_steps(category: ErrorCategory) -> &'static [&'static str] {
    match category {
        ErrorCategory::Network => &[
            "Check your internet connection",
            "Verify the trading backend is reachable",
            "Retry in a few seconds; data refreshes automatically",
        ],
        ErrorCategory::Auth => &[
            "Your session has expired",
            "Sign in again to continue",
        ],
        ErrorCategory::Data => &[
            "The backend sent data in an unexpected shape",
            "Retry to fetch a fresh snapshot",
            "If it persists, report the error to the operators",
        ],
        ErrorCategory::Render => &[
            "This panel failed to draw",
            "Reload the dashboard",
        ],
        ErrorCategory::Unknown => &[
            "Retry the last action",
            "Reload the dashboard or go back home",
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryAction {
    Retry,
    Reload,
    Home,
}

pub const BOUNDARY_ACTIONS: [BoundaryAction; 3] = [
    BoundaryAction::Retry,
    BoundaryAction::Reload,
    BoundaryAction::Home,
];

/// What a failed widget shows instead of its content
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub widget: String,
    pub category: ErrorCategory,
    pub message: String,
    pub steps: Vec<String>,
    pub actions: Vec<BoundaryAction>,
    pub report_id: Uuid,
}

/// Payload sent to the backend error log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub widget: String,
    pub category: ErrorCategory,
    pub message: String,
    pub stack: Option<String>,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Destination for error reports. Implementations must swallow their own failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn report(&self, report: ErrorReport);
}

#[derive(Clone, Default)]
pub struct ErrorBoundary {
    sink: Option<Arc<dyn ErrorSink>>,
}

impl std::fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("reporting", &self.sink.is_some())
            .finish()
    }
}

impl ErrorBoundary {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Boundary that only logs
    pub fn detached() -> Self {
        Self { sink: None }
    }

    /// Run one widget render. Errors and panics stay inside this call.
    pub fn render<T, E, F>(&self, widget: &str, render: F) -> Result<T, Fallback>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        match catch_unwind(AssertUnwindSafe(render)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.intercept(widget, &e.to_string(), None)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "widget panicked".to_string());
                Err(self.intercept(widget, &message, Some("panic")))
            }
        }
    }

    /// Classify a failure, log it, fire off a report and build the fallback
    pub fn intercept(&self, widget: &str, message: &str, stack: Option<&str>) -> Fallback {
        let category = classify(message, stack);
        let report = ErrorReport {
            id: Uuid::new_v4(),
            widget: widget.to_string(),
            category,
            message: message.to_string(),
            stack: stack.map(str::to_string),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        error!(
            widget = %widget,
            category = ?category,
            report_id = %report.id,
            error = %message,
            "Widget failed, showing fallback"
        );

        let fallback = Fallback {
            widget: widget.to_string(),
            category,
            message: message.to_string(),
            steps: recovery_steps(category)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            actions: BOUNDARY_ACTIONS.to_vec(),
            report_id: report.id,
        };

        if let Some(sink) = self.sink.clone() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { sink.report(report).await });
                }
                Err(_) => debug!(report_id = %report.id, "No runtime, error report skipped"),
            }
        }

        fallback
    }
}
