//! TradeWatch Library
//!
//! Live-data synchronization layer for an automated-trading dashboard:
//! typed backend client, polling controller, shared store and the derived
//! display metrics every widget reads.

pub mod api;
pub mod boundary;
pub mod config;
pub mod controls;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod store;
pub mod types;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, DashboardApi};
pub use config::AppConfig;
pub use error::{FetchError, FetchResult};
pub use poller::{Job, Poller, PollerConfig};
pub use store::{StoreReader, StoreState, StoreWriter};
