// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::{Config, FeedConfig};
pub use crate::ingest::types::{FeedSource, Item, RawEntry};
pub use crate::monitor::{CycleReport, Monitor, MonitorSettings};
pub use crate::notify::{CycleSummary, Notifier};
pub use crate::store::{SeenStore, Statistics};
