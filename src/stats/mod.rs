//! Relay statistics

pub mod metrics;

pub use metrics::{ConnectionCounters, ConnectionGuard, RelayStats, SessionStats};
