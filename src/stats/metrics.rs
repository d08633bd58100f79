//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Payloads received from the client
    pub messages_received: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Successful deliveries of this client's payloads to peers
    pub deliveries: u64,
    /// Peers evicted while relaying this client's payloads
    pub evictions: u64,
    /// Connection duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Average fan-out per received payload
    pub fn average_fanout(&self) -> f64 {
        if self.messages_received > 0 {
            self.deliveries as f64 / self.messages_received as f64
        } else {
            0.0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Active groups
    pub groups: usize,
    /// Registered members across all groups
    pub members: usize,
    /// Uptime
    pub uptime: Duration,
}

/// Live connection counters shared by the listener and its connection tasks
#[derive(Debug)]
pub struct ConnectionCounters {
    total: AtomicU64,
    active: AtomicU64,
    started_at: Instant,
}

impl ConnectionCounters {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            active: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count a new connection; the returned guard uncounts it when dropped
    pub fn open(self: &Arc<Self>) -> ConnectionGuard {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            counters: Arc::clone(self),
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for ConnectionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a connection counted as active
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<ConnectionCounters>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}
