//! Session membership state machine
//!
//! Tracks a connection's membership from handshake to disconnect:
//! `Unregistered -> Joined -> Left`. The `Joined -> Left` transition happens at
//! most once per connection.

use std::net::SocketAddr;
use std::time::Instant;

use crate::registry::BroadcastOutcome;
use crate::stats::SessionStats;

/// Membership lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipPhase {
    /// Handshake done, not yet in the registry
    Unregistered,
    /// Registered in its group
    Joined,
    /// Removed from its group (or never joined and finished)
    Left,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Connection id
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: MembershipPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the member joined its group
    pub joined_at: Option<Instant>,

    /// Registry session id of the registration
    pub registration: Option<u64>,

    /// Traffic counters
    pub stats: SessionStats,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: MembershipPhase::Unregistered,
            connected_at: Instant::now(),
            joined_at: None,
            registration: None,
            stats: SessionStats::new(),
        }
    }

    /// Record the registry join
    ///
    /// Ignored unless the session is still unregistered.
    pub fn on_join(&mut self, registration: u64) {
        if self.phase == MembershipPhase::Unregistered {
            self.phase = MembershipPhase::Joined;
            self.joined_at = Some(Instant::now());
            self.registration = Some(registration);
        }
    }

    /// Record the end of membership
    ///
    /// Returns `true` only for the `Joined -> Left` transition.
    pub fn on_leave(&mut self) -> bool {
        let was_joined = self.phase == MembershipPhase::Joined;
        self.phase = MembershipPhase::Left;
        self.stats.duration = self.connected_at.elapsed();
        was_joined
    }

    /// Record an inbound payload
    pub fn record_received(&mut self, bytes: usize) {
        self.stats.messages_received += 1;
        self.stats.bytes_received += bytes as u64;
    }

    /// Record the outcome of relaying an inbound payload
    pub fn record_relayed(&mut self, outcome: &BroadcastOutcome) {
        self.stats.deliveries += outcome.delivered as u64;
        self.stats.evictions += outcome.evicted.len() as u64;
    }

    pub fn is_joined(&self) -> bool {
        self.phase == MembershipPhase::Joined
    }
}
