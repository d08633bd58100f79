//! Handler context
//!
//! Context passed to handler callbacks containing session information.

use std::net::SocketAddr;
use std::time::Instant;

use crate::registry::{GroupId, MemberId};

/// Context passed to RelayHandler callbacks
///
/// Provides read-only access to session information.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique connection id
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Group the connection asked to join
    pub group: GroupId,

    /// Member id the connection identified as
    pub member: MemberId,

    /// When the connection was accepted
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr, group: GroupId, member: MemberId) -> Self {
        Self {
            session_id,
            peer_addr,
            group,
            member,
            connected_at: Instant::now(),
        }
    }
}
