//! Per-connection session state
//!
//! A session is one WebSocket connection's participation in one group.

pub mod context;
pub mod membership;
pub mod state;

pub use context::SessionContext;
pub use membership::Membership;
pub use state::{MembershipPhase, SessionState};
