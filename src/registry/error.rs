//! Delivery error types
//!
//! Failures of a single delivery to a single member. These never leave the
//! broadcaster: they are logged and turned into an eviction.

use thiserror::Error;

/// Error delivering a frame to one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The member's connection is gone
    #[error("member channel closed")]
    Closed,
    /// The member's queue stayed full past the delivery timeout
    #[error("member channel stalled")]
    TimedOut,
}
