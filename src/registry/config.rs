//! Registry configuration

use std::time::Duration;

/// Configuration for the group registry and broadcaster
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each member's outbound queue
    pub member_queue_capacity: usize,

    /// Upper bound for a single delivery to one member
    ///
    /// A member whose queue stays full for longer than this is treated as a
    /// failed delivery and evicted.
    pub delivery_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            member_queue_capacity: 64,
            delivery_timeout: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    /// Set the outbound queue capacity (minimum 1)
    pub fn member_queue_capacity(mut self, capacity: usize) -> Self {
        self.member_queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-member delivery timeout
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}
