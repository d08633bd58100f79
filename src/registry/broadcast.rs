//! Sender-excluded fan-out within a group
//!
//! The broadcaster takes a snapshot of the group, delivers to every member but
//! the sender concurrently, and evicts members whose delivery failed. No
//! registry lock is held while deliveries are in flight.

use std::sync::Arc;

use futures_util::future::join_all;

use super::entry::{CloseReason, Member};
use super::frame::{Frame, GroupId, MemberId};
use super::store::GroupRegistry;

/// Result of a single [`Broadcaster::send`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Number of members the frame was queued for
    pub delivered: usize,
    /// Members evicted because delivery failed
    pub evicted: Vec<MemberId>,
}

/// Delivers frames to the other members of a group
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<GroupRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Deliver `frame` to every member of `group` except `sender`
    ///
    /// Failures are never returned to the caller: a member whose delivery
    /// fails is logged, has its channel closed and is removed from the
    /// registry, while delivery to the remaining members proceeds. An unknown
    /// or empty group is a no-op.
    pub async fn send(&self, group: &GroupId, sender: &MemberId, frame: Frame) -> BroadcastOutcome {
        let snapshot = self.registry.snapshot(group).await;
        if snapshot.is_empty() {
            return BroadcastOutcome::default();
        }

        let timeout = self.registry.config().delivery_timeout;
        let recipients: Vec<Member> = snapshot.into_iter().filter(|m| &m.id != sender).collect();

        let results = join_all(recipients.iter().map(|member| {
            let frame = frame.clone();
            async move { member.channel.deliver(frame, timeout).await }
        }))
        .await;

        let mut outcome = BroadcastOutcome::default();
        for (member, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        group = %group,
                        member = %member.id,
                        session_id = member.session_id,
                        error = %e,
                        "Delivery failed, evicting member"
                    );
                    member.channel.close(CloseReason::DeliveryFailed);
                    self.registry
                        .leave_session(group, &member.id, member.session_id)
                        .await;
                    outcome.evicted.push(member.id.clone());
                }
            }
        }

        tracing::trace!(
            group = %group,
            sender = %sender,
            bytes = frame.len(),
            delivered = outcome.delivered,
            evicted = outcome.evicted.len(),
            "Broadcast complete"
        );

        outcome
    }
}
