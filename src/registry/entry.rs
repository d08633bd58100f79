//! Member and group entry types
//!
//! This module defines the per-member and per-group state stored in the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

use super::error::DeliveryError;
use super::frame::{Frame, GroupId, MemberId};

/// Why the registry closed a member's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer connection joined the same group with the same member id
    Superseded,
    /// A delivery to the member failed and it was evicted
    DeliveryFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Superseded => "superseded by a newer connection",
            CloseReason::DeliveryFailed => "delivery failed",
        }
    }
}

/// Item queued for a member's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Deliver a frame
    Frame(Frame),
    /// Close the connection
    Close(CloseReason),
}

/// Sending half of a member's outbound queue
///
/// The registry owns this once the member has joined. The receiving half is
/// drained by the connection's writer task, which stops once every sender is
/// dropped or a [`Outbound::Close`] arrives. Closing also fires a
/// [`CloseSignal`] that does not need queue space, so a member whose queue is
/// full still learns it was closed.
#[derive(Debug, Clone)]
pub struct MemberChannel {
    tx: mpsc::Sender<Outbound>,
    closed: Arc<watch::Sender<Option<CloseReason>>>,
}

impl MemberChannel {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        let (closed, _) = watch::channel(None);
        Self {
            tx,
            closed: Arc::new(closed),
        }
    }

    /// Create a channel with a bounded queue, returning the receiving half
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Subscribe to this channel being closed
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal {
            rx: self.closed.subscribe(),
        }
    }

    /// Queue a frame, waiting at most `timeout` for queue space
    pub async fn deliver(&self, frame: Frame, timeout: Duration) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(Outbound::Frame(frame), timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
            })
    }

    /// Close the member's connection
    ///
    /// Fires the close signal, then queues a close frame for the writer if
    /// there is room for one. The first reason wins.
    pub fn close(&self, reason: CloseReason) {
        self.closed.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        let _ = self.tx.try_send(Outbound::Close(reason));
    }

    /// Whether the receiving half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of a [`MemberChannel`]'s close signal
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<Option<CloseReason>>,
}

impl CloseSignal {
    /// Wait until the channel is closed
    ///
    /// Returns `None` when every [`MemberChannel`] clone was dropped without
    /// closing, which means the registry no longer holds the member.
    pub async fn closed(&mut self) -> Option<CloseReason> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        }
    }

    /// The close reason, if the channel has been closed
    pub fn reason(&self) -> Option<CloseReason> {
        *self.rx.borrow()
    }
}

/// A single connection's registration within a group
#[derive(Debug, Clone)]
pub struct Member {
    /// Caller-supplied member id
    pub id: MemberId,

    /// Registry-assigned id of this particular registration
    pub session_id: u64,

    /// Outbound channel to the connection
    pub channel: MemberChannel,

    /// When the member joined
    pub joined_at: Instant,
}

impl Member {
    pub(super) fn new(id: MemberId, session_id: u64, channel: MemberChannel) -> Self {
        Self {
            id,
            session_id,
            channel,
            joined_at: Instant::now(),
        }
    }
}

/// Entry for a single group in the registry
#[derive(Debug)]
pub struct GroupEntry {
    /// Members keyed by member id
    members: HashMap<MemberId, Member>,

    /// When the group was created
    pub created_at: Instant,
}

impl GroupEntry {
    pub(super) fn new() -> Self {
        Self {
            members: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    /// Insert a member, returning the registration it replaced
    pub(super) fn insert(&mut self, member: Member) -> Option<Member> {
        self.members.insert(member.id.clone(), member)
    }

    /// Remove a member regardless of which registration it is
    pub(super) fn remove(&mut self, id: &MemberId) -> Option<Member> {
        self.members.remove(id)
    }

    /// Remove a member only if it is still the registration `session_id`
    pub(super) fn remove_session(&mut self, id: &MemberId, session_id: u64) -> Option<Member> {
        match self.members.get(id) {
            Some(member) if member.session_id == session_id => self.members.remove(id),
            _ => None,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    pub(super) fn snapshot(&self, group: &GroupId) -> GroupSnapshot {
        GroupSnapshot {
            group: group.clone(),
            members: self.members.values().cloned().collect(),
        }
    }
}

/// Point-in-time copy of a group's membership
///
/// Owned by the caller; later registry operations never change it.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    /// Group the snapshot was taken from
    pub group: GroupId,
    members: Vec<Member>,
}

impl GroupSnapshot {
    pub(super) fn empty(group: &GroupId) -> Self {
        Self {
            group: group.clone(),
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Member ids in sorted order
    pub fn member_ids(&self) -> Vec<MemberId> {
        let mut ids: Vec<MemberId> = self.members.iter().map(|m| m.id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Member> {
        self.members.iter()
    }
}

impl IntoIterator for GroupSnapshot {
    type Item = Member;
    type IntoIter = std::vec::IntoIter<Member>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

/// Statistics for a group
#[derive(Debug, Clone)]
pub struct GroupStats {
    /// Number of members
    pub member_count: usize,
    /// Time since the group was created
    pub age: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, session_id: u64) -> (Member, mpsc::Receiver<Outbound>) {
        let (channel, rx) = MemberChannel::bounded(4);
        (Member::new(MemberId::new(id), session_id, channel), rx)
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut entry = GroupEntry::new();
        let (first, _rx1) = member("alice", 1);
        let (second, _rx2) = member("alice", 2);

        assert!(entry.insert(first).is_none());
        let replaced = entry.insert(second).unwrap();

        assert_eq!(replaced.session_id, 1);
        assert_eq!(entry.member_count(), 1);
    }

    #[test]
    fn test_remove_session_mismatch() {
        let mut entry = GroupEntry::new();
        let (m, _rx) = member("alice", 7);
        entry.insert(m);

        assert!(entry.remove_session(&MemberId::new("alice"), 3).is_none());
        assert!(entry.contains(&MemberId::new("alice")));

        assert!(entry.remove_session(&MemberId::new("alice"), 7).is_some());
        assert!(entry.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_closed_channel() {
        let (channel, rx) = MemberChannel::bounded(1);
        drop(rx);

        let result = channel
            .deliver(Frame::text("x"), Duration::from_millis(10))
            .await;

        assert_eq!(result, Err(DeliveryError::Closed));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_deliver_full_channel_times_out() {
        let (channel, _rx) = MemberChannel::bounded(1);
        channel
            .deliver(Frame::text("first"), Duration::from_millis(10))
            .await
            .unwrap();

        let result = channel
            .deliver(Frame::text("second"), Duration::from_millis(10))
            .await;

        assert_eq!(result, Err(DeliveryError::TimedOut));
    }

    #[tokio::test]
    async fn test_close_queues_reason() {
        let (channel, mut rx) = MemberChannel::bounded(2);
        channel.close(CloseReason::Superseded);

        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Close(CloseReason::Superseded))
        ));
    }

    #[tokio::test]
    async fn test_close_signal_fires_with_full_queue() {
        let (channel, _rx) = MemberChannel::bounded(1);
        let mut signal = channel.close_signal();
        channel
            .deliver(Frame::text("fills the queue"), Duration::from_millis(10))
            .await
            .unwrap();

        channel.close(CloseReason::DeliveryFailed);
        channel.close(CloseReason::Superseded);

        let reason = tokio::time::timeout(Duration::from_secs(1), signal.closed())
            .await
            .unwrap();
        assert_eq!(reason, Some(CloseReason::DeliveryFailed));
        assert_eq!(signal.reason(), Some(CloseReason::DeliveryFailed));
    }

    #[tokio::test]
    async fn test_close_signal_ends_when_channel_dropped() {
        let (channel, _rx) = MemberChannel::bounded(1);
        let mut signal = channel.close_signal();
        drop(channel);

        assert_eq!(signal.closed().await, None);
    }
}
