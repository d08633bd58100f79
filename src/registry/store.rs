//! Group registry implementation
//!
//! The central registry that tracks which connections belong to which groups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::entry::{CloseReason, GroupEntry, GroupSnapshot, GroupStats, Member, MemberChannel};
use super::frame::{GroupId, MemberId};

/// Central registry for all active groups
///
/// Two-level locking: the outer map lock is held shared by operations on an
/// existing group, so joins and snapshots of unrelated groups only contend on
/// their own group lock. Creating a group and removing a member take the outer
/// lock exclusively, which makes group creation happen once and removal of an
/// emptied group atomic with removal of its last member.
///
/// Invariant: every group present in the map has at least one member.
pub struct GroupRegistry {
    /// Map of group id to group entry
    groups: RwLock<HashMap<GroupId, Arc<RwLock<GroupEntry>>>>,

    /// Source of per-registration session ids
    next_session_id: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl GroupRegistry {
    /// Create a new group registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new group registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Add a member to a group
    ///
    /// Creates the group if it does not exist. If the group already has a
    /// member with the same id, that registration is replaced and its channel
    /// is closed with [`CloseReason::Superseded`].
    ///
    /// Returns the session id assigned to this registration.
    pub async fn join(&self, group: &GroupId, member_id: &MemberId, channel: MemberChannel) -> u64 {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let member = Member::new(member_id.clone(), session_id, channel);

        // Fast path: the group exists, only its own lock is taken exclusively
        let member = {
            let groups = self.groups.read().await;
            match groups.get(group) {
                Some(entry_arc) => {
                    let mut entry = entry_arc.write().await;
                    let replaced = entry.insert(member);
                    self.log_join(group, member_id, session_id, entry.member_count(), replaced);
                    return session_id;
                }
                None => member,
            }
        };

        let mut groups = self.groups.write().await;
        let entry_arc = groups
            .entry(group.clone())
            .or_insert_with(|| {
                tracing::info!(group = %group, "Group created");
                Arc::new(RwLock::new(GroupEntry::new()))
            })
            .clone();
        let mut entry = entry_arc.write().await;
        let replaced = entry.insert(member);
        self.log_join(group, member_id, session_id, entry.member_count(), replaced);

        session_id
    }

    fn log_join(
        &self,
        group: &GroupId,
        member_id: &MemberId,
        session_id: u64,
        members: usize,
        replaced: Option<Member>,
    ) {
        match replaced {
            Some(previous) => {
                previous.channel.close(CloseReason::Superseded);
                tracing::info!(
                    group = %group,
                    member = %member_id,
                    session_id = session_id,
                    replaced_session_id = previous.session_id,
                    "Member rejoined, previous connection superseded"
                );
            }
            None => {
                tracing::info!(
                    group = %group,
                    member = %member_id,
                    session_id = session_id,
                    members = members,
                    "Member joined"
                );
            }
        }
    }

    /// Remove a member from a group
    ///
    /// Removes the group once its last member is gone. Calling this for a
    /// member or group that is already absent is a no-op.
    pub async fn leave(&self, group: &GroupId, member_id: &MemberId) {
        self.remove_where(group, member_id, |entry| entry.remove(member_id))
            .await;
    }

    /// Remove a member only if it is still the registration `session_id`
    ///
    /// Returns whether a member was removed. A connection that was superseded
    /// by a newer registration of the same id leaves the newer one in place.
    pub async fn leave_session(&self, group: &GroupId, member_id: &MemberId, session_id: u64) -> bool {
        let removed = self
            .remove_where(group, member_id, |entry| entry.remove_session(member_id, session_id))
            .await;

        if !removed {
            tracing::debug!(
                group = %group,
                member = %member_id,
                session_id = session_id,
                "Leave ignored, registration already gone"
            );
        }

        removed
    }

    async fn remove_where<F>(&self, group: &GroupId, member_id: &MemberId, remove: F) -> bool
    where
        F: FnOnce(&mut GroupEntry) -> Option<Member>,
    {
        let mut groups = self.groups.write().await;

        let Some(entry_arc) = groups.get(group).cloned() else {
            return false;
        };

        let mut entry = entry_arc.write().await;
        let Some(member) = remove(&mut *entry) else {
            return false;
        };

        tracing::info!(
            group = %group,
            member = %member_id,
            session_id = member.session_id,
            members = entry.member_count(),
            "Member left"
        );

        if entry.is_empty() {
            drop(entry);
            groups.remove(group);
            tracing::info!(group = %group, "Group removed, no members left");
        }

        true
    }

    /// Get a point-in-time copy of a group's members
    ///
    /// Unknown groups yield an empty snapshot.
    pub async fn snapshot(&self, group: &GroupId) -> GroupSnapshot {
        let groups = self.groups.read().await;

        if let Some(entry_arc) = groups.get(group) {
            let entry = entry_arc.read().await;
            entry.snapshot(group)
        } else {
            GroupSnapshot::empty(group)
        }
    }

    /// Check if a group exists
    pub async fn group_exists(&self, group: &GroupId) -> bool {
        self.groups.read().await.contains_key(group)
    }

    /// Get group statistics
    pub async fn group_stats(&self, group: &GroupId) -> Option<GroupStats> {
        let groups = self.groups.read().await;

        if let Some(entry_arc) = groups.get(group) {
            let entry = entry_arc.read().await;
            Some(GroupStats {
                member_count: entry.member_count(),
                age: entry.created_at.elapsed(),
            })
        } else {
            None
        }
    }

    /// Get total number of groups
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Get total number of members across all groups
    pub async fn member_count(&self) -> usize {
        let groups = self.groups.read().await;
        let mut total = 0;
        for entry_arc in groups.values() {
            total += entry_arc.read().await.member_count();
        }
        total
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
