//! Registry membership guard
//!
//! A [`Membership`] is the connection's handle on its registration. It leaves
//! the group exactly once: explicitly through [`Membership::leave`], or from
//! `Drop` when the connection task unwinds or is cancelled first.

use std::sync::Arc;

use crate::registry::{GroupId, GroupRegistry, MemberChannel, MemberId};

/// Live registration of one connection in one group
pub struct Membership {
    registry: Arc<GroupRegistry>,
    group: GroupId,
    member: MemberId,
    session_id: u64,
    released: bool,
}

impl Membership {
    /// Join `group` as `member`, delivering through `channel`
    pub async fn join(
        registry: Arc<GroupRegistry>,
        group: GroupId,
        member: MemberId,
        channel: MemberChannel,
    ) -> Self {
        let session_id = registry.join(&group, &member, channel).await;

        Self {
            registry,
            group,
            member,
            session_id,
            released: false,
        }
    }

    /// Registry session id of this registration
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Leave the group
    ///
    /// Returns `false` if the registration was already gone (evicted, or
    /// superseded by a newer connection with the same member id).
    pub async fn leave(mut self) -> bool {
        self.released = true;
        self.registry
            .leave_session(&self.group, &self.member, self.session_id)
            .await
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let registry = Arc::clone(&self.registry);
        let group = self.group.clone();
        let member = self.member.clone();
        let session_id = self.session_id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry.leave_session(&group, &member, session_id).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    group = %group,
                    member = %member,
                    session_id = session_id,
                    "Membership dropped outside a runtime, leave skipped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_explicit_leave() {
        let registry = Arc::new(GroupRegistry::new());
        let (channel, _rx) = MemberChannel::bounded(4);
        let membership = Membership::join(
            Arc::clone(&registry),
            GroupId::new("room1"),
            MemberId::new("alice"),
            channel,
        )
        .await;

        assert!(registry.group_exists(&GroupId::new("room1")).await);
        assert!(membership.leave().await);
        assert!(!registry.group_exists(&GroupId::new("room1")).await);
    }

    #[tokio::test]
    async fn test_drop_leaves_group() {
        let registry = Arc::new(GroupRegistry::new());
        let (channel, _rx) = MemberChannel::bounded(4);
        let membership = Membership::join(
            Arc::clone(&registry),
            GroupId::new("room1"),
            MemberId::new("alice"),
            channel,
        )
        .await;

        drop(membership);

        // The leave runs on a spawned task
        for _ in 0..100 {
            if !registry.group_exists(&GroupId::new("room1")).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("group still present after membership was dropped");
    }

    #[tokio::test]
    async fn test_cancelled_task_leaves_group() {
        let registry = Arc::new(GroupRegistry::new());
        let task_registry = Arc::clone(&registry);

        let task = tokio::spawn(async move {
            let (channel, _rx) = MemberChannel::bounded(4);
            let _membership = Membership::join(
                task_registry,
                GroupId::new("g"),
                MemberId::new("m"),
                channel,
            )
            .await;
            std::future::pending::<()>().await;
        });

        while !registry.group_exists(&GroupId::new("g")).await {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        for _ in 0..100 {
            if registry.group_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("aborted connection left its membership behind");
    }

    #[tokio::test]
    async fn test_superseded_leave_keeps_newer() {
        let registry = Arc::new(GroupRegistry::new());
        let (old_channel, _old_rx) = MemberChannel::bounded(4);
        let (new_channel, _new_rx) = MemberChannel::bounded(4);

        let old = Membership::join(
            Arc::clone(&registry),
            GroupId::new("room1"),
            MemberId::new("alice"),
            old_channel,
        )
        .await;
        let _new = Membership::join(
            Arc::clone(&registry),
            GroupId::new("room1"),
            MemberId::new("alice"),
            new_channel,
        )
        .await;

        assert!(!old.leave().await);
        assert_eq!(registry.member_count().await, 1);
    }
}
