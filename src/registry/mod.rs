//! Group registry and broadcast engine
//!
//! The registry tracks which connections belong to which groups, and the
//! broadcaster fans a payload out to every other member of the sender's group.
//! Each member's connection is represented by a bounded `tokio::sync::mpsc`
//! queue drained by that connection's writer task.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<GroupRegistry>
//!                     ┌─────────────────────────┐
//!                     │ groups: HashMap<Group,  │
//!                     │   GroupEntry {          │
//!                     │     members: HashMap<   │
//!                     │       MemberId, Member>,│
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │ snapshot()
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!      [Sender]               [Member]                [Member]
//!    read loop               writer task             writer task
//!         │                       ▲                       ▲
//!         └──► broadcaster.send() ─┴── channel.deliver() ──┘
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all recipients share the same
//! payload allocation. Each recipient's queue holds a clone of the `Frame`,
//! but the inner data is only reference-counted, not copied.

pub mod broadcast;
pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use broadcast::{BroadcastOutcome, Broadcaster};
pub use config::RegistryConfig;
pub use entry::{CloseReason, CloseSignal, GroupSnapshot, GroupStats, Member, MemberChannel, Outbound};
pub use error::DeliveryError;
pub use frame::{Frame, FrameKind, GroupId, MemberId};
pub use store::GroupRegistry;
