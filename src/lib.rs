//! group-relay: real-time group messaging over WebSocket
//!
//! Clients connect to `/ws?group_id=<group>&client_id=<member>`, join the named
//! group, and every text message they send is relayed to the other members of
//! that group as `"<member>: <text>"`.
//!
//! # Example
//!
//! ```no_run
//! use group_relay::{DefaultHandler, RelayServer, ServerConfig};
//!
//! # async fn run() -> group_relay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default(), DefaultHandler);
//! server.run().await
//! # }
//! ```
//!
//! The [`registry`] module can also be used on its own: [`GroupRegistry`]
//! tracks memberships and [`Broadcaster`] performs the sender-excluded fan-out
//! with eviction of members whose delivery fails.

pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{
    BroadcastOutcome, Broadcaster, Frame, FrameKind, GroupId, GroupRegistry, MemberChannel,
    MemberId, RegistryConfig,
};
pub use server::{DefaultHandler, RelayHandler, RelayServer, ServerConfig};
pub use session::SessionContext;
