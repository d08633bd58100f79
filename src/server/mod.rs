//! WebSocket relay server
//!
//! Accepts connections, upgrades them to WebSocket, and drives each one
//! through its group membership.

pub mod config;
pub mod connection;
pub mod handler;
pub mod handshake;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::{DefaultHandler, RelayHandler};
pub use handshake::JoinRequest;
pub use listener::RelayServer;
