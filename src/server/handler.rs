//! Server callbacks
//!
//! [`RelayHandler`] lets an application observe connection lifecycle events.
//! Every method has a default, so an implementation only overrides what it
//! needs. Relaying itself is not customizable here: it is always the
//! sender-excluded group fan-out performed by the broadcaster.

use std::future::Future;

use crate::registry::Frame;
use crate::session::SessionContext;
use crate::stats::SessionStats;

/// Callbacks invoked by the server for each connection
pub trait RelayHandler: Send + Sync + 'static {
    /// Called after the WebSocket upgrade, before the member joins its group
    ///
    /// Returning `false` closes the connection without joining.
    fn on_connection(&self, _ctx: &SessionContext) -> impl Future<Output = bool> + Send {
        async { true }
    }

    /// Called for each payload received from the member, before it is relayed
    fn on_message(&self, _ctx: &SessionContext, _frame: &Frame) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called once the member has left its group
    fn on_disconnect(
        &self,
        _ctx: &SessionContext,
        _stats: &SessionStats,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Handler that accepts every connection and observes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl RelayHandler for DefaultHandler {}
