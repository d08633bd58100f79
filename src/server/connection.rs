//! Per-connection lifecycle
//!
//! Drives one member from join to leave:
//!
//! 1. ask the handler whether to accept the connection
//! 2. spawn a writer task draining the member's outbound queue into the socket
//! 3. join the group
//! 4. relay every inbound payload to the rest of the group
//! 5. leave the group, whichever way the read loop ended
//!
//! The read loop ends on client close or read error. It also ends when the
//! registry closes the member's channel (eviction or supersession) or when the
//! writer task stops on a failed socket write.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::registry::{
    Broadcaster, CloseReason, CloseSignal, Frame, FrameKind, MemberChannel, Outbound,
};
use crate::server::handler::RelayHandler;
use crate::session::{Membership, SessionContext, SessionState};
use crate::stats::SessionStats;

/// How long the writer gets to flush queued frames and the close handshake
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A single member connection
pub struct Connection<S, H> {
    ws: WebSocketStream<S>,
    ctx: SessionContext,
    state: SessionState,
    broadcaster: Broadcaster,
    handler: Arc<H>,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: RelayHandler,
{
    pub fn new(
        ws: WebSocketStream<S>,
        ctx: SessionContext,
        broadcaster: Broadcaster,
        handler: Arc<H>,
    ) -> Self {
        let state = SessionState::new(ctx.session_id, ctx.peer_addr);
        Self {
            ws,
            ctx,
            state,
            broadcaster,
            handler,
        }
    }

    /// Run the connection to completion
    ///
    /// Returns the session statistics. Errors describe why the connection
    /// ended; membership has been released either way.
    pub async fn run(self) -> Result<SessionStats> {
        let Self {
            mut ws,
            ctx,
            mut state,
            broadcaster,
            handler,
        } = self;

        if !handler.on_connection(&ctx).await {
            tracing::info!(
                session_id = ctx.session_id,
                group = %ctx.group,
                member = %ctx.member,
                "Connection refused by handler"
            );
            let _ = ws.close(None).await;
            state.on_leave();
            return Err(Error::Rejected("refused by handler".into()));
        }

        let registry = Arc::clone(broadcaster.registry());
        let (sink, mut stream) = ws.split();
        let (channel, outbound) = MemberChannel::bounded(registry.config().member_queue_capacity);
        let mut closed = channel.close_signal();
        let mut writer = tokio::spawn(write_loop(sink, outbound));

        let membership = Membership::join(registry, ctx.group.clone(), ctx.member.clone(), channel).await;
        state.on_join(membership.session_id());

        let result = read_loop(
            &mut stream,
            &mut writer,
            &mut closed,
            &ctx,
            &mut state,
            &broadcaster,
            &*handler,
        )
        .await;

        let removed = membership.leave().await;
        state.on_leave();

        // Leaving drops the registry's sender, so the writer drains and closes
        if !writer.is_finished()
            && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
                .await
                .is_err()
        {
            tracing::debug!(
                session_id = ctx.session_id,
                member = %ctx.member,
                "Writer did not drain in time, aborting"
            );
            writer.abort();
        }

        tracing::info!(
            session_id = ctx.session_id,
            group = %ctx.group,
            member = %ctx.member,
            evicted = !removed,
            close_reason = closed.reason().map(|r| r.as_str()).unwrap_or("none"),
            messages = state.stats.messages_received,
            duration_ms = state.stats.duration.as_millis() as u64,
            "Member disconnected"
        );

        handler.on_disconnect(&ctx, &state.stats).await;

        result.map(|()| state.stats)
    }
}

async fn read_loop<S, H>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    writer: &mut JoinHandle<Result<()>>,
    closed: &mut CloseSignal,
    ctx: &SessionContext,
    state: &mut SessionState,
    broadcaster: &Broadcaster,
    handler: &H,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: RelayHandler,
{
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        tracing::info!(
                            group = %ctx.group,
                            member = %ctx.member,
                            message = %text.as_str(),
                            "Message received"
                        );
                        state.record_received(text.as_str().len());
                        Frame::attributed(&ctx.member, text.as_str())
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(
                            group = %ctx.group,
                            member = %ctx.member,
                            bytes = data.len(),
                            "Binary message received"
                        );
                        state.record_received(data.len());
                        Frame::binary(data)
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    // Ping/pong are answered by the protocol layer
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };

                // Closed while this frame was being read
                if closed.reason().is_some() {
                    return Ok(());
                }

                handler.on_message(ctx, &frame).await;
                let outcome = broadcaster.send(&ctx.group, &ctx.member, frame).await;
                state.record_relayed(&outcome);
            }
            reason = closed.closed() => {
                tracing::debug!(
                    session_id = ctx.session_id,
                    member = %ctx.member,
                    reason = reason.map(|r| r.as_str()).unwrap_or("released"),
                    "Channel closed by registry, ending connection"
                );
                return Ok(());
            }
            finished = &mut *writer => {
                tracing::debug!(
                    session_id = ctx.session_id,
                    member = %ctx.member,
                    "Writer stopped, ending connection"
                );
                return match finished {
                    Ok(result) => result,
                    Err(e) => Err(Error::Io(std::io::Error::other(e))),
                };
            }
        }
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => sink.send(to_message(&frame)).await?,
            Outbound::Close(reason) => {
                let close = CloseFrame {
                    code: close_code(reason),
                    reason: Utf8Bytes::from_static(reason.as_str()),
                };
                sink.send(Message::Close(Some(close))).await?;
                return Ok(());
            }
        }
    }

    // Registry released the member
    sink.close().await?;
    Ok(())
}

fn to_message(frame: &Frame) -> Message {
    match frame.kind {
        FrameKind::Text => Message::text(frame.to_text_lossy()),
        FrameKind::Binary => Message::binary(frame.data.clone()),
    }
}

fn close_code(reason: CloseReason) -> CloseCode {
    match reason {
        CloseReason::Superseded => CloseCode::Policy,
        CloseReason::DeliveryFailed => CloseCode::Again,
    }
}
