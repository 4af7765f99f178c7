//! Per-socket session: handshake, join, routing, heartbeat.
//!
//! A session owns the read half of the socket; a writer task owns the
//! write half and drains the outbound queue, which keeps delivery FIFO
//! per socket. The engine only ever sees the queue's sender, wrapped
//! as a [`ParticipantTransport`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, trace, warn};

use trellis_config::GatewaySection;
use trellis_core::{CursorPosition, UserId};
use trellis_engine::{
    AccessOracle, EngineError, ParticipantTransport, RoomHandle, RoomRegistry, TransportClosed,
};
use trellis_protocol::{ClientMessage, ServerMessage};

/// Frames flowing to the writer task.
enum Outbound {
    /// A protocol envelope, serialized as a text frame.
    Envelope(ServerMessage),
    /// A heartbeat ping.
    Ping,
    /// A close frame; the writer exits after sending it.
    Close,
}

/// Everything a session needs from the gateway.
pub(crate) struct SessionCtx {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) oracle: Arc<dyn AccessOracle>,
    pub(crate) config: GatewaySection,
    pub(crate) shutdown_rx: broadcast::Receiver<()>,
}

/// Transport handed to the engine: a sender into the outbound queue.
struct WsTransport {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ParticipantTransport for WsTransport {
    fn send(&self, message: ServerMessage) -> Result<(), TransportClosed> {
        self.tx
            .send(Outbound::Envelope(message))
            .map_err(|_| TransportClosed)
    }
}

/// The room membership of a session, once joined.
struct Membership {
    handle: RoomHandle,
    user_id: UserId,
}

/// Run one socket to completion.
pub(crate) async fn run(stream: TcpStream, peer: SocketAddr, mut ctx: SessionCtx) {
    let ws_config = WebSocketConfig {
        max_message_size: Some(ctx.config.max_frame_bytes),
        max_frame_size: Some(ctx.config.max_frame_bytes),
        ..WebSocketConfig::default()
    };
    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        },
    };
    debug!(%peer, "session opened");

    let (write_half, mut read_half) = ws.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(write_half, out_rx));

    let mut membership: Option<Membership> = None;
    let mut last_activity = Instant::now();
    let mut ping_tick = tokio::time::interval(ctx.config.ping_interval());
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_tick.tick().await; // the first tick is immediate

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown_rx.recv() => {
                debug!(%peer, "session closing for shutdown");
                let _ = out_tx.send(Outbound::Close);
                break;
            },
            _ = ping_tick.tick() => {
                if last_activity.elapsed() >= ctx.config.ping_timeout() {
                    info!(%peer, "connection timed out, dropping");
                    let _ = out_tx.send(Outbound::Close);
                    break;
                }
                if out_tx.send(Outbound::Ping).is_err() {
                    break;
                }
            },
            frame = read_half.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        handle_text(&text, &mut membership, &out_tx, &ctx, peer).await;
                    },
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                        trace!(%peer, "pong");
                    },
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings itself.
                        last_activity = Instant::now();
                    },
                    Some(Ok(Message::Close(_))) => {
                        debug!(%peer, "client closed");
                        break;
                    },
                    Some(Ok(Message::Binary(_) | Message::Frame(_))) => {
                        trace!(%peer, "binary frame ignored");
                    },
                    Some(Err(e)) => {
                        debug!(%peer, error = %e, "socket error");
                        break;
                    },
                    None => break,
                }
            },
        }
    }

    if let Some(membership) = membership {
        membership.handle.leave(membership.user_id);
    }
    // Dropping the sender ends the writer after it drains the queue.
    drop(out_tx);
    let _ = writer.await;
    debug!(%peer, "session closed");
}

/// Route one text frame.
async fn handle_text(
    text: &str,
    membership: &mut Option<Membership>,
    out_tx: &mpsc::UnboundedSender<Outbound>,
    ctx: &SessionCtx,
    peer: SocketAddr,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            trace!(%peer, error = %e, "unparseable frame");
            let _ = out_tx.send(Outbound::Envelope(ServerMessage::error(
                "unrecognized message",
            )));
            return;
        },
    };

    match message {
        ClientMessage::JoinRoom { room_id, token } => {
            // A join while joined moves the session to the new room.
            if let Some(previous) = membership.take() {
                previous.handle.leave(previous.user_id);
            }
            match join(ctx, &room_id, &token, out_tx).await {
                Ok(joined) => *membership = Some(joined),
                Err(e) => {
                    debug!(%peer, %room_id, error = %e, "join refused");
                    let _ = out_tx.send(Outbound::Envelope(ServerMessage::error(join_error(&e))));
                },
            }
        },
        ClientMessage::FlowChange { change } => match membership.as_ref() {
            Some(m) => m.handle.ingest(m.user_id, change),
            None => {
                let _ = out_tx.send(Outbound::Envelope(ServerMessage::error(
                    "join a room first",
                )));
            },
        },
        ClientMessage::CursorMove { x, y } => match membership.as_ref() {
            Some(m) => m.handle.cursor(m.user_id, CursorPosition { x, y }),
            None => {
                let _ = out_tx.send(Outbound::Envelope(ServerMessage::error(
                    "join a room first",
                )));
            },
        },
        ClientMessage::Leave => {
            if let Some(m) = membership.take() {
                m.handle.leave(m.user_id);
            }
        },
    }
}

async fn join(
    ctx: &SessionCtx,
    room_id: &trellis_core::RoomId,
    token: &str,
    out_tx: &mpsc::UnboundedSender<Outbound>,
) -> Result<Membership, EngineError> {
    let principal = ctx
        .oracle
        .authenticate(token)
        .await?
        .ok_or(EngineError::AuthFailed)?;
    let user_id = principal.user_id;
    let transport = Arc::new(WsTransport { tx: out_tx.clone() });
    let handle = ctx.registry.join(*room_id, principal, transport).await?;
    Ok(Membership { handle, user_id })
}

/// Client-facing wording per error kind.
fn join_error(error: &EngineError) -> &'static str {
    match error {
        EngineError::AuthFailed => "authentication failed",
        EngineError::AccessDenied => "access denied",
        EngineError::RoomNotFound => "room not found",
        EngineError::Timeout { .. } => "join timed out",
        _ => "room unavailable",
    }
}

/// Drain the outbound queue into the socket, FIFO.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = rx.recv().await {
        let result = match frame {
            Outbound::Envelope(message) => match serde_json::to_string(&message) {
                Ok(json) => sink.send(Message::Text(json.into())).await,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable envelope");
                    continue;
                },
            },
            Outbound::Ping => sink.send(Message::Ping(Vec::new().into())).await,
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            },
        };
        if result.is_err() {
            // Socket gone: stop draining. The engine notices on its
            // next send and drops the participant.
            break;
        }
    }
}
