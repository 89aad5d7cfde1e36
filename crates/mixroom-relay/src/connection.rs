//! Per-connection dispatch loop: reads protocol messages in arrival order
//! and drives the room broadcaster. No shared state is touched directly;
//! everything goes through the broadcaster, which synchronizes itself.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use mixroom_protocol::ClientMessage;

use crate::error::ProtocolError;
use crate::registry::SessionId;
use crate::room::RoomBroadcaster;

/// Why the dispatch loop ended. Every variant funnels into the same
/// finalizer: registry removal plus a departure broadcast.
enum CloseReason {
    Leave,
    EndOfStream,
    Protocol(ProtocolError),
    Transport(tokio_tungstenite::tungstenite::Error),
}

enum Flow {
    Continue,
    Leave,
}

/// Handle a single WebSocket connection from accept to close.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    hub: RoomBroadcaster,
) {
    let (mut sink, mut stream) = ws.split();

    // Outbound queue: broadcasts are enqueued here and drained onto the
    // socket below, so no fan-out ever blocks on this peer's I/O.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session_id = hub.register(tx).await;

    let reason = dispatch(&hub, &session_id, &mut sink, &mut stream, &mut rx).await;

    match &reason {
        CloseReason::Leave => {
            tracing::info!(peer = %addr, session = %session_id, "Client left")
        }
        CloseReason::EndOfStream => {
            tracing::info!(peer = %addr, session = %session_id, "Client disconnected")
        }
        CloseReason::Protocol(e) => {
            tracing::warn!(peer = %addr, session = %session_id, error = %e, "Protocol violation")
        }
        CloseReason::Transport(e) => {
            tracing::debug!(peer = %addr, session = %session_id, error = %e, "WS error")
        }
    }

    // Single cleanup path for every exit: drop the session and re-broadcast
    // the vacated room.
    let name = hub.display_name(&session_id).await;
    if let Some(room) = hub.disconnect(&session_id).await {
        tracing::info!(name = name.as_deref().unwrap_or(""), room = %room, "Left room");
    }

    let _ = sink.send(Message::Close(None)).await;
}

async fn dispatch(
    hub: &RoomBroadcaster,
    id: &SessionId,
    sink: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    stream: &mut SplitStream<WebSocketStream<TcpStream>>,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> CloseReason {
    loop {
        tokio::select! {
            // Queued snapshots → this client's socket.
            Some(json) = rx.recv() => {
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    return CloseReason::Transport(e);
                }
            }

            // Frames from this client → protocol state machine.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match handle_message(hub, id, &text).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Leave) => return CloseReason::Leave,
                            Err(e) => return CloseReason::Protocol(e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        return CloseReason::Protocol(ProtocolError::BinaryFrame);
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseReason::EndOfStream,
                    Some(Err(e)) => return CloseReason::Transport(e),
                    _ => {}
                }
            }
        }
    }
}

async fn handle_message(
    hub: &RoomBroadcaster,
    id: &SessionId,
    text: &str,
) -> Result<Flow, ProtocolError> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Join {
            name,
            room,
            volume,
            muted,
        } => {
            hub.join(id, &name, &room, volume, muted).await?;
            tracing::info!(session = %id, name = %name, room = %room, volume, muted, "Joined room");
            Ok(Flow::Continue)
        }
        ClientMessage::Volume {
            name,
            volume,
            muted,
        } => {
            hub.update_status(id, volume, muted).await?;
            tracing::info!(session = %id, name = %name, volume, muted, "Status updated");
            Ok(Flow::Continue)
        }
        ClientMessage::Leave => Ok(Flow::Leave),
    }
}
