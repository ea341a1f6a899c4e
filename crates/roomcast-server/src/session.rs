use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use roomcast_core::envelope::Envelope;
use roomcast_core::protocol::{MAX_MESSAGE_SIZE, encode_envelope};

use crate::registry::ConnectionId;
use crate::state::{AppState, ConnectionGuard};

/// How a session's read side ended. Expected closure and transport
/// faults are logged distinctly but cleaned up identically.
enum CloseReason {
    Clean,
    TransportError,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response, StatusCode> {
    let max = state.config.limits.max_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max {
        tracing::warn!(current, max, "Connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    if !is_valid_room_id(&room_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Refuse upgrades that would create a room beyond the cap. Checked
    // again inside join, which is the authoritative gate.
    {
        let registry = state.registry.read().await;
        let (rooms, _) = registry.stats();
        if !registry.room_exists(&room_id) && rooms >= state.config.limits.max_rooms {
            tracing::warn!(room = %room_id, rooms, "Room limit reached");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id)))
}

fn is_valid_room_id(room_id: &str) -> bool {
    !room_id.is_empty() && room_id.len() <= 64 && !room_id.chars().any(|c| c.is_control())
}

async fn handle_socket(socket: WebSocket, state: AppState, room_id: String) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.member_message_buffer);

    // Joining: register into the target room.
    let conn_id = {
        let mut registry = state.registry.write().await;
        let conn_id = registry.alloc_connection_id();
        if let Err(e) = registry.join(&room_id, conn_id, tx) {
            tracing::warn!(room = %room_id, error = %e, "Join refused");
            return;
        }
        conn_id
    };
    tracing::info!(conn_id, room = %room_id, "Member joined");

    spawn_writer(ws_sender, rx);

    // Active: relay every inbound text frame to the room.
    let close = read_loop(&mut ws_receiver, &state, &room_id, conn_id).await;

    // Closing: remove membership. A failed send during a broadcast may
    // have pruned this member already; leave is idempotent either way.
    {
        let mut registry = state.registry.write().await;
        registry.leave(&room_id, conn_id);
    }

    match close {
        CloseReason::Clean => {
            tracing::info!(conn_id, room = %room_id, "Member disconnected");
        },
        CloseReason::TransportError => {
            tracing::debug!(conn_id, room = %room_id, "Member connection errored");
        },
    }
}

/// Drain the member's outbound channel into the WebSocket sink. Ends when
/// the channel closes (membership removed) or the sink errors, and closes
/// the socket so the session's read side unblocks promptly.
fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    room_id: &str,
    conn_id: ConnectionId,
) -> CloseReason {
    loop {
        let msg = match ws_receiver.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::debug!(conn_id, room = room_id, error = %e, "Receive failed");
                return CloseReason::TransportError;
            },
            None => return CloseReason::Clean,
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return CloseReason::Clean,
            _ => continue,
        };

        // Drop empty and oversized payloads
        if text.is_empty() || text.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let envelope = Envelope::new(room_id, text.as_str());
        let frame = match encode_envelope(&envelope) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                tracing::debug!(conn_id, room = room_id, error = %e, "Dropped message");
                continue;
            },
        };

        let delivered = {
            let mut registry = state.registry.write().await;
            registry.broadcast(room_id, frame)
        };
        tracing::debug!(conn_id, room = room_id, delivered, "Broadcast");
    }
}
