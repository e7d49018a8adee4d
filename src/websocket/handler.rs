use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::relay::{PeerId, RelayHandle};
use crate::state::AppState;

/// Session key of a relay connection.
///
/// The first `noteId` wins; a missing one is the empty key. The value is
/// never validated.
pub fn note_id_from(params: &[(String, String)]) -> String {
    params
        .iter()
        .find(|(key, _)| key == "noteId")
        .map(|(_, value)| value.clone())
        .unwrap_or_default()
}

/// WebSocket handler
pub async fn websocket_handler(
    Query(params): Query<Vec<(String, String)>>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    let note_id = note_id_from(&params);
    info!("New relay connection attempt for note {:?}", note_id);
    let relay = app_state.relay.clone();
    let shutdown = app_state.shutdown.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, note_id, relay, shutdown))
}

/// Drive one connection from OPEN to CLOSED.
async fn handle_socket(socket: WebSocket, note_id: String, relay: RelayHandle, shutdown: CancellationToken) {
    let peer: PeerId = Uuid::new_v4();
    info!("Relay connection established for note {:?} with peer {}", note_id, peer);

    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    if !relay.open(peer, note_id.clone(), outbound) {
        warn!("Relay dispatcher is not running, closing peer {}", peer);
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let _leave = LeaveGuard { relay: relay.clone(), peer };

    // Writes frames queued by the dispatcher
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Feeds inbound frames to the dispatcher in arrival order
    let frame_relay = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if !frame_relay.frame(peer, text) {
                        break;
                    }
                }
                Ok(Message::Binary(data)) => {
                    warn!("Dropping binary frame ({} bytes) from peer {}", data.len(), peer);
                }
                Ok(Message::Close(frame)) => {
                    debug!("Peer {} initiated close: {:?}", peer, frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Receive error from peer {}: {}", peer, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
        _ = shutdown.cancelled() => {
            debug!("Server shutting down, dropping peer {}", peer);
            send_task.abort();
            recv_task.abort();
        }
    };

    info!("Relay connection terminated for note {:?} with peer {}", note_id, peer);
}

/// Sends the peer's close event when the connection task ends, however it ends.
struct LeaveGuard {
    relay: RelayHandle,
    peer: PeerId,
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        self.relay.close(self.peer);
    }
}
