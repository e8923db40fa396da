// Connection supervisor: one WebSocket connection, one upstream
// session, one dispatch loop, one writer task.
//
// Client frames and generation-tagged upstream events funnel through a
// single select loop, so the session manager's transitions never
// overlap. Outbound messages go through a bounded queue drained into
// the socket by a separate writer task; the dispatch task produces
// into that queue and must never be its consumer. Session lifetime is
// tied strictly to the connection: accept opens the session,
// disconnect closes it, nothing else reaps it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::audio::codec;
use crate::protocol::TransportMessage;
use crate::upstream::{SessionManager, SessionOptions, UpstreamEvent};

/// GET /ws — WebSocket upgrade for the audio relay data plane.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "Client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportMessage>(64);
    let (events_tx, mut events_rx) = mpsc::channel::<(u64, UpstreamEvent)>(64);

    let options = SessionOptions {
        model: state.config.upstream.model.clone(),
        system_instruction: state.config.upstream.system_instruction.clone(),
        voice: state.config.upstream.voice.clone(),
        response_modalities: state.config.upstream.response_modalities.clone(),
    };
    let inbound_mime = codec::pcm_mime_type(state.config.audio.capture_sample_rate);

    let mut manager = SessionManager::new(
        state.service.clone(),
        options,
        inbound_mime,
        events_tx,
        outbound_tx.clone(),
    );
    manager.open().await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Dedicated writer: the dispatch task produces into the bounded
    // outbound queue, so the drain side must not be the same task or a
    // full queue would suspend its only consumer.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(%connection_id, "Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                debug!(%connection_id, "Client send failed; writer stopping");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            Some((generation, event)) = events_rx.recv() => {
                manager.handle_upstream(generation, event).await;
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_client_message(&text, &mut manager, &outbound_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%connection_id, "Client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%connection_id, "Transport error: {}", e);
                        break;
                    }
                    // Ping/pong handled by axum; binary frames are not
                    // part of the protocol.
                    Some(Ok(other)) => {
                        debug!(%connection_id, "Ignoring non-text frame: {:?}", other);
                    }
                }
            }
        }
    }

    manager.close().await;

    // Release the last outbound senders so the writer drains what is
    // queued and exits.
    drop(manager);
    drop(outbound_tx);
    if writer.await.is_err() {
        warn!(%connection_id, "Writer task panicked");
    }
    info!(%connection_id, "Connection torn down");
}

/// Validate and route one client frame. Malformed input costs exactly
/// one status message, never the connection.
async fn dispatch_client_message(
    text: &str,
    manager: &mut SessionManager,
    outbound_tx: &mpsc::Sender<TransportMessage>,
) {
    let message = match serde_json::from_str::<TransportMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejecting malformed client message: {}", e);
            send_bad_message_status(outbound_tx).await;
            return;
        }
    };

    if let Err(reason) = message.validate() {
        warn!("Rejecting invalid client message: {}", reason);
        send_bad_message_status(outbound_tx).await;
        return;
    }

    match message {
        TransportMessage::Reset => manager.reset().await,
        message @ (TransportMessage::Text { .. } | TransportMessage::Audio { .. }) => {
            manager.forward_inbound(message).await;
        }
        TransportMessage::Status { .. } => {
            // Server-to-client only; a client sending it is misbehaving.
            warn!("Client sent a status message");
            send_bad_message_status(outbound_tx).await;
        }
    }
}

async fn send_bad_message_status(outbound_tx: &mpsc::Sender<TransportMessage>) {
    if outbound_tx
        .send(TransportMessage::status("Bad client message"))
        .await
        .is_err()
    {
        debug!("Client connection gone; dropping status");
    }
}
