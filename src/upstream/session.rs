// Per-connection upstream session lifecycle.
//
// Exactly one remote session exists per client connection. The manager
// is owned by the connection's dispatch task, so state transitions are
// serialized by construction; no lock is needed. Each open() bumps a
// generation counter and events are tagged with the generation of the
// session that produced them, so strays from a just-closed session are
// discarded instead of reaching the client.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::service::{SessionOptions, SpeechService, UpstreamEvent, UpstreamHandle};
use crate::audio::codec;
use crate::protocol::TransportMessage;

/// Session lifecycle: `Closed → Opening → Open → Closed`, with the
/// reset path `Open → Closing → Closed → Opening → Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

pub struct SessionManager {
    service: Arc<dyn SpeechService>,
    options: SessionOptions,
    /// Mime type attached to client audio forwarded upstream
    inbound_mime: String,
    state: SessionState,
    generation: u64,
    handle: Option<Box<dyn UpstreamHandle>>,
    /// Upstream events, tagged with the generation that produced them
    events_tx: mpsc::Sender<(u64, UpstreamEvent)>,
    /// Messages headed back to the client
    outbound: mpsc::Sender<TransportMessage>,
}

impl SessionManager {
    pub fn new(
        service: Arc<dyn SpeechService>,
        options: SessionOptions,
        inbound_mime: String,
        events_tx: mpsc::Sender<(u64, UpstreamEvent)>,
        outbound: mpsc::Sender<TransportMessage>,
    ) -> Self {
        Self {
            service,
            options,
            inbound_mime,
            state: SessionState::Closed,
            generation: 0,
            handle: None,
            events_tx,
            outbound,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Establish the remote session. On failure the manager stays
    /// Closed and the client sees a status message; the connection
    /// remains usable for a retry via reset.
    pub async fn open(&mut self) {
        if self.state != SessionState::Closed {
            warn!(state = ?self.state, "open() called while session not closed; ignoring");
            return;
        }

        self.state = SessionState::Opening;
        self.generation += 1;
        let generation = self.generation;
        info!(generation, "Opening upstream session");

        // Per-generation pump: re-tags this session's events so the
        // dispatch loop can tell them apart from a replaced session's.
        let (session_tx, mut session_rx) = mpsc::channel::<UpstreamEvent>(64);
        let shared = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = session_rx.recv().await {
                if shared.send((generation, event)).await.is_err() {
                    break;
                }
            }
        });

        match self.service.connect(&self.options, session_tx).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Open;
                info!(generation, "Upstream session open");
                self.send_downstream(TransportMessage::status("Session ready"))
                    .await;
            }
            Err(e) => {
                self.state = SessionState::Closed;
                warn!(generation, "Upstream session failed to open: {}", e);
                self.send_downstream(TransportMessage::status(format!(
                    "Failed to open session: {}",
                    e
                )))
                .await;
            }
        }
    }

    /// Route a client message into the open session. Anything arriving
    /// while the session is not Open is dropped: early input during the
    /// handshake (or mid-reset) is lost by design rather than queued
    /// against a session that might never open.
    pub async fn forward_inbound(&mut self, message: TransportMessage) {
        if self.state != SessionState::Open {
            debug!(state = ?self.state, "Dropping inbound message while session not open");
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            debug!("Dropping inbound message: no live handle");
            return;
        };

        let result = match message {
            TransportMessage::Text { text } => handle.send_text(&text).await,
            TransportMessage::Audio { base64, .. } => match codec::decode_base64(&base64) {
                Ok(pcm) => handle.send_audio(&pcm, &self.inbound_mime).await,
                Err(e) => {
                    warn!("Rejecting client audio frame: {}", e);
                    self.send_downstream(TransportMessage::status("Bad client message"))
                        .await;
                    return;
                }
            },
            // Reset and status are routed by the supervisor, never here.
            _ => return,
        };

        if let Err(e) = result {
            warn!("Failed to forward input upstream: {}", e);
        }
    }

    /// Handle one event from the upstream receive side. Events from a
    /// generation other than the current one belong to a replaced
    /// session and are discarded.
    pub async fn handle_upstream(&mut self, generation: u64, event: UpstreamEvent) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Discarding event from stale session generation"
            );
            return;
        }

        match event {
            UpstreamEvent::Parts(parts) => {
                for part in parts {
                    if let Some(text) = part.text {
                        self.send_downstream(TransportMessage::Text { text }).await;
                    }
                    if let Some(audio) = part.audio {
                        self.send_downstream(TransportMessage::Audio {
                            base64: codec::encode_base64(&audio.data),
                            mime_type: Some(audio.mime_type),
                        })
                        .await;
                    }
                }
            }
            UpstreamEvent::Error(reason) => {
                warn!(generation, "Upstream session error: {}", reason);
                self.send_downstream(TransportMessage::status(format!(
                    "Upstream error: {}",
                    reason
                )))
                .await;
            }
            UpstreamEvent::Closed => {
                if self.state == SessionState::Open {
                    info!(generation, "Upstream session closed by remote");
                    self.handle = None;
                    self.state = SessionState::Closed;
                    self.send_downstream(TransportMessage::status("Session closed by upstream"))
                        .await;
                }
            }
        }
    }

    /// Replace the session: close the current one fully, then open a
    /// fresh one. Input arriving in between is dropped like during any
    /// other non-Open window.
    pub async fn reset(&mut self) {
        info!(generation = self.generation, "Resetting upstream session");

        if matches!(self.state, SessionState::Open | SessionState::Opening) {
            self.state = SessionState::Closing;
            if let Some(mut handle) = self.handle.take() {
                if let Err(e) = handle.close().await {
                    warn!("Error closing upstream session during reset: {}", e);
                }
            }
        }
        self.state = SessionState::Closed;

        self.open().await;
    }

    /// Tear the session down from any state. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.state = SessionState::Closing;
            if let Err(e) = handle.close().await {
                warn!("Error closing upstream session: {}", e);
            }
            info!(generation = self.generation, "Upstream session closed");
        }
        self.state = SessionState::Closed;
    }

    /// Send toward the client. A closing connection race is logged and
    /// swallowed; it must never crash the sender.
    async fn send_downstream(&self, message: TransportMessage) {
        if self.outbound.send(message).await.is_err() {
            debug!("Client connection gone; dropping outbound message");
        }
    }
}
