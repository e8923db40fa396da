// Boundary to the remote streaming speech service.
//
// The relay depends only on this connect/send/receive/close contract;
// the service's model behavior is opaque. `live.rs` provides the
// production implementation, tests plug in channel-backed doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RelayError;

/// Connection parameters for one remote session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub system_instruction: String,
    pub voice: String,
    pub response_modalities: Vec<String>,
}

/// Inline binary audio returned by the service.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// One part of a model turn. A part may carry text, inline audio, or
/// both; parts are forwarded downstream independently and in order.
#[derive(Debug, Clone, Default)]
pub struct ResponsePart {
    pub text: Option<String>,
    pub audio: Option<AudioBlob>,
}

/// Event emitted by a live session's receive side.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// One upstream message, split into its parts
    Parts(Vec<ResponsePart>),
    /// Non-fatal session error reported by the service
    Error(String),
    /// The remote side closed the session
    Closed,
}

/// Factory for remote sessions.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Establish a session. Events from the session's receive side are
    /// delivered through `events` until the session closes. Completes
    /// only once the session is usable for input.
    async fn connect(
        &self,
        options: &SessionOptions,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<Box<dyn UpstreamHandle>, RelayError>;
}

/// Input side of one live remote session.
///
/// `Send + Sync` so a boxed handle can live inside connection state
/// that is held across await points on a multi-threaded runtime.
#[async_trait]
pub trait UpstreamHandle: Send + Sync {
    async fn send_text(&mut self, text: &str) -> Result<(), RelayError>;

    /// Send one PCM frame as a raw media blob with an explicit mime type.
    async fn send_audio(&mut self, pcm: &[u8], mime_type: &str) -> Result<(), RelayError>;

    /// Tear the session down. Idempotent.
    async fn close(&mut self) -> Result<(), RelayError>;
}
