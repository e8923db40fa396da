// Channel-backed test double for the remote speech service.
//
// Each connect() records a SessionProbe so tests can inspect what was
// forwarded upstream and inject server events into a live session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voice_relay::error::RelayError;
use voice_relay::upstream::{SessionOptions, SpeechService, UpstreamEvent, UpstreamHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum SentInput {
    Text(String),
    Audio(Vec<u8>, String),
}

#[derive(Clone)]
pub struct SessionProbe {
    pub inputs: Arc<Mutex<Vec<SentInput>>>,
    pub events: mpsc::Sender<UpstreamEvent>,
    pub closed: Arc<AtomicBool>,
}

impl SessionProbe {
    pub fn sent(&self) -> Vec<SentInput> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockSpeechService {
    fail_next_connect: AtomicBool,
    sessions: Mutex<Vec<SessionProbe>>,
}

impl MockSpeechService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next connect() attempt fail.
    pub fn refuse_next_connect(&self) {
        self.fail_next_connect.store(true, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn probe(&self, index: usize) -> SessionProbe {
        self.sessions.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SpeechService for MockSpeechService {
    async fn connect(
        &self,
        _options: &SessionOptions,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<Box<dyn UpstreamHandle>, RelayError> {
        if self.fail_next_connect.swap(false, Ordering::SeqCst) {
            return Err(RelayError::UpstreamConnect("mock refusal".to_string()));
        }

        let inputs = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.sessions.lock().unwrap().push(SessionProbe {
            inputs: Arc::clone(&inputs),
            events,
            closed: Arc::clone(&closed),
        });

        Ok(Box::new(MockHandle { inputs, closed }))
    }
}

struct MockHandle {
    inputs: Arc<Mutex<Vec<SentInput>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl UpstreamHandle for MockHandle {
    async fn send_text(&mut self, text: &str) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("session closed".to_string()));
        }
        self.inputs
            .lock()
            .unwrap()
            .push(SentInput::Text(text.to_string()));
        Ok(())
    }

    async fn send_audio(&mut self, pcm: &[u8], mime_type: &str) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("session closed".to_string()));
        }
        self.inputs
            .lock()
            .unwrap()
            .push(SentInput::Audio(pcm.to_vec(), mime_type.to_string()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
