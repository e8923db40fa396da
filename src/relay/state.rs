use std::sync::Arc;

use crate::config::Config;
use crate::upstream::SpeechService;

/// Shared application state for the relay's HTTP/WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Factory for remote speech sessions; one session per connection
    pub service: Arc<dyn SpeechService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<dyn SpeechService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }
}
