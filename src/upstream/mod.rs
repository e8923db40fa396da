pub mod live;
pub mod service;
pub mod session;

pub use live::LiveSpeechService;
pub use service::{AudioBlob, ResponsePart, SessionOptions, SpeechService, UpstreamEvent, UpstreamHandle};
pub use session::{SessionManager, SessionState};
