pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod upstream;

pub use audio::{
    AudioFrame, AudioOutput, CapturePipeline, CaptureState, PlaybackScheduler, ScheduledSegment,
};
pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use protocol::TransportMessage;
pub use relay::{create_router, AppState};
pub use upstream::{
    AudioBlob, LiveSpeechService, ResponsePart, SessionManager, SessionOptions, SessionState,
    SpeechService, UpstreamEvent, UpstreamHandle,
};
