use thiserror::Error;

/// Error taxonomy for the relay and client pipelines.
///
/// All of these are recovered at the boundary where they occur and
/// surfaced as a `status` message or an error state; none of them
/// terminates the relay process. Transport failures end the one
/// connection they belong to, nothing else.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Codec input is structurally invalid (odd byte length, bad base64)
    #[error("malformed audio payload: {0}")]
    MalformedAudio(String),

    /// Microphone device denied or unavailable
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Remote speech session failed to open
    #[error("failed to open upstream session: {0}")]
    UpstreamConnect(String),

    /// Channel-level failure (network drop, closed socket)
    #[error("transport failure: {0}")]
    Transport(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
