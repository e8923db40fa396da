pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;

pub use capture::{CapturePipeline, CaptureState};
pub use output::AudioOutput;
pub use playback::{PlaybackScheduler, ScheduledSegment};

/// A fixed-length run of signed 16-bit mono samples at an explicit
/// sample rate. Immutable once constructed; produced by the capture
/// pipeline or decoded from a relay message.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Serialize the frame to little-endian PCM16 bytes.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
