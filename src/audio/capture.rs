// Microphone capture pipeline.
//
// cpal streams are not Send, so the stream lives on a dedicated worker
// thread for the whole recording session. The device is captured at
// its native rate, resampled to exactly the configured capture rate,
// sliced into fixed-size frames and pushed into a tokio channel.
// Dropping the stream on stop releases the device handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{codec, AudioFrame};
use crate::error::RelayError;

/// Explicit recording state, transitioned only by `start`/`stop`.
///
/// `Idle → Requesting → Recording → Idle`, with `Failed` reached when
/// device acquisition is denied. Components that care about the state
/// read it here instead of polling ambient flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Recording,
    Failed,
}

/// Divides the microphone stream into fixed-size PCM16 frames.
pub struct CapturePipeline {
    target_rate: u32,
    frame_samples: usize,
    state: CaptureState,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    pub fn new(target_rate: u32, frame_samples: usize) -> Self {
        Self {
            target_rate,
            frame_samples,
            state: CaptureState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Acquire the default input device and start emitting frames.
    ///
    /// Fails with `CaptureUnavailable` if the device cannot be opened;
    /// the pipeline is left not recording and a later retry is allowed.
    pub fn start(&mut self, frames_tx: mpsc::Sender<AudioFrame>) -> Result<(), RelayError> {
        if self.state == CaptureState::Recording {
            return Err(RelayError::CaptureUnavailable(
                "capture already running; call stop() first".to_string(),
            ));
        }

        self.state = CaptureState::Requesting;
        self.stop.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32, String>>();
        let stop = Arc::clone(&self.stop);
        let target_rate = self.target_rate;
        let frame_samples = self.frame_samples;

        let worker = std::thread::spawn(move || {
            let stream = match build_input_stream(target_rate, frame_samples, frames_tx) {
                Ok((stream, device_rate)) => {
                    let _ = ready_tx.send(Ok(device_rate));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Keep the stream alive until stop() flips the flag; the
            // device handle is released when the stream drops.
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            debug!("Capture worker released input device");
        });

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => {
                self.worker = Some(worker);
                self.state = CaptureState::Recording;
                info!(
                    "Capture started: device {}Hz -> {}Hz, {} samples/frame",
                    device_rate, self.target_rate, self.frame_samples
                );
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = worker.join();
                self.state = CaptureState::Failed;
                Err(RelayError::CaptureUnavailable(reason))
            }
            Err(_) => {
                self.state = CaptureState::Failed;
                Err(RelayError::CaptureUnavailable(
                    "capture worker exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Stop capturing and release the input device. Safe to call when
    /// not recording.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Capture worker panicked during shutdown");
            }
            info!("Capture stopped");
        }
        self.state = CaptureState::Idle;
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Streaming linear resampler from the device rate to the target rate.
///
/// Each output sample is interpolated between the two input samples
/// bracketing its position, so the output rate is exact regardless of
/// the rate ratio. State carries across callbacks; the first input
/// sample only primes the interpolation window.
struct LinearResampler {
    /// Input samples consumed per output sample
    step: f64,
    /// Position of the next output within the current input interval
    pos: f64,
    prev: f32,
    primed: bool,
}

impl LinearResampler {
    fn new(device_rate: u32, target_rate: u32) -> Self {
        Self {
            step: f64::from(device_rate) / f64::from(target_rate),
            pos: 0.0,
            prev: 0.0,
            primed: false,
        }
    }

    /// Feed one input sample, appending any output samples that fall
    /// inside the interval it closes.
    fn push(&mut self, input: f32, out: &mut Vec<i16>) {
        if !self.primed {
            self.prev = input;
            self.primed = true;
            return;
        }

        while self.pos < 1.0 {
            let sample = self.prev + (input - self.prev) * self.pos as f32;
            out.push(codec::quantize_sample(sample));
            self.pos += self.step;
        }
        self.pos -= 1.0;
        self.prev = input;
    }
}

/// Build the cpal input stream. Returns the stream plus the device's
/// native sample rate.
fn build_input_stream(
    target_rate: u32,
    frame_samples: usize,
    frames_tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, u32), String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| "no default input device".to_string())?;

    let supported = device
        .default_input_config()
        .map_err(|e| format!("failed to query input config: {}", e))?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(format!(
            "unsupported input sample format: {:?}",
            supported.sample_format()
        ));
    }

    let device_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let config: cpal::StreamConfig = supported.into();

    let mut resampler = LinearResampler::new(device_rate, target_rate);
    let mut pending: Vec<i16> = Vec::with_capacity(frame_samples * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _| {
                // Channel 0 only, resampled to exactly the target rate
                // so the emitted rate matches what the frames claim.
                for chunk in data.chunks(channels) {
                    resampler.push(chunk[0], &mut pending);
                }

                while pending.len() >= frame_samples {
                    let rest = pending.split_off(frame_samples);
                    let frame = AudioFrame {
                        samples: std::mem::replace(&mut pending, rest),
                        sample_rate: target_rate,
                    };
                    if let Err(e) = frames_tx.try_send(frame) {
                        // Receiver is slow or gone; dropping the frame
                        // keeps the audio callback non-blocking.
                        debug!("Dropping capture frame: {}", e);
                    }
                }
            },
            |err| warn!("Capture stream error: {}", err),
            None,
        )
        .map_err(|e| format!("failed to build input stream: {}", e))?;

    stream
        .play()
        .map_err(|e| format!("failed to start input stream: {}", e))?;

    Ok((stream, device_rate))
}
