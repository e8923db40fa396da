// Speaker output: owns the shared output clock and drives the
// playback scheduler from the cpal render callback.
//
// The clock is the count of frames handed to the device divided by the
// device sample rate, so "now" advances exactly as fast as audio
// leaves the process. Like capture, the stream lives on a dedicated
// worker thread because cpal streams are not Send.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use super::playback::PlaybackScheduler;

/// Handle to the output device, its clock, and the scheduler it renders.
pub struct AudioOutput {
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the default output device and start rendering.
    pub fn start() -> Result<Self> {
        let scheduler = Arc::new(Mutex::new(PlaybackScheduler::new()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32, String>>();
        let worker_scheduler = Arc::clone(&scheduler);
        let worker_frames = Arc::clone(&frames_rendered);
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::spawn(move || {
            let stream = match build_output_stream(worker_scheduler, worker_frames, &ready_tx) {
                Some(stream) => stream,
                None => return,
            };

            while !worker_stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!("Audio output started at {}Hz", sample_rate);
                Ok(Self {
                    scheduler,
                    frames_rendered,
                    sample_rate,
                    stop,
                    worker: Some(worker),
                })
            }
            Ok(Err(reason)) => {
                let _ = worker.join();
                Err(anyhow!("audio output unavailable: {}", reason))
            }
            Err(_) => Err(anyhow!("audio output worker exited unexpectedly")),
        }
    }

    pub fn scheduler(&self) -> Arc<Mutex<PlaybackScheduler>> {
        Arc::clone(&self.scheduler)
    }

    /// Current position on the output clock, in seconds.
    pub fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Audio output worker panicked during shutdown");
            }
            info!("Audio output stopped");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_output_stream(
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    frames_rendered: Arc<AtomicU64>,
    ready_tx: &std::sync::mpsc::Sender<Result<u32, String>>,
) -> Option<cpal::Stream> {
    let fail = |reason: String| {
        let _ = ready_tx.send(Err(reason));
        None
    };

    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(device) => device,
        None => return fail("no default output device".to_string()),
    };

    let supported = match device.default_output_config() {
        Ok(supported) => supported,
        Err(e) => return fail(format!("failed to query output config: {}", e)),
    };

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return fail(format!(
            "unsupported output sample format: {:?}",
            supported.sample_format()
        ));
    }

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.into();

    let mut mono: Vec<f32> = Vec::new();

    let stream = match device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);

            let now = frames_rendered.load(Ordering::Relaxed) as f64 / sample_rate as f64;
            if let Ok(mut scheduler) = scheduler.lock() {
                scheduler.render(&mut mono, sample_rate, now);
            } else {
                mono.fill(0.0);
            }

            for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                frame.fill(sample);
            }
            frames_rendered.fetch_add(frames as u64, Ordering::Relaxed);
        },
        |err| warn!("Output stream error: {}", err),
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => return fail(format!("failed to build output stream: {}", e)),
    };

    if let Err(e) = stream.play() {
        return fail(format!("failed to start output stream: {}", e));
    }

    let _ = ready_tx.send(Ok(sample_rate));
    Some(stream)
}
