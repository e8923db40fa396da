// Playback scheduling for streamed model audio.
//
// Decoded segments are scheduled back-to-back on the output clock:
// each one starts exactly where the previous one ends, or "now" when
// nothing is pending. The renderer mixes active segments into output
// blocks and retires them once their end time has passed, so natural
// completion and interruption both leave the active set consistent.

use tracing::debug;

/// A decoded audio buffer with its start position on the output clock.
///
/// Owned exclusively by the scheduler from enqueue until playback
/// completes or the segment is interrupted.
#[derive(Debug, Clone)]
pub struct ScheduledSegment {
    samples: Vec<f32>,
    sample_rate: u32,
    start: f64,
}

impl ScheduledSegment {
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration()
    }

    /// Sample value at clock time `t`, nearest-index lookup.
    fn sample_at(&self, t: f64) -> f32 {
        let index = ((t - self.start) * self.sample_rate as f64) as usize;
        self.samples.get(index).copied().unwrap_or(0.0)
    }
}

/// Schedules decoded segments gap-free on a shared output clock.
///
/// Clock positions are in seconds. Only the scheduler writes
/// `next_start`; the audio renderer drives `render` from the output
/// callback and the session side drives `enqueue`/`interrupt`.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    active: Vec<ScheduledSegment>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a decoded buffer to start when the previous segment
    /// ends, or at `now` if playback has stalled or this is the first
    /// segment of a turn. Returns the scheduled start time.
    pub fn enqueue(&mut self, samples: Vec<f32>, sample_rate: u32, now: f64) -> f64 {
        if self.next_start < now {
            self.next_start = now;
        }

        let start = self.next_start;

        if samples.is_empty() || sample_rate == 0 {
            debug!("Skipping empty playback segment");
            return start;
        }

        let segment = ScheduledSegment {
            samples,
            sample_rate,
            start,
        };
        self.next_start = segment.end();
        self.active.push(segment);

        start
    }

    /// Stop every active segment immediately and re-anchor the next
    /// enqueue to "now". Idempotent; safe with zero segments active or
    /// with segments that already finished naturally.
    pub fn interrupt(&mut self) {
        if !self.active.is_empty() {
            debug!("Interrupting {} active segment(s)", self.active.len());
        }
        self.active.clear();
        self.next_start = 0.0;
    }

    /// Mix active segments into an output block starting at clock time
    /// `now`, then retire segments whose playback has completed.
    pub fn render(&mut self, out: &mut [f32], out_rate: u32, now: f64) {
        out.fill(0.0);

        if out_rate == 0 {
            return;
        }

        let step = 1.0 / out_rate as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            let t = now + i as f64 * step;
            let mut sum = 0.0f32;
            for segment in &self.active {
                if segment.start <= t && t < segment.end() {
                    sum += segment.sample_at(t);
                }
            }
            *slot = sum.clamp(-1.0, 1.0);
        }

        let block_end = now + out.len() as f64 * step;
        self.active.retain(|segment| segment.end() > block_end);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Scheduled start times of the active set, in enqueue order.
    pub fn schedule(&self) -> Vec<(f64, f64)> {
        self.active.iter().map(|s| (s.start, s.end())).collect()
    }
}
