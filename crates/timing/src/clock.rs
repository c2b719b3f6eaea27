use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::waiter::Waiter;

/// A monotonic time source measured from an arbitrary origin.
pub trait TimeSource {
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for tests and offline replays.
///
/// Clones share the same time. As a [`Waiter`] it advances itself by the
/// requested duration, and by [`ManualClock::YIELD_STEP`] per yield, so a
/// pacing loop driven by it always terminates.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub const YIELD_STEP: Duration = Duration::from_micros(50);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Waiter for ManualClock {
    fn wait(&self, duration: Duration) {
        self.advance(duration);
    }

    fn yield_now(&self) {
        self.advance(Self::YIELD_STEP);
    }
}

/// Frame-boundary bookkeeping on top of a [`TimeSource`].
///
/// Tracks the timestamp of the last frame boundary and the accumulated
/// deviation between requested and actual frame intervals.
#[derive(Debug)]
pub struct SimulationClock<T: TimeSource> {
    source: T,
    last_sample: Duration,
    deviation_ms: f64,
}

impl<T: TimeSource> SimulationClock<T> {
    pub fn new(source: T) -> Self {
        let last_sample = source.now();
        Self {
            source,
            last_sample,
            deviation_ms: 0.0,
        }
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    /// Milliseconds since the last frame boundary.
    pub fn elapsed_ms(&self) -> f64 {
        to_ms(self.source.now().saturating_sub(self.last_sample))
    }

    /// Close the current frame: returns its length in milliseconds and starts
    /// the next one.
    pub fn mark_frame(&mut self) -> f64 {
        let now = self.source.now();
        let elapsed = to_ms(now.saturating_sub(self.last_sample));
        self.last_sample = now;
        elapsed
    }

    pub fn last_sample(&self) -> Duration {
        self.last_sample
    }

    pub fn deviation_ms(&self) -> f64 {
        self.deviation_ms
    }

    /// Add one frame's error and clamp the total to `±limit_ms`.
    pub fn accumulate_deviation(&mut self, frame_deviation_ms: f64, limit_ms: f64) {
        self.deviation_ms = (self.deviation_ms + frame_deviation_ms).clamp(-limit_ms, limit_ms);
    }

    pub fn reset_deviation(&mut self) {
        self.deviation_ms = 0.0;
    }
}

fn to_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
