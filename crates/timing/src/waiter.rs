use std::time::{Duration, Instant};

use crate::os_timer::{self, TimerRequest};

/// Observed sleep overshoot at or below which the platform sleep counts as
/// high resolution.
pub const HIGH_RES_THRESHOLD: Duration = Duration::from_millis(2);

const CALIBRATION_SAMPLES: u32 = 5;
const CALIBRATION_SLEEP: Duration = Duration::from_micros(500);
const MIN_CHUNK: Duration = Duration::from_micros(250);
const MIN_SPIN_TAIL: Duration = Duration::from_micros(200);
const COARSE_SAFETY: Duration = Duration::from_millis(1);

/// Something that can block the calling thread for a while.
///
/// The pacer only talks to this seam, so tests can drive it with a manual clock.
pub trait Waiter {
    /// Block for approximately `duration`, never returning early.
    fn wait(&self, duration: Duration);

    /// Give up the rest of the time slice without sleeping.
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// How [`PreciseWaiter`] spends the bulk of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Short sleeps of at most `chunk`, then spin the last `spin_tail`.
    HighResolution { chunk: Duration, spin_tail: Duration },
    /// One sleep that stops `margin` short of the deadline, then spin.
    Coarse { margin: Duration },
}

impl WaitStrategy {
    /// Pick a strategy from the worst sleep overshoot seen on this machine.
    pub fn for_granularity(granularity: Duration) -> Self {
        if granularity <= HIGH_RES_THRESHOLD {
            Self::HighResolution {
                chunk: (granularity * 4).clamp(MIN_CHUNK, Duration::from_millis(1)),
                spin_tail: granularity.max(MIN_SPIN_TAIL),
            }
        } else {
            Self::Coarse {
                margin: granularity + COARSE_SAFETY,
            }
        }
    }
}

/// Sub-millisecond sleep: low CPU for the bulk of the wait, a yielding spin
/// for the tail.
#[derive(Debug, Clone)]
pub struct PreciseWaiter {
    strategy: WaitStrategy,
    granularity: Duration,
    timer_request: TimerRequest,
}

impl PreciseWaiter {
    /// Ask the OS for its finest timer, then measure the platform sleep and
    /// choose a strategy for it.
    pub fn calibrated() -> Self {
        Self::calibrated_with(os_timer::request_fine_timer)
    }

    /// Calibrate after running `request`, whose outcome is only recorded.
    pub fn calibrated_with(request: impl FnOnce() -> TimerRequest) -> Self {
        let timer_request = request();
        let granularity = measure_granularity();
        let strategy = WaitStrategy::for_granularity(granularity);
        match strategy {
            WaitStrategy::HighResolution { chunk, spin_tail } => tracing::info!(
                granularity_us = granularity.as_micros() as u64,
                chunk_us = chunk.as_micros() as u64,
                spin_tail_us = spin_tail.as_micros() as u64,
                ?timer_request,
                "using high resolution waits"
            ),
            WaitStrategy::Coarse { margin } => tracing::warn!(
                granularity_us = granularity.as_micros() as u64,
                margin_us = margin.as_micros() as u64,
                ?timer_request,
                "high resolution sleep unavailable, falling back to coarse waits"
            ),
        }
        Self {
            strategy,
            granularity,
            timer_request,
        }
    }

    /// Skip calibration and use a fixed strategy.
    pub fn with_strategy(strategy: WaitStrategy) -> Self {
        Self {
            strategy,
            granularity: Duration::ZERO,
            timer_request: TimerRequest::NotRequested,
        }
    }

    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    /// Worst sleep overshoot seen during calibration (zero if not calibrated).
    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    pub fn timer_request(&self) -> TimerRequest {
        self.timer_request
    }

    /// Convenience for callers that think in seconds.
    pub fn wait_seconds(&self, seconds: f64) {
        if seconds > 0.0 && seconds.is_finite() {
            self.wait(Duration::from_secs_f64(seconds));
        }
    }
}

impl Default for PreciseWaiter {
    fn default() -> Self {
        Self::calibrated()
    }
}

impl Waiter for PreciseWaiter {
    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        match self.strategy {
            WaitStrategy::HighResolution { chunk, spin_tail } => loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= spin_tail {
                    break;
                }
                std::thread::sleep((remaining - spin_tail).min(chunk));
            },
            WaitStrategy::Coarse { margin } => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining > margin {
                    std::thread::sleep(remaining - margin);
                }
            }
        }
        // Sleeps may undershoot or wake late; re-measure and spin the remainder.
        while Instant::now() < deadline {
            std::thread::yield_now();
        }
    }
}

fn measure_granularity() -> Duration {
    let mut worst = Duration::ZERO;
    for _ in 0..CALIBRATION_SAMPLES {
        let start = Instant::now();
        std::thread::sleep(CALIBRATION_SLEEP);
        worst = worst.max(start.elapsed().saturating_sub(CALIBRATION_SLEEP));
    }
    worst
}
