//! Adaptive frame pacing.
//!
//! Once per presented frame the pacer waits out whatever is left of the target
//! interval (corrected by the deviation carried over from earlier frames) and
//! converts the elapsed wall time into a whole number of fixed-rate ticks.
//! Fractional ticks are carried to the next frame.

use std::time::Duration;

use horizon_common::{PacingPolicy, PacingSettings};

use crate::clock::{MonotonicClock, SimulationClock, TimeSource};
use crate::waiter::{PreciseWaiter, Waiter};

/// Below this much remaining time the efficient policy stops sleeping and
/// only yields.
pub const SPIN_TAIL_MS: f64 = 2.0;

/// The deviation accumulator is clamped to `± interval / DEVIATION_DIVISOR`.
pub const DEVIATION_DIVISOR: f64 = 16.0;

const SLEEP_STEP: Duration = Duration::from_millis(1);

/// Callbacks into the host presentation and loading layers.
pub trait PacerHooks {
    /// Switch the tear-resistant presentation mode on or off.
    fn set_tear_resistant(&mut self, _enabled: bool) {}

    /// Run one slice of pending load work. Returns false when nothing ran.
    fn pump_load_work(&mut self) -> bool {
        false
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl PacerHooks for NoHooks {}

/// Snapshot of the pacer's timing state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingState {
    /// `None` when pacing is uncapped.
    pub target_interval_ms: Option<f64>,
    pub accumulated_deviation_ms: f64,
    pub last_sample: Duration,
}

/// What happened during one call to [`FramePacer::pace_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FramePacing {
    /// Simulation ticks to run this frame.
    pub ticks: u32,
    /// Length of the frame that just closed.
    pub elapsed_ms: f64,
    /// Accumulated deviation after this frame.
    pub deviation_ms: f64,
    /// False when the frame was uncapped or skipped for loading.
    pub paced: bool,
    pub sleeps: u32,
    pub yields: u32,
    pub load_pumps: u32,
}

/// Decides how long each frame waits and how many ticks it runs.
pub struct FramePacer<T: TimeSource = MonotonicClock, W: Waiter = PreciseWaiter> {
    settings: PacingSettings,
    clock: SimulationClock<T>,
    waiter: W,
    hooks: Box<dyn PacerHooks>,
    loading: bool,
    tear_resistant: bool,
    tick_progress: f64,
    frames: u64,
    total_ticks: u64,
}

impl FramePacer {
    /// Pacer on the wall clock with a calibrated [`PreciseWaiter`].
    pub fn new(settings: PacingSettings) -> Self {
        Self::with_parts(settings, MonotonicClock::new(), PreciseWaiter::calibrated())
    }
}

impl<T: TimeSource, W: Waiter> FramePacer<T, W> {
    pub fn with_parts(settings: PacingSettings, source: T, waiter: W) -> Self {
        tracing::debug!(
            target_fps = settings.target_fps,
            policy = ?settings.policy,
            fast_load = ?settings.fast_load,
            min_ticks = settings.min_ticks_per_frame,
            "frame pacer created"
        );
        Self {
            settings,
            clock: SimulationClock::new(source),
            waiter,
            hooks: Box::new(NoHooks),
            loading: false,
            tear_resistant: false,
            tick_progress: 0.0,
            frames: 0,
            total_ticks: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: impl PacerHooks + 'static) -> Self {
        self.set_hooks(hooks);
        self
    }

    /// Replace the hooks on a live pacer. The new hooks are not told about a
    /// tear-resistant mode that is already on.
    pub fn set_hooks(&mut self, hooks: impl PacerHooks + 'static) {
        self.hooks = Box::new(hooks);
    }

    pub fn settings(&self) -> &PacingSettings {
        &self.settings
    }

    /// Swap the tuning live. A new target rate discards the old deviation.
    pub fn apply_settings(&mut self, settings: PacingSettings) {
        if settings.target_fps != self.settings.target_fps {
            self.clock.reset_deviation();
        }
        tracing::info!(
            target_fps = settings.target_fps,
            policy = ?settings.policy,
            "pacing settings applied"
        );
        self.settings = settings;
    }

    /// Report whether the simulation is in a non-interactive loading state.
    pub fn set_loading(&mut self, loading: bool) {
        if loading != self.loading {
            tracing::debug!(loading, "loading state changed");
        }
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_tear_resistant(&self) -> bool {
        self.tear_resistant
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn state(&self) -> PacingState {
        PacingState {
            target_interval_ms: self.settings.target_interval_ms(),
            accumulated_deviation_ms: self.clock.deviation_ms(),
            last_sample: self.clock.last_sample(),
        }
    }

    /// Tick count for this frame. Call exactly once per presented frame,
    /// before advancing the simulation.
    pub fn compute_ticks_this_frame(&mut self) -> u32 {
        self.pace_frame().ticks
    }

    /// Wait out the frame and report what happened.
    pub fn pace_frame(&mut self) -> FramePacing {
        let _span = tracing::trace_span!("pace_frame", frame = self.frames).entered();
        let mut report = FramePacing::default();

        let skip_for_load = self.loading && self.settings.fast_load.skips_pacing();
        self.sync_tear_resistance(skip_for_load);

        match self.settings.target_interval_ms() {
            Some(interval) if !skip_for_load => {
                self.wait_for_deadline(interval, &mut report);
                report.elapsed_ms = self.clock.mark_frame();
                self.clock.accumulate_deviation(
                    report.elapsed_ms - interval,
                    interval / DEVIATION_DIVISOR,
                );
                report.paced = true;
            }
            _ => {
                report.elapsed_ms = self.clock.mark_frame();
                self.clock.reset_deviation();
            }
        }

        report.deviation_ms = self.clock.deviation_ms();
        report.ticks = self.ticks_for(report.elapsed_ms);
        self.frames += 1;
        self.total_ticks += u64::from(report.ticks);

        tracing::trace!(
            ticks = report.ticks,
            elapsed_ms = report.elapsed_ms,
            deviation_ms = report.deviation_ms,
            sleeps = report.sleeps,
            yields = report.yields,
            "frame paced"
        );
        report
    }

    /// Block until the carried-deviation-corrected deadline has passed.
    ///
    /// A late previous frame (positive deviation) pulls the deadline in, an
    /// early one pushes it out.
    fn wait_for_deadline(&mut self, interval: f64, report: &mut FramePacing) {
        let threshold = interval - self.clock.deviation_ms();
        loop {
            let elapsed = self.clock.elapsed_ms();
            if elapsed >= threshold {
                break;
            }
            let remaining = threshold - elapsed;
            if self.settings.policy == PacingPolicy::Efficient && remaining > SPIN_TAIL_MS {
                if self.settings.fast_load.pumps_load_work() && self.hooks.pump_load_work() {
                    report.load_pumps += 1;
                    continue;
                }
                self.waiter.wait(SLEEP_STEP);
                report.sleeps += 1;
            } else {
                self.waiter.yield_now();
                report.yields += 1;
            }
        }
    }

    fn ticks_for(&mut self, elapsed_ms: f64) -> u32 {
        self.tick_progress += elapsed_ms * f64::from(self.settings.tick_rate_hz) / 1000.0;
        let whole = self.tick_progress.floor();
        self.tick_progress -= whole;
        // `as` saturates, so an absurd stall cannot wrap.
        let ticks = whole as u32;
        if ticks < self.settings.min_ticks_per_frame {
            self.tick_progress = 0.0;
            return self.settings.min_ticks_per_frame;
        }
        ticks
    }

    fn sync_tear_resistance(&mut self, skip_for_load: bool) {
        let want = skip_for_load && self.settings.fast_load.toggles_tearing();
        if want != self.tear_resistant {
            tracing::debug!(enabled = want, "tear-resistant presentation");
            self.hooks.set_tear_resistant(want);
            self.tear_resistant = want;
        }
    }
}
