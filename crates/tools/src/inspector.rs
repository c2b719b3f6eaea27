use std::fmt;

use horizon_kernel::{FrameCounters, FrameLoop, StageWorld};
use horizon_timing::{FramePacer, TimeSource, Waiter};
use serde::Serialize;

/// Read-only queries against the pacer and the stage, for debugging and
/// development UI.
pub struct PacingInspector;

impl PacingInspector {
    pub fn summary<T: TimeSource, W: Waiter>(pacer: &FramePacer<T, W>) -> PacingSummary {
        let state = pacer.state();
        PacingSummary {
            target_fps: pacer.settings().target_fps,
            target_interval_ms: state.target_interval_ms,
            deviation_ms: state.accumulated_deviation_ms,
            frames: pacer.frames(),
            total_ticks: pacer.total_ticks(),
            loading: pacer.is_loading(),
            tear_resistant: pacer.is_tear_resistant(),
        }
    }

    pub fn stage(world: &StageWorld) -> StageSummary {
        StageSummary {
            stage: world.stage().0,
            tick: world.tick(),
            section: world.section(),
            max_section: world.max_section(),
            loading: world.is_loading(),
            state_hash: world.state_hash(),
        }
    }

    /// Everything about a running loop at once.
    pub fn frame_loop<T: TimeSource, W: Waiter>(lp: &FrameLoop<T, W>) -> LoopSummary {
        LoopSummary {
            pacing: Self::summary(lp.pacer()),
            stage: Self::stage(lp.world()),
            counters: CounterSummary::from(lp.counters()),
            visibility_passes: lp.window().passes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacingSummary {
    pub target_fps: u32,
    pub target_interval_ms: Option<f64>,
    pub deviation_ms: f64,
    pub frames: u64,
    pub total_ticks: u64,
    pub loading: bool,
    pub tear_resistant: bool,
}

impl PacingSummary {
    /// Mean ticks per presented frame.
    pub fn ticks_per_frame(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_ticks as f64 / self.frames as f64
    }
}

impl fmt::Display for PacingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_interval_ms {
            Some(interval) => write!(
                f,
                "Pacing: target={}fps ({interval:.3}ms)",
                self.target_fps
            )?,
            None => write!(f, "Pacing: uncapped")?,
        }
        write!(
            f,
            " frames={} ticks={} ticks/frame={:.2} deviation={:+.3}ms",
            self.frames,
            self.total_ticks,
            self.ticks_per_frame(),
            self.deviation_ms
        )?;
        if self.loading {
            write!(f, " loading")?;
        }
        if self.tear_resistant {
            write!(f, " tear-resistant")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: u8,
    pub tick: u64,
    pub section: i32,
    pub max_section: i32,
    pub loading: bool,
    pub state_hash: u64,
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stage {}: tick={} section={}/{} hash={:016x}{}",
            self.stage,
            self.tick,
            self.section,
            self.max_section,
            self.state_hash,
            if self.loading { " loading" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSummary {
    pub render_frames: u64,
    pub frames_with_ticks: u64,
    pub animation_frame: u32,
}

impl From<&FrameCounters> for CounterSummary {
    fn from(c: &FrameCounters) -> Self {
        Self {
            render_frames: c.render_frames,
            frames_with_ticks: c.frames_with_ticks,
            animation_frame: c.animation_frame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSummary {
    pub pacing: PacingSummary,
    pub stage: StageSummary,
    pub counters: CounterSummary,
    pub visibility_passes: u64,
}

impl fmt::Display for LoopSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.pacing)?;
        writeln!(f, "{}", self.stage)?;
        write!(
            f,
            "Frames: rendered={} with_ticks={} animation={} visibility_passes={}",
            self.counters.render_frames,
            self.counters.frames_with_ticks,
            self.counters.animation_frame,
            self.visibility_passes
        )
    }
}
