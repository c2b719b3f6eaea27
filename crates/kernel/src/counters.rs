/// Per-frame counters kept by the host.
///
/// Animation state is keyed to simulation ticks, so its counters only move on
/// frames that ran at least one tick. A frame with zero ticks is a pure
/// re-render and must leave them untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    /// Every presented frame.
    pub render_frames: u64,
    /// Frames that ran one or more ticks.
    pub frames_with_ticks: u64,
    /// Advances by one per tick-bearing frame; drives texture and palette animation.
    pub animation_frame: u32,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ticks: u32) {
        self.render_frames += 1;
        if ticks > 0 {
            self.frames_with_ticks += 1;
            self.animation_frame = self.animation_frame.wrapping_add(1);
        }
    }

    /// Frames that re-rendered without advancing the simulation.
    pub fn idle_frames(&self) -> u64 {
        self.render_frames - self.frames_with_ticks
    }
}
