//! Developer tooling: pacing and stage inspectors, frame timing, and edge
//! capture reports for tuning the look-ahead.
//!
//! # Invariants
//! - Tools only read state; nothing here mutates the pacer, the stage or the window.

pub mod capture;
pub mod frame_timer;
pub mod inspector;

pub use capture::{CaptureReport, CapturedObject};
pub use frame_timer::FrameTimer;
pub use inspector::{CounterSummary, LoopSummary, PacingInspector, PacingSummary, StageSummary};

pub fn crate_info() -> &'static str {
    "horizon-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
