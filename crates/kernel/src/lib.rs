//! Host kernel: the fixed-rate stage simulation and the per-frame loop that
//! ties pacing, stepping and visibility together.
//!
//! # Invariants
//! - A frame runs exactly the number of ticks the pacer reported, never more.
//! - The visibility pass for a frame sees the section reached by the frame's last tick.
//! - Tick-keyed counters move only on frames that ran at least one tick.
//! - Stepping is integer-only and seeded, so runs replay bit-for-bit.

pub mod counters;
pub mod frame_loop;
pub mod sections;
pub mod stage;

pub use counters::FrameCounters;
pub use frame_loop::{FrameLoop, FrameOutcome, KernelError};
pub use sections::{SectionTable, SectionTableParams};
pub use stage::{StageEvent, StageLayout, StageWorld};
