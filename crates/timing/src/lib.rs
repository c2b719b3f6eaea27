//! Frame timing: decouples how often a frame is presented from how many
//! fixed-size simulation ticks run.
//!
//! # Invariants
//! - A wait never returns before its deadline.
//! - The accumulated pacing deviation stays within a sixteenth of the target interval.
//! - The tick count is derived from elapsed time only; it is never negative.

pub mod clock;
pub mod os_timer;
pub mod pacer;
pub mod waiter;

pub use clock::{ManualClock, MonotonicClock, SimulationClock, TimeSource};
pub use os_timer::TimerRequest;
pub use pacer::{FramePacer, FramePacing, NoHooks, PacerHooks, PacingState};
pub use waiter::{PreciseWaiter, WaitStrategy, Waiter};
