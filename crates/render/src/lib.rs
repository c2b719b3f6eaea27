//! Rendering Adapter: the seam between the visibility core and whatever draws.
//!
//! # Invariants
//! - The core never draws; it only hands sentinel-terminated node lists across.
//! - A sink must not retain the borrowed list past the call.
//!
//! # Workaround
//! Ships a recording sink and a debug text sink as stand-ins for a real draw
//! backend. The trait is stable; a GPU backend implements it without changing
//! the visibility window.

mod sink;

pub use sink::{DebugTextSink, DrawSink, RecordingSink, node_slice};

pub fn crate_info() -> &'static str {
    "horizon-render v0.1.0"
}
