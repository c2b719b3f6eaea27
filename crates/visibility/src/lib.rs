//! Visibility: which geometry nodes each drawable object shows this pass.
//!
//! # Invariants
//! - A node is handed to the renderer at most once per object per pass.
//! - Emission order depends only on section order and list order, never on span size.
//! - Exclusions decide what is drawn, not what counts as already seen.
//! - A pass reads one whole exclusion table; reloads are never observed half-done.

mod exclusion;
mod window;

pub use exclusion::{
    ExclusionError, ExclusionStore, ExclusionTable, LoadReport, ParseIssue, ParseIssueKind,
};
pub use window::{DebugCapture, PassSummary, SectionSource, VisibilityWindow, WindowParams};

pub fn crate_info() -> &'static str {
    "horizon-visibility v0.1.0"
}
