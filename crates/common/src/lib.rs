//! Shared types for the horizon workspace: stage/object/node identifiers and
//! the tuning surface consumed by the pacer and the visibility window.
//!
//! # Invariants
//! - Identifiers are plain copyable newtypes; range checks happen at construction.
//! - Settings are validated once at load; consumers trust them afterwards.

pub mod settings;
pub mod types;

pub use settings::{
    AheadSpanOverride, FastLoadPolicy, PacingPolicy, PacingSettings, Settings, SettingsError,
    VisibilitySettings,
};
pub use types::{
    MAX_NODE_ID, MAX_OBJECTS, MAX_STAGES, NODE_SENTINEL, NodeId, ObjectId, SectionIndex, StageId,
};
