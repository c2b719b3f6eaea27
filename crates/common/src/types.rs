use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminator for every node list handed across the core boundary.
pub const NODE_SENTINEL: u16 = 0xFFFF;

/// Highest node id the world data is expected to use.
pub const MAX_NODE_ID: u16 = 16383;

/// Number of addressable stages.
pub const MAX_STAGES: u32 = 128;

/// Number of drawable object slots.
pub const MAX_OBJECTS: u32 = 256;

/// Position along a stage's linear section sequence.
///
/// Signed so that `current + offset` can be tested for going negative.
pub type SectionIndex = i32;

/// Identifier of a stage (0..=127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(pub u8);

impl StageId {
    /// Returns `None` when `raw` is outside the stage range.
    pub fn new(raw: u32) -> Option<Self> {
        (raw < MAX_STAGES).then(|| Self(raw as u8))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.0)
    }
}

/// One of the drawable object slots that each receive their own node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u8);

impl ObjectId {
    pub fn new(raw: u32) -> Option<Self> {
        (raw < MAX_OBJECTS).then(|| Self(raw as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {}", self.0)
    }
}

/// A piece of drawable geometry owned by one or more sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl NodeId {
    pub fn is_sentinel(self) -> bool {
        self.0 == NODE_SENTINEL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_range_is_checked() {
        assert_eq!(StageId::new(0), Some(StageId(0)));
        assert_eq!(StageId::new(127), Some(StageId(127)));
        assert_eq!(StageId::new(128), None);
    }

    #[test]
    fn object_range_is_checked() {
        assert_eq!(ObjectId::new(255).map(ObjectId::index), Some(255));
        assert!(ObjectId::new(256).is_none());
    }

    #[test]
    fn sentinel_is_outside_node_range() {
        assert!(NodeId(NODE_SENTINEL).is_sentinel());
        assert!(!NodeId(MAX_NODE_ID).is_sentinel());
    }

    #[test]
    fn display_formats() {
        assert_eq!(StageId(12).to_string(), "stage 12");
        assert_eq!(NodeId(0x1f).to_string(), "0x001f");
    }
}
