use std::fmt;

use horizon_visibility::DebugCapture;
use serde::Serialize;

/// Nodes that first appear at the outermost look-ahead section, per object.
///
/// Built from a [`DebugCapture`] for the tuning UI, which uses it to decide
/// which nodes should go into the exclusion file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    pub stage: Option<u8>,
    pub section: Option<i32>,
    pub objects: Vec<CapturedObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedObject {
    pub object: u8,
    pub nodes: Vec<u16>,
}

impl CaptureReport {
    pub fn from_capture(capture: &DebugCapture) -> Self {
        Self {
            stage: capture.stage.map(|s| s.0),
            section: capture.section,
            objects: capture
                .non_empty()
                .map(|(object, nodes)| CapturedObject {
                    object: object.0,
                    nodes: nodes.to_vec(),
                })
                .collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.objects.iter().map(|o| o.nodes.len()).sum()
    }

    /// Render as exclusion-file lines, ready to paste under the stage header.
    pub fn to_exclusion_lines(&self) -> String {
        let mut out = String::new();
        if let Some(stage) = self.stage {
            out.push_str(&format!("[Stage {stage}]\n"));
        }
        for o in &self.objects {
            let nodes: Vec<String> = o.nodes.iter().map(|n| n.to_string()).collect();
            out.push_str(&format!("{} = {}\n", o.object, nodes.join(", ")));
        }
        out
    }
}

impl fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.section {
            Some(section) => writeln!(
                f,
                "Edge capture at section {section}: {} nodes in {} objects",
                self.node_count(),
                self.objects.len()
            )?,
            None => return write!(f, "Edge capture: edge section not reached"),
        }
        for o in &self.objects {
            write!(f, "  object {:>3}:", o.object)?;
            for n in &o.nodes {
                write!(f, " {n}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
