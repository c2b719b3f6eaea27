use std::collections::BTreeMap;
use std::fmt::Write as _;

use horizon_common::{NODE_SENTINEL, ObjectId};

/// Receiver of the visibility window's output. One call per object per pass.
pub trait DrawSink {
    /// `nodes` is sentinel-terminated; the sentinel is always the last element.
    fn draw_object(&mut self, object: ObjectId, nodes: &[u16]);
}

impl<S: DrawSink + ?Sized> DrawSink for &mut S {
    fn draw_object(&mut self, object: ObjectId, nodes: &[u16]) {
        (**self).draw_object(object, nodes);
    }
}

/// The part of a sentinel-terminated list before the sentinel.
pub fn node_slice(nodes: &[u16]) -> &[u16] {
    let end = nodes
        .iter()
        .position(|&n| n == NODE_SENTINEL)
        .unwrap_or(nodes.len());
    &nodes[..end]
}

/// Keeps the most recent list per object. Useful for tests and tooling.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    lists: BTreeMap<ObjectId, Vec<u16>>,
    calls: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last list drawn for `object`, sentinel included.
    pub fn list(&self, object: ObjectId) -> Option<&[u16]> {
        self.lists.get(&object).map(Vec::as_slice)
    }

    /// Last list drawn for `object`, sentinel stripped.
    pub fn nodes(&self, object: ObjectId) -> &[u16] {
        self.list(object).map(node_slice).unwrap_or(&[])
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.lists.keys().copied()
    }

    /// Total number of draw calls received.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn clear(&mut self) {
        self.lists.clear();
        self.calls = 0;
    }
}

impl DrawSink for RecordingSink {
    fn draw_object(&mut self, object: ObjectId, nodes: &[u16]) {
        let slot = self.lists.entry(object).or_default();
        slot.clear();
        slot.extend_from_slice(nodes);
        self.calls += 1;
    }
}

/// Formats each draw call as a line of text, for CLI output and logs.
#[derive(Debug, Default)]
pub struct DebugTextSink {
    out: String,
    skip_empty: bool,
}

impl DebugTextSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out objects whose list is empty.
    pub fn skipping_empty(mut self) -> Self {
        self.skip_empty = true;
        self
    }

    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

impl DrawSink for DebugTextSink {
    fn draw_object(&mut self, object: ObjectId, nodes: &[u16]) {
        let visible = node_slice(nodes);
        if self.skip_empty && visible.is_empty() {
            return;
        }
        let _ = write!(self.out, "{object} [{:>3}]:", visible.len());
        for n in visible {
            let _ = write!(self.out, " {n}");
        }
        self.out.push('\n');
        tracing::trace!(object = object.0, count = visible.len(), "draw object");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_slice_stops_at_sentinel() {
        assert_eq!(node_slice(&[1, 2, NODE_SENTINEL, 9]), &[1, 2]);
        assert_eq!(node_slice(&[NODE_SENTINEL]), &[] as &[u16]);
        assert_eq!(node_slice(&[4, 5]), &[4, 5]);
    }

    #[test]
    fn recording_sink_keeps_last_list_per_object() {
        let mut sink = RecordingSink::new();
        sink.draw_object(ObjectId(3), &[1, 2, NODE_SENTINEL]);
        sink.draw_object(ObjectId(3), &[7, NODE_SENTINEL]);
        sink.draw_object(ObjectId(0), &[NODE_SENTINEL]);

        assert_eq!(sink.calls(), 3);
        assert_eq!(sink.list(ObjectId(3)), Some(&[7, NODE_SENTINEL][..]));
        assert_eq!(sink.nodes(ObjectId(3)), &[7]);
        assert!(sink.nodes(ObjectId(0)).is_empty());
        assert!(sink.nodes(ObjectId(9)).is_empty());
        assert_eq!(sink.objects().collect::<Vec<_>>(), vec![ObjectId(0), ObjectId(3)]);

        sink.clear();
        assert_eq!(sink.calls(), 0);
        assert!(sink.list(ObjectId(3)).is_none());
    }

    #[test]
    fn debug_text_sink_formats_lines() {
        let mut sink = DebugTextSink::new();
        sink.draw_object(ObjectId(1), &[3, 4, NODE_SENTINEL]);
        sink.draw_object(ObjectId(2), &[NODE_SENTINEL]);
        let out = sink.take_output();
        assert!(out.contains("object 1 [  2]: 3 4"));
        assert!(out.contains("object 2 [  0]:"));
        assert!(sink.output().is_empty());
    }

    #[test]
    fn debug_text_sink_can_skip_empty() {
        let mut sink = DebugTextSink::new().skipping_empty();
        sink.draw_object(ObjectId(2), &[NODE_SENTINEL]);
        assert!(sink.output().is_empty());
    }

    #[test]
    fn mutable_reference_is_a_sink() {
        fn draw_into(mut sink: impl DrawSink) {
            sink.draw_object(ObjectId(5), &[1, NODE_SENTINEL]);
        }
        let mut rec = RecordingSink::new();
        draw_into(&mut rec);
        assert_eq!(rec.nodes(ObjectId(5)), &[1]);
    }
}
