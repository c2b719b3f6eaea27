//! The per-pass visibility window over a linear, section-indexed stage.
//!
//! For every drawable object the window walks the sections from
//! `current - behind` to `current + ahead` in ascending order, keeping only
//! the first occurrence of each node. Neighbouring sections share nodes in
//! the source data, so without the seen-set the same geometry would be drawn
//! twice.

use std::sync::Arc;

use horizon_common::{
    MAX_OBJECTS, NODE_SENTINEL, NodeId, ObjectId, SectionIndex, StageId, VisibilitySettings,
};
use horizon_render::DrawSink;

use crate::exclusion::ExclusionStore;

/// One bit per possible `u16` node id.
const SEEN_WORDS: usize = (u16::MAX as usize + 1) / 64;

/// World data the window reads from. Lists are borrowed, never copied.
pub trait SectionSource {
    /// Number of drawable object slots in the loaded stage.
    fn object_count(&self) -> usize;

    /// Number of sections in the loaded stage.
    fn max_section(&self) -> SectionIndex;

    /// Ordered node list of `object` in `section`. May be sentinel-terminated;
    /// anything past the sentinel is ignored. Unknown sections return an
    /// empty slice.
    fn nodes(&self, object: ObjectId, section: SectionIndex) -> &[u16];
}

/// Inputs for a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub stage: StageId,
    pub current_section: SectionIndex,
    pub max_section: SectionIndex,
    pub behind_span: u32,
    /// Configured look-ahead. Also decides whether the home section bypasses
    /// exclusions.
    pub ahead_span: u32,
    /// Stage-specific cap on the look-ahead, if any.
    pub ahead_override: Option<u32>,
    pub debug_capture: bool,
}

impl WindowParams {
    /// Look-ahead actually scanned this pass.
    pub fn effective_ahead(&self) -> u32 {
        self.ahead_override
            .map_or(self.ahead_span, |cap| cap.min(self.ahead_span))
    }

    /// Inclusive range of sections the pass visits, or `None` if it visits none.
    ///
    /// Sections below zero are skipped; the walk stops at the first section
    /// `>= max_section - 1`.
    pub fn section_range(&self) -> Option<(SectionIndex, SectionIndex)> {
        let current = i64::from(self.current_section);
        let first = (current - i64::from(self.behind_span)).max(0);
        let last = (current + i64::from(self.effective_ahead()))
            .min(i64::from(self.max_section) - 2);
        (first <= last).then(|| (first as SectionIndex, last as SectionIndex))
    }
}

/// Counters from one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    pub sections_scanned: u32,
    pub objects: u32,
    pub nodes_emitted: u64,
    pub nodes_suppressed: u64,
    pub effective_ahead: u32,
    /// The renderer should bypass its unstable sort for this stage.
    pub skip_sort: bool,
}

/// Nodes first seen at the outermost look-ahead section, before exclusions.
///
/// Lets a tuning tool show what appears at exactly this draw distance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugCapture {
    pub stage: Option<StageId>,
    /// `None` when the walk stopped before reaching the outermost section.
    pub section: Option<SectionIndex>,
    objects: Vec<Vec<u16>>,
}

impl DebugCapture {
    pub fn nodes(&self, object: ObjectId) -> &[u16] {
        self.objects
            .get(object.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Objects that saw at least one new node at the edge.
    pub fn non_empty(&self) -> impl Iterator<Item = (ObjectId, &[u16])> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(i, nodes)| (ObjectId(i as u8), nodes.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.objects.iter().all(Vec::is_empty)
    }

    fn reset(&mut self, objects: usize) {
        self.stage = None;
        self.section = None;
        self.objects.resize_with(objects, Vec::new);
        for list in &mut self.objects {
            list.clear();
        }
    }
}

/// Scratch reused for every object of every pass; nothing in it outlives
/// the object it was filled for.
struct ScanScratch {
    seen: Box<[u64; SEEN_WORDS]>,
    out: Vec<u16>,
}

impl ScanScratch {
    fn new() -> Self {
        Self {
            seen: Box::new([0; SEEN_WORDS]),
            out: Vec::with_capacity(1024),
        }
    }

    fn reset(&mut self) {
        self.seen.fill(0);
        self.out.clear();
    }

    /// Marks `node` as seen; returns true if it was not seen before.
    fn mark(&mut self, node: u16) -> bool {
        let word = &mut self.seen[usize::from(node) / 64];
        let bit = 1u64 << (node % 64);
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }
}

/// Produces the per-object node lists for the renderer.
pub struct VisibilityWindow {
    exclusions: Arc<ExclusionStore>,
    settings: VisibilitySettings,
    scratch: ScanScratch,
    capture: DebugCapture,
    passes: u64,
}

impl VisibilityWindow {
    pub fn new(settings: VisibilitySettings, exclusions: Arc<ExclusionStore>) -> Self {
        Self {
            exclusions,
            settings,
            scratch: ScanScratch::new(),
            capture: DebugCapture::default(),
            passes: 0,
        }
    }

    pub fn settings(&self) -> &VisibilitySettings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: VisibilitySettings) {
        tracing::info!(
            ahead = settings.ahead_span,
            behind = settings.behind_span,
            overrides = settings.ahead_overrides.len(),
            "visibility settings applied"
        );
        self.settings = settings;
    }

    pub fn exclusions(&self) -> &Arc<ExclusionStore> {
        &self.exclusions
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Capture from the most recent pass run with debug capture on.
    pub fn last_capture(&self) -> Option<&DebugCapture> {
        self.capture.stage.is_some().then_some(&self.capture)
    }

    /// Parameters the configured settings give for `section` of `stage`.
    pub fn params_for(
        &self,
        stage: StageId,
        section: SectionIndex,
        max_section: SectionIndex,
    ) -> WindowParams {
        let capped = self.settings.ahead_span_at(stage, section);
        WindowParams {
            stage,
            current_section: section,
            max_section,
            behind_span: self.settings.behind_span,
            ahead_span: self.settings.ahead_span,
            ahead_override: (capped < self.settings.ahead_span).then_some(capped),
            debug_capture: self.settings.debug_capture,
        }
    }

    /// Entry point for the simulation once it has advanced to `section`.
    pub fn on_section_advanced(
        &mut self,
        stage: StageId,
        section: SectionIndex,
        source: &impl SectionSource,
        sink: &mut impl DrawSink,
    ) -> PassSummary {
        let params = self.params_for(stage, section, source.max_section());
        self.compute(&params, source, sink)
    }

    /// Run one pass and hand every object's list to `sink`.
    pub fn compute(
        &mut self,
        params: &WindowParams,
        source: &impl SectionSource,
        sink: &mut impl DrawSink,
    ) -> PassSummary {
        let _span = tracing::debug_span!(
            "visibility_pass",
            stage = params.stage.0,
            section = params.current_section
        )
        .entered();

        // One snapshot for the whole pass, so a reload mid-pass is not observed.
        let table = self.exclusions.snapshot();
        let objects = source.object_count().min(MAX_OBJECTS as usize);
        let range = params.section_range();
        let edge_offset = i64::from(params.effective_ahead());
        let home_always_shown = params.ahead_span > 0;
        let current = i64::from(params.current_section);

        let mut summary = PassSummary {
            sections_scanned: range.map_or(0, |(first, last)| (last - first + 1) as u32),
            objects: objects as u32,
            effective_ahead: params.effective_ahead(),
            skip_sort: table.skip_sort(params.stage),
            ..PassSummary::default()
        };

        if params.debug_capture {
            self.capture.reset(objects);
            self.capture.stage = Some(params.stage);
            self.capture.section = range
                .filter(|&(_, last)| i64::from(last) - current == edge_offset)
                .map(|(_, last)| last);
        }

        for index in 0..objects {
            let object = ObjectId(index as u8);
            self.scratch.reset();

            if let Some((first, last)) = range {
                for section in first..=last {
                    let offset = i64::from(section) - current;
                    let at_edge = params.debug_capture && offset == edge_offset;

                    for &node in source.nodes(object, section) {
                        if node == NODE_SENTINEL {
                            break;
                        }
                        if !self.scratch.mark(node) {
                            continue;
                        }
                        if at_edge {
                            self.capture.objects[index].push(node);
                        }
                        let emit = (offset == 0 && home_always_shown)
                            || !table.is_excluded(params.stage, object, NodeId(node));
                        if emit {
                            self.scratch.out.push(node);
                            summary.nodes_emitted += 1;
                        } else {
                            summary.nodes_suppressed += 1;
                        }
                    }
                }
            }

            self.scratch.out.push(NODE_SENTINEL);
            sink.draw_object(object, &self.scratch.out);
        }

        self.passes += 1;
        tracing::trace!(
            sections = summary.sections_scanned,
            emitted = summary.nodes_emitted,
            suppressed = summary.nodes_suppressed,
            "visibility pass complete"
        );
        summary
    }
}
