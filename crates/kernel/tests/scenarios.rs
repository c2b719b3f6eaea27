//! Whole-stack scenarios: pacer, stage, window and sinks wired together.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use horizon_common::{
    FastLoadPolicy, NODE_SENTINEL, ObjectId, PacingSettings, SectionIndex, StageId,
    VisibilitySettings,
};
use horizon_kernel::{FrameLoop, SectionTable, SectionTableParams, StageLayout, StageWorld};
use horizon_render::{DrawSink, RecordingSink};
use horizon_timing::{FramePacer, ManualClock, PacerHooks};
use horizon_visibility::{ExclusionStore, SectionSource, VisibilityWindow};

const SECTIONS: SectionIndex = 200;

fn layout() -> StageLayout {
    StageLayout {
        stage: StageId(7),
        section_length: 40,
        speed_per_tick: 8,
        max_section: SECTIONS,
    }
}

fn table(objects: usize) -> SectionTable {
    SectionTable::generate(&SectionTableParams {
        seed: 1234,
        objects,
        sections: SECTIONS,
        nodes_per_section: 24,
        overlap: 8,
    })
}

fn build(
    pacing: PacingSettings,
    visibility: VisibilitySettings,
    exclusions: Arc<ExclusionStore>,
) -> (FrameLoop<ManualClock, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let pacer = FramePacer::with_parts(pacing, clock.clone(), clock.clone());
    let window = VisibilityWindow::new(visibility, exclusions);
    let lp = FrameLoop::with_parts(pacer, window, StageWorld::with_seed(layout(), 5), table(6))
        .expect("section counts match");
    (lp, clock)
}

/// Checks every list it receives for sentinel termination and duplicates.
#[derive(Default)]
struct CheckingSink {
    calls: usize,
    nodes: usize,
}

impl DrawSink for CheckingSink {
    fn draw_object(&mut self, object: ObjectId, nodes: &[u16]) {
        assert_eq!(nodes.last(), Some(&NODE_SENTINEL), "{object} not terminated");
        let body = &nodes[..nodes.len() - 1];
        assert!(!body.contains(&NODE_SENTINEL));
        let unique: HashSet<_> = body.iter().collect();
        assert_eq!(unique.len(), body.len(), "{object} has duplicates");
        self.calls += 1;
        self.nodes += body.len();
    }
}

#[test]
fn high_refresh_run_keeps_lists_clean_and_counters_gated() {
    let pacing = PacingSettings {
        target_fps: 144,
        min_ticks_per_frame: 0,
        ..PacingSettings::default()
    };
    let (mut lp, _clock) = build(pacing, VisibilitySettings::default(), Arc::new(ExclusionStore::new()));
    let mut sink = CheckingSink::default();
    for _ in 0..600 {
        lp.run_frame(&mut sink);
    }

    let counters = *lp.counters();
    assert_eq!(counters.render_frames, 600);
    assert!(counters.idle_frames() > 0);
    assert_eq!(lp.window().passes(), counters.frames_with_ticks);
    assert_eq!(sink.calls as u64, counters.frames_with_ticks * 6);
    assert!(sink.nodes > 0);
    // 600 frames at 144 fps is ~4.17 s, ~250 ticks at 60 Hz.
    assert!((245..=255).contains(&lp.world().tick()), "ticks = {}", lp.world().tick());
}

#[test]
fn same_seed_runs_produce_identical_output() {
    let run = || {
        let (mut lp, _clock) = build(
            PacingSettings::default(),
            VisibilitySettings::default(),
            Arc::new(ExclusionStore::new()),
        );
        let mut sink = RecordingSink::new();
        for _ in 0..90 {
            lp.run_frame(&mut sink);
        }
        (lp.world().state_hash(), sink)
    };
    let (hash_a, sink_a) = run();
    let (hash_b, sink_b) = run();
    assert_eq!(hash_a, hash_b);
    for object in sink_a.objects() {
        assert_eq!(sink_a.list(object), sink_b.list(object));
    }
}

#[test]
fn exclusions_reloaded_from_another_thread_apply_to_later_passes() {
    let store = Arc::new(ExclusionStore::new());
    let (mut lp, _clock) = build(PacingSettings::default(), VisibilitySettings::default(), Arc::clone(&store));
    let mut sink = RecordingSink::new();
    lp.run_frame(&mut sink);

    // Suppress every node object 0 drew in the first pass.
    let drawn: Vec<String> = sink
        .nodes(ObjectId(0))
        .iter()
        .map(|n| n.to_string())
        .collect();
    let doc = format!("[Stage 7]\n0 = {}\n", drawn.join(", "));
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.reload_from_str(&doc))
    };
    let report = writer.join().expect("reload thread");
    assert!(report.issues.is_empty());

    let out = lp.run_frame(&mut sink);
    let summary = out.visibility.expect("a tick ran");
    assert!(summary.nodes_suppressed > 0);
    // Nodes in the home section still show, so object 0 is not empty.
    let home: HashSet<u16> = lp
        .table()
        .nodes(ObjectId(0), out.section)
        .iter()
        .copied()
        .filter(|&n| n != NODE_SENTINEL)
        .collect();
    for n in sink.nodes(ObjectId(0)) {
        assert!(home.contains(n) || !drawn.contains(&n.to_string()));
    }
}

#[derive(Clone, Default)]
struct CountingHooks {
    toggles: Arc<Mutex<Vec<bool>>>,
}

impl PacerHooks for CountingHooks {
    fn set_tear_resistant(&mut self, enabled: bool) {
        self.toggles.lock().expect("hook lock").push(enabled);
    }
}

#[test]
fn stage_load_toggles_tearing_once_each_way() {
    let hooks = CountingHooks::default();
    let pacing = PacingSettings {
        fast_load: FastLoadPolicy::SkipPacingAndToggleTearing,
        ..PacingSettings::default()
    };
    let clock = ManualClock::new();
    let pacer = FramePacer::with_parts(pacing, clock.clone(), clock.clone()).with_hooks(hooks.clone());
    let window = VisibilityWindow::new(VisibilitySettings::default(), Arc::new(ExclusionStore::new()));
    let mut world = StageWorld::new(layout());
    world.begin_load(4);
    let mut lp = FrameLoop::with_parts(pacer, window, world, table(2)).expect("section counts match");

    let mut sink = RecordingSink::new();
    for _ in 0..8 {
        lp.run_frame(&mut sink);
        clock.advance(Duration::from_millis(2));
    }
    let toggles = hooks.toggles.lock().expect("hook lock").clone();
    assert_eq!(toggles, vec![true, false]);
    assert!(!lp.pacer().is_tear_resistant());
}
