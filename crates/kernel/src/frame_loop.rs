use std::sync::Arc;

use horizon_common::{SectionIndex, Settings, SettingsError};
use horizon_render::DrawSink;
use horizon_timing::{
    FramePacer, FramePacing, MonotonicClock, NoHooks, PacerHooks, PreciseWaiter, TimeSource, Waiter,
};
use horizon_visibility::{
    ExclusionError, ExclusionStore, PassSummary, SectionSource, VisibilityWindow,
};
use thiserror::Error;

use crate::counters::FrameCounters;
use crate::sections::SectionTable;
use crate::stage::StageWorld;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Exclusions(#[from] ExclusionError),
    #[error("stage has {stage} sections but its section table has {table}")]
    SectionCountMismatch {
        stage: SectionIndex,
        table: SectionIndex,
    },
}

/// Result of one presented frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub pacing: FramePacing,
    /// Section after all of this frame's ticks ran.
    pub section: SectionIndex,
    /// `None` when no tick ran; the previous lists are still current.
    pub visibility: Option<PassSummary>,
    pub loading: bool,
}

impl FrameOutcome {
    pub fn ticks(&self) -> u32 {
        self.pacing.ticks
    }
}

/// Host-side frame driver: pace, step the stage N times, then refresh the
/// visible node lists once from the section the last tick reached.
pub struct FrameLoop<T: TimeSource = MonotonicClock, W: Waiter = PreciseWaiter> {
    pacer: FramePacer<T, W>,
    window: VisibilityWindow,
    world: StageWorld,
    table: SectionTable,
    counters: FrameCounters,
}

impl FrameLoop {
    /// Validate `settings`, load the exclusion file it names and build a
    /// loop on the wall clock.
    pub fn from_settings(
        settings: &Settings,
        world: StageWorld,
        table: SectionTable,
    ) -> Result<Self, KernelError> {
        Self::from_settings_with_hooks(settings, world, table, NoHooks)
    }

    /// Like [`FrameLoop::from_settings`], with `hooks` attached to the pacer
    /// before the first frame.
    pub fn from_settings_with_hooks(
        settings: &Settings,
        world: StageWorld,
        table: SectionTable,
        hooks: impl PacerHooks + 'static,
    ) -> Result<Self, KernelError> {
        settings.validate()?;
        let exclusions = Arc::new(ExclusionStore::new());
        if let Some(path) = &settings.exclusions {
            let report = exclusions.reload_from_path(path)?;
            tracing::info!(
                path = %path.display(),
                entries = report.entries,
                issues = report.issues.len(),
                "exclusions loaded"
            );
        }
        let window = VisibilityWindow::new(settings.visibility.clone(), exclusions);
        let pacer = FramePacer::new(settings.pacing.clone()).with_hooks(hooks);
        Self::with_parts(pacer, window, world, table)
    }
}

impl<T: TimeSource, W: Waiter> FrameLoop<T, W> {
    pub fn with_parts(
        pacer: FramePacer<T, W>,
        window: VisibilityWindow,
        world: StageWorld,
        table: SectionTable,
    ) -> Result<Self, KernelError> {
        if world.max_section() != table.max_section() {
            return Err(KernelError::SectionCountMismatch {
                stage: world.max_section(),
                table: table.max_section(),
            });
        }
        Ok(Self {
            pacer,
            window,
            world,
            table,
            counters: FrameCounters::new(),
        })
    }

    pub fn pacer(&self) -> &FramePacer<T, W> {
        &self.pacer
    }

    pub fn pacer_mut(&mut self) -> &mut FramePacer<T, W> {
        &mut self.pacer
    }

    pub fn window(&self) -> &VisibilityWindow {
        &self.window
    }

    pub fn world(&self) -> &StageWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut StageWorld {
        &mut self.world
    }

    pub fn table(&self) -> &SectionTable {
        &self.table
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    /// Push new tuning into the pacer and the window.
    pub fn apply_settings(&mut self, settings: &Settings) -> Result<(), KernelError> {
        settings.validate()?;
        self.pacer.apply_settings(settings.pacing.clone());
        self.window.apply_settings(settings.visibility.clone());
        Ok(())
    }

    /// Run one presented frame and hand the refreshed lists to `sink`.
    pub fn run_frame(&mut self, sink: &mut impl DrawSink) -> FrameOutcome {
        let loading = self.world.is_loading();
        self.pacer.set_loading(loading);
        let pacing = self.pacer.pace_frame();

        for _ in 0..pacing.ticks {
            self.world.step();
        }
        self.counters.record(pacing.ticks);

        let section = self.world.section();
        let visibility = (pacing.ticks > 0).then(|| {
            self.window
                .on_section_advanced(self.world.stage(), section, &self.table, sink)
        });

        tracing::trace!(
            frame = self.counters.render_frames,
            ticks = pacing.ticks,
            section,
            loading,
            "frame complete"
        );
        FrameOutcome {
            pacing,
            section,
            visibility,
            loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SectionTableParams;
    use crate::stage::StageLayout;
    use horizon_common::{FastLoadPolicy, PacingSettings, StageId, VisibilitySettings};
    use horizon_render::RecordingSink;
    use horizon_timing::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SECTIONS: SectionIndex = 64;

    fn layout() -> StageLayout {
        StageLayout {
            stage: StageId(2),
            section_length: 60,
            speed_per_tick: 10,
            max_section: SECTIONS,
        }
    }

    fn table() -> SectionTable {
        SectionTable::generate(&SectionTableParams {
            objects: 3,
            sections: SECTIONS,
            ..SectionTableParams::default()
        })
    }

    fn manual_loop(pacing: PacingSettings) -> (FrameLoop<ManualClock, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let pacer = FramePacer::with_parts(pacing, clock.clone(), clock.clone());
        let window =
            VisibilityWindow::new(VisibilitySettings::default(), Arc::new(ExclusionStore::new()));
        let lp = FrameLoop::with_parts(pacer, window, StageWorld::new(layout()), table()).unwrap();
        (lp, clock)
    }

    #[test]
    fn each_frame_at_native_rate_runs_a_tick_and_a_pass() {
        let (mut lp, _clock) = manual_loop(PacingSettings::default());
        let mut sink = RecordingSink::new();
        for _ in 0..12 {
            let out = lp.run_frame(&mut sink);
            assert!(out.ticks() >= 1);
            assert!(out.visibility.is_some());
            assert!(out.pacing.paced);
        }
        assert!(lp.world().tick() >= 12);
        assert_eq!(lp.counters().render_frames, 12);
        assert_eq!(lp.window().passes(), 12);
        assert_eq!(sink.calls(), 12 * 3);
    }

    #[test]
    fn zero_tick_frames_skip_the_pass_and_animation() {
        let pacing = PacingSettings {
            target_fps: 120,
            min_ticks_per_frame: 0,
            ..PacingSettings::default()
        };
        let (mut lp, _clock) = manual_loop(pacing);
        let mut sink = RecordingSink::new();
        let mut idle = 0;
        for _ in 0..40 {
            let out = lp.run_frame(&mut sink);
            if out.ticks() == 0 {
                idle += 1;
                assert!(out.visibility.is_none());
            }
        }
        assert!(idle > 0);
        let c = lp.counters();
        assert_eq!(c.idle_frames(), idle);
        assert_eq!(u64::from(c.animation_frame), c.frames_with_ticks);
        assert_eq!(lp.window().passes(), c.frames_with_ticks);
    }

    #[test]
    fn loading_frames_are_not_paced() {
        let (mut lp, _clock) = manual_loop(PacingSettings::default());
        lp.world_mut().begin_load(3);
        let mut sink = RecordingSink::new();
        for _ in 0..3 {
            let out = lp.run_frame(&mut sink);
            assert!(out.loading);
            assert!(!out.pacing.paced);
            assert_eq!(out.section, 0);
        }
        let out = lp.run_frame(&mut sink);
        assert!(!out.loading);
        assert!(out.pacing.paced);
    }

    #[test]
    fn pass_uses_section_after_last_tick() {
        let (mut lp, clock) = manual_loop(PacingSettings::default());
        let mut sink = RecordingSink::new();
        lp.run_frame(&mut sink);
        // A half-second stall: 30 ticks, 300 distance units, section 5.
        clock.advance(std::time::Duration::from_millis(500));
        let before = lp.world().tick();
        let out = lp.run_frame(&mut sink);
        assert!(out.ticks() >= 30);
        assert_eq!(lp.world().tick() - before, u64::from(out.ticks()));
        assert_eq!(out.section, lp.world().section());
        assert_eq!(out.visibility.unwrap().effective_ahead, 8);
    }

    #[test]
    fn mismatched_table_is_rejected() {
        let clock = ManualClock::new();
        let pacer = FramePacer::with_parts(PacingSettings::default(), clock.clone(), clock);
        let window =
            VisibilityWindow::new(VisibilitySettings::default(), Arc::new(ExclusionStore::new()));
        let err = FrameLoop::with_parts(pacer, window, StageWorld::new(layout()), SectionTable::new(3, 10))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            KernelError::SectionCountMismatch {
                stage: SECTIONS,
                table: 10
            }
        ));
    }

    #[test]
    fn apply_settings_rejects_invalid_tuning() {
        let (mut lp, _clock) = manual_loop(PacingSettings::default());
        let mut settings = Settings::default();
        settings.pacing.min_ticks_per_frame = 5;
        assert!(matches!(
            lp.apply_settings(&settings),
            Err(KernelError::Settings(_))
        ));

        settings.pacing.min_ticks_per_frame = 0;
        settings.visibility.ahead_span = 3;
        lp.apply_settings(&settings).unwrap();
        assert_eq!(lp.pacer().settings().min_ticks_per_frame, 0);
        assert_eq!(lp.window().settings().ahead_span, 3);
    }

    #[test]
    fn from_settings_loads_exclusion_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclusions.ini");
        std::fs::write(&path, "[Stage 2]\n0 = 1, 2\nSkipQuickSort = true\n").unwrap();
        let settings = Settings {
            exclusions: Some(path),
            ..Settings::default()
        };
        let lp = FrameLoop::from_settings(&settings, StageWorld::new(layout()), table()).unwrap();
        let exclusions = lp.window().exclusions();
        assert!(exclusions.skip_sort(StageId(2)));
        assert_eq!(exclusions.snapshot().len(), 2);
    }

    #[test]
    fn from_settings_reports_missing_exclusion_file() {
        let settings = Settings {
            exclusions: Some("/nonexistent/horizon/exclusions.ini".into()),
            ..Settings::default()
        };
        let err = FrameLoop::from_settings(&settings, StageWorld::new(layout()), table());
        assert!(matches!(err, Err(KernelError::Exclusions(_))));
    }

    #[derive(Default, Clone)]
    struct TearingLog(Rc<RefCell<Vec<bool>>>);

    impl PacerHooks for TearingLog {
        fn set_tear_resistant(&mut self, enabled: bool) {
            self.0.borrow_mut().push(enabled);
        }
    }

    fn toggling_settings() -> Settings {
        let mut settings = Settings::default();
        settings.pacing.fast_load = FastLoadPolicy::SkipPacingAndToggleTearing;
        settings
    }

    #[test]
    fn settings_built_loop_reports_tearing_to_its_hooks() {
        let log = TearingLog::default();
        let mut world = StageWorld::new(layout());
        world.begin_load(3);
        let mut lp =
            FrameLoop::from_settings_with_hooks(&toggling_settings(), world, table(), log.clone())
                .unwrap();
        let mut sink = RecordingSink::new();

        let out = lp.run_frame(&mut sink);
        assert!(out.loading);
        assert!(lp.pacer().is_tear_resistant());
        assert_eq!(*log.0.borrow(), vec![true]);

        while lp.run_frame(&mut sink).loading {}
        lp.run_frame(&mut sink);
        assert!(!lp.pacer().is_tear_resistant());
        assert_eq!(*log.0.borrow(), vec![true, false]);
    }

    #[test]
    fn hooks_can_be_attached_after_building_from_settings() {
        let log = TearingLog::default();
        let mut world = StageWorld::new(layout());
        world.begin_load(3);
        let mut lp = FrameLoop::from_settings(&toggling_settings(), world, table()).unwrap();
        lp.pacer_mut().set_hooks(log.clone());

        lp.run_frame(&mut RecordingSink::new());
        assert!(lp.pacer().is_tear_resistant());
        assert_eq!(*log.0.borrow(), vec![true]);
    }
}
