use horizon_common::{SectionIndex, StageId};

/// Something the stage did while stepping.
///
/// The event log lets hosts replay a run and check that two runs with the
/// same seed went through the same sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Simulation advanced one tick with the given seed.
    Stepped { tick: u64, seed: u64 },
    /// The tick moved the player into a new section.
    SectionEntered { tick: u64, section: SectionIndex },
    /// A load began that will take `ticks` ticks.
    LoadStarted { tick: u64, ticks: u32 },
    LoadFinished { tick: u64 },
}

/// Layout and movement parameters for a [`StageWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLayout {
    pub stage: StageId,
    /// Distance units per section.
    pub section_length: u32,
    /// Distance units travelled per tick.
    pub speed_per_tick: u32,
    /// Number of sections on the stage.
    pub max_section: SectionIndex,
}

impl Default for StageLayout {
    fn default() -> Self {
        Self {
            stage: StageId(0),
            section_length: 240,
            speed_per_tick: 12,
            max_section: 128,
        }
    }
}

/// Minimal stand-in for the fixed-rate simulation: a player moving forward
/// along a linear stage, one fixed step per tick.
///
/// Stepping is pure integer arithmetic, so a given seed and layout always
/// yields the same sequence of sections on every platform.
#[derive(Debug, Clone)]
pub struct StageWorld {
    layout: StageLayout,
    distance: u64,
    tick: u64,
    seed: u64,
    load_ticks_left: u32,
    events: Vec<StageEvent>,
}

impl StageWorld {
    pub fn new(layout: StageLayout) -> Self {
        Self::with_seed(layout, 0)
    }

    /// Create a stage with a specific seed for deterministic replay.
    pub fn with_seed(layout: StageLayout, seed: u64) -> Self {
        Self {
            layout,
            distance: 0,
            tick: 0,
            seed,
            load_ticks_left: 0,
            events: Vec::new(),
        }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn stage(&self) -> StageId {
        self.layout.stage
    }

    pub fn max_section(&self) -> SectionIndex {
        self.layout.max_section
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn distance(&self) -> u64 {
        self.distance
    }

    /// Section the player is in. Stays on the last section once the end is reached.
    pub fn section(&self) -> SectionIndex {
        section_at(&self.layout, self.distance)
    }

    pub fn is_loading(&self) -> bool {
        self.load_ticks_left > 0
    }

    /// Start a load lasting `ticks` ticks. Movement stops until it finishes.
    pub fn begin_load(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        tracing::debug!(stage = self.layout.stage.0, ticks, "stage load started");
        self.load_ticks_left = ticks;
        self.events.push(StageEvent::LoadStarted {
            tick: self.tick,
            ticks,
        });
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.seed = splitmix64(self.seed);
        self.events.push(StageEvent::Stepped {
            tick: self.tick,
            seed: self.seed,
        });

        if self.load_ticks_left > 0 {
            self.load_ticks_left -= 1;
            if self.load_ticks_left == 0 {
                tracing::debug!(stage = self.layout.stage.0, "stage load finished");
                self.events.push(StageEvent::LoadFinished { tick: self.tick });
            }
            return;
        }

        let before = self.section();
        self.distance += u64::from(self.layout.speed_per_tick);
        let after = self.section();
        if after != before {
            self.events.push(StageEvent::SectionEntered {
                tick: self.tick,
                section: after,
            });
        }
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.events)
    }

    /// Rebuild a stage from its layout, starting seed and event log.
    pub fn replay(layout: StageLayout, seed: u64, events: &[StageEvent]) -> Self {
        let mut world = Self::with_seed(layout, seed);
        for event in events {
            match *event {
                StageEvent::Stepped { .. } => world.step(),
                StageEvent::LoadStarted { ticks, .. } => world.begin_load(ticks),
                StageEvent::SectionEntered { .. } | StageEvent::LoadFinished { .. } => {}
            }
        }
        world
    }

    /// Deterministic FNV-1a hash of the stage state for comparison.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        mix(&mut h, &[self.layout.stage.0]);
        mix(&mut h, &self.tick.to_le_bytes());
        mix(&mut h, &self.seed.to_le_bytes());
        mix(&mut h, &self.distance.to_le_bytes());
        mix(&mut h, &self.load_ticks_left.to_le_bytes());
        h
    }
}

fn section_at(layout: &StageLayout, distance: u64) -> SectionIndex {
    let last = i64::from(layout.max_section.max(1) - 1);
    let raw = distance / u64::from(layout.section_length.max(1));
    i64::try_from(raw).map_or(last, |s| s.min(last)) as SectionIndex
}

/// Splitmix64 step, used to advance the stage seed each tick.
pub(crate) fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StageLayout {
        StageLayout {
            stage: StageId(3),
            section_length: 100,
            speed_per_tick: 25,
            max_section: 10,
        }
    }

    #[test]
    fn stage_starts_at_origin() {
        let w = StageWorld::new(layout());
        assert_eq!(w.tick(), 0);
        assert_eq!(w.section(), 0);
        assert!(!w.is_loading());
    }

    #[test]
    fn four_ticks_cross_one_section() {
        let mut w = StageWorld::new(layout());
        for _ in 0..4 {
            w.step();
        }
        assert_eq!(w.section(), 1);
        assert_eq!(
            w.events().last(),
            Some(&StageEvent::SectionEntered {
                tick: 4,
                section: 1
            })
        );
    }

    #[test]
    fn section_stops_at_last() {
        let mut w = StageWorld::new(layout());
        for _ in 0..1000 {
            w.step();
        }
        assert_eq!(w.section(), 9);
    }

    #[test]
    fn loading_pauses_movement() {
        let mut w = StageWorld::new(layout());
        w.begin_load(3);
        assert!(w.is_loading());
        for _ in 0..3 {
            w.step();
        }
        assert!(!w.is_loading());
        assert_eq!(w.distance(), 0);
        assert!(w.events().contains(&StageEvent::LoadFinished { tick: 3 }));
        w.step();
        assert_eq!(w.distance(), 25);
    }

    #[test]
    fn zero_length_load_is_ignored() {
        let mut w = StageWorld::new(layout());
        w.begin_load(0);
        assert!(!w.is_loading());
        assert!(w.events().is_empty());
    }

    #[test]
    fn same_seed_same_state() {
        let mut a = StageWorld::with_seed(layout(), 42);
        let mut b = StageWorld::with_seed(layout(), 42);
        for _ in 0..100 {
            a.step();
            b.step();
        }
        assert_eq!(a.state_hash(), b.state_hash());

        let mut c = StageWorld::with_seed(layout(), 43);
        c.step();
        a.step();
        assert_ne!(a.seed(), c.seed());
    }

    #[test]
    fn replay_reproduces_state() {
        let mut w = StageWorld::with_seed(layout(), 7);
        w.step();
        w.begin_load(2);
        for _ in 0..10 {
            w.step();
        }
        let replayed = StageWorld::replay(layout(), 7, w.events());
        assert_eq!(replayed.state_hash(), w.state_hash());
        assert_eq!(replayed.section(), w.section());
        assert_eq!(replayed.events(), w.events());
    }

    #[test]
    fn drain_events_clears_log() {
        let mut w = StageWorld::new(layout());
        w.step();
        assert_eq!(w.drain_events().len(), 1);
        assert!(w.events().is_empty());
    }
}
