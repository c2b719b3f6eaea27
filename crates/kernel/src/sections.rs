use horizon_common::{MAX_NODE_ID, MAX_OBJECTS, NODE_SENTINEL, ObjectId, SectionIndex};
use horizon_visibility::SectionSource;

use crate::stage::splitmix64;

/// Shape of a generated [`SectionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTableParams {
    pub seed: u64,
    pub objects: usize,
    pub sections: SectionIndex,
    pub nodes_per_section: u16,
    /// How many nodes each section shares with the one before it.
    pub overlap: u16,
}

impl Default for SectionTableParams {
    fn default() -> Self {
        Self {
            seed: 0,
            objects: 4,
            sections: 128,
            nodes_per_section: 16,
            overlap: 4,
        }
    }
}

/// Per-object, per-section node lists for one loaded stage.
///
/// Every list is stored sentinel-terminated, the way the renderer expects
/// them. Lookups outside the table return an empty slice.
#[derive(Debug, Clone, Default)]
pub struct SectionTable {
    objects: usize,
    sections: SectionIndex,
    lists: Vec<Vec<u16>>,
}

impl SectionTable {
    /// Empty table with `objects` objects and `sections` sections.
    pub fn new(objects: usize, sections: SectionIndex) -> Self {
        let objects = objects.min(MAX_OBJECTS as usize);
        let sections = sections.max(0);
        Self {
            objects,
            sections,
            lists: vec![vec![NODE_SENTINEL]; objects * sections as usize],
        }
    }

    /// Replace the list of `object` in `section`. Out-of-range slots are ignored.
    pub fn set(&mut self, object: ObjectId, section: SectionIndex, nodes: &[u16]) {
        if let Some(idx) = self.slot(object, section) {
            let list = &mut self.lists[idx];
            list.clear();
            list.extend(nodes.iter().copied().take_while(|&n| n != NODE_SENTINEL));
            list.push(NODE_SENTINEL);
        }
    }

    /// Deterministic synthetic stage. Each section repeats the last
    /// `overlap` nodes of its predecessor, then adds fresh ones drawn from
    /// a splitmix64 stream seeded per object.
    pub fn generate(params: &SectionTableParams) -> Self {
        let mut table = Self::new(params.objects, params.sections);
        let overlap = usize::from(params.overlap.min(params.nodes_per_section));
        let per_section = usize::from(params.nodes_per_section);

        for object in 0..table.objects {
            let mut state = params.seed ^ (object as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            let mut previous: Vec<u16> = Vec::new();
            for section in 0..table.sections {
                let keep = previous.len().saturating_sub(overlap);
                let mut list: Vec<u16> = previous[keep..].to_vec();
                while list.len() < per_section {
                    state = splitmix64(state);
                    list.push((state % (u64::from(MAX_NODE_ID) + 1)) as u16);
                }
                table.set(ObjectId(object as u8), section, &list);
                previous = list;
            }
        }
        tracing::debug!(
            objects = table.objects,
            sections = table.sections,
            seed = params.seed,
            "section table generated"
        );
        table
    }

    fn slot(&self, object: ObjectId, section: SectionIndex) -> Option<usize> {
        if object.index() >= self.objects || section < 0 || section >= self.sections {
            return None;
        }
        Some(object.index() * self.sections as usize + section as usize)
    }
}

impl SectionSource for SectionTable {
    fn object_count(&self) -> usize {
        self.objects
    }

    fn max_section(&self) -> SectionIndex {
        self.sections
    }

    fn nodes(&self, object: ObjectId, section: SectionIndex) -> &[u16] {
        self.slot(object, section)
            .map(|idx| self.lists[idx].as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_render::node_slice;

    #[test]
    fn new_table_is_all_sentinels() {
        let t = SectionTable::new(2, 3);
        assert_eq!(t.nodes(ObjectId(1), 2), &[NODE_SENTINEL]);
        assert!(t.nodes(ObjectId(2), 0).is_empty());
        assert!(t.nodes(ObjectId(0), -1).is_empty());
        assert!(t.nodes(ObjectId(0), 3).is_empty());
    }

    #[test]
    fn set_stops_at_embedded_sentinel() {
        let mut t = SectionTable::new(1, 1);
        t.set(ObjectId(0), 0, &[4, 5, NODE_SENTINEL, 6]);
        assert_eq!(t.nodes(ObjectId(0), 0), &[4, 5, NODE_SENTINEL]);
    }

    #[test]
    fn object_count_is_capped() {
        let t = SectionTable::new(1000, 1);
        assert_eq!(t.object_count(), MAX_OBJECTS as usize);
    }

    #[test]
    fn generated_sections_overlap_their_predecessor() {
        let params = SectionTableParams {
            seed: 9,
            objects: 2,
            sections: 5,
            nodes_per_section: 6,
            overlap: 2,
        };
        let t = SectionTable::generate(&params);
        for object in [ObjectId(0), ObjectId(1)] {
            for section in 1..5 {
                let prev = node_slice(t.nodes(object, section - 1));
                let cur = node_slice(t.nodes(object, section));
                assert_eq!(cur.len(), 6);
                assert_eq!(&cur[..2], &prev[4..]);
            }
            assert!(node_slice(t.nodes(object, 0)).iter().all(|&n| n <= MAX_NODE_ID));
        }
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let params = SectionTableParams::default();
        let a = SectionTable::generate(&params);
        let b = SectionTable::generate(&params);
        let c = SectionTable::generate(&SectionTableParams { seed: 1, ..params });
        assert_eq!(a.nodes(ObjectId(3), 77), b.nodes(ObjectId(3), 77));
        assert_ne!(a.nodes(ObjectId(3), 77), c.nodes(ObjectId(3), 77));
    }
}
