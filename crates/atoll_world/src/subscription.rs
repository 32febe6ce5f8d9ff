//! # Interest Management
//!
//! Decides which regions a client should hear about. The desired set is the
//! rectangle of regions covered by the client's camera grown by the
//! configured margin; diffing it against the current subscription set yields
//! the regions to tear down and the regions to snapshot-and-subscribe.
//!
//! The functions here are pure so the subscription policy can be tested
//! without standing up a world; the world applies the resulting
//! [`InterestDiff`] to region subscriber lists and client queues.

use crate::map::WorldMap;
use crate::types::{Rect, RegionHandle};
use std::collections::HashSet;

/// Regions to add and drop to move a client from its current interest set
/// to the desired one. Both lists are sorted by grid position so emission
/// order is stable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterestDiff {
    pub subscribe: Vec<RegionHandle>,
    pub unsubscribe: Vec<RegionHandle>,
}

impl InterestDiff {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// The set of regions a camera should be subscribed to on the given map.
/// Empty when the camera (with margin) misses the map entirely.
pub fn desired_regions(map: &WorldMap, camera: Rect, margin: f32) -> HashSet<RegionHandle> {
    let mut out = HashSet::new();
    if let Some((x0, y0, x1, y1)) = map.region_range(camera.expand(margin)) {
        for ry in y0..=y1 {
            for rx in x0..=x1 {
                out.insert(RegionHandle {
                    map: map.id,
                    rx,
                    ry,
                });
            }
        }
    }
    out
}

/// Computes the interest diff between the current and desired sets.
pub fn diff_interest(
    current: &HashSet<RegionHandle>,
    desired: &HashSet<RegionHandle>,
) -> InterestDiff {
    let mut diff = InterestDiff {
        subscribe: desired.difference(current).copied().collect(),
        unsubscribe: current.difference(desired).copied().collect(),
    };
    let key = |h: &RegionHandle| (h.map.0, h.ry, h.rx);
    diff.subscribe.sort_by_key(key);
    diff.unsubscribe.sort_by_key(key);
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MapId, Tile};

    fn test_map() -> WorldMap {
        // 3x2 region grid.
        WorldMap::new(MapId(0), "flat", 24, 16, Tile::Grass)
    }

    #[test]
    fn camera_inside_one_region_with_margin_spills_over() {
        let map = test_map();
        let tight = desired_regions(&map, Rect::new(1.0, 1.0, 4.0, 4.0), 0.0);
        assert_eq!(tight.len(), 1);

        let wide = desired_regions(&map, Rect::new(1.0, 1.0, 4.0, 4.0), 4.0);
        assert!(wide.len() > 1);
        assert!(wide.contains(&RegionHandle {
            map: MapId(0),
            rx: 1,
            ry: 0
        }));
    }

    #[test]
    fn camera_off_the_map_wants_nothing() {
        let map = test_map();
        let desired = desired_regions(&map, Rect::new(200.0, 200.0, 10.0, 10.0), 2.0);
        assert!(desired.is_empty());
    }

    #[test]
    fn diff_splits_into_sorted_subscribe_and_unsubscribe() {
        let map = test_map();
        let before = desired_regions(&map, Rect::new(0.0, 0.0, 8.0, 8.0), 0.0);
        let after = desired_regions(&map, Rect::new(8.0, 0.0, 8.0, 8.0), 0.0);

        let diff = diff_interest(&before, &after);
        assert!(!diff.subscribe.is_empty());
        assert!(!diff.unsubscribe.is_empty());
        for h in &diff.subscribe {
            assert!(after.contains(h));
            assert!(!before.contains(h));
        }
        for h in &diff.unsubscribe {
            assert!(before.contains(h));
            assert!(!after.contains(h));
        }
    }

    #[test]
    fn identical_sets_diff_to_nothing() {
        let map = test_map();
        let set = desired_regions(&map, Rect::new(0.0, 0.0, 20.0, 12.0), 1.0);
        assert!(diff_interest(&set, &set).is_empty());
    }
}
