/// Ring geometry - concentric square rings on an unbounded plane, and the
/// toroidal wrap that folds them onto a finite grid
use std::ops::Index;

use super::{GridCoordinate, RingOffset};

/// Offsets for rings `0..len()`, centered on `(0, 0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingPlan {
    rings: Vec<Vec<RingOffset>>,
}

impl RingPlan {
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn ring(&self, n: usize) -> Option<&[RingOffset]> {
        self.rings.get(n).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[RingOffset]> {
        self.rings.iter().map(Vec::as_slice)
    }

    /// Translates every ring onto a `width` x `height` torus around `origin`.
    pub fn wrap_around(
        &self,
        origin: GridCoordinate,
        width: usize,
        height: usize,
    ) -> Vec<Vec<GridCoordinate>> {
        self.rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .map(|offset| wrap(origin, *offset, width, height))
                    .collect()
            })
            .collect()
    }
}

impl Index<usize> for RingPlan {
    type Output = [RingOffset];

    fn index(&self, n: usize) -> &Self::Output {
        &self.rings[n]
    }
}

/// Builds ring plans. Plans do not depend on the sweep origin, so one plan
/// serves every sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingPlanner;

impl RingPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, max_ring_index: usize) -> RingPlan {
        RingPlan {
            rings: (0..max_ring_index as i32).map(ring_offsets).collect(),
        }
    }
}

/// Ring `n`: right edge, left edge, bottom edge, top edge, then the `(n, n)`
/// corner. Ring 0 comes out as the lone corner `(0, 0)`.
fn ring_offsets(n: i32) -> Vec<RingOffset> {
    let mut cells = Vec::with_capacity((8 * n).max(1) as usize);
    cells.extend((-n + 1..n).map(|dy| RingOffset::new(n, dy)));
    cells.extend((-n..n).map(|dy| RingOffset::new(-n, dy)));
    cells.extend((-n..n).map(|dx| RingOffset::new(dx, n)));
    cells.extend((-n + 1..n + 1).map(|dx| RingOffset::new(dx, -n)));
    cells.push(RingOffset::new(n, n));
    cells
}

/// `origin + offset`, folded onto the grid with a floor modulo so negative
/// offsets land on the far edge.
pub fn wrap(
    origin: GridCoordinate,
    offset: RingOffset,
    width: usize,
    height: usize,
) -> GridCoordinate {
    let col = (origin.col as i64 + offset.dx as i64).rem_euclid(width as i64);
    let row = (origin.row as i64 + offset.dy as i64).rem_euclid(height as i64);
    GridCoordinate::new(col as i32, row as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ring_zero_is_origin() {
        let plan = RingPlanner::new().plan(3);
        assert_eq!(&plan[0], &[RingOffset::new(0, 0)]);
    }

    #[test]
    fn test_ring_sizes() {
        let plan = RingPlanner::new().plan(30);
        assert_eq!(plan.len(), 30);
        for n in 1..30 {
            assert_eq!(plan[n].len(), 8 * n, "ring {n}");
        }
    }

    #[test]
    fn test_ring_one_order() {
        let plan = RingPlanner::new().plan(2);
        let expected: Vec<RingOffset> = [
            (1, 0),
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, 1),
            (0, -1),
            (1, -1),
            (1, 1),
        ]
        .iter()
        .map(|&(dx, dy)| RingOffset::new(dx, dy))
        .collect();
        assert_eq!(&plan[1], expected.as_slice());
    }

    #[test]
    fn test_rings_tile_square_without_gaps() {
        let plan = RingPlanner::new().plan(12);
        let mut seen = HashSet::new();
        for (n, ring) in plan.iter().enumerate() {
            for offset in ring {
                assert_eq!(offset.ring_index() as usize, n);
                assert!(seen.insert(*offset), "duplicate {offset:?}");
            }
            let side = 2 * n + 1;
            assert_eq!(seen.len(), side * side);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let planner = RingPlanner::new();
        assert_eq!(planner.plan(40), planner.plan(40));
    }

    #[test]
    fn test_empty_plan() {
        assert!(RingPlanner::new().plan(0).is_empty());
    }

    #[test]
    fn test_wrap_identity() {
        let origin = GridCoordinate::new(5, 7);
        assert_eq!(wrap(origin, RingOffset::new(0, 0), 24, 24), origin);
    }

    #[test]
    fn test_wrap_negative_uses_floor_mod() {
        let origin = GridCoordinate::new(0, 1);
        assert_eq!(
            wrap(origin, RingOffset::new(-1, -3), 24, 10),
            GridCoordinate::new(23, 8)
        );
        assert_eq!(
            wrap(origin, RingOffset::new(-49, 0), 24, 10),
            GridCoordinate::new(23, 1)
        );
    }

    #[test]
    fn test_wrap_stays_in_bounds() {
        let plan = RingPlanner::new().plan(20);
        let origin = GridCoordinate::new(2, 9);
        for ring in plan.wrap_around(origin, 7, 11) {
            for cell in ring {
                assert!((0..7).contains(&cell.col));
                assert!((0..11).contains(&cell.row));
            }
        }
    }
}
