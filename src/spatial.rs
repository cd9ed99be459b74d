//! Uniform spatial grid for neighbor queries.
//!
//! Agents are bucketed by cell each tick so a neighbor query only touches the
//! 27 cells around the querying agent instead of every agent in the flock.
//! The grid holds agent indices, not agents, and is rebuilt from scratch
//! before any query in a tick.

use std::collections::HashMap;

use glam::{IVec3, Vec3};

/// Offsets of the 3x3x3 block of cells around (and including) a cell.
const NEIGHBOR_OFFSETS: [IVec3; 27] = {
    let mut offsets = [IVec3::ZERO; 27];
    let mut i = 0;
    while i < 27 {
        offsets[i] = IVec3::new((i % 3) as i32 - 1, ((i / 3) % 3) as i32 - 1, (i / 9) as i32 - 1);
        i += 1;
    }
    offsets
};

/// Grid key for a world position: `floor((coord + bounds) / cell_size)` per axis.
#[inline]
pub fn cell_key(position: Vec3, bounds: f32, cell_size: f32) -> IVec3 {
    ((position + Vec3::splat(bounds)) / cell_size).floor().as_ivec3()
}

/// Mapping from cell coordinate to the indices of agents inside it.
#[derive(Debug, Default)]
pub struct SpatialGrid {
    cells: HashMap<IVec3, Vec<usize>>,
    bounds: f32,
    cell_size: f32,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the grid and bucket every position by its cell.
    ///
    /// Indices in later queries refer to the iteration order of `positions`.
    pub fn rebuild<I>(&mut self, positions: I, bounds: f32, cell_size: f32)
    where
        I: IntoIterator<Item = Vec3>,
    {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        self.bounds = bounds;
        self.cell_size = cell_size;
        self.cells.clear();
        for (index, position) in positions.into_iter().enumerate() {
            self.cells
                .entry(cell_key(position, bounds, cell_size))
                .or_default()
                .push(index);
        }
    }

    /// Key of the cell containing `position` under the current layout.
    #[inline]
    pub fn key(&self, position: Vec3) -> IVec3 {
        cell_key(position, self.bounds, self.cell_size)
    }

    /// Visit every index in the 27-cell block around `position`'s cell.
    ///
    /// The agent at `position` itself is included; callers filter by exact
    /// distance.
    pub fn for_each_neighbor<F>(&self, position: Vec3, mut visit: F)
    where
        F: FnMut(usize),
    {
        let center = self.key(position);
        for offset in NEIGHBOR_OFFSETS {
            if let Some(bucket) = self.cells.get(&(center + offset)) {
                for &index in bucket {
                    visit(index);
                }
            }
        }
    }

    /// Collect the 27-cell neighborhood of `position` into `out` (cleared first).
    pub fn query_neighbors_into(&self, position: Vec3, out: &mut Vec<usize>) {
        out.clear();
        self.for_each_neighbor(position, |index| out.push(index));
    }

    /// Convenience wrapper around [`Self::query_neighbors_into`].
    pub fn query_neighbors(&self, position: Vec3) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_neighbors_into(position, &mut out);
        out
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_cover_block_once() {
        let mut seen = std::collections::HashSet::new();
        for offset in NEIGHBOR_OFFSETS {
            assert!(offset.abs().max_element() <= 1);
            assert!(seen.insert(offset));
        }
        assert!(seen.contains(&IVec3::ZERO));
    }

    #[test]
    fn test_cell_key_shifts_by_bounds() {
        assert_eq!(cell_key(Vec3::splat(-15.0), 15.0, 2.5), IVec3::ZERO);
        assert_eq!(cell_key(Vec3::ZERO, 15.0, 2.5), IVec3::splat(6));
        assert_eq!(cell_key(Vec3::new(-15.1, 0.0, 14.9), 15.0, 2.5), IVec3::new(-1, 6, 11));
    }

    #[test]
    fn test_query_includes_self_and_adjacent() {
        let positions = [
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        ];
        let mut grid = SpatialGrid::new();
        grid.rebuild(positions, 15.0, 2.5);

        let near = grid.query_neighbors(positions[0]);
        assert!(near.contains(&0));
        assert!(near.contains(&1));
        assert!(!near.contains(&2));
    }

    #[test]
    fn test_rebuild_discards_previous_contents() {
        let mut grid = SpatialGrid::new();
        grid.rebuild([Vec3::ZERO, Vec3::ONE], 15.0, 2.5);
        grid.rebuild([Vec3::new(12.0, 12.0, 12.0)], 15.0, 2.5);

        assert_eq!(grid.occupied_cells(), 1);
        assert!(grid.query_neighbors(Vec3::ZERO).is_empty());
        assert_eq!(grid.query_neighbors(Vec3::new(12.0, 12.0, 12.0)), vec![0]);
    }
}
