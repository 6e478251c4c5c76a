//! Square grid coordinate adapter
//!
//! Maps world positions onto cells with `round(coordinate / tile_size)` per
//! planar axis. `tile_size` must be positive; that is the caller's job.

use serde::{Deserialize, Serialize};

use crate::core::types::{GridCoord, WorldPos};

/// How diagonal steps are priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagonalRule {
    /// Diagonal steps cost the same as orthogonal ones (tabletop 5-5-5)
    Uniform,
    /// Diagonal steps cost √2
    #[default]
    Octile,
}

impl DiagonalRule {
    /// Base cost of a single step from `from` to the adjacent `to`
    pub fn step_cost(&self, from: GridCoord, to: GridCoord) -> f32 {
        let diagonal = from.x != to.x && from.z != to.z;
        match (self, diagonal) {
            (DiagonalRule::Octile, true) => std::f32::consts::SQRT_2,
            _ => 1.0,
        }
    }

    /// Cheapest possible step count between two cells on an open grid
    pub fn distance(&self, a: GridCoord, b: GridCoord) -> f32 {
        let dx = (a.x - b.x).unsigned_abs() as f32;
        let dz = (a.z - b.z).unsigned_abs() as f32;
        match self {
            DiagonalRule::Uniform => dx.max(dz),
            DiagonalRule::Octile => {
                let (lo, hi) = if dx < dz { (dx, dz) } else { (dz, dx) };
                hi + (std::f32::consts::SQRT_2 - 1.0) * lo
            }
        }
    }
}

/// The 8 neighbor offsets in fixed exploration order: E, W, S, N, SE, SW, NE, NW
///
/// "South" is +z (rows grow downwards).
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// Neighbors of a cell in exploration order (unbounded)
pub fn neighbors(coord: GridCoord) -> [GridCoord; 8] {
    NEIGHBOR_OFFSETS.map(|(dx, dz)| GridCoord::new(coord.x + dx, coord.z + dz))
}

/// World position to grid cell
pub fn world_to_grid(pos: WorldPos, tile_size: f32) -> GridCoord {
    GridCoord::new(
        (pos.x / tile_size).round() as i32,
        (pos.z / tile_size).round() as i32,
    )
}

/// Grid cell to world position (cell origin on the ground plane)
pub fn grid_to_world(cell: GridCoord, tile_size: f32) -> WorldPos {
    WorldPos::new(cell.x as f32 * tile_size, 0.0, cell.z as f32 * tile_size)
}

/// Grid cell to world position, keeping an existing height
pub fn grid_to_world_at(cell: GridCoord, tile_size: f32, y: f32) -> WorldPos {
    WorldPos {
        y,
        ..grid_to_world(cell, tile_size)
    }
}
