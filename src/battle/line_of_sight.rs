//! Line of sight over the battle grid
//!
//! Bresenham raycast between cell centers. Only the cells strictly between
//! the two endpoints can occlude; a token standing in a doorway still sees out.

use crate::battle::battle_map::BattleGrid;
use crate::core::types::GridCoord;

/// Cells on the Bresenham line from `from` to `to`, both inclusive
pub fn line_cells(from: GridCoord, to: GridCoord) -> Vec<GridCoord> {
    let dx = (to.x - from.x).abs();
    let dz = (to.z - from.z).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sz = if from.z < to.z { 1 } else { -1 };
    let mut err = dx - dz;

    let mut cells = Vec::with_capacity((dx.max(dz) + 1) as usize);
    let (mut x, mut z) = (from.x, from.z);

    loop {
        cells.push(GridCoord::new(x, z));
        if x == to.x && z == to.z {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dz {
            err -= dz;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            z += sz;
        }
    }

    cells
}

/// Distance between two cells in world units
pub fn world_distance(grid: &BattleGrid, from: GridCoord, to: GridCoord) -> f32 {
    from.euclidean(&to) * grid.tile_size
}

/// Is any cell strictly between the endpoints opaque?
pub fn is_occluded(grid: &BattleGrid, from: GridCoord, to: GridCoord) -> bool {
    let line = line_cells(from, to);
    line.iter()
        .skip(1)
        .take(line.len().saturating_sub(2))
        .any(|coord| grid.blocks_los(*coord))
}

/// Can `from` see `to` within `max_range` world units?
///
/// False when either cell is off the grid, the target is beyond range, or an
/// opaque cell sits on the line between them.
pub fn has_line_of_sight(grid: &BattleGrid, from: GridCoord, to: GridCoord, max_range: f32) -> bool {
    if !grid.in_bounds(from) || !grid.in_bounds(to) {
        return false;
    }
    if world_distance(grid, from, to) > max_range {
        return false;
    }
    !is_occluded(grid, from, to)
}

/// Cells within `radius` cells of `center` that it can see, ignoring range caps
pub fn visible_cells(grid: &BattleGrid, center: GridCoord, radius: f32) -> Vec<GridCoord> {
    if !grid.in_bounds(center) || radius < 0.0 || radius.is_nan() {
        return Vec::new();
    }
    let radius = radius as f64;
    let reach = radius.floor().min(i32::MAX as f64) as i64;
    let radius_sq = radius * radius;
    let (cx, cz) = (center.x as i64, center.z as i64);

    let x_min = (cx - reach).max(0);
    let x_max = (cx + reach).min(grid.width as i64 - 1);
    let z_min = (cz - reach).max(0);
    let z_max = (cz + reach).min(grid.height as i64 - 1);

    let mut cells = Vec::new();
    for z in z_min..=z_max {
        for x in x_min..=x_max {
            let dx = (x - cx) as f64;
            let dz = (z - cz) as f64;
            if dx * dx + dz * dz > radius_sq {
                continue;
            }
            let coord = GridCoord::new(x as i32, z as i32);
            if !is_occluded(grid, center, coord) {
                cells.push(coord);
            }
        }
    }

    cells
}
