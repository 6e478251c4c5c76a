//! Battle grid: per-cell movement cost, opacity and elevation
//!
//! Cells are stored row-major as `cells[z][x]`.

use serde::{Deserialize, Serialize};

use crate::battle::terrain::Terrain;
use crate::core::error::{Result, VttError};
use crate::core::types::GridCoord;

/// A single cell on the battle grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Movement cost multiplier; 0 means impassable unless flagged
    pub cost: f32,
    /// Blocks line of sight regardless of cost
    pub opaque: bool,
    pub elevation: f32,
    /// Treat a zero cost as free movement instead of a wall
    #[serde(default)]
    pub zero_cost_passable: bool,
}

impl Default for GridCell {
    fn default() -> Self {
        Self::open()
    }
}

impl GridCell {
    pub fn new(cost: f32, opaque: bool, elevation: f32) -> Self {
        Self {
            cost,
            opaque,
            elevation,
            zero_cost_passable: false,
        }
    }

    pub fn open() -> Self {
        Self::new(1.0, false, 0.0)
    }

    /// Impassable and opaque
    pub fn wall() -> Self {
        Self::new(0.0, true, 0.0)
    }

    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn is_passable(&self) -> bool {
        if !self.cost.is_finite() || self.cost < 0.0 {
            return false;
        }
        self.cost > 0.0 || self.zero_cost_passable
    }

    /// Movement cost, infinite when impassable
    pub fn movement_cost(&self) -> f32 {
        if self.is_passable() {
            self.cost
        } else {
            f32::INFINITY
        }
    }

    pub fn blocks_los(&self) -> bool {
        self.opaque
    }
}

impl From<Terrain> for GridCell {
    fn from(terrain: Terrain) -> Self {
        terrain.cell()
    }
}

/// The full battle grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleGrid {
    pub width: u32,
    pub height: u32,
    /// World units per cell
    pub tile_size: f32,
    cells: Vec<Vec<GridCell>>,
}

impl BattleGrid {
    /// Create an open grid
    pub fn new(width: u32, height: u32, tile_size: f32) -> Self {
        Self {
            width,
            height,
            tile_size,
            cells: vec![vec![GridCell::open(); width as usize]; height as usize],
        }
    }

    /// Build from rows indexed `[z][x]`; rows must all have the same length
    pub fn from_rows(rows: Vec<Vec<GridCell>>, tile_size: f32) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);

        if let Some((z, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(VttError::InvalidGrid(format!(
                "row {} has {} cells, expected {}",
                z,
                row.len(),
                width
            )));
        }
        if tile_size <= 0.0 || !tile_size.is_finite() {
            return Err(VttError::InvalidGrid(format!(
                "tile size {} must be positive",
                tile_size
            )));
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            tile_size,
            cells: rows,
        })
    }

    /// Build from an ASCII sketch, one row per line
    ///
    /// `.` open, `~` difficult, `=` road, `w` water, `#` wall, `o` pillar,
    /// `*` foliage. Unknown characters are open ground.
    pub fn from_ascii(sketch: &str, tile_size: f32) -> Result<Self> {
        let rows = sketch
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.chars().map(|c| Terrain::from_symbol(c).cell()).collect())
            .collect();
        Self::from_rows(rows, tile_size)
    }

    /// Check if coordinate is within grid bounds
    pub fn in_bounds(&self, coord: GridCoord) -> bool {
        coord.x >= 0
            && coord.z >= 0
            && coord.x < self.width as i32
            && coord.z < self.height as i32
    }

    pub fn cell(&self, coord: GridCoord) -> Option<&GridCell> {
        if !self.in_bounds(coord) {
            return None;
        }
        self.cells
            .get(coord.z as usize)
            .and_then(|row| row.get(coord.x as usize))
    }

    pub fn cell_mut(&mut self, coord: GridCoord) -> Option<&mut GridCell> {
        if !self.in_bounds(coord) {
            return None;
        }
        self.cells
            .get_mut(coord.z as usize)
            .and_then(|row| row.get_mut(coord.x as usize))
    }

    /// Replace a cell; out-of-bounds writes are ignored
    pub fn set_cell(&mut self, coord: GridCoord, cell: GridCell) {
        if let Some(slot) = self.cell_mut(coord) {
            *slot = cell;
        }
    }

    pub fn set_terrain(&mut self, coord: GridCoord, terrain: Terrain) {
        let elevation = self.cell(coord).map(|c| c.elevation).unwrap_or(0.0);
        self.set_cell(coord, terrain.cell().with_elevation(elevation));
    }

    pub fn set_elevation(&mut self, coord: GridCoord, elevation: f32) {
        if let Some(cell) = self.cell_mut(coord) {
            cell.elevation = elevation;
        }
    }

    pub fn set_opaque(&mut self, coord: GridCoord, opaque: bool) {
        if let Some(cell) = self.cell_mut(coord) {
            cell.opaque = opaque;
        }
    }

    pub fn is_passable(&self, coord: GridCoord) -> bool {
        self.cell(coord).map(|c| c.is_passable()).unwrap_or(false)
    }

    pub fn blocks_los(&self, coord: GridCoord) -> bool {
        self.cell(coord).map(|c| c.blocks_los()).unwrap_or(false)
    }

    /// Elevation difference (positive = `from` is higher)
    pub fn elevation_difference(&self, from: GridCoord, to: GridCoord) -> f32 {
        let from_elev = self.cell(from).map(|c| c.elevation).unwrap_or(0.0);
        let to_elev = self.cell(to).map(|c| c.elevation).unwrap_or(0.0);
        from_elev - to_elev
    }

    /// Cheapest cost among passable cells, 1.0 for a grid with none
    pub fn min_passable_cost(&self) -> f32 {
        self.cells
            .iter()
            .flatten()
            .filter(|c| c.is_passable())
            .map(|c| c.cost)
            .fold(None, |acc: Option<f32>, cost| {
                Some(acc.map_or(cost, |a| a.min(cost)))
            })
            .unwrap_or(1.0)
    }

    /// All coordinates, row by row
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (0..self.height as i32)
            .flat_map(move |z| (0..self.width as i32).map(move |x| GridCoord::new(x, z)))
    }

    pub fn rows(&self) -> &[Vec<GridCell>] {
        &self.cells
    }
}
