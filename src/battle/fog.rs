//! Fog of war: per-map reveal bitmaps
//!
//! Each map keeps two layers of `width * height` bytes, `0` hidden and `1`
//! revealed:
//! - `data`: everything ever revealed. Only `hide`/`hide_all`/`clear_map`
//!   take cells away.
//! - `visible`: what the current vision sources see, rebuilt on every
//!   `update_vision`. Newly visible cells are merged into `data`.
//!
//! Fog coordinates are `(x, y)` with `y` the row; on the battle grid that is
//! the `z` axis. Operations on an unknown map id are no-ops.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::battle::battle_map::BattleGrid;
use crate::battle::line_of_sight::is_occluded;
use crate::core::error::{Result, VttError};
use crate::core::types::{GridCoord, MapId};

pub const HIDDEN: u8 = 0;
pub const REVEALED: u8 = 1;

/// A token or light that reveals fog around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionSource {
    pub id: String,
    pub position: GridCoord,
    /// Radius in cells
    pub radius: f32,
    /// Sources at zero intensity are switched off
    pub intensity: f32,
}

impl VisionSource {
    pub fn new(id: impl Into<String>, position: GridCoord, radius: f32) -> Self {
        Self {
            id: id.into(),
            position,
            radius,
            intensity: 1.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.intensity > 0.0 && self.radius >= 0.0
    }
}

/// Reveal bitmap for one battle map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FogMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub visible: Vec<u8>,
}

impl FogMap {
    /// Fully hidden map
    pub fn hidden(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            data: vec![HIDDEN; len],
            visible: vec![HIDDEN; len],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn is_revealed(&self, x: i32, y: i32) -> bool {
        self.index(x, y)
            .map(|i| self.data[i] == REVEALED)
            .unwrap_or(false)
    }

    pub fn is_visible(&self, x: i32, y: i32) -> bool {
        self.index(x, y)
            .map(|i| self.visible[i] == REVEALED)
            .unwrap_or(false)
    }

    pub fn revealed_count(&self) -> usize {
        self.data.iter().filter(|&&b| b == REVEALED).count()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|&&b| b == REVEALED).count()
    }

    /// Both layers hold exactly `width * height` bytes
    pub fn is_consistent(&self) -> bool {
        let len = self.width as usize * self.height as usize;
        self.data.len() == len && self.visible.len() == len
    }

    /// In-bounds cells with `dx² + dy² ≤ radius²`
    ///
    /// The scan is clipped to the map, so any radius costs at most one pass
    /// over the map. An infinite radius covers every cell.
    fn circle(&self, cx: i32, cy: i32, radius: f32) -> Vec<usize> {
        if radius < 0.0 || radius.is_nan() || self.width == 0 || self.height == 0 {
            return Vec::new();
        }
        let radius = radius as f64;
        let reach = radius.floor().min(i32::MAX as f64) as i64;
        let radius_sq = radius * radius;
        let (cx, cy) = (cx as i64, cy as i64);

        let x_min = (cx - reach).max(0);
        let x_max = (cx + reach).min(self.width as i64 - 1);
        let y_min = (cy - reach).max(0);
        let y_max = (cy + reach).min(self.height as i64 - 1);

        let mut cells = Vec::new();
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let dx = (x - cx) as f64;
                let dy = (y - cy) as f64;
                if dx * dx + dy * dy <= radius_sq {
                    cells.push(y as usize * self.width as usize + x as usize);
                }
            }
        }
        cells
    }

    /// Reveal a circle; returns how many cells changed
    pub fn reveal(&mut self, cx: i32, cy: i32, radius: f32) -> usize {
        let mut changed = 0;
        for i in self.circle(cx, cy, radius) {
            if self.data[i] != REVEALED {
                self.data[i] = REVEALED;
                changed += 1;
            }
        }
        changed
    }

    /// Hide a circle; returns how many cells changed
    pub fn hide(&mut self, cx: i32, cy: i32, radius: f32) -> usize {
        let mut changed = 0;
        for i in self.circle(cx, cy, radius) {
            if self.data[i] != HIDDEN {
                self.data[i] = HIDDEN;
                changed += 1;
            }
        }
        changed
    }

    pub fn reveal_all(&mut self) {
        self.data.fill(REVEALED);
    }

    pub fn hide_all(&mut self) {
        self.data.fill(HIDDEN);
        self.visible.fill(HIDDEN);
    }

    /// Rebuild the visible layer from vision sources and merge it into `data`
    ///
    /// With `occluders`, a cell only counts if the source can see it on that
    /// grid. Returns how many cells were revealed for the first time.
    pub fn update_vision(&mut self, sources: &[VisionSource], occluders: Option<&BattleGrid>) -> usize {
        self.visible.fill(HIDDEN);

        for source in sources.iter().filter(|s| s.is_active()) {
            let center = source.position;
            for i in self.circle(center.x, center.z, source.radius) {
                if self.visible[i] == REVEALED {
                    continue;
                }
                let cell = GridCoord::new(
                    (i % self.width as usize) as i32,
                    (i / self.width as usize) as i32,
                );
                let seen = occluders
                    .map(|grid| !is_occluded(grid, center, cell))
                    .unwrap_or(true);
                if seen {
                    self.visible[i] = REVEALED;
                }
            }
        }

        let mut newly_revealed = 0;
        for (explored, &visible) in self.data.iter_mut().zip(self.visible.iter()) {
            if visible == REVEALED && *explored != REVEALED {
                *explored = REVEALED;
                newly_revealed += 1;
            }
        }
        newly_revealed
    }
}

/// All fog maps, keyed by battle map id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FogStore {
    maps: AHashMap<MapId, FogMap>,
}

impl FogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)initialize a map, replacing any previous map under the same id
    ///
    /// `initial` must hold `width * height` bytes; any non-zero byte counts as
    /// revealed. `None` starts fully hidden.
    pub fn set_map(
        &mut self,
        id: impl Into<MapId>,
        initial: Option<&[u8]>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let id = id.into();
        let mut map = FogMap::hidden(width, height);

        if let Some(initial) = initial {
            if initial.len() != map.data.len() {
                return Err(VttError::InvalidFogData {
                    map: id,
                    expected: map.data.len(),
                    actual: initial.len(),
                });
            }
            for (slot, &byte) in map.data.iter_mut().zip(initial) {
                *slot = if byte == HIDDEN { HIDDEN } else { REVEALED };
            }
        }

        tracing::debug!("Fog map {} set to {}x{}", id, width, height);
        self.maps.insert(id, map);
        Ok(())
    }

    pub fn reveal(&mut self, id: &MapId, cx: i32, cy: i32, radius: f32) -> usize {
        self.maps
            .get_mut(id)
            .map(|map| map.reveal(cx, cy, radius))
            .unwrap_or(0)
    }

    pub fn hide(&mut self, id: &MapId, cx: i32, cy: i32, radius: f32) -> usize {
        self.maps
            .get_mut(id)
            .map(|map| map.hide(cx, cy, radius))
            .unwrap_or(0)
    }

    pub fn reveal_all(&mut self, id: &MapId) {
        if let Some(map) = self.maps.get_mut(id) {
            map.reveal_all();
        }
    }

    pub fn hide_all(&mut self, id: &MapId) {
        if let Some(map) = self.maps.get_mut(id) {
            map.hide_all();
        }
    }

    /// Remove a map and its dimensions entirely
    pub fn clear_map(&mut self, id: &MapId) -> bool {
        self.maps.remove(id).is_some()
    }

    pub fn update_vision(
        &mut self,
        id: &MapId,
        sources: &[VisionSource],
        occluders: Option<&BattleGrid>,
    ) -> usize {
        self.maps
            .get_mut(id)
            .map(|map| map.update_vision(sources, occluders))
            .unwrap_or(0)
    }

    /// `None` for an unknown map
    pub fn is_revealed(&self, id: &MapId, x: i32, y: i32) -> Option<bool> {
        self.maps.get(id).map(|map| map.is_revealed(x, y))
    }

    pub fn is_visible(&self, id: &MapId, x: i32, y: i32) -> Option<bool> {
        self.maps.get(id).map(|map| map.is_visible(x, y))
    }

    pub fn map(&self, id: &MapId) -> Option<&FogMap> {
        self.maps.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapId, &FogMap)> {
        self.maps.iter()
    }

    pub fn contains(&self, id: &MapId) -> bool {
        self.maps.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
