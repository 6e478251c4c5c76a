//! Terrain presets and the grid cells they produce

use serde::{Deserialize, Serialize};

use crate::battle::battle_map::GridCell;

/// Common terrain kinds found on battle maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Terrain {
    #[default]
    Open,      // No movement penalty
    Difficult, // Rubble, undergrowth: double cost
    Road,      // Half cost
    Water,     // Wading
    Wall,      // Impassable, blocks sight
    Pillar,    // Impassable, blocks sight
    Foliage,   // Slow and blocks sight
}

impl Terrain {
    /// Movement cost multiplier (1.0 = normal, 0.0 = impassable)
    pub fn movement_cost(&self) -> f32 {
        match self {
            Terrain::Open => 1.0,
            Terrain::Difficult => 2.0,
            Terrain::Road => 0.5,
            Terrain::Water => 3.0,
            Terrain::Wall | Terrain::Pillar => 0.0,
            Terrain::Foliage => 2.0,
        }
    }

    pub fn blocks_los(&self) -> bool {
        matches!(self, Terrain::Wall | Terrain::Pillar | Terrain::Foliage)
    }

    pub fn cell(&self) -> GridCell {
        GridCell::new(self.movement_cost(), self.blocks_los(), 0.0)
    }

    /// Map sketch symbol, see `BattleGrid::from_ascii`
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            '~' => Terrain::Difficult,
            '=' => Terrain::Road,
            'w' => Terrain::Water,
            '#' => Terrain::Wall,
            'o' => Terrain::Pillar,
            '*' => Terrain::Foliage,
            _ => Terrain::Open,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Terrain::Open => '.',
            Terrain::Difficult => '~',
            Terrain::Road => '=',
            Terrain::Water => 'w',
            Terrain::Wall => '#',
            Terrain::Pillar => 'o',
            Terrain::Foliage => '*',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_terrain_no_penalty() {
        assert_eq!(Terrain::Open.movement_cost(), 1.0);
        assert!(Terrain::Open.cell().is_passable());
    }

    #[test]
    fn test_difficult_doubles_cost() {
        assert_eq!(Terrain::Difficult.movement_cost(), 2.0 * Terrain::Open.movement_cost());
    }

    #[test]
    fn test_wall_blocks_everything() {
        let cell = Terrain::Wall.cell();
        assert!(!cell.is_passable());
        assert!(cell.blocks_los());
    }

    #[test]
    fn test_foliage_passable_but_opaque() {
        let cell = Terrain::Foliage.cell();
        assert!(cell.is_passable());
        assert!(cell.blocks_los());
    }

    #[test]
    fn test_symbols_round_trip() {
        for terrain in [
            Terrain::Open,
            Terrain::Difficult,
            Terrain::Road,
            Terrain::Water,
            Terrain::Wall,
            Terrain::Pillar,
            Terrain::Foliage,
        ] {
            assert_eq!(Terrain::from_symbol(terrain.symbol()), terrain);
        }
    }
}
