//! Combat tokens and the weapons they attack with

use serde::{Deserialize, Serialize};

use crate::battle::grid::world_to_grid;
use crate::core::types::{GridCoord, TokenId, WorldPos};

/// A creature on the battle map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatToken {
    pub id: TokenId,
    pub name: String,
    pub position: WorldPos,
    pub hp: u32,
    pub max_hp: u32,
    /// Armor class: attack totals at or above this hit
    pub ac: i32,
    /// Movement budget per turn, in grid steps
    pub speed: u32,
    #[serde(default)]
    pub initiative_modifier: i32,
    #[serde(default)]
    pub is_player: bool,
    /// Sight radius in cells; `None` uses the encounter default
    #[serde(default)]
    pub vision_radius: Option<f32>,
}

impl CombatToken {
    /// Token at full health
    pub fn new(
        id: impl Into<TokenId>,
        name: impl Into<String>,
        position: WorldPos,
        max_hp: u32,
        ac: i32,
        speed: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            hp: max_hp,
            max_hp,
            ac,
            speed,
            initiative_modifier: 0,
            is_player: false,
            vision_radius: None,
        }
    }

    /// Set current hp, clamped to `[0, max_hp]`
    pub fn with_hp(mut self, hp: u32) -> Self {
        self.hp = hp.min(self.max_hp);
        self
    }

    pub fn with_initiative_modifier(mut self, modifier: i32) -> Self {
        self.initiative_modifier = modifier;
        self
    }

    pub fn with_vision_radius(mut self, radius: f32) -> Self {
        self.vision_radius = Some(radius);
        self
    }

    pub fn player(mut self) -> Self {
        self.is_player = true;
        self
    }

    /// Re-establish `hp <= max_hp` on data from outside the core
    pub fn normalize(&mut self) {
        self.hp = self.hp.min(self.max_hp);
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Subtract damage, flooring at zero; returns the hp actually lost
    pub fn apply_damage(&mut self, damage: u32) -> u32 {
        let lost = damage.min(self.hp);
        self.hp -= lost;
        lost
    }

    pub fn heal(&mut self, amount: u32) {
        self.hp = self.hp.saturating_add(amount).min(self.max_hp);
    }

    pub fn grid_position(&self, tile_size: f32) -> GridCoord {
        world_to_grid(self.position, tile_size)
    }
}

/// What an attack rolls for damage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    /// Damage dice formula, e.g. `1d8+2`
    pub damage: String,
    #[serde(default)]
    pub attack_bonus: i32,
    /// Reach in world units; `None` uses the encounter's sight range
    #[serde(default)]
    pub range: Option<f32>,
}

impl Weapon {
    pub fn new(name: impl Into<String>, damage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            damage: damage.into(),
            attack_bonus: 0,
            range: None,
        }
    }

    pub fn with_attack_bonus(mut self, bonus: i32) -> Self {
        self.attack_bonus = bonus;
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = Some(range);
        self
    }

    pub fn effective_range(&self, default_range: f32) -> f32 {
        self.range.unwrap_or(default_range)
    }
}
