//! Combat configuration with documented defaults
//!
//! Every tunable number used by the battle core lives here. Configs load from
//! TOML; missing keys fall back to the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::battle::grid::DiagonalRule;
use crate::core::error::{Result, VttError};

/// Configuration for one encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    // === GRID ===
    /// World units per grid cell
    ///
    /// Tabletop convention is 5 feet per square. Must be positive, and a
    /// combat state machine requires its grid to use the same value.
    pub tile_size: f32,

    /// How diagonal steps are priced by the pathfinder
    pub diagonal_rule: DiagonalRule,

    /// Extra step cost per unit of elevation change
    ///
    /// A step multiplies its terrain cost by `1 + factor * |Δelevation|`.
    /// At 1.0, climbing one level costs as much as a second step.
    pub elevation_cost_factor: f32,

    // === SIGHT ===
    /// Default sight/attack range in world units
    ///
    /// Weapons may override this with their own range.
    pub los_max_range: f32,

    /// Vision radius in cells for tokens that do not declare one
    pub default_vision_radius: f32,

    /// Hide the whole map again when a new encounter starts
    pub reset_fog_on_start: bool,

    // === TURN ORDER ===
    /// Formula rolled per token for initiative
    pub initiative_formula: String,

    // === LOG ===
    /// Maximum number of combat log entries kept; oldest are dropped first
    pub log_capacity: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tile_size: 5.0,
            diagonal_rule: DiagonalRule::Octile,
            elevation_cost_factor: 1.0,
            los_max_range: 120.0,
            default_vision_radius: 12.0,
            reset_fog_on_start: false,
            initiative_formula: "1d20".to_string(),
            log_capacity: 100,
        }
    }
}

impl CombatConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CombatConfig = toml::from_str(content)?;
        config.validate().map_err(VttError::Config)?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded combat config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tile_size <= 0.0 || !self.tile_size.is_finite() {
            return Err(format!("tile_size ({}) must be positive", self.tile_size));
        }

        if self.los_max_range < 0.0 || self.los_max_range.is_nan() {
            return Err(format!(
                "los_max_range ({}) must not be negative",
                self.los_max_range
            ));
        }

        if self.elevation_cost_factor < 0.0 || !self.elevation_cost_factor.is_finite() {
            return Err(format!(
                "elevation_cost_factor ({}) must be a non-negative number",
                self.elevation_cost_factor
            ));
        }

        if self.default_vision_radius < 0.0 || self.default_vision_radius.is_nan() {
            return Err("default_vision_radius must not be negative".into());
        }

        if self.log_capacity == 0 {
            return Err("log_capacity must be at least 1".into());
        }

        if let Err(e) = crate::dice::DiceFormula::parse(&self.initiative_formula) {
            return Err(format!("initiative_formula: {}", e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CombatConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CombatConfig::from_toml_str(
            r#"
            tile_size = 1.0
            diagonal_rule = "uniform"
            "#,
        )
        .unwrap();

        assert_eq!(config.tile_size, 1.0);
        assert_eq!(config.diagonal_rule, DiagonalRule::Uniform);
        assert_eq!(config.los_max_range, 120.0);
        assert_eq!(config.log_capacity, 100);
    }

    #[test]
    fn test_rejects_non_positive_tile_size() {
        let err = CombatConfig::from_toml_str("tile_size = 0.0").unwrap_err();
        assert!(matches!(err, VttError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_initiative_formula() {
        let mut config = CombatConfig::default();
        config.initiative_formula = "twenty".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_log_capacity() {
        let mut config = CombatConfig::default();
        config.log_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combat.toml");
        std::fs::write(&path, "los_max_range = 60.0\nlog_capacity = 10\n").unwrap();

        let config = CombatConfig::load(&path).unwrap();
        assert_eq!(config.los_max_range, 60.0);
        assert_eq!(config.log_capacity, 10);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = CombatConfig::from_toml_str(include_str!("../../data/combat.toml")).unwrap();
        assert_eq!(config, CombatConfig::default());
    }
}
