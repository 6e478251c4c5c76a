//! Battle system - grid combat with fog of war
//!
//! Layers, leaf first:
//! - grid and cells (`grid`, `battle_map`, `terrain`)
//! - queries over the grid (`pathfinding`, `line_of_sight`)
//! - per-map fog (`fog`)
//! - turn order (`initiative`)
//! - intents and their resolution (`tokens`, `actions`, `combat_log`)
//! - the encounter itself (`state`, `events`)

pub mod actions;
pub mod battle_map;
pub mod combat_log;
pub mod events;
pub mod fog;
pub mod grid;
pub mod initiative;
pub mod line_of_sight;
pub mod pathfinding;
pub mod state;
pub mod terrain;
pub mod tokens;

// Re-exports for convenient access
pub use actions::{ActionPipeline, AttackContext, AttackOutcome, MoveContext, MoveOutcome};
pub use battle_map::{BattleGrid, GridCell};
pub use combat_log::{CombatLog, CombatLogEntry, LogAction};
pub use events::{CombatEvent, EventBus, ListenerId};
pub use fog::{FogMap, FogStore, VisionSource};
pub use grid::{grid_to_world, neighbors, world_to_grid, DiagonalRule};
pub use initiative::{build_initiative, build_initiative_with, next_turn_index, TurnEntry};
pub use line_of_sight::{has_line_of_sight, line_cells, visible_cells};
pub use pathfinding::{
    cells_within_steps, find_path, find_path_with, path_cost, reachable_cells, MovementRules,
};
pub use state::{CombatPhase, CombatSnapshot, CombatStateMachine};
pub use terrain::Terrain;
pub use tokens::{CombatToken, Weapon};
