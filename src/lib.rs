//! VTT Combat - rendering-agnostic battle core for a virtual tabletop
//!
//! Dice, grid, pathfinding, line of sight, fog of war, initiative and the
//! combat state machine that ties them together. The core consumes tokens
//! and maps from the session layer and hands back state, log entries and
//! events; it never draws anything.

pub mod battle;
pub mod core;
pub mod dice;
pub mod persistence;
