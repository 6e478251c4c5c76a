//! Saving and loading encounters
//!
//! The battle core only needs "load by session id, or nothing" and "save by
//! session id". Storage backends live behind `CombatStore`.

pub mod store;

pub use store::{CombatStore, JsonFileStore, MemoryStore};
