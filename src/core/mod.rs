pub mod config;
pub mod error;
pub mod types;

pub use config::CombatConfig;
pub use error::{Rejection, Result, VttError};
pub use types::{GridCoord, MapId, TokenId, WorldPos};
