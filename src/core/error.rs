use thiserror::Error;

use crate::core::types::{MapId, TokenId};
use crate::dice::DiceError;

/// User-facing refusals: the intent was understood but is not allowed now
///
/// A rejection never mutates state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Combat is not active")]
    NotActive,

    #[error("Combat is already active")]
    AlreadyActive,

    #[error("Cannot start combat without entities")]
    EmptyRoster,

    #[error("It is not {0}'s turn")]
    OutOfTurn(TokenId),

    #[error("{0} has already used its action this turn")]
    ActionAlreadyUsed(TokenId),

    #[error("{0} is defeated")]
    Defeated(TokenId),

    #[error("Path is empty")]
    EmptyPath,

    #[error("Path must start at the token's cell {expected}, got {actual}")]
    PathStartMismatch {
        expected: crate::core::types::GridCoord,
        actual: crate::core::types::GridCoord,
    },

    #[error("Path is not contiguous at {0}")]
    DisjointPath(crate::core::types::GridCoord),

    #[error("Path crosses blocked cell {0}")]
    BlockedPath(crate::core::types::GridCoord),

    #[error("Not enough movement: needs {needed}, has {available}")]
    MovementExceeded { needed: u32, available: u32 },

    #[error("No line of sight")]
    NoLineOfSight,

    #[error("Invalid dice formula: {0}")]
    InvalidFormula(String),

    #[error("Token {0} is already in the roster")]
    DuplicateToken(TokenId),
}

#[derive(Error, Debug)]
pub enum VttError {
    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Invalid fog data for map {map}: expected {expected} bytes, got {actual}")]
    InvalidFogData {
        map: MapId,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl VttError {
    /// Recoverable refusal (surface to the user) as opposed to a caller bug
    pub fn is_rejection(&self) -> bool {
        matches!(self, VttError::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            VttError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VttError>;
