//! Dice engine: formula parsing, random sources and rolling

pub mod formula;
pub mod roller;
pub mod source;

pub use formula::{DiceError, DiceFormula, MAX_DICE};
pub use roller::{roll, roll_die, roll_formula, DiceRoll, RollMode};
pub use source::{ChaChaSource, RandomSource, SequenceSource, ThreadRandom, XorShiftRng};
