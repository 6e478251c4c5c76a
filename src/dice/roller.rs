//! Rolling dice formulas
//!
//! Advantage and disadvantage evaluate the *entire* formula twice and keep the
//! higher or lower total: `roll("2d6+3", Advantage)` compares two full 2d6+3
//! totals rather than adding one extra die.

use serde::{Deserialize, Serialize};

use crate::dice::formula::{DiceError, DiceFormula};
use crate::dice::source::RandomSource;

/// How many times a formula is evaluated and which total is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Combine advantage and disadvantage flags; both cancel out
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => RollMode::Advantage,
            (false, true) => RollMode::Disadvantage,
            _ => RollMode::Normal,
        }
    }
}

/// Result of rolling a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub formula: DiceFormula,
    pub mode: RollMode,
    pub total: i64,
    /// Individual faces of the kept evaluation
    pub rolls: Vec<u32>,
    /// Human-readable account of the roll
    pub breakdown: String,
}

/// Draw a single face in `[1, sides]`
pub fn roll_die(sides: u32, source: &mut impl RandomSource) -> u32 {
    let face = (source.next_f64() * sides as f64).floor() as u32 + 1;
    face.clamp(1, sides.max(1))
}

/// Evaluate a formula once
fn evaluate(formula: &DiceFormula, source: &mut impl RandomSource) -> (i64, Vec<u32>) {
    let rolls: Vec<u32> = (0..formula.count)
        .map(|_| roll_die(formula.sides, source))
        .collect();
    let total = rolls.iter().map(|&r| r as i64).sum::<i64>() + formula.modifier as i64;
    (total, rolls)
}

fn describe(formula: &DiceFormula, rolls: &[u32], total: i64) -> String {
    let faces = rolls
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    match formula.modifier {
        0 => format!("{}: [{}] = {}", formula, faces, total),
        m if m > 0 => format!("{}: [{}] + {} = {}", formula, faces, m, total),
        m => format!("{}: [{}] - {} = {}", formula, faces, -m, total),
    }
}

/// Roll an already parsed formula
pub fn roll_formula(
    formula: &DiceFormula,
    mode: RollMode,
    source: &mut impl RandomSource,
) -> DiceRoll {
    let (first_total, first_rolls) = evaluate(formula, source);

    if mode == RollMode::Normal {
        return DiceRoll {
            formula: *formula,
            mode,
            total: first_total,
            breakdown: describe(formula, &first_rolls, first_total),
            rolls: first_rolls,
        };
    }

    let (second_total, second_rolls) = evaluate(formula, source);
    let keep_first = match mode {
        RollMode::Advantage => first_total >= second_total,
        _ => first_total <= second_total,
    };

    let (total, rolls) = if keep_first {
        (first_total, first_rolls.clone())
    } else {
        (second_total, second_rolls.clone())
    };

    let label = if mode == RollMode::Advantage {
        "advantage"
    } else {
        "disadvantage"
    };
    let breakdown = format!(
        "{} ({}): {} | {} -> {}",
        formula,
        label,
        describe(formula, &first_rolls, first_total),
        describe(formula, &second_rolls, second_total),
        total
    );

    DiceRoll {
        formula: *formula,
        mode,
        total,
        rolls,
        breakdown,
    }
}

/// Parse and roll a formula
///
/// A malformed formula is a recoverable usage error, never a panic.
pub fn roll(
    formula: &str,
    mode: RollMode,
    source: &mut impl RandomSource,
) -> Result<DiceRoll, DiceError> {
    let parsed = DiceFormula::parse(formula)?;
    Ok(roll_formula(&parsed, mode, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::source::{SequenceSource, XorShiftRng};

    #[test]
    fn test_roll_die_range() {
        let mut rng = XorShiftRng::new(1234);
        for _ in 0..10_000 {
            let face = roll_die(6, &mut rng);
            assert!((1..=6).contains(&face));
        }
    }

    #[test]
    fn test_roll_total_range() {
        let mut rng = XorShiftRng::new(99);
        for _ in 0..2_000 {
            let r = roll("2d6+3", RollMode::Normal, &mut rng).unwrap();
            assert!((5..=15).contains(&r.total));
            assert_eq!(r.rolls.len(), 2);
        }
    }

    #[test]
    fn test_malformed_formula_is_recoverable() {
        let mut rng = XorShiftRng::new(1);
        let err = roll("fireball", RollMode::Normal, &mut rng).unwrap_err();
        assert_eq!(err, DiceError::Malformed("fireball".into()));
    }

    #[test]
    fn test_advantage_keeps_higher_total() {
        // First evaluation 1+1, second 6+6
        let mut source = SequenceSource::faces(6, &[1, 1, 6, 6]);
        let r = roll("2d6", RollMode::Advantage, &mut source).unwrap();
        assert_eq!(r.total, 12);
        assert_eq!(r.rolls, vec![6, 6]);
    }

    #[test]
    fn test_disadvantage_keeps_lower_total() {
        let mut source = SequenceSource::faces(6, &[1, 1, 6, 6]);
        let r = roll("2d6+1", RollMode::Disadvantage, &mut source).unwrap();
        assert_eq!(r.total, 3);
        assert!(r.breakdown.contains("disadvantage"));
    }

    #[test]
    fn test_whole_formula_not_single_die() {
        // Totals 7 (1+6) vs 8 (4+4): advantage keeps 8 even though a 6 was seen
        let mut source = SequenceSource::faces(6, &[1, 6, 4, 4]);
        let r = roll("2d6", RollMode::Advantage, &mut source).unwrap();
        assert_eq!(r.total, 8);
    }

    #[test]
    fn test_advantage_mean_exceeds_normal() {
        let mut rng = XorShiftRng::new(2024);
        let trials = 5_000;
        let normal: i64 = (0..trials)
            .map(|_| roll("1d20", RollMode::Normal, &mut rng).unwrap().total)
            .sum();
        let advantage: i64 = (0..trials)
            .map(|_| roll("1d20", RollMode::Advantage, &mut rng).unwrap().total)
            .sum();
        assert!(advantage > normal);
    }

    #[test]
    fn test_breakdown_mentions_modifier() {
        let mut source = SequenceSource::faces(8, &[5]);
        let r = roll("1d8-2", RollMode::Normal, &mut source).unwrap();
        assert_eq!(r.total, 3);
        assert_eq!(r.breakdown, "1d8-2: [5] - 2 = 3");
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(RollMode::from_flags(true, false), RollMode::Advantage);
        assert_eq!(RollMode::from_flags(false, true), RollMode::Disadvantage);
        assert_eq!(RollMode::from_flags(true, true), RollMode::Normal);
    }
}
