//! Initiative order and turn advancement
//!
//! Ties go to player tokens first; beyond that they keep roster order.

use serde::{Deserialize, Serialize};

use crate::battle::tokens::CombatToken;
use crate::core::types::TokenId;
use crate::dice::{roll_formula, DiceFormula, RandomSource, RollMode};

/// One token's slot in the turn order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub token_id: TokenId,
    pub initiative: i64,
    pub acted: bool,
}

/// Roll `formula + initiative_modifier` for each token and sort descending
pub fn build_initiative(
    tokens: &[CombatToken],
    formula: &DiceFormula,
    source: &mut impl RandomSource,
) -> Vec<TurnEntry> {
    build_initiative_with(tokens, |token| {
        let roll = roll_formula(formula, RollMode::Normal, &mut *source);
        tracing::debug!("{} rolls initiative: {}", token.name, roll.breakdown);
        roll.total + token.initiative_modifier as i64
    })
}

/// Build the order from caller-supplied rolls
pub fn build_initiative_with(
    tokens: &[CombatToken],
    mut roll: impl FnMut(&CombatToken) -> i64,
) -> Vec<TurnEntry> {
    let mut rolled: Vec<(TurnEntry, bool)> = tokens
        .iter()
        .map(|token| {
            let entry = TurnEntry {
                token_id: token.id.clone(),
                initiative: roll(token),
                acted: false,
            };
            (entry, token.is_player)
        })
        .collect();
    rolled.sort_by(|(a, a_player), (b, b_player)| {
        b.initiative
            .cmp(&a.initiative)
            .then_with(|| b_player.cmp(a_player))
    });
    rolled.into_iter().map(|(entry, _)| entry).collect()
}

/// Index of the next turn, wrapping; 0 for an empty order
pub fn next_turn_index(order: &[TurnEntry], current: usize) -> usize {
    if order.is_empty() {
        return 0;
    }
    (current + 1) % order.len()
}

pub fn reset_acted(order: &mut [TurnEntry]) {
    for entry in order.iter_mut() {
        entry.acted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WorldPos;
    use crate::dice::SequenceSource;

    fn token(id: &str, modifier: i32) -> CombatToken {
        CombatToken::new(id, id, WorldPos::default(), 10, 12, 6).with_initiative_modifier(modifier)
    }

    #[test]
    fn test_forced_rolls_sorted_descending() {
        let tokens = vec![token("a", 0), token("b", 0), token("c", 0)];
        let rolls = [7, 18, 11];
        let mut i = 0;
        let order = build_initiative_with(&tokens, |_| {
            i += 1;
            rolls[i - 1]
        });
        let ids: Vec<_> = order.iter().map(|e| e.token_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(order.iter().all(|e| !e.acted));
    }

    #[test]
    fn test_ties_keep_roster_order() {
        let tokens = vec![token("first", 0), token("second", 0), token("third", 0)];
        let order = build_initiative_with(&tokens, |_| 10);
        let ids: Vec<_> = order.iter().map(|e| e.token_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_ties_put_players_first() {
        let tokens = vec![token("orc", 0), token("hero", 0).player(), token("wolf", 0)];
        let order = build_initiative_with(&tokens, |t| if t.id.as_str() == "wolf" { 12 } else { 10 });
        let ids: Vec<_> = order.iter().map(|e| e.token_id.as_str()).collect();
        assert_eq!(ids, vec!["wolf", "hero", "orc"]);
    }

    #[test]
    fn test_modifier_added_to_roll() {
        let tokens = vec![token("slow", 0), token("quick", 5)];
        let mut source = SequenceSource::faces(20, &[10, 10]);
        let formula = DiceFormula::parse("1d20").unwrap();
        let order = build_initiative(&tokens, &formula, &mut source);
        assert_eq!(order[0].token_id.as_str(), "quick");
        assert_eq!(order[0].initiative, 15);
        assert_eq!(order[1].initiative, 10);
    }

    #[test]
    fn test_next_turn_wraps() {
        let tokens = vec![token("a", 0), token("b", 0)];
        let order = build_initiative_with(&tokens, |_| 1);
        assert_eq!(next_turn_index(&order, 0), 1);
        assert_eq!(next_turn_index(&order, 1), 0);
    }

    #[test]
    fn test_next_turn_empty_order() {
        assert_eq!(next_turn_index(&[], 0), 0);
        assert_eq!(next_turn_index(&[], 42), 0);
    }

    #[test]
    fn test_reset_acted() {
        let tokens = vec![token("a", 0), token("b", 0)];
        let mut order = build_initiative_with(&tokens, |_| 1);
        order[0].acted = true;
        reset_acted(&mut order);
        assert!(order.iter().all(|e| !e.acted));
    }
}
