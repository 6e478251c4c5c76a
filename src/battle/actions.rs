//! Action resolution: validate, resolve, emit
//!
//! Validation runs to completion before anything is written, so a rejected
//! action leaves every token untouched. Resolution returns an outcome carrying
//! the log entry for the caller to record.

use serde::{Deserialize, Serialize};

use crate::battle::battle_map::BattleGrid;
use crate::battle::combat_log::{CombatLogEntry, LogAction};
use crate::battle::grid::grid_to_world_at;
use crate::battle::line_of_sight::has_line_of_sight;
use crate::battle::pathfinding::{step_cost, MovementRules};
use crate::battle::tokens::{CombatToken, Weapon};
use crate::core::config::CombatConfig;
use crate::core::error::{Rejection, Result, VttError};
use crate::core::types::{GridCoord, TokenId, WorldPos};
use crate::dice::{roll_formula, DiceFormula, DiceRoll, RandomSource, RollMode};

/// Intent to walk a token along a path of cells, starting at its own cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveContext {
    pub token: TokenId,
    pub path: Vec<GridCoord>,
}

impl MoveContext {
    pub fn new(token: impl Into<TokenId>, path: Vec<GridCoord>) -> Self {
        Self {
            token: token.into(),
            path,
        }
    }
}

/// Intent to attack another token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackContext {
    pub attacker: TokenId,
    pub target: TokenId,
    #[serde(default)]
    pub mode: RollMode,
    pub weapon: Weapon,
}

impl AttackContext {
    pub fn new(attacker: impl Into<TokenId>, target: impl Into<TokenId>, weapon: Weapon) -> Self {
        Self {
            attacker: attacker.into(),
            target: target.into(),
            mode: RollMode::Normal,
            weapon,
        }
    }

    pub fn with_mode(mut self, mode: RollMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub token_id: TokenId,
    pub from: GridCoord,
    pub to: GridCoord,
    /// Grid steps spent (path length minus one)
    pub steps: u32,
    pub position: WorldPos,
    pub log_entry: CombatLogEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub attacker: TokenId,
    pub target: TokenId,
    pub attack_roll: DiceRoll,
    /// d20 result plus the weapon's attack bonus
    pub attack_total: i64,
    pub hit: bool,
    pub damage_roll: Option<DiceRoll>,
    pub damage: u32,
    pub target_hp: u32,
    pub defeated: bool,
    pub log_entry: CombatLogEntry,
}

/// A move that passed validation
#[derive(Debug, Clone, Copy)]
struct MovePlan {
    index: usize,
    from: GridCoord,
    to: GridCoord,
    steps: u32,
}

/// An attack that passed validation
#[derive(Debug, Clone, Copy)]
struct AttackPlan {
    attacker: usize,
    target: usize,
    damage: DiceFormula,
}

fn token_index(tokens: &[CombatToken], id: &TokenId) -> Result<usize> {
    tokens
        .iter()
        .position(|t| &t.id == id)
        .ok_or_else(|| VttError::TokenNotFound(id.clone()))
}

/// Runs move and attack intents against a grid and config
#[derive(Debug, Clone, Copy)]
pub struct ActionPipeline<'a> {
    grid: &'a BattleGrid,
    config: &'a CombatConfig,
    rules: MovementRules,
}

impl<'a> ActionPipeline<'a> {
    pub fn new(grid: &'a BattleGrid, config: &'a CombatConfig) -> Self {
        Self {
            grid,
            config,
            rules: MovementRules::from_config(config),
        }
    }

    fn validate_move(&self, tokens: &[CombatToken], ctx: &MoveContext, budget: u32) -> Result<MovePlan> {
        let index = token_index(tokens, &ctx.token)?;
        let token = &tokens[index];

        if !token.is_alive() {
            return Err(Rejection::Defeated(token.id.clone()).into());
        }

        let (Some(&first), Some(&last)) = (ctx.path.first(), ctx.path.last()) else {
            return Err(Rejection::EmptyPath.into());
        };

        let start = token.grid_position(self.grid.tile_size);
        if first != start {
            return Err(Rejection::PathStartMismatch {
                expected: start,
                actual: first,
            }
            .into());
        }

        for step in ctx.path.windows(2) {
            if !step[0].is_adjacent(&step[1]) {
                return Err(Rejection::DisjointPath(step[1]).into());
            }
            if step_cost(self.grid, step[0], step[1], &self.rules).is_none() {
                return Err(Rejection::BlockedPath(step[1]).into());
            }
        }

        let steps = (ctx.path.len() - 1) as u32;
        if steps > budget {
            return Err(Rejection::MovementExceeded {
                needed: steps,
                available: budget,
            }
            .into());
        }

        Ok(MovePlan {
            index,
            from: first,
            to: last,
            steps,
        })
    }

    /// Check a move without applying it
    pub fn check_move(&self, tokens: &[CombatToken], ctx: &MoveContext, budget: u32) -> Result<()> {
        self.validate_move(tokens, ctx, budget).map(|_| ())
    }

    /// Validate and apply a move within `budget` grid steps
    pub fn execute_move(
        &self,
        tokens: &mut [CombatToken],
        ctx: &MoveContext,
        budget: u32,
    ) -> Result<MoveOutcome> {
        let plan = self.validate_move(tokens, ctx, budget)?;

        let token = &mut tokens[plan.index];
        token.position = grid_to_world_at(plan.to, self.grid.tile_size, token.position.y);

        let description = format!(
            "{} moves from {} to {} ({} steps)",
            token.name, plan.from, plan.to, plan.steps
        );
        tracing::debug!("{}", description);

        Ok(MoveOutcome {
            token_id: token.id.clone(),
            from: plan.from,
            to: plan.to,
            steps: plan.steps,
            position: token.position,
            log_entry: CombatLogEntry::new(token.id.clone(), LogAction::Move, description),
        })
    }

    fn validate_attack(&self, tokens: &[CombatToken], ctx: &AttackContext) -> Result<AttackPlan> {
        let attacker = token_index(tokens, &ctx.attacker)?;
        let target = token_index(tokens, &ctx.target)?;

        for &index in &[attacker, target] {
            if !tokens[index].is_alive() {
                return Err(Rejection::Defeated(tokens[index].id.clone()).into());
            }
        }

        let tile = self.grid.tile_size;
        let range = ctx.weapon.effective_range(self.config.los_max_range);
        let from = tokens[attacker].grid_position(tile);
        let to = tokens[target].grid_position(tile);
        if !has_line_of_sight(self.grid, from, to, range) {
            return Err(Rejection::NoLineOfSight.into());
        }

        let damage = DiceFormula::parse(&ctx.weapon.damage)
            .map_err(|_| Rejection::InvalidFormula(ctx.weapon.damage.clone()))?;

        Ok(AttackPlan {
            attacker,
            target,
            damage,
        })
    }

    /// Check an attack without rolling anything
    pub fn check_attack(&self, tokens: &[CombatToken], ctx: &AttackContext) -> Result<()> {
        self.validate_attack(tokens, ctx).map(|_| ())
    }

    /// Validate, roll and apply an attack
    ///
    /// `d20 + attack_bonus` hits when it reaches the target's AC. On a hit the
    /// weapon's damage is rolled (negative totals count as zero) and taken off
    /// the target's hp, which floors at zero.
    pub fn execute_attack(
        &self,
        tokens: &mut [CombatToken],
        ctx: &AttackContext,
        source: &mut impl RandomSource,
    ) -> Result<AttackOutcome> {
        let plan = self.validate_attack(tokens, ctx)?;

        let d20 = DiceFormula::new(1, 20, 0);
        let attack_roll = roll_formula(&d20, ctx.mode, &mut *source);
        let attack_total = attack_roll.total + ctx.weapon.attack_bonus as i64;
        let target_ac = tokens[plan.target].ac;
        let hit = attack_total >= target_ac as i64;

        let damage_roll = hit.then(|| roll_formula(&plan.damage, RollMode::Normal, &mut *source));
        let damage = damage_roll
            .as_ref()
            .map(|r| r.total.max(0) as u32)
            .unwrap_or(0);

        let attacker_name = tokens[plan.attacker].name.clone();
        let target = &mut tokens[plan.target];
        target.apply_damage(damage);
        let defeated = !target.is_alive();

        let description = if hit {
            format!(
                "{} hits {} with {} for {} damage (attack {} vs AC {})",
                attacker_name, target.name, ctx.weapon.name, damage, attack_total, target_ac
            )
        } else {
            format!(
                "{} misses {} with {} (attack {} vs AC {})",
                attacker_name, target.name, ctx.weapon.name, attack_total, target_ac
            )
        };
        tracing::debug!("{}", description);

        let mut log_entry = CombatLogEntry::new(ctx.attacker.clone(), LogAction::Attack, description)
            .with_target(ctx.target.clone());
        if hit {
            log_entry = log_entry.with_damage(damage);
        }

        Ok(AttackOutcome {
            attacker: ctx.attacker.clone(),
            target: ctx.target.clone(),
            attack_roll,
            attack_total,
            hit,
            damage_roll,
            damage,
            target_hp: target.hp,
            defeated,
            log_entry,
        })
    }
}
