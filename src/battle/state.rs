//! Combat state machine
//!
//! Owns one encounter: the roster, the initiative order, per-turn budgets, the
//! combat log and the fog of war for the encounter's map.
//!
//! Phases run `Idle -> Active -> Ended`; a new encounter can start from either
//! `Idle` or `Ended`. Every intent is checked in full before anything changes,
//! and listeners are notified after the change has been applied.

use serde::{Deserialize, Serialize};

use crate::battle::actions::{ActionPipeline, AttackContext, AttackOutcome, MoveContext, MoveOutcome};
use crate::battle::battle_map::BattleGrid;
use crate::battle::combat_log::{CombatLog, CombatLogEntry, LogAction};
use crate::battle::events::{CombatEvent, EventBus, ListenerId};
use crate::battle::fog::{FogStore, VisionSource};
use crate::battle::initiative::{build_initiative, next_turn_index, reset_acted, TurnEntry};
use crate::battle::pathfinding::{cells_within_steps, MovementRules};
use crate::battle::tokens::CombatToken;
use crate::core::config::CombatConfig;
use crate::core::error::{Rejection, Result, VttError};
use crate::core::types::{GridCoord, MapId, TokenId};
use crate::dice::{DiceFormula, RandomSource, ThreadRandom};
use crate::persistence::CombatStore;

/// Encounter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatPhase {
    #[default]
    Idle,
    Active,
    Ended,
}

/// Everything needed to resume an encounter
///
/// The grid and config are supplied again on restore; the random source is
/// not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    pub session_id: String,
    pub phase: CombatPhase,
    pub round: u32,
    pub current_index: usize,
    pub entities: Vec<CombatToken>,
    pub turn_order: Vec<TurnEntry>,
    /// Grid steps already spent by the entity whose turn it is
    pub movement_used: u32,
    /// Whether the entity whose turn it is has attacked
    pub action_used: bool,
    pub log: CombatLog,
    pub map_id: MapId,
    pub fog: FogStore,
}

pub struct CombatStateMachine {
    session_id: String,
    grid: BattleGrid,
    config: CombatConfig,
    phase: CombatPhase,
    round: u32,
    current_index: usize,
    entities: Vec<CombatToken>,
    turn_order: Vec<TurnEntry>,
    movement_used: u32,
    action_used: bool,
    log: CombatLog,
    map_id: MapId,
    fog: FogStore,
    rng: Box<dyn RandomSource + Send>,
    events: EventBus,
}

impl std::fmt::Debug for CombatStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatStateMachine")
            .field("session_id", &self.session_id)
            .field("phase", &self.phase)
            .field("round", &self.round)
            .field("current_index", &self.current_index)
            .field("entities", &self.entities.len())
            .field("events", &self.events)
            .finish()
    }
}

impl CombatStateMachine {
    /// Fresh idle machine with a fully hidden fog map named after the session
    ///
    /// The grid's `tile_size` must match the config's.
    pub fn new(session_id: impl Into<String>, grid: BattleGrid, config: CombatConfig) -> Result<Self> {
        config.validate().map_err(VttError::Config)?;
        if (grid.tile_size - config.tile_size).abs() > f32::EPSILON * config.tile_size.max(1.0) {
            return Err(VttError::Config(format!(
                "grid tile_size ({}) does not match config tile_size ({})",
                grid.tile_size, config.tile_size
            )));
        }

        let session_id = session_id.into();
        let map_id = MapId::new(session_id.clone());
        let mut fog = FogStore::new();
        fog.set_map(map_id.clone(), None, grid.width, grid.height)?;

        Ok(Self {
            session_id,
            log: CombatLog::with_capacity(config.log_capacity),
            grid,
            config,
            phase: CombatPhase::Idle,
            round: 0,
            current_index: 0,
            entities: Vec::new(),
            turn_order: Vec::new(),
            movement_used: 0,
            action_used: false,
            map_id,
            fog,
            rng: Box::new(ThreadRandom),
            events: EventBus::new(),
        })
    }

    /// Rebuild a machine from a snapshot
    pub fn from_snapshot(snapshot: CombatSnapshot, grid: BattleGrid, config: CombatConfig) -> Result<Self> {
        let mut machine = Self::new(snapshot.session_id.clone(), grid, config)?;
        machine.restore(snapshot)?;
        Ok(machine)
    }

    pub fn from_json(json: &str, grid: BattleGrid, config: CombatConfig) -> Result<Self> {
        let snapshot: CombatSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, grid, config)
    }

    /// Restore the saved encounter for `session_id`, or start a fresh one
    pub async fn load_or_start<S: CombatStore>(
        store: &S,
        session_id: &str,
        grid: BattleGrid,
        config: CombatConfig,
    ) -> Result<Self> {
        match store.load(session_id).await? {
            Some(snapshot) => {
                tracing::info!("Resuming encounter for session {}", session_id);
                Self::from_snapshot(snapshot, grid, config)
            }
            None => {
                tracing::info!("No saved encounter for session {}, starting fresh", session_id);
                Self::new(session_id, grid, config)
            }
        }
    }

    pub async fn save<S: CombatStore>(&self, store: &S) -> Result<()> {
        store.save(&self.session_id, &self.snapshot()).await
    }

    /// Replace the dice source (seeded sources make encounters reproducible)
    pub fn with_random_source(mut self, source: impl RandomSource + Send + 'static) -> Self {
        self.rng = Box::new(source);
        self
    }

    pub fn set_random_source(&mut self, source: impl RandomSource + Send + 'static) {
        self.rng = Box::new(source);
    }

    // === QUERIES ===

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> CombatPhase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_turn(&self) -> Option<&TurnEntry> {
        if self.phase != CombatPhase::Active {
            return None;
        }
        self.turn_order.get(self.current_index)
    }

    pub fn current_entity(&self) -> Option<&CombatToken> {
        let entry = self.current_turn()?;
        self.entity(&entry.token_id)
    }

    pub fn entities(&self) -> &[CombatToken] {
        &self.entities
    }

    pub fn entity(&self, id: &TokenId) -> Option<&CombatToken> {
        self.entities.iter().find(|t| &t.id == id)
    }

    pub fn turn_order(&self) -> &[TurnEntry] {
        &self.turn_order
    }

    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    pub fn grid(&self) -> &BattleGrid {
        &self.grid
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn map_id(&self) -> &MapId {
        &self.map_id
    }

    pub fn fog(&self) -> &FogStore {
        &self.fog
    }

    /// Direct fog access for manual reveal/hide
    pub fn fog_mut(&mut self) -> &mut FogStore {
        &mut self.fog
    }

    pub fn movement_used(&self) -> u32 {
        self.movement_used
    }

    pub fn action_used(&self) -> bool {
        self.action_used
    }

    /// Steps the entity may still take this turn
    ///
    /// Outside its own turn this is its full speed.
    pub fn remaining_movement(&self, id: &TokenId) -> Option<u32> {
        let token = self.entity(id)?;
        let used = match self.current_turn() {
            Some(entry) if &entry.token_id == id => self.movement_used,
            _ => 0,
        };
        Some(token.speed.saturating_sub(used))
    }

    /// Cells the entity could step to with its remaining movement
    pub fn highlight_tiles(&self, id: &TokenId) -> Result<Vec<GridCoord>> {
        let token = self
            .entity(id)
            .ok_or_else(|| VttError::TokenNotFound(id.clone()))?;
        let remaining = self.remaining_movement(id).unwrap_or(0);
        let start = token.grid_position(self.grid.tile_size);
        Ok(cells_within_steps(
            &self.grid,
            start,
            remaining,
            &MovementRules::from_config(&self.config),
        ))
    }

    // === OBSERVERS ===

    pub fn subscribe(&mut self, listener: impl FnMut(&CombatEvent) + Send + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&mut self, event: CombatEvent) {
        self.events.emit(&event);
    }

    // === LIFECYCLE ===

    /// Begin an encounter: roll initiative, round 1, first turn
    pub fn start_combat(&mut self, entities: Vec<CombatToken>) -> Result<()> {
        if self.phase == CombatPhase::Active {
            return self.reject(Rejection::AlreadyActive);
        }
        if entities.is_empty() {
            return self.reject(Rejection::EmptyRoster);
        }
        for (i, token) in entities.iter().enumerate() {
            if entities[..i].iter().any(|other| other.id == token.id) {
                return self.reject(Rejection::DuplicateToken(token.id.clone()));
            }
        }
        let mut entities = entities;
        for token in entities.iter_mut() {
            token.normalize();
        }
        if let Some(fallen) = entities.iter().find(|t| !t.is_alive()) {
            return self.reject(Rejection::Defeated(fallen.id.clone()));
        }
        let formula = DiceFormula::parse(&self.config.initiative_formula)?;

        self.turn_order = build_initiative(&entities, &formula, &mut self.rng);
        self.entities = entities;
        self.phase = CombatPhase::Active;
        self.round = 1;
        self.current_index = 0;
        self.movement_used = 0;
        self.action_used = false;
        self.log = CombatLog::with_capacity(self.config.log_capacity);

        if self.config.reset_fog_on_start {
            self.fog.hide_all(&self.map_id);
        }

        tracing::info!(
            "Combat started in session {} with {} entities",
            self.session_id,
            self.entities.len()
        );

        let order = self.turn_order.iter().map(|e| e.token_id.clone()).collect();
        self.emit(CombatEvent::CombatStarted { round: 1, order });
        self.emit(CombatEvent::RoundStarted { round: 1 });
        self.announce_turn();
        self.refresh_fog();
        Ok(())
    }

    /// End the current entity's turn; only that entity may do so
    pub fn end_turn(&mut self, id: &TokenId) -> Result<()> {
        self.ensure_turn(id)?;

        if let Some(entry) = self.turn_order.get_mut(self.current_index) {
            entry.acted = true;
        }
        self.emit(CombatEvent::TurnEnded {
            token_id: id.clone(),
        });

        let next = next_turn_index(&self.turn_order, self.current_index);
        if next <= self.current_index {
            self.begin_round();
        }
        self.current_index = next;
        self.movement_used = 0;
        self.action_used = false;
        self.announce_turn();
        Ok(())
    }

    /// Finish the encounter; entities and log stay queryable
    pub fn end_combat(&mut self) -> Result<()> {
        if self.phase != CombatPhase::Active {
            return self.reject(Rejection::NotActive);
        }
        self.phase = CombatPhase::Ended;
        tracing::info!(
            "Combat ended in session {} after {} rounds",
            self.session_id,
            self.round
        );
        self.emit(CombatEvent::CombatEnded { round: self.round });
        Ok(())
    }

    // === ACTIONS ===

    /// Walk the current entity along a path within its remaining movement
    pub fn move_entity(&mut self, ctx: &MoveContext) -> Result<MoveOutcome> {
        self.ensure_turn(&ctx.token)?;

        let budget = self.remaining_movement(&ctx.token).unwrap_or(0);
        let outcome = ActionPipeline::new(&self.grid, &self.config)
            .execute_move(&mut self.entities, ctx, budget)
            .map_err(|e| self.warn_rejection(e))?;

        self.movement_used += outcome.steps;
        self.record(outcome.log_entry.clone());
        self.emit(CombatEvent::EntityMoved {
            token_id: outcome.token_id.clone(),
            from: outcome.from,
            to: outcome.to,
            steps: outcome.steps,
        });
        self.refresh_fog();
        Ok(outcome)
    }

    /// Attack with the current entity; one attack per turn
    pub fn use_action(&mut self, ctx: &AttackContext) -> Result<AttackOutcome> {
        self.ensure_turn(&ctx.attacker)?;
        if self.action_used {
            return self.reject(Rejection::ActionAlreadyUsed(ctx.attacker.clone()));
        }

        let outcome = ActionPipeline::new(&self.grid, &self.config)
            .execute_attack(&mut self.entities, ctx, &mut self.rng)
            .map_err(|e| self.warn_rejection(e))?;

        self.action_used = true;
        self.record(outcome.log_entry.clone());
        self.emit(CombatEvent::AttackResolved {
            attacker: outcome.attacker.clone(),
            target: outcome.target.clone(),
            hit: outcome.hit,
            attack_total: outcome.attack_total,
            damage: outcome.damage,
        });

        if outcome.defeated {
            self.defeat(&outcome.target);
        }
        Ok(outcome)
    }

    /// Take an entity out of the encounter
    pub fn remove_entity(&mut self, id: &TokenId) -> Result<CombatToken> {
        let token = self
            .detach(id)
            .ok_or_else(|| VttError::TokenNotFound(id.clone()))?;

        self.record(CombatLogEntry::new(
            id.clone(),
            LogAction::Removed,
            format!("{} leaves the encounter", token.name),
        ));
        self.emit(CombatEvent::EntityRemoved {
            token_id: id.clone(),
        });
        self.refresh_fog();
        Ok(token)
    }

    // === SNAPSHOTS ===

    pub fn snapshot(&self) -> CombatSnapshot {
        CombatSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            round: self.round,
            current_index: self.current_index,
            entities: self.entities.clone(),
            turn_order: self.turn_order.clone(),
            movement_used: self.movement_used,
            action_used: self.action_used,
            log: self.log.clone(),
            map_id: self.map_id.clone(),
            fog: self.fog.clone(),
        }
    }

    /// Replace the encounter state with a snapshot
    ///
    /// The snapshot is checked first; on error nothing changes.
    pub fn restore(&mut self, snapshot: CombatSnapshot) -> Result<()> {
        if !snapshot.turn_order.is_empty() && snapshot.current_index >= snapshot.turn_order.len() {
            return Err(VttError::InvalidSnapshot(format!(
                "turn index {} out of range for {} entries",
                snapshot.current_index,
                snapshot.turn_order.len()
            )));
        }
        if let Some(entry) = snapshot
            .turn_order
            .iter()
            .find(|e| !snapshot.entities.iter().any(|t| t.id == e.token_id))
        {
            return Err(VttError::InvalidSnapshot(format!(
                "turn order references unknown token {}",
                entry.token_id
            )));
        }

        for (i, token) in snapshot.entities.iter().enumerate() {
            if snapshot.entities[..i].iter().any(|other| other.id == token.id) {
                return Err(VttError::InvalidSnapshot(format!(
                    "duplicate token {}",
                    token.id
                )));
            }
        }
        if let Some((id, _)) = snapshot.fog.iter().find(|(_, map)| !map.is_consistent()) {
            return Err(VttError::InvalidSnapshot(format!(
                "fog map {} does not match its dimensions",
                id
            )));
        }
        if let Some(map) = snapshot.fog.map(&snapshot.map_id) {
            if map.width != self.grid.width || map.height != self.grid.height {
                return Err(VttError::InvalidSnapshot(format!(
                    "fog map {} is {}x{}, grid is {}x{}",
                    snapshot.map_id, map.width, map.height, self.grid.width, self.grid.height
                )));
            }
        }

        let mut fog = snapshot.fog;
        if !fog.contains(&snapshot.map_id) {
            fog.set_map(snapshot.map_id.clone(), None, self.grid.width, self.grid.height)?;
        }

        self.session_id = snapshot.session_id;
        self.phase = snapshot.phase;
        self.round = snapshot.round;
        self.current_index = snapshot.current_index;
        self.entities = snapshot.entities;
        self.turn_order = snapshot.turn_order;
        self.movement_used = snapshot.movement_used;
        self.action_used = snapshot.action_used;
        self.log = snapshot.log;
        self.map_id = snapshot.map_id;
        self.fog = fog;

        for token in self.entities.iter_mut() {
            token.normalize();
        }
        tracing::debug!(
            "Restored session {} at round {} ({:?})",
            self.session_id,
            self.round,
            self.phase
        );
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    // === INTERNALS ===

    fn reject<T>(&self, rejection: Rejection) -> Result<T> {
        tracing::warn!("Session {}: {}", self.session_id, rejection);
        Err(rejection.into())
    }

    fn warn_rejection(&self, err: VttError) -> VttError {
        if let Some(rejection) = err.rejection() {
            tracing::warn!("Session {}: {}", self.session_id, rejection);
        }
        err
    }

    /// Active combat, known entity, and it is that entity's turn
    fn ensure_turn(&self, id: &TokenId) -> Result<()> {
        if self.phase != CombatPhase::Active {
            return self.reject(Rejection::NotActive);
        }
        if self.entity(id).is_none() {
            return Err(VttError::TokenNotFound(id.clone()));
        }
        match self.turn_order.get(self.current_index) {
            Some(entry) if &entry.token_id == id => Ok(()),
            _ => self.reject(Rejection::OutOfTurn(id.clone())),
        }
    }

    fn record(&mut self, mut entry: CombatLogEntry) {
        entry.round = self.round;
        self.log.push(entry);
    }

    fn begin_round(&mut self) {
        self.round += 1;
        reset_acted(&mut self.turn_order);
        tracing::info!("Round {} begins", self.round);
        self.emit(CombatEvent::RoundStarted { round: self.round });
    }

    fn announce_turn(&mut self) {
        if let Some(entry) = self.turn_order.get(self.current_index) {
            let token_id = entry.token_id.clone();
            tracing::debug!("Round {}: {}'s turn", self.round, token_id);
            self.emit(CombatEvent::TurnStarted {
                token_id,
                round: self.round,
            });
        }
    }

    fn defeat(&mut self, id: &TokenId) {
        let Some(token) = self.detach(id) else {
            return;
        };
        tracing::info!("{} is defeated", token.name);
        self.record(CombatLogEntry::new(
            id.clone(),
            LogAction::Defeated,
            format!("{} is defeated", token.name),
        ));
        self.emit(CombatEvent::EntityDefeated {
            token_id: id.clone(),
        });
        self.refresh_fog();
    }

    /// Drop an entity from the roster and turn order, keeping the turn pointer
    /// on the same entity (or passing the turn on if it was theirs)
    fn detach(&mut self, id: &TokenId) -> Option<CombatToken> {
        let position = self.entities.iter().position(|t| &t.id == id)?;
        let token = self.entities.remove(position);

        let Some(slot) = self.turn_order.iter().position(|e| &e.token_id == id) else {
            return Some(token);
        };
        self.turn_order.remove(slot);

        if slot < self.current_index {
            self.current_index -= 1;
        } else if slot == self.current_index && self.phase == CombatPhase::Active {
            self.movement_used = 0;
            self.action_used = false;
            if self.current_index >= self.turn_order.len() {
                self.current_index = 0;
                if !self.turn_order.is_empty() {
                    self.begin_round();
                }
            }
            self.announce_turn();
        }
        if self.current_index >= self.turn_order.len() {
            self.current_index = 0;
        }
        Some(token)
    }

    /// Recompute what the living entities can see and merge it into the fog
    fn refresh_fog(&mut self) {
        let tile = self.grid.tile_size;
        let default_radius = self.config.default_vision_radius;
        let sources: Vec<VisionSource> = self
            .entities
            .iter()
            .filter(|t| t.is_alive())
            .map(|t| {
                VisionSource::new(
                    t.id.to_string(),
                    t.grid_position(tile),
                    t.vision_radius.unwrap_or(default_radius),
                )
            })
            .collect();

        let newly_revealed = self
            .fog
            .update_vision(&self.map_id, &sources, Some(&self.grid));
        tracing::debug!(
            "Fog updated from {} sources, {} cells newly revealed",
            sources.len(),
            newly_revealed
        );
        self.emit(CombatEvent::FogUpdated { newly_revealed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid::grid_to_world;
    use crate::battle::tokens::Weapon;
    use crate::dice::SequenceSource;
    use std::sync::{Arc, Mutex};

    fn token_at(id: &str, x: i32, z: i32) -> CombatToken {
        CombatToken::new(id, id, grid_to_world(GridCoord::new(x, z), 5.0), 10, 12, 6)
    }

    /// Machine whose initiative puts `a` first and `b` second
    fn two_token_machine() -> CombatStateMachine {
        let mut machine = CombatStateMachine::new("s1", BattleGrid::new(10, 10, 5.0), CombatConfig::default())
            .unwrap()
            .with_random_source(SequenceSource::faces(20, &[18, 4]));
        machine
            .start_combat(vec![token_at("a", 0, 0), token_at("b", 1, 0)])
            .unwrap();
        machine
    }

    fn id(s: &str) -> TokenId {
        TokenId::new(s)
    }

    #[test]
    fn test_start_combat() {
        let machine = two_token_machine();
        assert_eq!(machine.phase(), CombatPhase::Active);
        assert_eq!(machine.round(), 1);
        assert_eq!(machine.current_turn().unwrap().token_id, id("a"));
    }

    #[test]
    fn test_start_rejects_empty_and_active() {
        let mut machine =
            CombatStateMachine::new("s", BattleGrid::new(5, 5, 5.0), CombatConfig::default()).unwrap();
        let err = machine.start_combat(vec![]).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::EmptyRoster));
        assert_eq!(machine.phase(), CombatPhase::Idle);

        machine.start_combat(vec![token_at("a", 0, 0)]).unwrap();
        let err = machine.start_combat(vec![token_at("b", 0, 0)]).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::AlreadyActive));
    }

    #[test]
    fn test_start_rejects_duplicate_ids() {
        let mut machine =
            CombatStateMachine::new("s", BattleGrid::new(5, 5, 5.0), CombatConfig::default()).unwrap();
        let err = machine
            .start_combat(vec![token_at("a", 0, 0), token_at("a", 1, 1)])
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::DuplicateToken(id("a"))));
    }

    #[test]
    fn test_end_turn_guarded() {
        let mut machine = two_token_machine();
        machine.end_turn(&id("a")).unwrap();
        assert_eq!(machine.current_turn().unwrap().token_id, id("b"));

        let before = machine.snapshot();
        let err = machine.end_turn(&id("a")).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::OutOfTurn(id("a"))));
        assert_eq!(machine.snapshot(), before);
    }

    #[test]
    fn test_wraparound_starts_new_round() {
        let mut machine = two_token_machine();
        machine.end_turn(&id("a")).unwrap();
        assert!(machine.turn_order()[0].acted);
        machine.end_turn(&id("b")).unwrap();
        assert_eq!(machine.round(), 2);
        assert_eq!(machine.current_index(), 0);
        assert!(machine.turn_order().iter().all(|e| !e.acted));
    }

    #[test]
    fn test_actions_outside_active_rejected() {
        let mut machine =
            CombatStateMachine::new("s", BattleGrid::new(5, 5, 5.0), CombatConfig::default()).unwrap();
        let ctx = MoveContext::new("a", vec![GridCoord::new(0, 0)]);
        assert_eq!(
            machine.move_entity(&ctx).unwrap_err().rejection(),
            Some(&Rejection::NotActive)
        );
        assert_eq!(
            machine.end_combat().unwrap_err().rejection(),
            Some(&Rejection::NotActive)
        );
    }

    #[test]
    fn test_movement_budget_spans_moves() {
        let mut machine = two_token_machine();
        let first: Vec<_> = (0..4).map(|z| GridCoord::new(0, z)).collect();
        machine.move_entity(&MoveContext::new("a", first)).unwrap();
        assert_eq!(machine.remaining_movement(&id("a")), Some(3));

        let too_far: Vec<_> = (3..8).map(|z| GridCoord::new(0, z)).collect();
        let err = machine.move_entity(&MoveContext::new("a", too_far)).unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::MovementExceeded {
                needed: 4,
                available: 3
            })
        );

        machine.end_turn(&id("a")).unwrap();
        machine.end_turn(&id("b")).unwrap();
        assert_eq!(machine.remaining_movement(&id("a")), Some(6));
    }

    #[test]
    fn test_one_attack_per_turn() {
        let mut machine = two_token_machine();
        machine.set_random_source(SequenceSource::faces(20, &[1]));
        let ctx = AttackContext::new("a", "b", Weapon::new("Sword", "1d6"));
        let outcome = machine.use_action(&ctx).unwrap();
        assert!(!outcome.hit);

        let err = machine.use_action(&ctx).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::ActionAlreadyUsed(id("a"))));
        assert_eq!(machine.log().len(), 1);
    }

    #[test]
    fn test_out_of_turn_attack_rejected() {
        let mut machine = two_token_machine();
        let ctx = AttackContext::new("b", "a", Weapon::new("Sword", "1d6"));
        let err = machine.use_action(&ctx).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::OutOfTurn(id("b"))));
        assert!(machine.log().is_empty());
    }

    #[test]
    fn test_unknown_entity_is_fatal() {
        let mut machine = two_token_machine();
        let err = machine.end_turn(&id("ghost")).unwrap_err();
        assert!(matches!(err, VttError::TokenNotFound(_)));
    }

    #[test]
    fn test_defeat_removes_from_roster_and_order() {
        let mut machine = CombatStateMachine::new("s", BattleGrid::new(10, 10, 5.0), CombatConfig::default())
            .unwrap()
            .with_random_source(SequenceSource::faces(20, &[18, 10, 4]));
        machine
            .start_combat(vec![
                token_at("a", 0, 0),
                token_at("b", 1, 0).with_hp(1),
                token_at("c", 2, 0),
            ])
            .unwrap();
        assert_eq!(machine.current_turn().unwrap().token_id, id("a"));

        // d20 of 20 hits, d6 of 6 kills
        machine.set_random_source(SequenceSource::new(vec![0.99, 0.99]));
        let outcome = machine
            .use_action(&AttackContext::new("a", "b", Weapon::new("Sword", "1d6")))
            .unwrap();
        assert!(outcome.defeated);
        assert!(machine.entity(&id("b")).is_none());
        assert_eq!(machine.turn_order().len(), 2);
        assert_eq!(machine.current_turn().unwrap().token_id, id("a"));
        assert_eq!(machine.log().last().unwrap().action, LogAction::Defeated);

        machine.end_turn(&id("a")).unwrap();
        assert_eq!(machine.current_turn().unwrap().token_id, id("c"));
    }

    #[test]
    fn test_remove_entity_before_current_keeps_turn() {
        let mut machine = two_token_machine();
        machine.end_turn(&id("a")).unwrap();
        machine.remove_entity(&id("a")).unwrap();
        assert_eq!(machine.current_turn().unwrap().token_id, id("b"));
        assert!(matches!(
            machine.remove_entity(&id("a")),
            Err(VttError::TokenNotFound(_))
        ));
    }

    #[test]
    fn test_remove_current_entity_passes_turn() {
        let mut machine = two_token_machine();
        machine.end_turn(&id("a")).unwrap();
        machine.remove_entity(&id("b")).unwrap();
        assert_eq!(machine.round(), 2);
        assert_eq!(machine.current_turn().unwrap().token_id, id("a"));
    }

    #[test]
    fn test_end_combat_keeps_state_and_allows_restart() {
        let mut machine = two_token_machine();
        machine.end_combat().unwrap();
        assert_eq!(machine.phase(), CombatPhase::Ended);
        assert_eq!(machine.entities().len(), 2);
        assert!(machine.current_turn().is_none());

        machine.start_combat(vec![token_at("c", 3, 3)]).unwrap();
        assert_eq!(machine.phase(), CombatPhase::Active);
        assert_eq!(machine.round(), 1);
    }

    #[test]
    fn test_fog_follows_tokens() {
        let mut config = CombatConfig::default();
        config.default_vision_radius = 2.0;
        let mut machine = CombatStateMachine::new("fog", BattleGrid::new(20, 20, 5.0), config)
            .unwrap()
            .with_random_source(SequenceSource::faces(20, &[10]));
        machine.start_combat(vec![token_at("scout", 0, 0)]).unwrap();

        let map = machine.map_id().clone();
        assert_eq!(machine.fog().is_revealed(&map, 2, 0), Some(true));
        assert_eq!(machine.fog().is_revealed(&map, 6, 0), Some(false));

        let path: Vec<_> = (0..7).map(|x| GridCoord::new(x, 0)).collect();
        machine.move_entity(&MoveContext::new("scout", path)).unwrap();
        assert_eq!(machine.fog().is_visible(&map, 8, 0), Some(true));
        assert_eq!(machine.fog().is_visible(&map, 0, 0), Some(false));
        assert_eq!(machine.fog().is_revealed(&map, 0, 0), Some(true));
    }

    #[test]
    fn test_fog_kept_between_encounters_unless_configured() {
        let mut config = CombatConfig::default();
        config.default_vision_radius = 1.0;
        let mut machine = CombatStateMachine::new("f", BattleGrid::new(10, 10, 5.0), config.clone()).unwrap();
        machine.start_combat(vec![token_at("a", 0, 0)]).unwrap();
        machine.end_combat().unwrap();
        machine.start_combat(vec![token_at("b", 9, 9)]).unwrap();
        let map = machine.map_id().clone();
        assert_eq!(machine.fog().is_revealed(&map, 0, 0), Some(true));

        config.reset_fog_on_start = true;
        let mut machine = CombatStateMachine::new("f", BattleGrid::new(10, 10, 5.0), config).unwrap();
        machine.start_combat(vec![token_at("a", 0, 0)]).unwrap();
        machine.end_combat().unwrap();
        machine.start_combat(vec![token_at("b", 9, 9)]).unwrap();
        assert_eq!(machine.fog().is_revealed(&map, 0, 0), Some(false));
    }

    #[test]
    fn test_highlight_tiles_uses_remaining_movement() {
        let mut machine = two_token_machine();
        let tiles = machine.highlight_tiles(&id("a")).unwrap();
        assert!(tiles.contains(&GridCoord::new(6, 6)));
        assert!(!tiles.contains(&GridCoord::new(7, 0)));

        let path: Vec<_> = (0..5).map(|z| GridCoord::new(0, z)).collect();
        machine.move_entity(&MoveContext::new("a", path)).unwrap();
        let tiles = machine.highlight_tiles(&id("a")).unwrap();
        assert!(tiles.contains(&GridCoord::new(0, 6)));
        assert!(!tiles.contains(&GridCoord::new(0, 7)));
    }

    #[test]
    fn test_listeners_see_lifecycle() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut machine = CombatStateMachine::new("ev", BattleGrid::new(5, 5, 5.0), CombatConfig::default())
            .unwrap()
            .with_random_source(SequenceSource::faces(20, &[18, 4]));
        let listener = machine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        machine
            .start_combat(vec![token_at("a", 0, 0), token_at("b", 1, 0)])
            .unwrap();
        machine.end_turn(&id("a")).unwrap();
        assert!(machine.unsubscribe(listener));
        machine.end_turn(&id("b")).unwrap();

        let seen = seen.lock().unwrap();
        assert!(matches!(seen[0], CombatEvent::CombatStarted { round: 1, .. }));
        assert!(seen.contains(&CombatEvent::TurnEnded { token_id: id("a") }));
        assert!(seen.contains(&CombatEvent::TurnStarted {
            token_id: id("b"),
            round: 1
        }));
        assert!(!seen.contains(&CombatEvent::RoundStarted { round: 2 }));
    }

    #[test]
    fn test_snapshot_round_trip_through_json() {
        let mut machine = two_token_machine();
        let path = vec![GridCoord::new(0, 0), GridCoord::new(0, 1)];
        machine.move_entity(&MoveContext::new("a", path)).unwrap();
        machine.end_turn(&id("a")).unwrap();

        let json = machine.to_json().unwrap();
        let restored =
            CombatStateMachine::from_json(&json, BattleGrid::new(10, 10, 5.0), CombatConfig::default()).unwrap();
        assert_eq!(restored.snapshot(), machine.snapshot());
        assert_eq!(restored.current_turn().unwrap().token_id, id("b"));
    }

    #[test]
    fn test_restore_rejects_inconsistent_snapshot() {
        let mut machine = two_token_machine();
        let mut snapshot = machine.snapshot();
        snapshot.current_index = 5;
        assert!(matches!(
            machine.restore(snapshot),
            Err(VttError::InvalidSnapshot(_))
        ));
        assert_eq!(machine.current_index(), 0);
    }

    fn corrupt_json(machine: &CombatStateMachine, edit: impl FnOnce(&mut serde_json::Value)) -> String {
        let mut value: serde_json::Value = serde_json::from_str(&machine.to_json().unwrap()).unwrap();
        edit(&mut value);
        value.to_string()
    }

    fn restore_json(json: &str) -> Result<CombatStateMachine> {
        CombatStateMachine::from_json(json, BattleGrid::new(10, 10, 5.0), CombatConfig::default())
    }

    #[test]
    fn test_restore_rejects_truncated_fog_layers() {
        let machine = two_token_machine();
        let json = corrupt_json(&machine, |v| {
            v["fog"]["maps"]["s1"]["data"] = serde_json::json!([0, 0, 0]);
            v["fog"]["maps"]["s1"]["visible"] = serde_json::json!([0, 0, 0]);
        });
        assert!(matches!(restore_json(&json), Err(VttError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_restore_rejects_fog_sized_for_another_grid() {
        let machine = two_token_machine();
        let mut snapshot = machine.snapshot();
        snapshot.fog.set_map("s1", None, 4, 4).unwrap();
        let err = CombatStateMachine::from_snapshot(snapshot, BattleGrid::new(10, 10, 5.0), CombatConfig::default())
            .unwrap_err();
        assert!(matches!(err, VttError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_restore_rejects_duplicate_entities() {
        let mut machine = two_token_machine();
        let mut snapshot = machine.snapshot();
        let copy = snapshot.entities[0].clone();
        snapshot.entities.push(copy);
        assert!(matches!(
            machine.restore(snapshot),
            Err(VttError::InvalidSnapshot(_))
        ));
        assert_eq!(machine.entities().len(), 2);
    }

    #[test]
    fn test_restored_zero_capacity_log_still_records() {
        let machine = two_token_machine();
        let json = corrupt_json(&machine, |v| v["log"]["capacity"] = serde_json::json!(0));
        let mut restored = restore_json(&json)
            .unwrap()
            .with_random_source(SequenceSource::faces(20, &[1]));

        let path = vec![GridCoord::new(0, 0), GridCoord::new(0, 1)];
        restored.move_entity(&MoveContext::new("a", path)).unwrap();
        assert_eq!(restored.log().len(), 1);
        assert_eq!(restored.log().last().unwrap().action, LogAction::Move);
    }

    #[test]
    fn test_start_rejects_defeated_token() {
        let mut machine =
            CombatStateMachine::new("s", BattleGrid::new(5, 5, 5.0), CombatConfig::default()).unwrap();
        let err = machine
            .start_combat(vec![token_at("a", 0, 0), token_at("b", 1, 1).with_hp(0)])
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Defeated(id("b"))));
        assert_eq!(machine.phase(), CombatPhase::Idle);
        assert!(machine.turn_order().is_empty());
    }

    #[test]
    fn test_new_rejects_tile_size_mismatch() {
        let err = CombatStateMachine::new("s", BattleGrid::new(5, 5, 1.0), CombatConfig::default()).unwrap_err();
        assert!(matches!(err, VttError::Config(_)));
    }

    #[test]
    fn test_huge_vision_radius_reveals_whole_map() {
        let mut machine =
            CombatStateMachine::new("eye", BattleGrid::new(10, 10, 5.0), CombatConfig::default()).unwrap();
        machine
            .start_combat(vec![token_at("a", 5, 5).with_vision_radius(3.0e9)])
            .unwrap();
        let map = machine.map_id().clone();
        assert_eq!(machine.fog().map(&map).unwrap().revealed_count(), 100);
    }
}
