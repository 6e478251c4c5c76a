//! Combat events and the observer list that fans them out
//!
//! Listeners are called synchronously, in subscription order, after the state
//! change they describe has been applied.

use serde::{Deserialize, Serialize};

use crate::core::types::{GridCoord, TokenId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    CombatStarted { round: u32, order: Vec<TokenId> },
    RoundStarted { round: u32 },
    TurnStarted { token_id: TokenId, round: u32 },
    TurnEnded { token_id: TokenId },
    EntityMoved { token_id: TokenId, from: GridCoord, to: GridCoord, steps: u32 },
    AttackResolved {
        attacker: TokenId,
        target: TokenId,
        hit: bool,
        attack_total: i64,
        damage: u32,
    },
    EntityDefeated { token_id: TokenId },
    EntityRemoved { token_id: TokenId },
    FogUpdated { newly_revealed: usize },
    CombatEnded { round: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

type Listener = Box<dyn FnMut(&CombatEvent) + Send>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&CombatEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &CombatEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
