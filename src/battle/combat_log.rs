//! Bounded, structured combat log
//!
//! Every resolved action appends one entry, hits and misses alike. Rejected
//! actions never reach the log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::TokenId;

pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Move,
    Attack,
    Defeated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub id: Uuid,
    pub round: u32,
    pub actor: TokenId,
    pub action: LogAction,
    pub target: Option<TokenId>,
    pub damage: Option<u32>,
    pub description: String,
}

impl CombatLogEntry {
    pub fn new(actor: TokenId, action: LogAction, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            round: 0,
            actor,
            action,
            target: None,
            damage: None,
            description: description.into(),
        }
    }

    pub fn with_target(mut self, target: TokenId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_damage(mut self, damage: u32) -> Self {
        self.damage = Some(damage);
        self
    }
}

/// Log that drops its oldest entries beyond `capacity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredLog")]
pub struct CombatLog {
    capacity: usize,
    entries: VecDeque<CombatLogEntry>,
}

/// Wire form of a log; capacity and length are repaired on load
#[derive(Deserialize)]
struct StoredLog {
    capacity: usize,
    entries: VecDeque<CombatLogEntry>,
}

impl From<StoredLog> for CombatLog {
    fn from(stored: StoredLog) -> Self {
        let mut log = CombatLog::with_capacity(stored.capacity);
        for entry in stored.entries {
            log.push(entry);
        }
        log
    }
}

impl Default for CombatLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl CombatLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: CombatLogEntry) {
        let capacity = self.capacity.max(1);
        while self.entries.len() >= capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &CombatLogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&CombatLogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_vec(&self) -> Vec<CombatLogEntry> {
        self.entries.iter().cloned().collect()
    }
}
