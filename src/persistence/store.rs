//! Async encounter stores

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use tokio::sync::RwLock;

use crate::battle::state::CombatSnapshot;
use crate::core::error::Result;

/// Storage backend for encounter snapshots, keyed by session id
#[allow(async_fn_in_trait)]
pub trait CombatStore {
    /// `None` when nothing has been saved for the session
    async fn load(&self, session_id: &str) -> Result<Option<CombatSnapshot>>;

    async fn save(&self, session_id: &str, snapshot: &CombatSnapshot) -> Result<()>;
}

/// In-process store; clones share the same sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<AHashMap<String, CombatSnapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn remove(&self, session_id: &str) -> Option<CombatSnapshot> {
        self.sessions.write().await.remove(session_id)
    }
}

impl CombatStore for MemoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<CombatSnapshot>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, snapshot: &CombatSnapshot) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), snapshot.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File for a session; characters outside `[A-Za-z0-9_-]` become `_`
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        let name: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.json", name))
    }
}

impl CombatStore for JsonFileStore {
    async fn load(&self, session_id: &str) -> Result<Option<CombatSnapshot>> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_str(&content)?;
        tracing::debug!("Loaded session {} from {}", session_id, path.display());
        Ok(Some(snapshot))
    }

    async fn save(&self, session_id: &str, snapshot: &CombatSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(session_id);
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!("Saved session {} to {}", session_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_sanitizes() {
        let store = JsonFileStore::new("/tmp/sessions");
        assert_eq!(
            store.path_for("room/42 night"),
            PathBuf::from("/tmp/sessions/room_42_night.json")
        );
        assert_eq!(
            store.path_for("abc-DEF_1"),
            PathBuf::from("/tmp/sessions/abc-DEF_1.json")
        );
    }

    #[tokio::test]
    async fn test_memory_store_missing_session() {
        let store = MemoryStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_json_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        assert!(store.load("nope").await.unwrap().is_none());
    }
}
