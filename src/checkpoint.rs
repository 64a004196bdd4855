//! Persisted state (spec §6): "session records (opaque to the core) and checkpoint frames
//! consisting of the entire Task State at node boundaries, keyed by (task_id, iteration,
//! node_name). The core makes no commitment to backend (SQL, KV, JSONL) beyond a narrow
//! save/load interface."
//!
//! `CheckpointStore` is that narrow interface; `InMemoryCheckpointStore` is a reference
//! implementation for tests and default wiring, the same way the teacher ships a concrete
//! `.jsonl`-backed `ThoughtChain` even though nothing in its public API requires a specific
//! durable-memory backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::task_state::TaskState;

/// A single saved frame: the full `TaskState` as of one node boundary.
#[derive(Debug, Clone)]
pub struct CheckpointKey {
    pub task_id: Uuid,
    pub iteration: u32,
    pub node_name: String,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, iteration: u32, node_name: &str, state: &TaskState);

    /// The most recently saved state for `task_id`, if any frame exists.
    async fn load(&self, task_id: Uuid) -> Option<TaskState>;

    /// All frames saved for `task_id`, oldest first, for callers that need the full
    /// history rather than just the latest snapshot.
    async fn load_history(&self, task_id: Uuid) -> Vec<TaskState>;
}

/// `RwLock<HashMap<...>>`-backed reference `CheckpointStore`. Frames accumulate per task
/// for the lifetime of the store; nothing evicts them, which is fine for tests and a
/// single-process default but not a production retention policy.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    frames: RwLock<HashMap<Uuid, Vec<TaskState>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, _iteration: u32, _node_name: &str, state: &TaskState) {
        let mut frames = self.frames.write().await;
        frames.entry(state.task_id).or_default().push(state.clone());
    }

    async fn load(&self, task_id: Uuid) -> Option<TaskState> {
        let frames = self.frames.read().await;
        frames.get(&task_id).and_then(|v| v.last().cloned())
    }

    async fn load_history(&self, task_id: Uuid) -> Vec<TaskState> {
        let frames = self.frames.read().await;
        frames.get(&task_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent_router::Domain;
    use std::path::PathBuf;

    #[tokio::test]
    async fn load_returns_most_recent_frame() {
        let store = InMemoryCheckpointStore::new();
        let mut state = TaskState::new("t", Domain::General, PathBuf::from("."), 10, 60);
        store.save(0, "plan", &state).await;
        state.iteration = 1;
        store.save(1, "execute", &state).await;

        let loaded = store.load(state.task_id).await.unwrap();
        assert_eq!(loaded.iteration, 1);
        assert_eq!(store.load_history(state.task_id).await.len(), 2);
    }

    #[tokio::test]
    async fn load_on_unknown_task_is_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load(Uuid::new_v4()).await.is_none());
    }
}
