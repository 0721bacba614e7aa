//! In-memory worker store owned by the registry server.

use crate::definition::{WorkerDefinition, WorkerRegistry};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single source of truth for registered workers.
///
/// Cloning shares the same map. Every mutation takes the write lock, so an
/// upsert, delete or clear is atomic with respect to concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct WorkerStore {
    inner: Arc<RwLock<WorkerRegistry>>,
}

impl WorkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> WorkerRegistry {
        self.inner.read().await.clone()
    }

    /// Insert or fully replace the entry for `name`.
    ///
    /// Returns true when an earlier definition was replaced.
    pub async fn upsert(&self, name: String, definition: WorkerDefinition) -> bool {
        self.inner.write().await.insert(name, definition).is_some()
    }

    /// Returns true when an entry existed.
    pub async fn remove(&self, name: &str) -> bool {
        self.inner.write().await.remove(name).is_some()
    }

    /// Returns the number of entries dropped.
    pub async fn clear(&self) -> usize {
        let mut guard = self.inner.write().await;
        let count = guard.len();
        guard.clear();
        count
    }

    /// Remove `name` only if it still maps to `expected`.
    pub async fn remove_if_unchanged(&self, name: &str, expected: &WorkerDefinition) -> bool {
        let mut guard = self.inner.write().await;
        if guard.get(name) == Some(expected) {
            guard.remove(name);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
