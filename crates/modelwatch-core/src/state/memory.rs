// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// A state store that doesn't persist across restarts, for testing and for
// embedding the engine where persistence isn't needed. A restart treats the
// entire catalog as new and forgets all subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::model::WatcherState;
use crate::traits::StateStore;

/// In-memory state store implementation
///
/// Stores the document behind an RwLock; clones share the same document.
///
/// # Example
///
/// ```rust,no_run
/// use modelwatch_core::state::MemoryStateStore;
/// use modelwatch_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let mut state = store.load().await?;
///     state.subscribers.insert(42);
///     store.save(&state).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<WatcherState>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a state document
    pub fn with_state(state: WatcherState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Snapshot of the current document, bypassing the trait
    pub async fn snapshot(&self) -> WatcherState {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<WatcherState, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, state: &WatcherState) -> Result<(), Error> {
        *self.inner.write().await = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStateStore::new();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, WatcherState::new());

        let mut state = WatcherState::new();
        state.subscribers.insert(42);
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_clones_share_the_document() {
        let store = MemoryStateStore::new();
        let alias = store.clone();

        let mut state = WatcherState::new();
        state.subscribers.insert(7);
        store.save(&state).await.unwrap();

        assert!(alias.load().await.unwrap().subscribers.contains(&7));
    }
}
