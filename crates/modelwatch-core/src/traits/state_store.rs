// # State Store Trait
//
// Defines the interface for persisting the watcher state document.
//
// ## Purpose
//
// The store holds one document per deployment: the registry slice and
// removal waitlist for every source, plus the global subscriber set. It
// exists so that a restart neither forgets subscribers nor re-announces the
// entire catalog as "new".
//
// ## Implementations
//
// - File-based with crash recovery: `FileStateStore`
// - In-memory (tests, embedding): `MemoryStateStore`
//
// ## Contract
//
// `load` must always return a usable state: no prior document and an
// unreadable/corrupt document both yield an empty state (corruption is
// logged, never fatal). `save` must replace the previous document in one
// indivisible step so a crash mid-write cannot leave a torn document.
//
// The store assumes single-writer discipline: the engine serializes every
// mutation and save through its own exclusive section, so implementations
// only need to protect their internal structures.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::WatcherState;

/// Trait for state store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted state document
    ///
    /// # Returns
    ///
    /// - `Ok(WatcherState)`: the persisted state, or an empty state when no
    ///   valid document exists
    /// - `Err(Error)`: an I/O failure that is not document corruption
    async fn load(&self) -> Result<WatcherState>;

    /// Atomically replace the persisted state document
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the document is durably replaced
    /// - `Err(Error)`: the document could not be written; the caller must
    ///   surface this (silent data loss is not masked)
    async fn save(&self, state: &WatcherState) -> Result<()>;
}
