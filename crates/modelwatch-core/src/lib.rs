// # modelwatch-core
//
// Core library for the model-listing watcher.
//
// ## Architecture Overview
//
// This library provides the change-detection and state-reconciliation
// engine for watching external model catalogs:
// - **ModelSource**: Trait for fetching one provider's listing
// - **Notifier**: Trait for delivering structured change reports
// - **StateStore**: Trait for persisting the registry document
// - **WatcherEngine**: Orchestrates fetch → normalize → debounce → diff →
//   persist → notify, one schedule per source
// - **SourceRegistry**: Plugin-based registry for adapters and sinks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Adapters fetch, the engine decides, sinks
//    deliver; persistence is a dumb atomic document swap
// 2. **Explicit time**: The removal debouncer takes injected timestamps so
//    tests never depend on wall-clock scheduling
// 3. **Single mutation domain**: One mutex over the whole persisted state;
//    fetches run concurrently, mutation serializes
// 4. **Library-First**: The daemon is a thin wiring layer over this crate

pub mod config;
pub mod debounce;
pub mod diff;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, NotifierConfig, SourceConfig, SourceKind, WatcherConfig};
pub use diff::{ChangeReport, SnapshotDiff};
pub use engine::{EngineEvent, EngineSource, TagUpdate, WatcherEngine};
pub use error::{Error, Result};
pub use model::{Capabilities, ModelEntry, SourceState, SubscriberId, TrackedModel, WatcherState};
pub use registry::SourceRegistry;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{ModelSource, Notifier, StateStore};
