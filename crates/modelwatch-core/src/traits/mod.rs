//! Core trait definitions
//!
//! The seams of the system: sources produce entry lists, the state store
//! persists the registry document, and notifiers deliver structured reports.
//! Implementations live in their own crates; the engine only sees these
//! traits.

pub mod model_source;
pub mod notifier;
pub mod state_store;

pub use model_source::{ModelSource, ModelSourceFactory};
pub use notifier::{Notifier, NotifierFactory};
pub use state_store::StateStore;
