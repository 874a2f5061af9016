//! Plugin-based source and notifier registry
//!
//! The registry allows source adapters and notification sinks to be
//! registered dynamically at runtime, avoiding hardcoded if-else chains in
//! the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modelwatch_core::registry::SourceRegistry;
//!
//! let registry = SourceRegistry::new();
//! modelwatch_source_arena::register(&registry);
//!
//! let source = registry.create_source(&source_config)?;
//! ```
//!
//! Implementations register themselves through a `register()` function in
//! their own crate, keyed by the config `type` name.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::{NotifierConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::traits::{ModelSource, ModelSourceFactory, Notifier, NotifierFactory};

/// Registry of source and notifier factories
///
/// ## Thread Safety
///
/// Uses interior mutability with RwLock, allowing concurrent reads and
/// exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    /// Registered source factories, keyed by kind name
    sources: RwLock<HashMap<String, Box<dyn ModelSourceFactory>>>,

    /// Registered notifier factories, keyed by kind name
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source factory under a kind name (e.g. "arena", "openai")
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn ModelSourceFactory>) {
        let name = name.into();
        let mut sources = self.sources.write().unwrap();
        sources.insert(name, factory);
    }

    /// Register a notifier factory under a kind name (e.g. "telegram")
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        let name = name.into();
        let mut notifiers = self.notifiers.write().unwrap();
        notifiers.insert(name, factory);
    }

    /// Create a source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ModelSource>)`: created source instance
    /// - `Err(Error)`: the kind is not registered or creation failed
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>> {
        let kind = config.kind.type_name();
        let sources = self.sources.read().unwrap();

        let factory = sources
            .get(kind)
            .ok_or_else(|| Error::config(format!("Unknown source kind: {}", kind)))?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let kind = config.type_name();
        let notifiers = self.notifiers.read().unwrap();

        let factory = notifiers
            .get(kind)
            .ok_or_else(|| Error::config(format!("Unknown notifier kind: {}", kind)))?;

        let config_json = serde_json::to_value(config)?;
        factory.create(&config_json)
    }

    /// List all registered source kinds
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap();
        sources.keys().cloned().collect()
    }

    /// Check if a source kind is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap();
        sources.contains_key(name)
    }

    /// Check if a notifier kind is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        let notifiers = self.notifiers.read().unwrap();
        notifiers.contains_key(name)
    }
}
