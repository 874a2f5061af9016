//! Data model for tracked model listings
//!
//! `ModelEntry` is what adapters produce on every fetch; `TrackedModel` is
//! what the registry persists per identifier. The persisted document
//! (`WatcherState`) holds one registry slice and one removal waitlist per
//! source, plus the global subscriber set.
//!
//! All maps and sets are ordered (`BTreeMap`/`BTreeSet`) so the persisted
//! JSON is deterministic across runs.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability metadata carried by sources that report it.
///
/// Each side is independently absent (`None`), empty, or populated. A source
/// that stops reporting a side is a different state from a source reporting
/// an empty set, and the distinction survives persistence and diffing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepted input modalities (e.g. "text", "image")
    #[serde(default)]
    pub input: Option<BTreeSet<String>>,
    /// Produced output modalities
    #[serde(default)]
    pub output: Option<BTreeSet<String>>,
}

impl Capabilities {
    /// Capabilities with both sides reported
    pub fn new(
        input: impl IntoIterator<Item = String>,
        output: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            input: Some(input.into_iter().collect()),
            output: Some(output.into_iter().collect()),
        }
    }
}

/// A single normalized listing entry, produced fresh on every fetch.
///
/// Immutable once returned by an adapter; adapters never supply tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Opaque source-unique identifier
    pub identifier: String,
    /// Display name shown to subscribers
    pub name: String,
    /// Capability metadata, for sources that carry it
    pub capabilities: Option<Capabilities>,
}

impl ModelEntry {
    /// Entry without capability metadata
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            capabilities: None,
        }
    }

    /// Entry with capability metadata
    pub fn with_capabilities(
        identifier: impl Into<String>,
        name: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            capabilities: Some(capabilities),
        }
    }
}

/// Registry record for one tracked identifier.
///
/// Name and capabilities are overwritten by each reconciliation cycle; the
/// tag is mutated only by the administrative command and carried forward
/// across fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedModel {
    /// Last-known display name
    pub name: String,
    /// Last-known input capabilities
    #[serde(default)]
    pub input_capabilities: Option<BTreeSet<String>>,
    /// Last-known output capabilities
    #[serde(default)]
    pub output_capabilities: Option<BTreeSet<String>>,
    /// User-assigned annotation, never supplied by adapters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl TrackedModel {
    /// Record with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_capabilities: None,
            output_capabilities: None,
            tag: None,
        }
    }

    /// Build a record from a fresh entry, carrying the given tag forward
    pub fn from_entry(entry: &ModelEntry, tag: Option<String>) -> Self {
        let (input, output) = match &entry.capabilities {
            Some(caps) => (caps.input.clone(), caps.output.clone()),
            None => (None, None),
        };
        Self {
            name: entry.name.clone(),
            input_capabilities: input,
            output_capabilities: output,
            tag,
        }
    }
}

/// Registry slice and removal waitlist for one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    /// Last-known entry set, keyed by identifier
    #[serde(default)]
    pub models: BTreeMap<String, TrackedModel>,
    /// Identifiers pending removal confirmation, with the timestamp they
    /// were first found missing
    #[serde(default)]
    pub waitlist: BTreeMap<String, DateTime<Utc>>,
}

impl SourceState {
    /// True when neither registry nor waitlist holds anything
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.waitlist.is_empty()
    }
}

/// Opaque subscriber identity (Telegram chat id in the shipped sink)
pub type SubscriberId = i64;

/// The full persisted state document.
///
/// Unknown or missing fields default to empty on load so older documents
/// keep loading as the format grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherState {
    /// Per-source registry slices, keyed by source id
    pub sources: BTreeMap<String, SourceState>,
    /// Chats subscribed to change reports
    pub subscribers: BTreeSet<SubscriberId>,
}

impl WatcherState {
    /// Empty valid state
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry slice for a source, creating an empty one on first use
    pub fn source_mut(&mut self, source_id: &str) -> &mut SourceState {
        self.sources.entry(source_id.to_string()).or_default()
    }

    /// Registry slice for a source, if any cycle has run for it
    pub fn source(&self, source_id: &str) -> Option<&SourceState> {
        self.sources.get(source_id)
    }
}
