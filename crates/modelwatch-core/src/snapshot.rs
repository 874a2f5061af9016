//! Snapshot normalization
//!
//! Turns one raw fetch result into a keyed registry-shaped mapping, carrying
//! mutable annotations (the tag) forward from the previous registry slice.
//! The output reflects raw truth: identifiers absent from the fetch are
//! absent here, regardless of any pending grace period; debouncing is the
//! next stage's job.

use std::collections::BTreeMap;

use crate::model::{ModelEntry, TrackedModel};

/// Build the keyed "API snapshot" for one source.
///
/// Name and capabilities come from the fresh entries; the tag is carried
/// over unchanged from the previous record with the same identifier
/// (adapters never supply tags). Duplicate identifiers within one fetch:
/// last entry wins.
pub fn normalize(
    entries: &[ModelEntry],
    previous: &BTreeMap<String, TrackedModel>,
) -> BTreeMap<String, TrackedModel> {
    let mut snapshot = BTreeMap::new();
    for entry in entries {
        let tag = previous
            .get(&entry.identifier)
            .and_then(|record| record.tag.clone());
        snapshot.insert(entry.identifier.clone(), TrackedModel::from_entry(entry, tag));
    }
    snapshot
}
