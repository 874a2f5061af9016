//! Snapshot diffing
//!
//! Computes the structured delta between two reconciled (effective)
//! snapshots of the same source. Pure value-object output; rendering is the
//! notifier's job.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::TrackedModel;

/// A rename observed between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Identifier present in both snapshots
    pub identifier: String,
    /// Name in the previous snapshot
    pub previous_name: String,
    /// Name in the new snapshot
    pub new_name: String,
}

/// One side (input or output) of a capability change.
///
/// `previous`/`current` preserve the raw option states: `None` means the
/// source did not report this side at all, which is distinct from reporting
/// an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySideChange {
    /// Elements gained
    pub added: BTreeSet<String>,
    /// Elements lost
    pub removed: BTreeSet<String>,
    /// The side as previously recorded
    pub previous: Option<BTreeSet<String>>,
    /// The side as now reported
    pub current: Option<BTreeSet<String>>,
}

impl CapabilitySideChange {
    fn compute(previous: &Option<BTreeSet<String>>, current: &Option<BTreeSet<String>>) -> Self {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        let before = previous.as_ref().unwrap_or(&EMPTY);
        let after = current.as_ref().unwrap_or(&EMPTY);
        Self {
            added: after.difference(before).cloned().collect(),
            removed: before.difference(after).cloned().collect(),
            previous: previous.clone(),
            current: current.clone(),
        }
    }

    /// True when this side gained or lost at least one element
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Capability delta for one identifier present in both snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityChange {
    /// Identifier present in both snapshots
    pub identifier: String,
    /// Current display name, for rendering
    pub name: String,
    /// Input-side delta
    pub input: CapabilitySideChange,
    /// Output-side delta
    pub output: CapabilitySideChange,
}

/// A tag transition observed between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    /// Identifier present in both snapshots
    pub identifier: String,
    /// Current display name, for rendering
    pub name: String,
    /// Tag in the previous snapshot
    pub previous_tag: Option<String>,
    /// Tag in the new snapshot
    pub new_tag: Option<String>,
}

/// Structured delta between two effective snapshots of one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Identifiers in new but not in previous, with their records
    pub added: BTreeMap<String, TrackedModel>,
    /// Identifiers in previous but not in new, paired with their
    /// last-known records for display
    pub removed: BTreeMap<String, TrackedModel>,
    /// Identifiers present in both whose name differs
    pub renamed: Vec<Rename>,
    /// Identifiers present in both with a capability delta
    pub capability_changed: Vec<CapabilityChange>,
    /// Identifiers present in both whose tag differs
    pub tag_changed: Vec<TagChange>,
}

impl SnapshotDiff {
    /// True when no change set carries anything
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && self.capability_changed.is_empty()
            && self.tag_changed.is_empty()
    }
}

/// One reconciliation cycle's report, fed to the notification sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    /// Source the cycle ran for
    pub source: String,
    /// The computed delta
    pub diff: SnapshotDiff,
}

/// Compute the delta between two effective snapshots.
///
/// Pure and idempotent: identical inputs yield identical results, and
/// `diff(s, s)` is empty.
pub fn diff(
    previous: &BTreeMap<String, TrackedModel>,
    new: &BTreeMap<String, TrackedModel>,
) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (id, record) in new {
        if !previous.contains_key(id) {
            result.added.insert(id.clone(), record.clone());
        }
    }

    for (id, record) in previous {
        let Some(current) = new.get(id) else {
            result.removed.insert(id.clone(), record.clone());
            continue;
        };

        if current.name != record.name {
            result.renamed.push(Rename {
                identifier: id.clone(),
                previous_name: record.name.clone(),
                new_name: current.name.clone(),
            });
        }

        let input =
            CapabilitySideChange::compute(&record.input_capabilities, &current.input_capabilities);
        let output = CapabilitySideChange::compute(
            &record.output_capabilities,
            &current.output_capabilities,
        );
        if input.changed() || output.changed() {
            result.capability_changed.push(CapabilityChange {
                identifier: id.clone(),
                name: current.name.clone(),
                input,
                output,
            });
        }

        if current.tag != record.tag {
            result.tag_changed.push(TagChange {
                identifier: id.clone(),
                name: current.name.clone(),
                previous_tag: record.tag.clone(),
                new_tag: current.tag.clone(),
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(input: &[&str]) -> Option<BTreeSet<String>> {
        Some(input.iter().map(|s| s.to_string()).collect())
    }

    fn model(name: &str) -> TrackedModel {
        TrackedModel::new(name)
    }

    fn snapshot(pairs: &[(&str, TrackedModel)]) -> BTreeMap<String, TrackedModel> {
        pairs
            .iter()
            .map(|(id, m)| (id.to_string(), m.clone()))
            .collect()
    }

    #[test]
    fn identical_snapshots_diff_to_empty() {
        let s = snapshot(&[("a", model("A")), ("b", model("B"))]);
        let d = diff(&s, &s);
        assert!(d.is_empty());
    }

    #[test]
    fn diff_is_deterministic() {
        let previous = snapshot(&[("a", model("A"))]);
        let new = snapshot(&[("a", model("A2")), ("b", model("B"))]);
        assert_eq!(diff(&previous, &new), diff(&previous, &new));
    }

    #[test]
    fn added_and_removed_carry_records() {
        let previous = snapshot(&[("a", model("A"))]);
        let new = snapshot(&[("b", model("B"))]);

        let d = diff(&previous, &new);
        assert_eq!(d.added.get("b").map(|m| m.name.as_str()), Some("B"));
        assert_eq!(d.removed.get("a").map(|m| m.name.as_str()), Some("A"));
        assert!(d.renamed.is_empty());
    }

    #[test]
    fn rename_is_detected() {
        let previous = snapshot(&[("a", model("old"))]);
        let new = snapshot(&[("a", model("new"))]);

        let d = diff(&previous, &new);
        assert_eq!(
            d.renamed,
            vec![Rename {
                identifier: "a".to_string(),
                previous_name: "old".to_string(),
                new_name: "new".to_string(),
            }]
        );
        assert!(d.added.is_empty() && d.removed.is_empty());
    }

    #[test]
    fn capability_gain_is_reported_without_add_or_remove() {
        let mut before = model("A");
        before.input_capabilities = caps(&["text"]);
        let mut after = model("A");
        after.input_capabilities = caps(&["text", "image"]);

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));

        assert!(d.added.is_empty() && d.removed.is_empty());
        assert_eq!(d.capability_changed.len(), 1);
        let change = &d.capability_changed[0];
        assert_eq!(change.input.added, BTreeSet::from(["image".to_string()]));
        assert!(change.input.removed.is_empty());
        assert!(!change.output.changed());
    }

    #[test]
    fn losing_all_capabilities_preserves_the_none_state() {
        let mut before = model("A");
        before.input_capabilities = caps(&["text", "image"]);
        let after = model("A");

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));

        let change = &d.capability_changed[0];
        assert_eq!(
            change.input.removed,
            BTreeSet::from(["text".to_string(), "image".to_string()])
        );
        assert_eq!(change.input.previous, caps(&["text", "image"]));
        assert_eq!(change.input.current, None);
    }

    #[test]
    fn none_to_empty_set_is_not_an_element_change() {
        let before = model("A");
        let mut after = model("A");
        after.input_capabilities = Some(BTreeSet::new());

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));
        assert!(d.capability_changed.is_empty());
    }

    #[test]
    fn empty_set_and_none_stay_distinguishable_in_reports() {
        let mut before = model("A");
        before.input_capabilities = Some(BTreeSet::new());
        let mut after = model("A");
        after.input_capabilities = caps(&["text"]);

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));
        let change = &d.capability_changed[0];
        assert_eq!(change.input.previous, Some(BTreeSet::new()));
        assert_eq!(change.input.current, caps(&["text"]));
    }

    #[test]
    fn tag_transition_is_reported() {
        let mut before = model("A");
        before.tag = Some("beta".to_string());
        let after = model("A");

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));
        assert_eq!(
            d.tag_changed,
            vec![TagChange {
                identifier: "a".to_string(),
                name: "A".to_string(),
                previous_tag: Some("beta".to_string()),
                new_tag: None,
            }]
        );
    }

    #[test]
    fn independent_sides_are_diffed_independently() {
        let mut before = model("A");
        before.input_capabilities = caps(&["text"]);
        before.output_capabilities = caps(&["text"]);
        let mut after = model("A");
        after.input_capabilities = caps(&["text"]);
        after.output_capabilities = caps(&["text", "audio"]);

        let d = diff(&snapshot(&[("a", before)]), &snapshot(&[("a", after)]));
        let change = &d.capability_changed[0];
        assert!(!change.input.changed());
        assert_eq!(change.output.added, BTreeSet::from(["audio".to_string()]));
    }
}
