//! Report rendering
//!
//! Turns one structured change report into the message subscribers see.
//! Rendering lives here, in the sink, so the core never produces
//! user-facing text.

use std::collections::BTreeSet;

use modelwatch_core::diff::ChangeReport;
use modelwatch_core::model::TrackedModel;

/// Render one change report as a plain-text Telegram message.
///
/// Returns an empty string for an empty diff; the notifier skips delivery
/// in that case rather than sending a blank message.
pub fn render_report(report: &ChangeReport) -> String {
    let diff = &report.diff;
    let mut sections = Vec::new();

    if !diff.added.is_empty() {
        let lines: Vec<String> = diff
            .added
            .values()
            .map(|record| format!("• {}{}", record.name, capability_suffix(record)))
            .collect();
        sections.push(format!(
            "🆕 New models on {}:\n{}",
            report.source,
            lines.join("\n")
        ));
    }

    if !diff.removed.is_empty() {
        let lines: Vec<String> = diff
            .removed
            .values()
            .map(|record| match &record.tag {
                Some(tag) => format!("• {} [{}]", record.name, tag),
                None => format!("• {}", record.name),
            })
            .collect();
        sections.push(format!(
            "❌ Removed from {}:\n{}",
            report.source,
            lines.join("\n")
        ));
    }

    if !diff.renamed.is_empty() {
        let lines: Vec<String> = diff
            .renamed
            .iter()
            .map(|rename| format!("• {} → {}", rename.previous_name, rename.new_name))
            .collect();
        sections.push(format!(
            "✏️ Renamed on {}:\n{}",
            report.source,
            lines.join("\n")
        ));
    }

    if !diff.capability_changed.is_empty() {
        let lines: Vec<String> = diff
            .capability_changed
            .iter()
            .map(|change| {
                let mut parts = Vec::new();
                if let Some(part) = side_summary("input", &change.input) {
                    parts.push(part);
                }
                if let Some(part) = side_summary("output", &change.output) {
                    parts.push(part);
                }
                format!("• {}: {}", change.name, parts.join("; "))
            })
            .collect();
        sections.push(format!(
            "🔄 Capability changes on {}:\n{}",
            report.source,
            lines.join("\n")
        ));
    }

    if !diff.tag_changed.is_empty() {
        let lines: Vec<String> = diff
            .tag_changed
            .iter()
            .map(|change| match (&change.previous_tag, &change.new_tag) {
                (Some(old), Some(new)) => format!("• {}: {} → {}", change.name, old, new),
                (None, Some(new)) => format!("• {}: tagged {}", change.name, new),
                (Some(old), None) => format!("• {}: tag {} cleared", change.name, old),
                (None, None) => format!("• {}", change.name),
            })
            .collect();
        sections.push(format!(
            "🏷 Tag changes on {}:\n{}",
            report.source,
            lines.join("\n")
        ));
    }

    sections.join("\n\n")
}

/// " (input: text, image; output: text)" suffix for a record that carries
/// capability metadata; empty when neither side is reported
fn capability_suffix(record: &TrackedModel) -> String {
    if record.input_capabilities.is_none() && record.output_capabilities.is_none() {
        return String::new();
    }
    format!(
        " (input: {}; output: {})",
        summarize(record.input_capabilities.as_ref()),
        summarize(record.output_capabilities.as_ref())
    )
}

/// "text, image" for a populated set, "none" for empty, "n/a" for absent
fn summarize(side: Option<&BTreeSet<String>>) -> String {
    match side {
        None => "n/a".to_string(),
        Some(set) if set.is_empty() => "none".to_string(),
        Some(set) => set.iter().cloned().collect::<Vec<_>>().join(", "),
    }
}

/// One side's delta, e.g. "input +image", "output no longer reported"
fn side_summary(
    label: &str,
    change: &modelwatch_core::diff::CapabilitySideChange,
) -> Option<String> {
    if !change.changed() {
        return None;
    }
    if change.current.is_none() {
        return Some(format!("{} no longer reported", label));
    }
    let mut deltas = Vec::new();
    if !change.added.is_empty() {
        deltas.push(format!(
            "+{}",
            change.added.iter().cloned().collect::<Vec<_>>().join(", +")
        ));
    }
    if !change.removed.is_empty() {
        deltas.push(format!(
            "-{}",
            change
                .removed
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", -")
        ));
    }
    Some(format!("{} {}", label, deltas.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelwatch_core::diff::{CapabilityChange, CapabilitySideChange, Rename, SnapshotDiff};
    use modelwatch_core::model::TrackedModel;
    use std::collections::BTreeMap;

    fn report(diff: SnapshotDiff) -> ChangeReport {
        ChangeReport {
            source: "arena".to_string(),
            diff,
        }
    }

    #[test]
    fn empty_diff_renders_nothing() {
        assert_eq!(render_report(&report(SnapshotDiff::default())), "");
    }

    #[test]
    fn added_models_show_capability_summaries() {
        let mut with_caps = TrackedModel::new("Model A");
        with_caps.input_capabilities =
            Some(["text".to_string(), "image".to_string()].into());
        with_caps.output_capabilities = Some(BTreeSet::new());

        let mut diff = SnapshotDiff::default();
        diff.added = BTreeMap::from([
            ("a".to_string(), with_caps),
            ("b".to_string(), TrackedModel::new("Model B")),
        ]);

        let text = render_report(&report(diff));
        assert!(text.contains("🆕 New models on arena:"));
        assert!(text.contains("• Model A (input: image, text; output: none)"));
        assert!(text.contains("• Model B\n") || text.ends_with("• Model B"));
    }

    #[test]
    fn removed_models_show_name_and_tag() {
        let mut tagged = TrackedModel::new("Model B");
        tagged.tag = Some("beta".to_string());

        let mut diff = SnapshotDiff::default();
        diff.removed = BTreeMap::from([("b".to_string(), tagged)]);

        let text = render_report(&report(diff));
        assert!(text.contains("❌ Removed from arena:"));
        assert!(text.contains("• Model B [beta]"));
    }

    #[test]
    fn renames_show_the_transition() {
        let mut diff = SnapshotDiff::default();
        diff.renamed = vec![Rename {
            identifier: "a".to_string(),
            previous_name: "old".to_string(),
            new_name: "new".to_string(),
        }];

        let text = render_report(&report(diff));
        assert!(text.contains("✏️ Renamed on arena:"));
        assert!(text.contains("• old → new"));
    }

    #[test]
    fn capability_deltas_show_gains_losses_and_withdrawal() {
        let mut diff = SnapshotDiff::default();
        diff.capability_changed = vec![CapabilityChange {
            identifier: "a".to_string(),
            name: "Model A".to_string(),
            input: CapabilitySideChange {
                added: ["image".to_string()].into(),
                removed: BTreeSet::new(),
                previous: Some(["text".to_string()].into()),
                current: Some(["text".to_string(), "image".to_string()].into()),
            },
            output: CapabilitySideChange {
                added: BTreeSet::new(),
                removed: ["text".to_string()].into(),
                previous: Some(["text".to_string()].into()),
                current: None,
            },
        }];

        let text = render_report(&report(diff));
        assert!(text.contains("🔄 Capability changes on arena:"));
        assert!(text.contains("input +image"));
        assert!(text.contains("output no longer reported"));
    }

    #[test]
    fn multiple_sections_are_separated() {
        let mut diff = SnapshotDiff::default();
        diff.added = BTreeMap::from([("a".to_string(), TrackedModel::new("Model A"))]);
        diff.removed = BTreeMap::from([("b".to_string(), TrackedModel::new("Model B"))]);

        let text = render_report(&report(diff));
        let sections: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(sections.len(), 2);
    }
}
