//! Removal debouncing
//!
//! Absorbs a suspiciously empty or partial fetch (rate limiting, transient
//! scrape failure) without mass-reporting removals. Per (source, identifier)
//! state machine:
//!
//! - **Live**: present in the latest raw snapshot; any waitlist entry clears
//!   the instant the identifier reappears.
//! - **Waiting**: absent from the raw snapshot but present in the previous
//!   effective snapshot; waitlisted with the timestamp it was first found
//!   missing and kept visible in the effective snapshot.
//! - **Expired**: absent for at least the grace period; dropped from both
//!   waitlist and effective snapshot. This is the only point a removal is
//!   reported.
//!
//! Deferral is strictly per identifier: a cycle with zero additions and many
//! removals starts one independent grace window per missing identifier, the
//! same as any other cycle.
//!
//! Time is injected by the caller so tests drive the machine with synthetic
//! timestamps instead of wall-clock scheduling.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::TrackedModel;

/// Result of one debounce pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceOutcome {
    /// The consumer-visible snapshot: raw entries plus waiting carry-overs
    pub effective: BTreeMap<String, TrackedModel>,
    /// Identifiers new to the effective snapshot
    pub added: BTreeSet<String>,
    /// Identifiers whose absence was confirmed this pass
    pub removed: BTreeSet<String>,
    /// True when the waitlist was mutated and must be persisted
    pub waitlist_changed: bool,
}

/// Apply one raw snapshot to the waitlist state machine.
///
/// `previous` is the prior effective snapshot (the registry slice), `raw` the
/// normalized fetch result. The waitlist is mutated in place. A grace period
/// of zero or less disables debouncing entirely: the effective snapshot
/// equals the raw one and any stale waitlist is cleared.
///
/// `added` and `removed` are computed against the effective snapshot, not
/// the raw one, so an identifier that blinks out and back within the grace
/// period produces no events at all.
pub fn debounce(
    previous: &BTreeMap<String, TrackedModel>,
    raw: &BTreeMap<String, TrackedModel>,
    waitlist: &mut BTreeMap<String, DateTime<Utc>>,
    grace_period: TimeDelta,
    now: DateTime<Utc>,
) -> DebounceOutcome {
    if grace_period <= TimeDelta::zero() {
        let waitlist_changed = !waitlist.is_empty();
        waitlist.clear();
        let added = raw
            .keys()
            .filter(|id| !previous.contains_key(*id))
            .cloned()
            .collect();
        let removed = previous
            .keys()
            .filter(|id| !raw.contains_key(*id))
            .cloned()
            .collect();
        return DebounceOutcome {
            effective: raw.clone(),
            added,
            removed,
            waitlist_changed,
        };
    }

    let mut waitlist_changed = false;
    let mut effective = raw.clone();
    let mut removed = BTreeSet::new();

    // Reappeared identifiers leave the waitlist immediately.
    let reappeared: Vec<String> = waitlist
        .keys()
        .filter(|id| raw.contains_key(*id))
        .cloned()
        .collect();
    for id in reappeared {
        waitlist.remove(&id);
        waitlist_changed = true;
    }

    // Identifiers missing from the raw snapshot enter or continue their
    // grace window; expired ones become confirmed removals.
    for (id, record) in previous {
        if raw.contains_key(id) {
            continue;
        }
        match waitlist.get(id) {
            Some(first_missing) if now - *first_missing >= grace_period => {
                waitlist.remove(id);
                waitlist_changed = true;
                removed.insert(id.clone());
            }
            Some(_) => {
                effective.insert(id.clone(), record.clone());
            }
            None => {
                waitlist.insert(id.clone(), now);
                waitlist_changed = true;
                effective.insert(id.clone(), record.clone());
            }
        }
    }

    // Waitlist entries for identifiers no longer tracked at all are stale.
    let stale: Vec<String> = waitlist
        .keys()
        .filter(|id| !previous.contains_key(*id) && !raw.contains_key(*id))
        .cloned()
        .collect();
    for id in stale {
        waitlist.remove(&id);
        waitlist_changed = true;
    }

    let added = effective
        .keys()
        .filter(|id| !previous.contains_key(*id))
        .cloned()
        .collect();

    DebounceOutcome {
        effective,
        added,
        removed,
        waitlist_changed,
    }
}
