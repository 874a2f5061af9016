//! Engine Contract Test: Reconciliation Cycle
//!
//! Constraints verified:
//! - A cycle with no changes performs no persistence and no notification
//! - A failed or timed-out fetch aborts the cycle without mutating state
//! - An empty successful fetch is a legitimate zero-entry snapshot
//! - A waitlist-only mutation is persisted but never notified
//! - A confirmed removal is reported exactly once
//! - A failed save rolls the in-memory state back and surfaces the error

mod common;

use chrono::{DateTime, TimeDelta, Utc};
use common::*;
use modelwatch_core::config::EngineConfig;
use modelwatch_core::engine::{EngineSource, WatcherEngine};
use modelwatch_core::model::{Capabilities, ModelEntry};
use modelwatch_core::ModelSource;
use std::time::Duration;

fn t0() -> DateTime<Utc> {
    "2025-06-01T12:00:00Z".parse().unwrap()
}

fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
}

fn engine_source(source: ScriptedSource, grace_secs: i64) -> EngineSource {
    EngineSource {
        id: source.source_name().to_string(),
        source: Box::new(source),
        poll_interval: Duration::from_secs(30),
        grace_period: secs(grace_secs),
        fetch_timeout: Duration::from_secs(5),
    }
}

async fn engine_with(
    source: ScriptedSource,
    grace_secs: i64,
) -> (WatcherEngine, RecordingNotifier, CountingStateStore) {
    let notifier = RecordingNotifier::new();
    let store = CountingStateStore::new();

    let (engine, _events) = WatcherEngine::new(
        vec![engine_source(source, grace_secs)],
        Box::new(notifier.clone()),
        Box::new(store.clone()),
        EngineConfig::default(),
    )
    .await
    .expect("engine construction succeeds");

    (engine, notifier, store)
}

#[tokio::test]
async fn unchanged_listing_skips_persist_and_notify() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
        ],
    );
    let (engine, notifier, store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    let saves_after_first = store.save_count();
    let reports_after_first = notifier.delivery_count();
    assert_eq!(reports_after_first, 1, "first sighting is reported");

    engine.run_cycle(0, t0() + secs(30)).await.unwrap();

    assert_eq!(store.save_count(), saves_after_first, "no-op cycle must not save");
    assert_eq!(
        notifier.delivery_count(),
        reports_after_first,
        "no-op cycle must not notify"
    );
}

#[tokio::test]
async fn fetch_failure_aborts_without_mutation() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
            FetchStep::Failure("HTTP 503".to_string()),
        ],
    );
    let (engine, notifier, store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    let saves = store.save_count();
    let reports = notifier.delivery_count();

    // The failed fetch must not reach the debouncer as an empty listing.
    engine.run_cycle(0, t0() + secs(30)).await.unwrap();

    assert_eq!(store.save_count(), saves);
    assert_eq!(notifier.delivery_count(), reports);
    let tracked = engine.tracked_models().await;
    assert!(tracked["arena"].contains_key("a"), "registry must be untouched");
}

#[tokio::test]
async fn empty_successful_fetch_is_a_real_snapshot() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
            FetchStep::Entries(vec![]),
        ],
    );
    // Debouncing disabled: the removal is trusted immediately.
    let (engine, notifier, _store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    engine.run_cycle(0, t0() + secs(30)).await.unwrap();

    let reports = notifier.reports();
    let last = &reports.last().unwrap().1;
    assert!(last.diff.removed.contains_key("a"));
    assert!(engine.tracked_models().await["arena"].is_empty());
}

#[tokio::test]
async fn waitlist_only_mutation_persists_silently() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![
                ModelEntry::new("a", "Model A"),
                ModelEntry::new("b", "Model B"),
            ]),
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
        ],
    );
    let (engine, notifier, store) = engine_with(source, 60).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    let saves = store.save_count();
    let reports = notifier.delivery_count();

    // b goes missing: enters the waitlist, stays visible, nothing reported.
    engine.run_cycle(0, t0() + secs(30)).await.unwrap();

    assert_eq!(store.save_count(), saves + 1, "waitlist mutation must persist");
    assert_eq!(reports, notifier.delivery_count(), "empty diff must not notify");
    assert!(engine.tracked_models().await["arena"].contains_key("b"));

    let persisted = store.snapshot().await;
    assert!(persisted.sources["arena"].waitlist.contains_key("b"));
}

#[tokio::test]
async fn confirmed_removal_is_reported_exactly_once() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![
                ModelEntry::new("a", "Model A"),
                ModelEntry::new("b", "Model B"),
            ]),
            FetchStep::Entries(vec![]),
            FetchStep::Entries(vec![]),
            FetchStep::Entries(vec![]),
        ],
    );
    let (engine, notifier, store) = engine_with(source, 60).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();

    // Both models vanish at t0: the grace window opens.
    engine.run_cycle(0, t0()).await.unwrap();
    let tracked = engine.tracked_models().await;
    assert!(tracked["arena"].contains_key("a") && tracked["arena"].contains_key("b"));

    // At t+30s they are still visible.
    engine.run_cycle(0, t0() + secs(30)).await.unwrap();
    let tracked = engine.tracked_models().await;
    assert!(tracked["arena"].contains_key("a") && tracked["arena"].contains_key("b"));

    // At t+61s the grace period has elapsed: one report with both removals.
    engine.run_cycle(0, t0() + secs(61)).await.unwrap();
    let reports = notifier.reports();
    let removal_report = &reports.last().unwrap().1;
    assert_eq!(removal_report.diff.removed.len(), 2);
    assert!(engine.tracked_models().await["arena"].is_empty());
    assert!(store.snapshot().await.sources["arena"].waitlist.is_empty());

    // A further empty cycle reports nothing new.
    let count = notifier.delivery_count();
    engine.run_cycle(0, t0() + secs(120)).await.unwrap();
    assert_eq!(notifier.delivery_count(), count);
}

#[tokio::test]
async fn blinking_model_produces_no_events() {
    let entry = ModelEntry::with_capabilities(
        "a",
        "Model A",
        Capabilities::new(["text".to_string()], ["text".to_string()]),
    );
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![entry.clone()]),
            FetchStep::Entries(vec![]),
            FetchStep::Entries(vec![entry.clone()]),
        ],
    );
    let (engine, notifier, _store) = engine_with(source, 60).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    let reports = notifier.delivery_count();

    engine.run_cycle(0, t0() + secs(30)).await.unwrap();
    engine.run_cycle(0, t0() + secs(50)).await.unwrap();

    assert_eq!(notifier.delivery_count(), reports, "a blink must stay silent");
    let tracked = engine.tracked_models().await;
    assert_eq!(
        tracked["arena"]["a"].input_capabilities,
        Some(["text".to_string()].into())
    );
}

#[tokio::test]
async fn capability_growth_is_reported_without_add_or_remove() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![ModelEntry::with_capabilities(
                "a",
                "Model A",
                Capabilities {
                    input: Some(["text".to_string()].into()),
                    output: None,
                },
            )]),
            FetchStep::Entries(vec![ModelEntry::with_capabilities(
                "a",
                "Model A",
                Capabilities {
                    input: Some(["text".to_string(), "image".to_string()].into()),
                    output: None,
                },
            )]),
        ],
    );
    let (engine, notifier, _store) = engine_with(source, 60).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    engine.run_cycle(0, t0() + secs(30)).await.unwrap();

    let reports = notifier.reports();
    let last = &reports.last().unwrap().1;
    assert!(last.diff.added.is_empty() && last.diff.removed.is_empty());
    assert_eq!(last.diff.capability_changed.len(), 1);
    assert_eq!(
        last.diff.capability_changed[0].input.added,
        std::collections::BTreeSet::from(["image".to_string()])
    );
}

#[tokio::test]
async fn save_failure_rolls_back_and_surfaces() {
    let source = ScriptedSource::new(
        "arena",
        vec![
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A")]),
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A2")]),
            FetchStep::Entries(vec![ModelEntry::new("a", "Model A2")]),
        ],
    );
    let (engine, notifier, store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();

    engine.run_cycle(0, t0()).await.unwrap();
    let reports = notifier.delivery_count();

    store.fail_saves(true);
    let err = engine.run_cycle(0, t0() + secs(30)).await.unwrap_err();
    assert!(err.to_string().contains("injected save failure"));
    assert_eq!(notifier.delivery_count(), reports, "unpersisted changes must not be reported");
    assert_eq!(engine.tracked_models().await["arena"]["a"].name, "Model A");

    // The next tick retries and succeeds.
    store.fail_saves(false);
    engine.run_cycle(0, t0() + secs(60)).await.unwrap();
    assert_eq!(engine.tracked_models().await["arena"]["a"].name, "Model A2");
    assert_eq!(notifier.delivery_count(), reports + 1);
}

#[tokio::test]
async fn delivery_failure_is_isolated_per_subscriber() {
    let source = ScriptedSource::new(
        "arena",
        vec![FetchStep::Entries(vec![ModelEntry::new("a", "Model A")])],
    );
    let (engine, notifier, store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();
    engine.subscribe(200).await.unwrap();
    engine.subscribe(300).await.unwrap();
    notifier.fail_for(200);

    engine.run_cycle(0, t0()).await.unwrap();

    let delivered: Vec<_> = notifier.reports().iter().map(|(chat, _)| *chat).collect();
    assert_eq!(delivered, vec![100, 300]);
    // Persisted state is not rolled back by the delivery failure.
    assert!(store.snapshot().await.sources["arena"].models.contains_key("a"));
}

#[tokio::test]
async fn unreachable_subscriber_is_purged() {
    let source = ScriptedSource::new(
        "arena",
        vec![FetchStep::Entries(vec![ModelEntry::new("a", "Model A")])],
    );
    let (engine, notifier, store) = engine_with(source, 0).await;
    engine.subscribe(100).await.unwrap();
    engine.subscribe(200).await.unwrap();
    notifier.gone_for(200);

    engine.run_cycle(0, t0()).await.unwrap();

    assert_eq!(engine.subscriber_count().await, 1);
    assert!(!store.snapshot().await.subscribers.contains(&200));
}

#[tokio::test]
async fn scheduler_drives_cycles_until_shutdown() {
    let source = ScriptedSource::new(
        "arena",
        vec![FetchStep::Entries(vec![ModelEntry::new("a", "Model A")])],
    );
    let probe = source.clone();

    let engine_source = EngineSource {
        id: "arena".to_string(),
        source: Box::new(source),
        poll_interval: Duration::from_millis(20),
        grace_period: secs(0),
        fetch_timeout: Duration::from_secs(1),
    };

    let (engine, _events) = WatcherEngine::new(
        vec![engine_source],
        Box::new(RecordingNotifier::new()),
        Box::new(CountingStateStore::new()),
        EngineConfig::default(),
    )
    .await
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(probe.fetch_count() >= 2, "scheduler should have ticked repeatedly");
}
