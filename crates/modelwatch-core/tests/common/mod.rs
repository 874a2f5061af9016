//! Test doubles and common utilities for engine contract tests
//!
//! These doubles verify the engine's contracts without any real I/O: a
//! scripted source, a recording notifier, and a counting state store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modelwatch_core::diff::ChangeReport;
use modelwatch_core::error::{Error, Result};
use modelwatch_core::model::{ModelEntry, SubscriberId, WatcherState};
use modelwatch_core::state::MemoryStateStore;
use modelwatch_core::traits::{ModelSource, Notifier, StateStore};

/// One scripted fetch outcome
pub enum FetchStep {
    Entries(Vec<ModelEntry>),
    Failure(String),
}

/// A source that replays a scripted sequence of fetch outcomes.
///
/// When the script runs out it repeats the last successful listing, so
/// scheduler-driven tests stay deterministic no matter how many ticks fire.
#[derive(Clone)]
pub struct ScriptedSource {
    name: String,
    steps: Arc<Mutex<VecDeque<FetchStep>>>,
    last: Arc<Mutex<Vec<ModelEntry>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(name: &str, steps: Vec<FetchStep>) -> Self {
        Self {
            name: name.to_string(),
            steps: Arc::new(Mutex::new(steps.into())),
            last: Arc::new(Mutex::new(Vec::new())),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times fetch_models() was called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSource for ScriptedSource {
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(FetchStep::Entries(entries)) => {
                *self.last.lock().unwrap() = entries.clone();
                Ok(entries)
            }
            Some(FetchStep::Failure(message)) => Err(Error::fetch(&self.name, message)),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// A notifier that records every delivery and can fail on demand
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    reports: Arc<Mutex<Vec<(SubscriberId, ChangeReport)>>>,
    failing: Arc<Mutex<Vec<SubscriberId>>>,
    gone: Arc<Mutex<Vec<SubscriberId>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded (subscriber, report) pair, in delivery order
    pub fn reports(&self) -> Vec<(SubscriberId, ChangeReport)> {
        self.reports.lock().unwrap().clone()
    }

    /// Number of deliveries that succeeded
    pub fn delivery_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    /// Make deliveries to this subscriber fail with a transient error
    pub fn fail_for(&self, subscriber: SubscriberId) {
        self.failing.lock().unwrap().push(subscriber);
    }

    /// Make deliveries to this subscriber report it as permanently gone
    pub fn gone_for(&self, subscriber: SubscriberId) {
        self.gone.lock().unwrap().push(subscriber);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subscriber: SubscriberId, report: &ChangeReport) -> Result<()> {
        if self.gone.lock().unwrap().contains(&subscriber) {
            return Err(Error::SubscriberGone {
                subscriber,
                message: "bot was kicked".to_string(),
            });
        }
        if self.failing.lock().unwrap().contains(&subscriber) {
            return Err(Error::notify("injected delivery failure"));
        }
        self.reports.lock().unwrap().push((subscriber, report.clone()));
        Ok(())
    }
}

/// A state store that counts saves and can be made to fail
#[derive(Clone, Default)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    save_count: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl CountingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the persisted document
    pub async fn snapshot(&self) -> WatcherState {
        self.inner.snapshot().await
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn load(&self) -> Result<WatcherState> {
        self.inner.load().await
    }

    async fn save(&self, state: &WatcherState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::state_store("injected save failure"));
        }
        self.inner.save(state).await?;
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
