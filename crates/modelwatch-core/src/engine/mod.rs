//! Core reconciliation engine
//!
//! The WatcherEngine is responsible for:
//! - Running one reconciliation cycle per source on its own schedule
//! - Normalizing, debouncing, and diffing each fetch result
//! - Persisting state only when something actually changed
//! - Fanning change reports out to subscribers
//! - Serving the administrative surface (subscribe/unsubscribe/tag)
//!
//! ## Cycle Flow
//!
//! ```text
//! ┌──────────────┐   fetch    ┌──────────────────────────────┐
//! │ ModelSource  │──────────▶ │        WatcherEngine         │
//! └──────────────┘            │ normalize → debounce → diff  │
//!                             └──────────────┬───────────────┘
//!                        ┌───────────────────┼───────────────────┐
//!                        ▼                   ▼                   ▼
//!                ┌──────────────┐    ┌──────────────┐    ┌─────────────┐
//!                │  StateStore  │    │   Notifier   │    │   Events    │
//!                │  (persist)   │    │ (subscribers)│    │ (observe)   │
//!                └──────────────┘    └──────────────┘    └─────────────┘
//! ```
//!
//! One `tokio::sync::Mutex` guards the entire persisted state (all registry
//! slices, waitlists, and the subscriber set). Fetches for different sources
//! run concurrently; state mutation and persistence serialize through that
//! mutex, as do administrative commands. A failed cycle waits for the next
//! scheduled tick; there are no in-cycle retries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, SourceConfig};
use crate::debounce::debounce;
use crate::diff::{ChangeReport, diff};
use crate::error::{Error, Result};
use crate::model::{SubscriberId, TrackedModel, WatcherState};
use crate::snapshot::normalize;
use crate::traits::{ModelSource, Notifier, StateStore};

/// Events emitted by the WatcherEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        sources_count: usize,
        subscribers_count: usize,
    },

    /// A fetch failed or timed out; the cycle was aborted without mutation
    FetchFailed { source: String, error: String },

    /// A cycle produced a non-empty delta
    ChangesDetected {
        source: String,
        added: usize,
        removed: usize,
        renamed: usize,
        capability_changed: usize,
    },

    /// The state document could not be written
    PersistFailed { source: String, error: String },

    /// Delivery to one subscriber failed
    NotifyFailed {
        subscriber: SubscriberId,
        error: String,
    },

    /// A subscriber was dropped because the sink reported it unreachable
    SubscriberPurged { subscriber: SubscriberId },

    /// Engine stopped
    Stopped { reason: String },
}

/// One source wired into the engine, with its schedule
pub struct EngineSource {
    /// Source id: registry slice key and report label
    pub id: String,
    /// The adapter
    pub source: Box<dyn ModelSource>,
    /// Time between reconciliation cycles
    pub poll_interval: Duration,
    /// Removal grace period; zero or negative disables debouncing
    pub grace_period: TimeDelta,
    /// Per-call fetch timeout
    pub fetch_timeout: Duration,
}

impl EngineSource {
    /// Wire an adapter using the schedule from its configuration
    pub fn from_config(config: &SourceConfig, source: Box<dyn ModelSource>) -> Self {
        Self {
            id: config.id.clone(),
            source,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            grace_period: TimeDelta::seconds(config.grace_period_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }
}

/// Outcome of a successful tag update, including the prior value so the
/// caller can report the transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    /// Source the record belongs to
    pub source: String,
    /// Resolved identifier
    pub identifier: String,
    /// Current display name
    pub name: String,
    /// Tag before the update
    pub previous_tag: Option<String>,
    /// Tag after the update
    pub tag: Option<String>,
}

struct EngineInner {
    sources: Vec<EngineSource>,
    notifier: Box<dyn Notifier>,
    store: Box<dyn StateStore>,
    state: Mutex<WatcherState>,
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Core reconciliation engine
///
/// Cheap to clone; clones share the same state, store, and sources. One
/// clone runs the scheduler via [`WatcherEngine::run`] while others serve
/// administrative commands.
#[derive(Clone)]
pub struct WatcherEngine {
    inner: Arc<EngineInner>,
}

impl WatcherEngine {
    /// Create a new engine, loading the persisted state document.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events for monitoring and logging.
    pub async fn new(
        sources: Vec<EngineSource>,
        notifier: Box<dyn Notifier>,
        store: Box<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        if sources.is_empty() {
            return Err(Error::config("No sources wired into the engine"));
        }

        let state = store.load().await?;
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            inner: Arc::new(EngineInner {
                sources,
                notifier,
                store,
                state: Mutex::new(state),
                event_tx: tx,
            }),
        };

        Ok((engine, rx))
    }

    /// Run the engine until a shutdown signal is received.
    ///
    /// Spawns one timer task per source; each ticks on its own interval,
    /// starting immediately, and keeps running regardless of individual
    /// cycle failures.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Test-only seam: run the engine with a controlled shutdown signal.
    ///
    /// Production code should use `run()`, which shuts down on SIGINT.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        {
            let state = self.inner.state.lock().await;
            self.emit_event(EngineEvent::Started {
                sources_count: self.inner.sources.len(),
                subscribers_count: state.subscribers.len(),
            });
        }

        let (stop_tx, _) = tokio::sync::watch::channel(false);
        let mut handles = Vec::with_capacity(self.inner.sources.len());

        for index in 0..self.inner.sources.len() {
            let engine = self.clone();
            let mut stop_rx = stop_tx.subscribe();

            handles.push(tokio::spawn(async move {
                let runtime = &engine.inner.sources[index];
                let mut ticker = tokio::time::interval(runtime.poll_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.run_cycle(index, Utc::now()).await {
                                warn!("Cycle failed for source {}: {}", runtime.id, e);
                            }
                        }
                        _ = stop_rx.changed() => break,
                    }
                }
            }));
        }

        // Wait for shutdown.
        if let Some(rx) = shutdown_rx {
            let _ = rx.await;
            info!("Shutdown signal received");
        } else {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        }

        let _ = stop_tx.send(true);
        for handle in handles {
            let _ = handle.await;
        }

        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Engine stopped");

        Ok(())
    }

    /// Run one reconciliation cycle for the source at `index`.
    ///
    /// Public so embedders and tests can drive cycles with synthetic time
    /// instead of waiting on the scheduler.
    pub async fn run_cycle(&self, index: usize, now: DateTime<Utc>) -> Result<()> {
        let runtime = self
            .inner
            .sources
            .get(index)
            .ok_or_else(|| Error::config(format!("No source at index {}", index)))?;

        // Step 1: fetch outside the state mutex. A hard fetch error or a
        // timeout aborts the cycle without touching state; it must never
        // masquerade as an empty listing.
        let fetch = tokio::time::timeout(runtime.fetch_timeout, runtime.source.fetch_models());
        let entries = match fetch.await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!("Fetch failed for source {}: {}", runtime.id, e);
                self.emit_event(EngineEvent::FetchFailed {
                    source: runtime.id.clone(),
                    error: e.to_string(),
                });
                return Ok(());
            }
            Err(_) => {
                warn!(
                    "Fetch timed out for source {} after {:?}",
                    runtime.id, runtime.fetch_timeout
                );
                self.emit_event(EngineEvent::FetchFailed {
                    source: runtime.id.clone(),
                    error: format!("timed out after {:?}", runtime.fetch_timeout),
                });
                return Ok(());
            }
        };

        debug!(
            "Fetched {} entries from source {}",
            entries.len(),
            runtime.id
        );

        // Steps 2-3: reconcile and persist under the state mutex.
        let (report, subscribers) = {
            let mut state = self.inner.state.lock().await;
            let slice = state.source_mut(&runtime.id);
            let previous = slice.models.clone();
            let previous_waitlist = slice.waitlist.clone();

            let raw = normalize(&entries, &slice.models);
            let outcome = debounce(
                &previous,
                &raw,
                &mut slice.waitlist,
                runtime.grace_period,
                now,
            );
            let delta = diff(&previous, &outcome.effective);

            if delta.is_empty() && !outcome.waitlist_changed {
                debug!("No changes detected for source {}", runtime.id);
                return Ok(());
            }

            slice.models = outcome.effective;

            if let Err(e) = self.inner.store.save(&state).await {
                // Roll the slice back so the next tick re-detects the delta
                // and retries persistence; masking the loss would mean
                // reporting changes that were never durably recorded.
                let slice = state.source_mut(&runtime.id);
                slice.models = previous;
                slice.waitlist = previous_waitlist;
                self.emit_event(EngineEvent::PersistFailed {
                    source: runtime.id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }

            if delta.is_empty() {
                // Waitlist-only mutation: persisted, but an empty report
                // would be a spurious notification.
                debug!("Waitlist updated for source {}, nothing to report", runtime.id);
                return Ok(());
            }

            self.emit_event(EngineEvent::ChangesDetected {
                source: runtime.id.clone(),
                added: delta.added.len(),
                removed: delta.removed.len(),
                renamed: delta.renamed.len(),
                capability_changed: delta.capability_changed.len(),
            });

            let report = ChangeReport {
                source: runtime.id.clone(),
                diff: delta,
            };
            let subscribers: Vec<SubscriberId> = state.subscribers.iter().copied().collect();
            (report, subscribers)
        };

        // Step 4: deliver outside the mutex. Failures are isolated per
        // subscriber and never roll back the persisted state.
        self.deliver(&report, &subscribers).await;

        Ok(())
    }

    /// Deliver one report to every subscriber, isolating failures
    async fn deliver(&self, report: &ChangeReport, subscribers: &[SubscriberId]) {
        if subscribers.is_empty() {
            debug!("No subscribers to notify for source {}", report.source);
            return;
        }

        for subscriber in subscribers {
            match self.inner.notifier.notify(*subscriber, report).await {
                Ok(()) => {}
                Err(Error::SubscriberGone {
                    subscriber: gone, ..
                }) => {
                    warn!("Subscriber {} unreachable, unsubscribing", gone);
                    self.emit_event(EngineEvent::SubscriberPurged { subscriber: gone });
                    if let Err(e) = self.unsubscribe(gone).await {
                        warn!("Failed to drop unreachable subscriber {}: {}", gone, e);
                    }
                }
                Err(e) => {
                    warn!("Failed to notify subscriber {}: {}", subscriber, e);
                    self.emit_event(EngineEvent::NotifyFailed {
                        subscriber: *subscriber,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Subscribe a chat to change reports.
    ///
    /// Returns `false` when the chat was already subscribed (no-op, nothing
    /// persisted).
    pub async fn subscribe(&self, subscriber: SubscriberId) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if !state.subscribers.insert(subscriber) {
            return Ok(false);
        }
        if let Err(e) = self.inner.store.save(&state).await {
            state.subscribers.remove(&subscriber);
            return Err(e);
        }
        info!("Subscriber {} added", subscriber);
        Ok(true)
    }

    /// Unsubscribe a chat.
    ///
    /// Returns `false` when the chat was not subscribed.
    pub async fn unsubscribe(&self, subscriber: SubscriberId) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if !state.subscribers.remove(&subscriber) {
            return Ok(false);
        }
        if let Err(e) = self.inner.store.save(&state).await {
            state.subscribers.insert(subscriber);
            return Err(e);
        }
        info!("Subscriber {} removed", subscriber);
        Ok(true)
    }

    /// Set or clear a record's tag.
    ///
    /// Resolution prefers an exact identifier match across all sources and
    /// falls back to a case-insensitive display-name match. Zero matches
    /// yield [`Error::NotFound`]; more than one match yields
    /// [`Error::Ambiguous`] listing the candidates, never guessing. An empty
    /// or absent tag clears the annotation. The previous tag is returned so
    /// the caller can report the transition.
    pub async fn set_tag(&self, lookup: &str, tag: Option<&str>) -> Result<TagUpdate> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());

        let mut state = self.inner.state.lock().await;

        let mut matches: Vec<(String, String)> = state
            .sources
            .iter()
            .filter(|(_, slice)| slice.models.contains_key(lookup))
            .map(|(source_id, _)| (source_id.clone(), lookup.to_string()))
            .collect();

        if matches.is_empty() {
            let lookup_lower = lookup.to_lowercase();
            matches = state
                .sources
                .iter()
                .flat_map(|(source_id, slice)| {
                    slice
                        .models
                        .iter()
                        .filter(|(_, record)| record.name.to_lowercase() == lookup_lower)
                        .map(|(identifier, _)| (source_id.clone(), identifier.clone()))
                })
                .collect();
        }

        let (source_id, identifier) = match matches.len() {
            0 => return Err(Error::not_found(lookup)),
            1 => matches.remove(0),
            _ => {
                return Err(Error::ambiguous(
                    lookup,
                    matches
                        .iter()
                        .map(|(source, id)| format!("{}/{}", source, id))
                        .collect(),
                ));
            }
        };

        let record = state
            .sources
            .get_mut(&source_id)
            .and_then(|slice| slice.models.get_mut(&identifier))
            .expect("resolved record exists under the held lock");

        let previous_tag = record.tag.clone();
        record.tag = tag.map(str::to_string);
        let update = TagUpdate {
            source: source_id.clone(),
            identifier: identifier.clone(),
            name: record.name.clone(),
            previous_tag,
            tag: record.tag.clone(),
        };

        if let Err(e) = self.inner.store.save(&state).await {
            let record = state
                .sources
                .get_mut(&source_id)
                .and_then(|slice| slice.models.get_mut(&identifier))
                .expect("resolved record exists under the held lock");
            record.tag = update.previous_tag.clone();
            return Err(e);
        }

        Ok(update)
    }

    /// Snapshot of every source's tracked models, for status reporting
    pub async fn tracked_models(&self) -> BTreeMap<String, BTreeMap<String, TrackedModel>> {
        let state = self.inner.state.lock().await;
        state
            .sources
            .iter()
            .map(|(id, slice)| (id.clone(), slice.models.clone()))
            .collect()
    }

    /// Number of subscribed chats
    pub async fn subscriber_count(&self) -> usize {
        self.inner.state.lock().await.subscribers.len()
    }

    /// Source ids in wiring order
    pub fn source_ids(&self) -> Vec<String> {
        self.inner.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// Emit an engine event, dropping it if the channel is full
    fn emit_event(&self, event: EngineEvent) {
        if self.inner.event_tx.try_send(event).is_err() {
            // Channel full: event processing is slower than event generation.
            // Dropping bounds memory under load.
            warn!("Event channel full, dropping event");
        }
    }
}
