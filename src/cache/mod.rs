// src/cache/mod.rs

//! Live entity cache over all registered catalog sources
//!
//! The cache holds one entity snapshot per catalog source, keyed by
//! `namespace/name`. A single background loop owns every mutation:
//!
//! - registration changes arrive on the store's watch stream
//! - resyncs and retries arrive through the [`WorkQueue`]
//! - each successful fetch replaces that source's snapshot wholesale
//!
//! Queries take the read lock and scan every snapshot. The write lock is held
//! only while a snapshot is swapped in or removed, never during a fetch.

mod rate_limit;
mod workqueue;

pub use rate_limit::{ItemExponentialBackoff, MaxOf, RateLimiter, TokenBucket, default_rate_limiter};
pub use workqueue::WorkQueue;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogSource, CatalogSourceStore, WatchEvent};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::registry::RegistryClient;
use crate::source::{EntityList, EntityListMap, EntitySource, group_into};

/// Resync interval for polled catalog sources
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Event reason for a successful snapshot update
pub const REASON_CACHE_UPDATED: &str = "BundleCacheUpdated";
/// Event reason for a failed snapshot update
pub const REASON_CACHE_UPDATE_FAILED: &str = "BundleCacheUpdateFailed";

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How often polled sources are refetched after a successful sync
    pub sync_interval: Duration,
    /// Buffered cache events per subscriber
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            event_capacity: 64,
        }
    }
}

impl CacheConfig {
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Lifecycle of a cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Created, not yet started
    Idle,
    /// Fetching every registered source for the first time
    Populating,
    /// Initial population finished; following changes
    Serving,
    /// Shut down; cannot be started again
    Stopped,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheState::Idle => "idle",
            CacheState::Populating => "populating",
            CacheState::Serving => "serving",
            CacheState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Outcome of one snapshot update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    /// Source key (`namespace/name`)
    pub source: String,
    pub kind: EventKind,
    pub reason: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Concurrent entity cache fed by a [`RegistryClient`]
pub struct EntityCache {
    client: Arc<dyn RegistryClient>,
    store: Arc<dyn CatalogSourceStore>,
    config: CacheConfig,
    snapshots: RwLock<HashMap<String, EntityList>>,
    queue: WorkQueue,
    state: watch::Sender<CacheState>,
    events: broadcast::Sender<CacheEvent>,
    shutdown: CancellationToken,
}

impl EntityCache {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        store: Arc<dyn CatalogSourceStore>,
        config: CacheConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(CacheState::Idle);
        Self {
            client,
            store,
            config,
            snapshots: RwLock::new(HashMap::new()),
            queue: WorkQueue::new(),
            state,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run the cache until `cancel` fires or [`stop`](Self::stop) is called
    ///
    /// Fails if the registration watch cannot be opened or the cache was
    /// already started.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.begin()?;

        let mut watch = match self.store.watch().await {
            Ok(watch) => watch,
            Err(e) => {
                error!(error = %e, "Failed to start catalog source watch");
                self.finish();
                return Err(e);
            }
        };

        info!("Starting catalog source cache");
        self.populate(&cancel).await;
        self.state.send_replace(CacheState::Serving);

        let mut watch_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
                event = watch.next(), if watch_open => match event {
                    Some(event) => self.handle_watch_event(event),
                    None => {
                        warn!("Catalog source watch closed; continuing with queued resyncs");
                        watch_open = false;
                    }
                },
                item = self.queue.get() => match item {
                    Some(key) => {
                        self.process(&key, &cancel).await;
                        self.queue.done(&key);
                    }
                    None => break,
                },
            }
        }

        self.finish();
        Ok(())
    }

    /// Run the cache on a background task
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.run(cancel).await })
    }

    /// Stop the cache; it cannot be restarted
    pub fn stop(&self) {
        info!("Stopping catalog source cache");
        self.queue.shutdown();
        self.shutdown.cancel();
        self.state.send_replace(CacheState::Stopped);
    }

    /// Wait until initial population has finished
    pub async fn wait_until_serving(&self) -> Result<()> {
        let mut state = self.state.subscribe();
        let reached = state
            .wait_for(|s| matches!(s, CacheState::Serving | CacheState::Stopped))
            .await
            .map(|s| *s)
            .map_err(|_| Error::CacheStopped)?;
        match reached {
            CacheState::Serving => Ok(()),
            _ => Err(Error::CacheStopped),
        }
    }

    /// Subscribe to snapshot update events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> CacheState {
        *self.state.borrow()
    }

    /// Keys of the sources with a cached snapshot, sorted
    pub fn sources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.snapshots.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Total number of cached entities
    pub fn entity_count(&self) -> usize {
        self.snapshots.read().values().map(Vec::len).sum()
    }

    fn begin(&self) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match state {
            CacheState::Idle => {
                *state = CacheState::Populating;
                true
            }
            CacheState::Stopped => {
                outcome = Err(Error::CacheStopped);
                false
            }
            CacheState::Populating | CacheState::Serving => {
                outcome = Err(Error::CacheRunning);
                false
            }
        });
        outcome
    }

    fn finish(&self) {
        self.queue.shutdown();
        self.state.send_replace(CacheState::Stopped);
    }

    async fn stopped(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// Fetch every registered source once
    async fn populate(&self, cancel: &CancellationToken) {
        let sources = match self.store.list().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "Error populating initial entity cache");
                return;
            }
        };

        let mut errors = Vec::new();
        for source in &sources {
            match self.sync_source(source, cancel).await {
                Some(Ok(())) => {}
                Some(Err(e)) => errors.push(e),
                None => return,
            }
        }

        match Error::aggregate(errors) {
            Some(e) => error!(error = %e, "Error populating initial entity cache"),
            None => info!(sources = sources.len(), "Populated initial cache"),
        }
    }

    fn handle_watch_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(source) | WatchEvent::Modified(source) => {
                debug!(source = %source.key(), "Catalog source changed; queueing resync");
                self.queue.add(&source.key());
            }
            WatchEvent::Deleted(source) => {
                let key = source.key();
                self.snapshots.write().remove(&key);
                self.queue.forget(&key);
                info!(source = %key, "Completed cache delete");
            }
        }
    }

    async fn process(&self, key: &str, cancel: &CancellationToken) {
        match self.store.get(key).await {
            Ok(Some(source)) => {
                self.sync_source(&source, cancel).await;
            }
            Ok(None) => {
                info!(source = key, "Cannot find catalog source, skipping cache update");
            }
            Err(e) => {
                warn!(source = key, error = %e, "Cannot look up catalog source, skipping cache update");
            }
        }
    }

    /// Fetch one source and swap in its snapshot; `None` when cancelled
    async fn sync_source(
        &self,
        source: &CatalogSource,
        cancel: &CancellationToken,
    ) -> Option<Result<()>> {
        let key = source.key();
        let fetched = tokio::select! {
            result = self.client.list_entities(source) => result,
            _ = self.stopped(cancel) => return None,
        };

        match fetched {
            Ok(entities) => {
                let count = entities.len();
                let snapshot: EntityList = entities.into_iter().map(Arc::new).collect();
                self.snapshots.write().insert(key.clone(), snapshot);

                if !source.is_managed() {
                    self.queue.forget(&key);
                    self.queue.add_after(&key, self.config.sync_interval);
                }
                info!(source = %key, entities = count, "Completed cache update");
                self.publish(
                    &key,
                    EventKind::Normal,
                    REASON_CACHE_UPDATED,
                    format!("Successfully updated bundle cache from {key}"),
                );
                Some(Ok(()))
            }
            Err(e) => {
                warn!(source = %key, error = %e, "Failed to list entities for catalog source cache update");
                self.publish(
                    &key,
                    EventKind::Warning,
                    REASON_CACHE_UPDATE_FAILED,
                    format!("Failed to update bundle cache from {key}: {e}"),
                );
                if !source.is_managed() {
                    self.queue.add_rate_limited(&key);
                }
                Some(Err(e))
            }
        }
    }

    fn publish(&self, source: &str, kind: EventKind, reason: &'static str, message: String) {
        // no subscribers is fine
        let _ = self.events.send(CacheEvent {
            source: source.to_string(),
            kind,
            reason,
            message,
            timestamp: Utc::now(),
        });
    }
}

impl EntitySource for EntityCache {
    fn get(&self, id: &str) -> Option<Arc<Entity>> {
        self.snapshots
            .read()
            .values()
            .flatten()
            .find(|e| e.id == id)
            .cloned()
    }

    fn filter(&self, predicate: &dyn Fn(&Entity) -> bool) -> Result<EntityList> {
        Ok(self
            .snapshots
            .read()
            .values()
            .flatten()
            .filter(|e| predicate(e.as_ref()))
            .cloned()
            .collect())
    }

    fn group_by(&self, key: &dyn Fn(&Entity) -> Vec<String>) -> Result<EntityListMap> {
        let snapshots = self.snapshots.read();
        let mut groups = EntityListMap::new();
        for entity in snapshots.values().flatten() {
            group_into(&mut groups, entity, key);
        }
        Ok(groups)
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        let snapshots = self.snapshots.read();
        snapshots
            .values()
            .flatten()
            .try_for_each(|e| visitor(e.as_ref()))
    }
}
