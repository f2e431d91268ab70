// src/catalog/memory.rs

//! In-memory registration store
//!
//! Used by the CLI's static configuration and by tests. Every `apply` and
//! `delete` is fanned out to all open watch streams; closed watchers are
//! dropped on the next send.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{CatalogSource, CatalogSourceStore, WatchEvent};
use crate::error::Result;

#[derive(Default)]
struct Inner {
    sources: BTreeMap<String, CatalogSource>,
    watchers: Vec<mpsc::UnboundedSender<WatchEvent>>,
}

/// Registration store backed by a map
#[derive(Default)]
pub struct InMemoryCatalogSourceStore {
    inner: Mutex<Inner>,
}

impl InMemoryCatalogSourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given records, without emitting events
    pub fn with_sources(sources: impl IntoIterator<Item = CatalogSource>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for source in sources {
                inner.sources.insert(source.key(), source);
            }
        }
        store
    }

    /// Create or replace a record and notify watchers
    pub fn apply(&self, source: CatalogSource) {
        let mut inner = self.inner.lock();
        let event = match inner.sources.insert(source.key(), source.clone()) {
            Some(_) => WatchEvent::Modified(source),
            None => WatchEvent::Added(source),
        };
        Self::broadcast(&mut inner, event);
    }

    /// Remove a record by key and notify watchers; returns the removed record
    pub fn delete(&self, key: &str) -> Option<CatalogSource> {
        let mut inner = self.inner.lock();
        let removed = inner.sources.remove(key)?;
        Self::broadcast(&mut inner, WatchEvent::Deleted(removed.clone()));
        Some(removed)
    }

    fn broadcast(inner: &mut Inner, event: WatchEvent) {
        debug!(key = %event.source().key(), "Broadcasting catalog source event");
        inner
            .watchers
            .retain(|watcher| watcher.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl CatalogSourceStore for InMemoryCatalogSourceStore {
    async fn list(&self) -> Result<Vec<CatalogSource>> {
        Ok(self.inner.lock().sources.values().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<CatalogSource>> {
        Ok(self.inner.lock().sources.get(key).cloned())
    }

    async fn watch(&self) -> Result<BoxStream<'static, WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().watchers.push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
