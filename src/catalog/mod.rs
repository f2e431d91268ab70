// src/catalog/mod.rs

//! Catalog source registrations
//!
//! A [`CatalogSource`] names one content provider. Sources with an address
//! are polled on an interval; sources without one are managed elsewhere and
//! only resynchronized when their registration changes.

mod memory;

pub use memory::InMemoryCatalogSourceStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Registration record for one catalog provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSource {
    pub name: String,
    pub namespace: String,
    /// Registry endpoint (`host:port`); empty for managed sources
    #[serde(default)]
    pub address: String,
    /// In-cluster registry service published for managed sources
    #[serde(default)]
    pub service: Option<RegistryService>,
}

/// Registry service backing a managed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryService {
    pub name: String,
    pub namespace: String,
    pub port: u16,
}

impl RegistryService {
    /// Cluster-local `host:port`
    pub fn address(&self) -> String {
        format!("{}.{}.svc:{}", self.name, self.namespace, self.port)
    }
}

impl CatalogSource {
    /// Create a source with the given name, namespace and address
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            address: address.into(),
            service: None,
        }
    }

    /// Attach the registry service of a managed source
    pub fn with_service(mut self, service: RegistryService) -> Self {
        self.service = Some(service);
        self
    }

    /// Cache and work-queue key: `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Managed sources have no address of their own and are not polled
    pub fn is_managed(&self) -> bool {
        self.address.is_empty()
    }

    /// Endpoint to fetch from: the explicit address, else the registry service
    pub fn registry_address(&self) -> Option<String> {
        if !self.is_managed() {
            return Some(self.address.clone());
        }
        self.service.as_ref().map(RegistryService::address)
    }
}

/// Change notification for a registration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(CatalogSource),
    Modified(CatalogSource),
    Deleted(CatalogSource),
}

impl WatchEvent {
    /// The record the event refers to
    pub fn source(&self) -> &CatalogSource {
        match self {
            WatchEvent::Added(s) | WatchEvent::Modified(s) | WatchEvent::Deleted(s) => s,
        }
    }
}

/// Read and watch access to registration records
#[async_trait]
pub trait CatalogSourceStore: Send + Sync {
    /// All current registrations
    async fn list(&self) -> Result<Vec<CatalogSource>>;

    /// One registration by `namespace/name` key
    async fn get(&self, key: &str) -> Result<Option<CatalogSource>>;

    /// Stream of changes from this point on
    async fn watch(&self) -> Result<BoxStream<'static, WatchEvent>>;
}
