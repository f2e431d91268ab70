// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;

use operator_catalog::cache::CacheEvent;
use operator_catalog::registry::api::{Bundle, GroupVersionKind, Package, PackageChannel};
use operator_catalog::registry::{RegistryApi, fetch_entities};
use operator_catalog::{CatalogSource, Entity, Error, RegistryClient, Result};

/// A bundle in the `beta` channel providing the given (group, version, kind) APIs
pub fn bundle(package: &str, version: &str, provides: &[(&str, &str, &str)]) -> Bundle {
    Bundle {
        csv_name: format!("{package}.v{version}"),
        package_name: package.to_string(),
        channel_name: "beta".to_string(),
        bundle_path: format!("quay.io/{package}/{package}:v{version}"),
        version: version.to_string(),
        provided_apis: provides
            .iter()
            .map(|(group, version, kind)| GroupVersionKind {
                group: group.to_string(),
                version: version.to_string(),
                kind: kind.to_string(),
                plural: String::new(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Registry content served for one address
#[derive(Clone, Default)]
pub struct Catalog {
    pub bundles: Vec<Bundle>,
    pub packages: HashMap<String, Package>,
}

impl Catalog {
    pub fn new(bundles: Vec<Bundle>) -> Self {
        let packages = bundles
            .iter()
            .map(|b| {
                (
                    b.package_name.clone(),
                    Package {
                        name: b.package_name.clone(),
                        channels: vec![PackageChannel {
                            name: "beta".to_string(),
                            csv_name: b.csv_name.clone(),
                        }],
                        default_channel_name: "beta".to_string(),
                    },
                )
            })
            .collect();
        Self { bundles, packages }
    }
}

/// In-process registry API over a [`Catalog`]
struct StaticApi {
    catalog: Catalog,
}

#[async_trait]
impl RegistryApi for StaticApi {
    async fn list_bundles(&mut self) -> Result<BoxStream<'static, Result<Bundle>>> {
        let bundles = self.catalog.bundles.clone();
        Ok(stream::iter(bundles.into_iter().map(Ok)).boxed())
    }

    async fn get_package(&mut self, name: &str) -> Result<Package> {
        self.catalog
            .packages
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("package {name} not found")))
    }
}

/// Registry client serving canned catalogs per address
#[derive(Default)]
pub struct FakeRegistry {
    catalogs: Mutex<HashMap<String, std::result::Result<Catalog, String>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, address: &str, catalog: Catalog) {
        self.catalogs.lock().insert(address.to_string(), Ok(catalog));
    }

    pub fn fail(&self, address: &str, message: &str) {
        self.catalogs
            .lock()
            .insert(address.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self, address: &str) -> usize {
        self.calls.lock().get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_entities(&self, source: &CatalogSource) -> Result<Vec<Entity>> {
        let address = source
            .registry_address()
            .ok_or_else(|| Error::Connection(format!("{} has no address", source.key())))?;
        *self.calls.lock().entry(address.clone()).or_default() += 1;

        let catalog = self.catalogs.lock().get(&address).cloned();
        match catalog {
            Some(Ok(catalog)) => fetch_entities(&mut StaticApi { catalog }, &source.key()).await,
            Some(Err(message)) => Err(Error::Rpc(message)),
            None => Err(Error::Connection(format!("no registry at {address}"))),
        }
    }
}

/// Next cache event, failing the test if none arrives in time
pub async fn next_event(events: &mut tokio::sync::broadcast::Receiver<CacheEvent>) -> CacheEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a cache event")
        .expect("event channel closed")
}
