// src/registry/mod.rs

//! Catalog registry clients
//!
//! A [`RegistryClient`] fetches every bundle a catalog source serves and
//! converts it to an [`Entity`]. The fetch is all-or-nothing: a stream error,
//! a failed package lookup or a bundle that cannot be converted fails the
//! whole call, so callers never cache a half-synced source.

pub mod api;
mod grpc;
pub mod proxy;

pub use grpc::{DEFAULT_GRPC_TIMEOUT, GrpcRegistryClient};
pub use proxy::ProxyConfig;

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

use crate::catalog::CatalogSource;
use crate::entity::{Entity, entity_from_bundle};
use crate::error::{Error, Result};
use api::{Bundle, Package};

/// Fetches the entities a catalog source serves
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn list_entities(&self, source: &CatalogSource) -> Result<Vec<Entity>>;
}

/// The two registry calls entity synchronization needs
#[async_trait]
pub trait RegistryApi: Send {
    /// Stream of every bundle in the catalog
    async fn list_bundles(&mut self) -> Result<BoxStream<'static, Result<Bundle>>>;

    /// Package metadata by name
    async fn get_package(&mut self, name: &str) -> Result<Package>;
}

/// Stream all bundles from `api` and convert them to entities
///
/// Each package is looked up once per call, keyed by `source_id/package`.
pub async fn fetch_entities<A: RegistryApi + ?Sized>(
    api: &mut A,
    source_id: &str,
) -> Result<Vec<Entity>> {
    let mut bundles = api
        .list_bundles()
        .await
        .map_err(|e| Error::Rpc(format!("ListBundles failed: {e}")))?;

    let mut packages: HashMap<String, Package> = HashMap::new();
    let mut entities = Vec::new();

    while let Some(bundle) = bundles.next().await {
        let bundle =
            bundle.map_err(|e| Error::Rpc(format!("failed to read bundle stream: {e}")))?;

        let package = match packages.entry(format!("{source_id}/{}", bundle.package_name)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let package = api.get_package(&bundle.package_name).await.map_err(|e| {
                    Error::Rpc(format!("failed to get package {}: {e}", bundle.package_name))
                })?;
                entry.insert(package)
            }
        };
        entities.push(entity_from_bundle(source_id, package, &bundle)?);
    }

    debug!(
        source = source_id,
        entities = entities.len(),
        packages = packages.len(),
        "Fetched catalog entities"
    );
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::api::PackageChannel;
    use futures::stream;

    struct FakeApi {
        bundles: Vec<Result<Bundle>>,
        packages: HashMap<String, Package>,
        lookups: Vec<String>,
        fail_listing: bool,
    }

    impl FakeApi {
        fn new(bundles: Vec<Result<Bundle>>) -> Self {
            let packages = ["prometheus", "etcd"]
                .into_iter()
                .map(|name| {
                    (
                        name.to_string(),
                        Package {
                            name: name.to_string(),
                            channels: vec![PackageChannel {
                                name: "beta".to_string(),
                                csv_name: format!("{name}.v1"),
                            }],
                            default_channel_name: "beta".to_string(),
                        },
                    )
                })
                .collect();
            Self {
                bundles,
                packages,
                lookups: Vec::new(),
                fail_listing: false,
            }
        }
    }

    #[async_trait]
    impl RegistryApi for FakeApi {
        async fn list_bundles(&mut self) -> Result<BoxStream<'static, Result<Bundle>>> {
            if self.fail_listing {
                return Err(Error::Rpc("unavailable".to_string()));
            }
            let bundles = std::mem::take(&mut self.bundles);
            Ok(stream::iter(bundles).boxed())
        }

        async fn get_package(&mut self, name: &str) -> Result<Package> {
            self.lookups.push(name.to_string());
            self.packages
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Rpc(format!("package {name} not found")))
        }
    }

    fn bundle(package: &str, version: &str) -> Bundle {
        Bundle {
            csv_name: format!("{package}.v{version}"),
            package_name: package.to_string(),
            channel_name: "beta".to_string(),
            version: version.to_string(),
            bundle_path: format!("quay.io/{package}:{version}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_memoizes_packages() {
        let mut api = FakeApi::new(vec![
            Ok(bundle("prometheus", "0.37.0")),
            Ok(bundle("prometheus", "0.47.0")),
            Ok(bundle("etcd", "1.0.0")),
        ]);
        let entities = fetch_entities(&mut api, "olm/operatorhub").await.unwrap();

        let ids: Vec<_> = entities.iter().map(|e| e.id()).collect();
        assert_eq!(
            ids,
            vec![
                "olm/operatorhub/prometheus/beta/0.37.0",
                "olm/operatorhub/prometheus/beta/0.47.0",
                "olm/operatorhub/etcd/beta/1.0.0",
            ]
        );
        assert_eq!(api.lookups, vec!["prometheus", "etcd"]);
        assert_eq!(
            entities[0].property(crate::entity::PROPERTY_DEFAULT_CHANNEL),
            Some("beta")
        );
    }

    #[tokio::test]
    async fn test_interleaved_packages_keep_every_bundle() {
        let mut api = FakeApi::new(vec![
            Ok(bundle("prometheus", "0.37.0")),
            Ok(bundle("etcd", "1.0.0")),
            Ok(bundle("prometheus", "0.47.0")),
            Ok(bundle("etcd", "1.1.0")),
        ]);
        let entities = fetch_entities(&mut api, "olm/operatorhub").await.unwrap();

        assert_eq!(entities.len(), 4);
        assert_eq!(entities[2].id(), "olm/operatorhub/prometheus/beta/0.47.0");
        assert_eq!(entities[3].id(), "olm/operatorhub/etcd/beta/1.1.0");
        assert_eq!(api.lookups, vec!["prometheus", "etcd"]);
    }

    #[tokio::test]
    async fn test_stream_error_discards_partial_results() {
        let mut api = FakeApi::new(vec![
            Ok(bundle("prometheus", "0.37.0")),
            Err(Error::Rpc("connection reset".to_string())),
            Ok(bundle("etcd", "1.0.0")),
        ]);
        let err = fetch_entities(&mut api, "olm/operatorhub").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to read bundle stream: connection reset"
        );
    }

    #[tokio::test]
    async fn test_package_lookup_error() {
        let mut api = FakeApi::new(vec![Ok(bundle("missing", "1.0.0"))]);
        let err = fetch_entities(&mut api, "olm/operatorhub").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to get package missing: package missing not found"
        );
    }

    #[tokio::test]
    async fn test_listing_error() {
        let mut api = FakeApi::new(Vec::new());
        api.fail_listing = true;
        let err = fetch_entities(&mut api, "olm/operatorhub").await.unwrap_err();
        assert_eq!(err.to_string(), "ListBundles failed: unavailable");
    }

    #[tokio::test]
    async fn test_conversion_error_fails_fetch() {
        let mut broken = bundle("etcd", "1.0.0");
        broken.provided_apis = Vec::new();
        broken.dependencies = vec![api::Dependency {
            r#type: "olm.gvk".to_string(),
            value: "not json".to_string(),
        }];
        let mut api = FakeApi::new(vec![Ok(bundle("prometheus", "0.47.0")), Ok(broken)]);
        let err = fetch_entities(&mut api, "olm/operatorhub").await.unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let mut api = FakeApi::new(Vec::new());
        let entities = fetch_entities(&mut api, "olm/operatorhub").await.unwrap();
        assert!(entities.is_empty());
        assert!(api.lookups.is_empty());
    }
}
