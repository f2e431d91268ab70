// tests/catalog_resolution.rs

//! End-to-end catalog sync and resolution tests.

mod common;

use std::sync::Arc;

use common::{Catalog, FakeRegistry, bundle, next_event};
use operator_catalog::cache::{REASON_CACHE_UPDATED, REASON_CACHE_UPDATE_FAILED};
use operator_catalog::source::predicates::with_package_name;
use operator_catalog::{
    CacheConfig, CacheState, CatalogSource, EntityCache, EntitySource, EventKind,
    InMemoryCatalogSourceStore, InMemoryInstallRequestStore, InstallRequest, OperatorResolver,
    bundle_for_package,
};
use tokio_util::sync::CancellationToken;

const MONITORING: &str = "monitoring.coreos.com";

fn operatorhub() -> Catalog {
    Catalog::new(vec![
        bundle(
            "prometheus",
            "0.37.0",
            &[(MONITORING, "v1", "Alertmanager"), (MONITORING, "v1", "Prometheus")],
        ),
        bundle(
            "prometheus",
            "0.47.0",
            &[(MONITORING, "v1", "Alertmanager"), (MONITORING, "v1alpha1", "Prometheus")],
        ),
        bundle("packageA", "2.0.0", &[("foo.io", "v1", "Foo")]),
    ])
}

struct Harness {
    registry: Arc<FakeRegistry>,
    store: Arc<InMemoryCatalogSourceStore>,
    cache: Arc<EntityCache>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(sources: Vec<CatalogSource>) -> Self {
        let registry = FakeRegistry::new();
        let store = Arc::new(InMemoryCatalogSourceStore::with_sources(sources));
        let cache = Arc::new(EntityCache::new(
            registry.clone(),
            store.clone(),
            CacheConfig::default(),
        ));
        Self {
            registry,
            store,
            cache,
            cancel: CancellationToken::new(),
        }
    }

    fn resolver(&self, requests: Vec<InstallRequest>) -> OperatorResolver {
        let entities: Arc<dyn EntitySource> = self.cache.clone();
        OperatorResolver::with_default_solver(
            Arc::new(InMemoryInstallRequestStore::new(requests)),
            entities,
        )
    }
}

#[tokio::test]
async fn test_sync_then_resolve() {
    let harness = Harness::new(vec![CatalogSource::new("operatorhub", "olm", "hub:50051")]);
    harness.registry.serve("hub:50051", operatorhub());

    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();
    assert_eq!(harness.cache.sources(), vec!["olm/operatorhub"]);
    assert_eq!(harness.cache.entity_count(), 3);

    let solution = harness
        .resolver(vec![
            InstallRequest::new("prometheus", "prometheus"),
            InstallRequest::new("packageA", "packageA"),
        ])
        .resolve()
        .await
        .unwrap();
    assert_eq!(solution.selected_variables().len(), 4);

    let prometheus = bundle_for_package(&solution, "prometheus").unwrap().unwrap();
    assert_eq!(prometheus.id(), "olm/operatorhub/prometheus/beta/0.47.0");
    assert_eq!(prometheus.bundle_path().unwrap(), "quay.io/prometheus/prometheus:v0.47.0");

    harness.cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_duplicate_requests_fail() {
    let harness = Harness::new(vec![CatalogSource::new("operatorhub", "olm", "hub:50051")]);
    harness.registry.serve("hub:50051", operatorhub());
    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();

    let err = harness
        .resolver(vec![
            InstallRequest::new("first", "prometheus"),
            InstallRequest::new("second", "prometheus"),
        ])
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "duplicate identifier \"required package prometheus\" in input"
    );

    harness.cache.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(harness.cache.state(), CacheState::Stopped);
}

#[tokio::test]
async fn test_unknown_package_not_found() {
    let harness = Harness::new(vec![CatalogSource::new("operatorhub", "olm", "hub:50051")]);
    harness.registry.serve("hub:50051", operatorhub());
    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();

    let err = harness
        .resolver(vec![InstallRequest::new("ghost", "ghost")])
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "package 'ghost' not found");

    harness.cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_source_does_not_hide_others() {
    let harness = Harness::new(vec![
        CatalogSource::new("operatorhub", "olm", "hub:50051"),
        CatalogSource::new("broken", "olm", "broken:50051"),
    ]);
    harness.registry.serve("hub:50051", operatorhub());
    harness.registry.fail("broken:50051", "boom");

    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();
    assert_eq!(harness.cache.sources(), vec!["olm/operatorhub"]);

    let solution = harness
        .resolver(vec![InstallRequest::new("packageA", "packageA")])
        .resolve()
        .await
        .unwrap();
    assert!(solution.is_selected("olm/operatorhub/packageA/beta/2.0.0"));

    harness.cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_registration_changes_flow_into_resolution() {
    let harness = Harness::new(Vec::new());
    harness.registry.serve("hub:50051", operatorhub());
    harness.registry.serve(
        "extra:50051",
        Catalog::new(vec![bundle("etcd", "0.9.4", &[("etcd.database.coreos.com", "v1", "EtcdCluster")])]),
    );

    let mut events = harness.cache.subscribe();
    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();
    assert_eq!(harness.cache.entity_count(), 0);

    harness
        .store
        .apply(CatalogSource::new("extra", "olm", "extra:50051"));
    let event = next_event(&mut events).await;
    assert_eq!(event.kind, EventKind::Normal);
    assert_eq!(event.reason, REASON_CACHE_UPDATED);
    assert_eq!(event.message, "Successfully updated bundle cache from olm/extra");

    let etcd = harness.cache.filter(&with_package_name("etcd")).unwrap();
    assert_eq!(etcd.len(), 1);

    let solution = harness
        .resolver(vec![InstallRequest::new("etcd", "etcd")])
        .resolve()
        .await
        .unwrap();
    assert!(solution.is_selected("olm/extra/etcd/beta/0.9.4"));

    harness.store.delete("olm/extra");
    // the delete is applied by the cache loop; wait for it via a follow-up sync
    harness.registry.fail("broken:50051", "boom");
    harness
        .store
        .apply(CatalogSource::new("broken", "olm", "broken:50051"));
    let event = next_event(&mut events).await;
    assert_eq!(event.kind, EventKind::Warning);
    assert_eq!(event.reason, REASON_CACHE_UPDATE_FAILED);
    assert!(event.message.contains("boom"));

    assert!(harness.cache.filter(&with_package_name("etcd")).unwrap().is_empty());
    let err = harness
        .resolver(vec![InstallRequest::new("etcd", "etcd")])
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "package 'etcd' not found");

    harness.cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(harness.registry.calls("extra:50051"), 1);
}

#[tokio::test]
async fn test_managed_source_uses_service_address() {
    use operator_catalog::catalog::RegistryService;

    let source = CatalogSource::new("community", "olm", "").with_service(RegistryService {
        name: "community".to_string(),
        namespace: "olm".to_string(),
        port: 50051,
    });
    let harness = Harness::new(vec![source]);
    harness.registry.serve("community.olm.svc:50051", operatorhub());

    let handle = harness.cache.spawn(harness.cancel.clone());
    harness.cache.wait_until_serving().await.unwrap();
    assert_eq!(harness.cache.entity_count(), 3);
    assert_eq!(harness.registry.calls("community.olm.svc:50051"), 1);

    harness.cancel.cancel();
    handle.await.unwrap().unwrap();
}
