// src/lib.rs

//! Operator Catalog
//!
//! Catalog source synchronization and resolution input for an operator
//! lifecycle manager.
//!
//! # Architecture
//!
//! - Registry client: streams bundles from each catalog registry over gRPC
//! - Entity codec: canonical property-bag entities, one per bundle and channel
//! - Entity cache: per-source snapshots kept fresh by a watch and a delay queue
//! - Resolver: turns install requests into solver variables and selects bundles

pub mod cache;
pub mod catalog;
pub mod config;
pub mod entity;
mod error;
pub mod registry;
pub mod resolution;
pub mod source;

pub use cache::{CacheConfig, CacheEvent, CacheState, EntityCache, EventKind};
pub use catalog::{CatalogSource, CatalogSourceStore, InMemoryCatalogSourceStore, WatchEvent};
pub use config::CatalogConfig;
pub use entity::{BundleEntity, Entity, VersionRange, entity_from_bundle};
pub use error::{Error, Result};
pub use registry::{GrpcRegistryClient, ProxyConfig, RegistryClient};
pub use resolution::{
    InMemoryInstallRequestStore, InstallRequest, InstallRequestStore, OperatorResolver, Solution,
    bundle_for_package,
};
pub use source::{CacheQuerier, EntityList, EntityListMap, EntitySource};
