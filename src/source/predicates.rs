// src/source/predicates.rs

//! Entity predicates for [`EntitySource::filter`](super::EntitySource::filter)
//!
//! Entities whose properties cannot be decoded never match. Predicates own
//! their arguments and are `'static`.

use semver::Version;
use serde::de::DeserializeOwned;

use crate::entity::{
    ChannelProperties, Entity, Gvk, PROPERTY_BUNDLE_PATH, PROPERTY_CHANNEL, PROPERTY_GVK,
    PROPERTY_PACKAGE, PackageProperty, VersionRange,
};

fn decode<T: DeserializeOwned>(entity: &Entity, key: &str) -> Option<T> {
    serde_json::from_str(entity.property(key)?).ok()
}

fn package(entity: &Entity) -> Option<PackageProperty> {
    decode(entity, PROPERTY_PACKAGE)
}

/// Bundles of the named package
pub fn with_package_name(name: &str) -> impl Fn(&Entity) -> bool + Send + Sync + use<> {
    let name = name.to_string();
    move |entity| package(entity).is_some_and(|p| p.package_name == name)
}

/// Bundles whose version falls inside the range
pub fn in_semver_range(range: VersionRange) -> impl Fn(&Entity) -> bool + Send + Sync {
    move |entity| {
        package(entity)
            .and_then(|p| Version::parse(&p.version).ok())
            .is_some_and(|v| range.matches(&v))
    }
}

/// Bundles in the named channel
pub fn in_channel(channel: &str) -> impl Fn(&Entity) -> bool + Send + Sync + use<> {
    let channel = channel.to_string();
    move |entity| {
        decode::<ChannelProperties>(entity, PROPERTY_CHANNEL)
            .is_some_and(|c| c.channel_name == channel)
    }
}

/// Bundles that provide the API kind
pub fn provides_gvk(gvk: Gvk) -> impl Fn(&Entity) -> bool + Send + Sync {
    move |entity| {
        decode::<Vec<Gvk>>(entity, PROPERTY_GVK).is_some_and(|provided| provided.contains(&gvk))
    }
}

/// Bundles built from the given image
pub fn with_bundle_path(path: &str) -> impl Fn(&Entity) -> bool + Send + Sync + use<> {
    let path = path.to_string();
    move |entity| decode::<String>(entity, PROPERTY_BUNDLE_PATH).is_some_and(|p| p == path)
}

/// Bundles matching every predicate
pub fn and(
    predicates: Vec<Box<dyn Fn(&Entity) -> bool + Send + Sync>>,
) -> impl Fn(&Entity) -> bool + Send + Sync {
    move |entity| predicates.iter().all(|p| p(entity))
}
