// src/entity/mod.rs

//! Canonical bundle entities
//!
//! An [`Entity`] is the property-bag form of one bundle in one channel of one
//! catalog source. Property values are JSON strings keyed by well-known type
//! names, encoded deterministically so that identical catalog content always
//! produces identical entities.
//!
//! - [`entity_from_bundle`] converts registry bundles into entities
//! - [`BundleEntity`] decodes the well-known properties on demand
//! - [`VersionRange`] matches bundle versions against catalog range syntax

mod bundle;
mod codec;
mod properties;
mod version_range;

pub use bundle::{BundleEntity, PackageRequirement};
pub use codec::entity_from_bundle;
pub use properties::{ChannelProperties, Gvk, GvkRequired, PackageProperty, PackageRequired};
pub use version_range::VersionRange;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Package name and version: `{"packageName","version"}`
pub const PROPERTY_PACKAGE: &str = "olm.package";
/// Channel membership and upgrade edges
pub const PROPERTY_CHANNEL: &str = "olm.channel";
/// Provided API kinds (array)
pub const PROPERTY_GVK: &str = "olm.gvk";
/// Required API kinds (array)
pub const PROPERTY_GVK_REQUIRED: &str = "olm.gvk.required";
/// Required packages (array)
pub const PROPERTY_PACKAGE_REQUIRED: &str = "olm.package.required";
/// Required labels (array)
pub const PROPERTY_LABEL_REQUIRED: &str = "olm.label.required";
/// Label dependency type used by legacy bundles
pub const PROPERTY_LABEL: &str = "olm.label";
/// Default channel of the owning package (raw string, not JSON)
pub const PROPERTY_DEFAULT_CHANNEL: &str = "olm.package.defaultChannel";
/// Bundle image reference (JSON string)
pub const PROPERTY_BUNDLE_PATH: &str = "olm.bundle.path";
/// Bundle media type (JSON string)
pub const PROPERTY_BUNDLE_MEDIA_TYPE: &str = "olm.bundle.mediatype";
/// Embedded bundle manifests, never copied into entities
pub const PROPERTY_BUNDLE_OBJECT: &str = "olm.bundle.object";

/// Entity identifier: `providerID/packageName/channelName/version`
pub type EntityId = String;

/// Immutable property bag describing one bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier
    pub id: EntityId,
    /// Property type -> JSON encoded value
    pub properties: BTreeMap<String, String>,
}

impl Entity {
    /// Create an entity from an id and a set of properties
    pub fn new<I, K, V>(id: impl Into<EntityId>, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Entity identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw property value for a key
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether the entity carries a property with this key
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}
