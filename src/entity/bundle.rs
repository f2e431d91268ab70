// src/entity/bundle.rs

//! Typed, lazily decoded view over a bundle entity
//!
//! Each accessor decodes its property on first use and keeps the result, so
//! repeated lookups during resolution do not re-parse JSON. Failed decodes
//! are not cached and report the entity id, property key and raw value.

use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use semver::Version;
use serde::de::DeserializeOwned;

use super::properties::{ChannelProperties, Gvk, GvkRequired, PackageProperty, PackageRequired};
use super::version_range::VersionRange;
use super::{
    Entity, PROPERTY_BUNDLE_MEDIA_TYPE, PROPERTY_BUNDLE_PATH, PROPERTY_CHANNEL,
    PROPERTY_DEFAULT_CHANNEL, PROPERTY_GVK, PROPERTY_GVK_REQUIRED, PROPERTY_PACKAGE,
    PROPERTY_PACKAGE_REQUIRED,
};
use crate::error::{Error, Result};

/// A required package with its range already parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequirement {
    pub package_name: String,
    pub version_range: VersionRange,
}

/// Entity wrapper exposing the well-known bundle properties
#[derive(Debug)]
pub struct BundleEntity {
    entity: Arc<Entity>,
    package: OnceLock<(PackageProperty, Version)>,
    provided_gvks: OnceLock<Vec<Gvk>>,
    required_gvks: OnceLock<Vec<GvkRequired>>,
    required_packages: OnceLock<Vec<PackageRequirement>>,
    channel: OnceLock<ChannelProperties>,
    bundle_path: OnceLock<String>,
}

impl BundleEntity {
    /// Wrap a shared entity
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            package: OnceLock::new(),
            provided_gvks: OnceLock::new(),
            required_gvks: OnceLock::new(),
            required_packages: OnceLock::new(),
            channel: OnceLock::new(),
            bundle_path: OnceLock::new(),
        }
    }

    /// The wrapped entity
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Package name from `olm.package`
    pub fn package_name(&self) -> Result<&str> {
        Ok(&self.load_package()?.0.package_name)
    }

    /// Semantic version from `olm.package`
    pub fn version(&self) -> Result<&Version> {
        Ok(&self.load_package()?.1)
    }

    /// Provided API kinds from `olm.gvk`
    pub fn provided_gvks(&self) -> Result<&[Gvk]> {
        if let Some(gvks) = self.provided_gvks.get() {
            return Ok(gvks);
        }
        let gvks = self.required_property::<Vec<Gvk>>(PROPERTY_GVK, "bundle provided gvks")?;
        Ok(self.provided_gvks.get_or_init(|| gvks))
    }

    /// Required API kinds from `olm.gvk.required`
    pub fn required_gvks(&self) -> Result<&[GvkRequired]> {
        if let Some(gvks) = self.required_gvks.get() {
            return Ok(gvks);
        }
        let gvks = self
            .required_property::<Vec<GvkRequired>>(PROPERTY_GVK_REQUIRED, "bundle required gvks")?;
        Ok(self.required_gvks.get_or_init(|| gvks))
    }

    /// Required packages with parsed version ranges
    pub fn required_packages(&self) -> Result<&[PackageRequirement]> {
        if let Some(packages) = self.required_packages.get() {
            return Ok(packages);
        }
        let raw = self.required_property::<Vec<PackageRequired>>(
            PROPERTY_PACKAGE_REQUIRED,
            "bundle required packages",
        )?;

        let mut packages = Vec::with_capacity(raw.len());
        for required in raw {
            let version_range = VersionRange::parse(&required.version_range).map_err(|e| {
                Error::InvalidVersionRange {
                    range: required.version_range.clone(),
                    reason: format!(
                        "required package '{}' of entity '{}': {e}",
                        required.package_name, self.entity.id
                    ),
                }
            })?;
            packages.push(PackageRequirement {
                package_name: required.package_name,
                version_range,
            });
        }
        Ok(self.required_packages.get_or_init(|| packages))
    }

    /// Channel name from `olm.channel`
    pub fn channel_name(&self) -> Result<&str> {
        Ok(&self.channel_properties()?.channel_name)
    }

    /// Channel membership and upgrade edges
    pub fn channel_properties(&self) -> Result<&ChannelProperties> {
        if let Some(channel) = self.channel.get() {
            return Ok(channel);
        }
        let channel = self.required_property::<ChannelProperties>(
            PROPERTY_CHANNEL,
            "bundle channel properties",
        )?;
        Ok(self.channel.get_or_init(|| channel))
    }

    /// Bundle image reference
    pub fn bundle_path(&self) -> Result<&str> {
        if let Some(path) = self.bundle_path.get() {
            return Ok(path);
        }
        let path = self.required_property::<String>(PROPERTY_BUNDLE_PATH, "bundle path")?;
        Ok(self.bundle_path.get_or_init(|| path))
    }

    /// Default channel of the owning package, stored as a raw string
    pub fn default_channel(&self) -> Option<&str> {
        self.entity.property(PROPERTY_DEFAULT_CHANNEL)
    }

    /// Bundle media type, when the catalog declares one
    pub fn media_type(&self) -> Result<Option<String>> {
        self.optional_property::<String>(PROPERTY_BUNDLE_MEDIA_TYPE, "bundle mediatype")
    }

    fn load_package(&self) -> Result<&(PackageProperty, Version)> {
        if let Some(package) = self.package.get() {
            return Ok(package);
        }
        let package = self.required_property::<PackageProperty>(PROPERTY_PACKAGE, "package")?;
        let version = Version::parse(&package.version).map_err(|e| Error::InvalidVersion {
            entity: self.entity.id.clone(),
            version: package.version.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.package.get_or_init(|| (package, version)))
    }

    fn required_property<T: DeserializeOwned>(&self, key: &str, context: &'static str) -> Result<T> {
        self.optional_property(key, context)?
            .ok_or_else(|| Error::PropertyNotFound {
                entity: self.entity.id.clone(),
                key: key.to_string(),
                context,
            })
    }

    fn optional_property<T: DeserializeOwned>(
        &self,
        key: &str,
        context: &'static str,
    ) -> Result<Option<T>> {
        let Some(raw) = self.entity.property(key) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| Error::PropertyParse {
                entity: self.entity.id.clone(),
                key: key.to_string(),
                value: raw.to_string(),
                context,
                reason: e.to_string(),
            })
    }
}

impl Deref for BundleEntity {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl Clone for BundleEntity {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.entity))
    }
}

impl PartialEq for BundleEntity {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
    }
}

impl Eq for BundleEntity {}

impl From<Entity> for BundleEntity {
    fn from(entity: Entity) -> Self {
        Self::new(Arc::new(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(properties: &[(&str, &str)]) -> BundleEntity {
        BundleEntity::from(Entity::new(
            "operatorhub/prometheus/beta/0.47.0",
            properties.iter().copied(),
        ))
    }

    #[test]
    fn test_package_name_and_version() {
        let b = bundle(&[(
            PROPERTY_PACKAGE,
            r#"{"packageName":"prometheus","version":"0.47.0"}"#,
        )]);
        assert_eq!(b.package_name().unwrap(), "prometheus");
        assert_eq!(b.version().unwrap(), &Version::new(0, 47, 0));
    }

    #[test]
    fn test_missing_package() {
        let b = bundle(&[]);
        let err = b.package_name().unwrap_err();
        assert_eq!(
            err.to_string(),
            "error determining package for entity 'operatorhub/prometheus/beta/0.47.0': required property 'olm.package' not found"
        );
    }

    #[test]
    fn test_malformed_package() {
        let b = bundle(&[(PROPERTY_PACKAGE, "badPackageNameStructure")]);
        let msg = b.package_name().unwrap_err().to_string();
        assert!(msg.contains("operatorhub/prometheus/beta/0.47.0"));
        assert!(msg.contains("property 'olm.package' ('badPackageNameStructure') could not be parsed"));
    }

    #[test]
    fn test_invalid_semver() {
        let b = bundle(&[(
            PROPERTY_PACKAGE,
            r#"{"packageName":"prometheus","version":"badversion"}"#,
        )]);
        assert!(b.package_name().is_err());
        let err = b.version().unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
        assert!(err.to_string().starts_with("could not parse semver (badversion)"));
    }

    #[test]
    fn test_provided_gvks() {
        let b = bundle(&[(
            PROPERTY_GVK,
            r#"[{"group":"foo.io","kind":"Foo","version":"v1"},{"group":"bar.io","kind":"Bar","version":"v1alpha1"}]"#,
        )]);
        let gvks = b.provided_gvks().unwrap();
        assert_eq!(gvks.len(), 2);
        assert_eq!(gvks[0].group, "foo.io");
        assert_eq!(gvks[1].kind, "Bar");
    }

    #[test]
    fn test_missing_list_properties_fail() {
        let b = bundle(&[]);
        let errors = [
            b.provided_gvks().map(|_| ()).unwrap_err(),
            b.required_gvks().map(|_| ()).unwrap_err(),
            b.required_packages().map(|_| ()).unwrap_err(),
        ];
        for err in &errors {
            assert!(matches!(err, Error::PropertyNotFound { .. }), "{err}");
        }
        assert_eq!(
            errors[0].to_string(),
            "error determining bundle provided gvks for entity 'operatorhub/prometheus/beta/0.47.0': required property 'olm.gvk' not found"
        );
        assert!(errors[1].to_string().contains("required property 'olm.gvk.required' not found"));
        assert!(errors[2].to_string().contains("required property 'olm.package.required' not found"));
    }

    #[test]
    fn test_empty_list_properties() {
        let b = bundle(&[
            (PROPERTY_GVK, "[]"),
            (PROPERTY_GVK_REQUIRED, "[]"),
            (PROPERTY_PACKAGE_REQUIRED, "[]"),
        ]);
        assert!(b.provided_gvks().unwrap().is_empty());
        assert!(b.required_gvks().unwrap().is_empty());
        assert!(b.required_packages().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_required_gvks() {
        let b = bundle(&[(PROPERTY_GVK_REQUIRED, "{}")]);
        let msg = b.required_gvks().unwrap_err().to_string();
        assert!(msg.contains("'olm.gvk.required' ('{}') could not be parsed"));
    }

    #[test]
    fn test_required_packages() {
        let b = bundle(&[(
            PROPERTY_PACKAGE_REQUIRED,
            r#"[{"packageName":"etcd","versionRange":">=1.0.0 <2.0.0"}]"#,
        )]);
        let required = b.required_packages().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].package_name, "etcd");
        assert!(required[0].version_range.matches(&Version::new(1, 5, 0)));
        assert!(!required[0].version_range.matches(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_required_packages_bad_range() {
        let b = bundle(&[(
            PROPERTY_PACKAGE_REQUIRED,
            r#"[{"packageName":"etcd","versionRange":"garbage"}]"#,
        )]);
        let msg = b.required_packages().unwrap_err().to_string();
        assert!(msg.contains("operatorhub/prometheus/beta/0.47.0"));
    }

    #[test]
    fn test_channel_properties() {
        let b = bundle(&[(
            PROPERTY_CHANNEL,
            r#"{"channelName":"beta","priority":0,"replaces":"prometheus.0.37.0","skips":["prometheus.0.36.0"],"skipRange":"<0.37.0"}"#,
        )]);
        assert_eq!(b.channel_name().unwrap(), "beta");
        let channel = b.channel_properties().unwrap();
        assert_eq!(channel.replaces, "prometheus.0.37.0");
        assert_eq!(channel.skips, vec!["prometheus.0.36.0".to_string()]);
        assert_eq!(channel.skip_range, "<0.37.0");
    }

    #[test]
    fn test_missing_channel() {
        let b = bundle(&[]);
        let msg = b.channel_name().unwrap_err().to_string();
        assert!(msg.contains("required property 'olm.channel' not found"));
    }

    #[test]
    fn test_bundle_path() {
        let b = bundle(&[(PROPERTY_BUNDLE_PATH, r#""foo.io/bar/baz""#)]);
        assert_eq!(b.bundle_path().unwrap(), "foo.io/bar/baz");

        let raw = bundle(&[(PROPERTY_BUNDLE_PATH, "foo.io/bar/baz")]);
        assert!(raw.bundle_path().is_err());
    }

    #[test]
    fn test_default_channel_and_media_type() {
        let b = bundle(&[
            (PROPERTY_DEFAULT_CHANNEL, "stable"),
            (PROPERTY_BUNDLE_MEDIA_TYPE, r#""plain+v0""#),
        ]);
        assert_eq!(b.default_channel(), Some("stable"));
        assert_eq!(b.media_type().unwrap(), Some("plain+v0".to_string()));
        assert_eq!(bundle(&[]).media_type().unwrap(), None);
    }

    #[test]
    fn test_clone_and_equality() {
        let b = bundle(&[(PROPERTY_BUNDLE_PATH, r#""foo.io/bar/baz""#)]);
        let _ = b.bundle_path().unwrap();
        let c = b.clone();
        assert_eq!(b, c);
        assert_eq!(c.id(), "operatorhub/prometheus/beta/0.47.0");
    }
}
