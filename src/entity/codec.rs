// src/entity/codec.rs

//! Bundle to entity conversion
//!
//! Conversion is deterministic: multi-valued properties are canonicalized,
//! deduplicated and sorted by their serialized form, and JSON objects are
//! re-serialized with sorted keys. Converting the same bundle twice yields
//! byte-identical entities regardless of the order properties arrived in.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::properties::{ChannelProperties, Gvk, GvkRequired, PackageProperty, PackageRequired};
use super::{
    Entity, PROPERTY_BUNDLE_OBJECT, PROPERTY_BUNDLE_PATH, PROPERTY_CHANNEL,
    PROPERTY_DEFAULT_CHANNEL, PROPERTY_GVK, PROPERTY_GVK_REQUIRED, PROPERTY_LABEL,
    PROPERTY_LABEL_REQUIRED, PROPERTY_PACKAGE, PROPERTY_PACKAGE_REQUIRED,
};
use crate::error::{Error, Result};
use crate::registry::api::{Bundle, Package};

/// Convert one registry bundle into an entity
///
/// `source_id` is the `namespace/name` of the catalog source the bundle came
/// from. Any property that cannot be encoded fails the whole conversion; the
/// error names the bundle, the source, and every offending property.
pub fn entity_from_bundle(source_id: &str, package: &Package, bundle: &Bundle) -> Result<Entity> {
    let mut errors = Vec::new();
    let raw_properties = bundle_properties(bundle, &mut errors);

    let mut properties = BTreeMap::new();
    let mut multi_valued: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (property_type, raw_value) in raw_properties {
        match property_type.as_str() {
            PROPERTY_BUNDLE_OBJECT => {
                // only metadata is needed for resolution
            }
            PROPERTY_PACKAGE => match canonical_json(&raw_value) {
                Some(encoded) => {
                    properties.insert(property_type, encoded);
                }
                None => errors.push(format!(
                    "property {PROPERTY_PACKAGE} is not valid JSON: {raw_value}"
                )),
            },
            _ => match canonical_json(&raw_value) {
                Some(encoded) => {
                    multi_valued.entry(property_type).or_default().insert(encoded);
                }
                None => errors.push(format!(
                    "property {property_type} is not valid JSON: {raw_value}"
                )),
            },
        }
    }

    // sets of serialized values are already deduplicated and sorted
    for (property_type, values) in multi_valued {
        let elements: Vec<&str> = values.iter().map(String::as_str).collect();
        properties.insert(property_type, format!("[{}]", elements.join(",")));
    }

    let channel = ChannelProperties {
        channel_name: bundle.channel_name.clone(),
        priority: 0,
        replaces: bundle.replaces.clone(),
        skips: bundle.skips.clone(),
        skip_range: bundle.skip_range.clone(),
    };
    match serde_json::to_string(&channel) {
        Ok(encoded) => {
            properties.insert(PROPERTY_CHANNEL.to_string(), encoded);
        }
        Err(e) => errors.push(format!("property {PROPERTY_CHANNEL}: {e}")),
    }

    properties.insert(
        PROPERTY_DEFAULT_CHANNEL.to_string(),
        package.default_channel_name.clone(),
    );
    properties.insert(
        PROPERTY_BUNDLE_PATH.to_string(),
        json_string(&bundle.bundle_path),
    );

    if !errors.is_empty() {
        return Err(Error::Conversion {
            bundle: format!("{}/{}", bundle.package_name, bundle.version),
            source_id: source_id.to_string(),
            reason: errors.join(", "),
        });
    }

    // Multiple instances of a bundle exist across channels, so the id carries the channel
    let id = format!(
        "{}/{}/{}/{}",
        source_id, bundle.package_name, bundle.channel_name, bundle.version
    );
    Ok(Entity { id, properties })
}

/// Flatten explicit properties, legacy API fields and legacy dependencies
/// into `(type, raw JSON value)` pairs
fn bundle_properties(bundle: &Bundle, errors: &mut Vec<String>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut provided: BTreeSet<Gvk> = BTreeSet::new();
    let mut required: BTreeSet<GvkRequired> = BTreeSet::new();

    for (i, property) in bundle.properties.iter().enumerate() {
        match property.r#type.as_str() {
            PROPERTY_GVK => match serde_json::from_str::<Gvk>(&property.value) {
                Ok(gvk) => {
                    provided.insert(gvk);
                }
                Err(e) => errors.push(format!("property {i}: {e}")),
            },
            // always rebuilt from the bundle's own name and version
            PROPERTY_PACKAGE => {}
            _ => out.push((property.r#type.clone(), property.value.clone())),
        }
    }

    for (i, dependency) in bundle.dependencies.iter().enumerate() {
        match dependency.r#type.as_str() {
            PROPERTY_GVK => match serde_json::from_str::<GvkRequired>(&dependency.value) {
                Ok(gvk) => {
                    required.insert(gvk);
                }
                Err(e) => errors.push(format!("dependency {i}: {e}")),
            },
            PROPERTY_PACKAGE => match serde_json::from_str::<PackageProperty>(&dependency.value) {
                Ok(dep) => {
                    let requirement = PackageRequired {
                        package_name: dep.package_name,
                        version_range: dep.version,
                    };
                    match serde_json::to_string(&requirement) {
                        Ok(value) => out.push((PROPERTY_PACKAGE_REQUIRED.to_string(), value)),
                        Err(e) => errors.push(format!("dependency {i}: {e}")),
                    }
                }
                Err(e) => errors.push(format!("dependency {i}: {e}")),
            },
            PROPERTY_LABEL => {
                out.push((PROPERTY_LABEL_REQUIRED.to_string(), dependency.value.clone()))
            }
            other => out.push((other.to_string(), dependency.value.clone())),
        }
    }

    let package = PackageProperty {
        package_name: bundle.package_name.clone(),
        version: bundle.version.clone(),
    };
    match serde_json::to_string(&package) {
        Ok(value) => out.push((PROPERTY_PACKAGE.to_string(), value)),
        Err(e) => errors.push(format!("property {PROPERTY_PACKAGE}: {e}")),
    }

    for api in &bundle.provided_apis {
        provided.insert(Gvk {
            group: api.group.clone(),
            kind: api.kind.clone(),
            version: api.version.clone(),
        });
    }
    for api in &bundle.required_apis {
        required.insert(GvkRequired {
            group: api.group.clone(),
            kind: api.kind.clone(),
            version: api.version.clone(),
        });
    }

    for gvk in provided {
        match serde_json::to_string(&gvk) {
            Ok(value) => out.push((PROPERTY_GVK.to_string(), value)),
            Err(e) => errors.push(format!("property {PROPERTY_GVK}: {e}")),
        }
    }
    for gvk in required {
        match serde_json::to_string(&gvk) {
            Ok(value) => out.push((PROPERTY_GVK_REQUIRED.to_string(), value)),
            Err(e) => errors.push(format!("property {PROPERTY_GVK_REQUIRED}: {e}")),
        }
    }

    out
}

/// Parse and re-serialize a JSON document with sorted keys and no whitespace
fn canonical_json(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    serde_json::to_string(&value).ok()
}

fn json_string(raw: &str) -> String {
    Value::String(raw.to_string()).to_string()
}
