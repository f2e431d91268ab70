// src/entity/properties.rs

//! Typed forms of the well-known entity properties

use serde::{Deserialize, Serialize};
use std::fmt;

/// `olm.package` value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProperty {
    pub package_name: String,
    pub version: String,
}

/// `olm.channel` value: channel membership plus upgrade edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProperties {
    pub channel_name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replaces: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub skip_range: String,
}

/// Provided API kind (element of `olm.gvk`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub kind: String,
    pub version: String,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group:\"{}\" version:\"{}\" kind:\"{}\"",
            self.group, self.version, self.kind
        )
    }
}

/// Required API kind (element of `olm.gvk.required`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GvkRequired {
    pub group: String,
    pub kind: String,
    pub version: String,
}

impl GvkRequired {
    /// The provided kind that satisfies this requirement
    pub fn as_gvk(&self) -> Gvk {
        Gvk {
            group: self.group.clone(),
            kind: self.kind.clone(),
            version: self.version.clone(),
        }
    }
}

impl fmt::Display for GvkRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_gvk().fmt(f)
    }
}

/// Required package (element of `olm.package.required`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequired {
    pub package_name: String,
    pub version_range: String,
}
