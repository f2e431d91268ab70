// src/source/sort.rs

//! Candidate ordering for resolution
//!
//! Bundles are ordered by package name, then channel name, then version with
//! the highest first. Bundles whose package, channel or version cannot be
//! decoded sort after the ones that can.

use std::cmp::Reverse;
use std::sync::Arc;

use semver::Version;

use crate::entity::{BundleEntity, Entity};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Rank<T> {
    Known(T),
    Unknown,
}

impl<T> From<Option<T>> for Rank<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Rank::Unknown, Rank::Known)
    }
}

type SortKey = (
    Rank<String>,
    Rank<String>,
    Rank<Reverse<Version>>,
    String,
);

fn sort_key(entity: &Arc<Entity>) -> SortKey {
    let bundle = BundleEntity::new(Arc::clone(entity));
    let package = Rank::from(bundle.package_name().ok().map(str::to_string));
    let channel = Rank::from(bundle.channel_name().ok().map(str::to_string));
    let version = Rank::from(bundle.version().ok().cloned().map(Reverse));
    (package, channel, version, entity.id.clone())
}

/// Sort by package, channel, then descending version; ties by id
pub fn by_channel_and_version(entities: &mut [Arc<Entity>]) {
    entities.sort_by_cached_key(sort_key);
}
