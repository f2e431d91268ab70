// src/source/mod.rs

//! Entity query contract
//!
//! [`EntitySource`] is what resolution reads from: the live cache implements
//! it, and [`CacheQuerier`] implements it over a fixed set of entities for
//! tests and one-shot runs.

pub mod predicates;
mod querier;
pub mod sort;

pub use querier::CacheQuerier;

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::Result;

/// Entities returned by a query
pub type EntityList = Vec<Arc<Entity>>;

/// Entities grouped by key
pub type EntityListMap = HashMap<String, EntityList>;

/// Read access to a collection of entities
///
/// Implementations scan every entity on each call; there is no indexing.
pub trait EntitySource: Send + Sync {
    /// Entity with the given id
    fn get(&self, id: &str) -> Option<Arc<Entity>>;

    /// Entities matching the predicate
    fn filter(&self, predicate: &dyn Fn(&Entity) -> bool) -> Result<EntityList>;

    /// Entities grouped under every key the function returns for them
    fn group_by(&self, key: &dyn Fn(&Entity) -> Vec<String>) -> Result<EntityListMap>;

    /// Visit every entity, stopping at the first error
    fn iterate(&self, visitor: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()>;
}

impl<T: EntitySource + ?Sized> EntitySource for Arc<T> {
    fn get(&self, id: &str) -> Option<Arc<Entity>> {
        (**self).get(id)
    }

    fn filter(&self, predicate: &dyn Fn(&Entity) -> bool) -> Result<EntityList> {
        (**self).filter(predicate)
    }

    fn group_by(&self, key: &dyn Fn(&Entity) -> Vec<String>) -> Result<EntityListMap> {
        (**self).group_by(key)
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        (**self).iterate(visitor)
    }
}

/// Add an entity under each of its group keys
pub(crate) fn group_into(
    groups: &mut EntityListMap,
    entity: &Arc<Entity>,
    key: &dyn Fn(&Entity) -> Vec<String>,
) {
    for k in key(entity.as_ref()) {
        groups.entry(k).or_default().push(Arc::clone(entity));
    }
}
