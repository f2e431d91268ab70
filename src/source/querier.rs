// src/source/querier.rs

//! Entity source over a fixed set of entities

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{EntityList, EntityListMap, EntitySource, group_into};
use crate::entity::Entity;
use crate::error::Result;

/// Static, id-ordered entity source
#[derive(Debug, Clone, Default)]
pub struct CacheQuerier {
    entities: BTreeMap<String, Arc<Entity>>,
}

impl CacheQuerier {
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|e| (e.id.clone(), Arc::new(e)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntitySource for CacheQuerier {
    fn get(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities.get(id).cloned()
    }

    fn filter(&self, predicate: &dyn Fn(&Entity) -> bool) -> Result<EntityList> {
        Ok(self
            .entities
            .values()
            .filter(|e| predicate(e.as_ref()))
            .cloned()
            .collect())
    }

    fn group_by(&self, key: &dyn Fn(&Entity) -> Vec<String>) -> Result<EntityListMap> {
        let mut groups = EntityListMap::new();
        for entity in self.entities.values() {
            group_into(&mut groups, entity, key);
        }
        Ok(groups)
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        self.entities
            .values()
            .try_for_each(|e| visitor(e.as_ref()))
    }
}
