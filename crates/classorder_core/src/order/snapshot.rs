//! In-memory ordered view of one container.
//!
//! # Responsibility
//! - Hold the top-level sequence and every group's nested sequence.
//! - Offer the read helpers the resolver needs and the write helpers the
//!   client mirror needs.
//!
//! # Invariants
//! - Every scope list is sorted ascending by `order_key`, ties by id.
//! - Every group present at top level has a (possibly empty) nested list.

use crate::model::entity::{ContainerId, Entity, EntityId, OrderVersion, Scope};
use crate::order::key::{rebalance_keys, OrderKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered snapshot of one container at one order version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    pub container_id: ContainerId,
    pub version: OrderVersion,
    top_level: Vec<Entity>,
    groups: BTreeMap<EntityId, Vec<Entity>>,
}

impl ContainerSnapshot {
    /// Builds a snapshot from entities in any order.
    pub fn from_entities(
        container_id: ContainerId,
        version: OrderVersion,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Self {
        let mut snapshot = Self {
            container_id,
            version,
            top_level: Vec::new(),
            groups: BTreeMap::new(),
        };
        for entity in entities {
            if entity.is_group() {
                snapshot.groups.entry(entity.id).or_default();
            }
            snapshot.scope_list_mut(entity.scope()).push(entity);
        }
        sort_scope(&mut snapshot.top_level);
        for tasks in snapshot.groups.values_mut() {
            sort_scope(tasks);
        }
        snapshot
    }

    /// Top-level tasks and groups in display order.
    pub fn top_level(&self) -> &[Entity] {
        &self.top_level
    }

    /// Entities of one scope in display order; empty for unknown groups.
    pub fn scope_entities(&self, scope: Scope) -> &[Entity] {
        match scope {
            Scope::TopLevel => &self.top_level,
            Scope::Group(group_id) => self
                .groups
                .get(&group_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Ids of one scope in display order.
    pub fn scope_ids(&self, scope: Scope) -> Vec<EntityId> {
        self.scope_entities(scope)
            .iter()
            .map(|entity| entity.id)
            .collect()
    }

    /// Every scope present in this snapshot, top level first.
    pub fn scopes(&self) -> Vec<Scope> {
        std::iter::once(Scope::TopLevel)
            .chain(self.groups.keys().copied().map(Scope::Group))
            .collect()
    }

    pub fn find(&self, id: EntityId) -> Option<&Entity> {
        self.top_level
            .iter()
            .chain(self.groups.values().flatten())
            .find(|entity| entity.id == id)
    }

    pub fn len(&self) -> usize {
        self.top_level.len() + self.groups.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `entity` into its scope, replacing any previous copy by id.
    pub fn upsert(&mut self, entity: Entity) {
        self.remove(entity.id);
        if entity.is_group() {
            self.groups.entry(entity.id).or_default();
        }
        let scope = entity.scope();
        let list = self.scope_list_mut(scope);
        let index = list.partition_point(|current| sort_key(current) < sort_key(&entity));
        list.insert(index, entity);
    }

    /// Removes one entity from whichever scope holds it.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let lists = std::iter::once(&mut self.top_level).chain(self.groups.values_mut());
        for list in lists {
            if let Some(index) = list.iter().position(|entity| entity.id == id) {
                return Some(list.remove(index));
            }
        }
        None
    }

    /// Respaces every key of one scope, keeping its current order.
    ///
    /// Returns the rewritten entities.
    pub fn rebalance_scope(&mut self, scope: Scope) -> Vec<Entity> {
        let list = self.scope_list_mut(scope);
        let keys = rebalance_keys(list.len());
        for (entity, key) in list.iter_mut().zip(keys) {
            entity.order_key = key;
        }
        list.clone()
    }

    /// Checks the per-scope ordering invariant.
    pub fn keys_strictly_ascending(&self) -> bool {
        std::iter::once(&self.top_level)
            .chain(self.groups.values())
            .all(|list| {
                list.windows(2)
                    .all(|pair| pair[0].order_key < pair[1].order_key)
            })
    }

    fn scope_list_mut(&mut self, scope: Scope) -> &mut Vec<Entity> {
        match scope {
            Scope::TopLevel => &mut self.top_level,
            Scope::Group(group_id) => self.groups.entry(group_id).or_default(),
        }
    }
}

fn sort_key(entity: &Entity) -> (OrderKey, EntityId) {
    (entity.order_key, entity.id)
}

fn sort_scope(list: &mut [Entity]) {
    list.sort_by_key(sort_key);
}
