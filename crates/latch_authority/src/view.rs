//! Component view: the enforcer's read-only window onto replicated state
//!
//! [`ComponentView`] is the pull interface the enforcer depends on.
//! [`StaticComponentView`] is an in-memory implementation fed by the same
//! [`WorkerOp`] stream the enforcer receives.

use crate::components::{
    Authority, ComponentData, EntityAcl, AUTHORITY_INTENT_COMPONENT_ID,
    COMPONENT_PRESENCE_COMPONENT_ID, ENTITY_ACL_COMPONENT_ID,
};
use crate::ids::{ComponentId, EntityId, VirtualWorkerId};
use crate::ops::WorkerOp;
use std::collections::HashMap;
use tracing::trace;

/// Synchronous queries against the local worker's component store.
pub trait ComponentView {
    /// Intended owner recorded in the entity's AuthorityIntent, if visible.
    fn authority_intent(&self, entity: EntityId) -> Option<VirtualWorkerId>;

    /// Component ids recorded in the entity's ComponentPresence, if visible.
    fn component_presence(&self, entity: EntityId) -> Option<&[ComponentId]>;

    /// This worker's authority over `component` on `entity`.
    fn authority(&self, entity: EntityId, component: ComponentId) -> Authority;

    fn has_authority(&self, entity: EntityId, component: ComponentId) -> bool {
        self.authority(entity, component).is_authoritative()
    }

    /// Whether this worker may rewrite the entity's ACL.
    fn has_acl_write_authority(&self, entity: EntityId) -> bool {
        self.has_authority(entity, ENTITY_ACL_COMPONENT_ID)
    }
}

#[derive(Debug, Default, Clone)]
struct EntityRecord {
    components: HashMap<ComponentId, ComponentData>,
    authority: HashMap<ComponentId, Authority>,
}

/// In-memory component store for one worker.
#[derive(Debug, Default, Clone)]
pub struct StaticComponentView {
    entities: HashMap<EntityId, EntityRecord>,
}

impl StaticComponentView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a component together with this worker's authority over it.
    pub fn add_component(&mut self, entity: EntityId, data: ComponentData, authority: Authority) {
        let record = self.entities.entry(entity).or_default();
        let component = data.component_id();
        record.components.insert(component, data);
        record.authority.insert(component, authority);
    }

    /// Apply one inbound op.
    ///
    /// Updates and authority changes for components this view has never seen
    /// are dropped, as the replication layer only sends them after an add.
    pub fn apply_op(&mut self, op: &WorkerOp) {
        match op {
            WorkerOp::AddComponent { entity, data } => {
                let record = self.entities.entry(*entity).or_default();
                let component = data.component_id();
                record.components.insert(component, data.clone());
                record.authority.entry(component).or_default();
            }
            WorkerOp::ComponentUpdate { entity, data } => {
                match self
                    .entities
                    .get_mut(entity)
                    .and_then(|record| record.components.get_mut(&data.component_id()))
                {
                    Some(stored) => *stored = data.clone(),
                    None => trace!(
                        %entity,
                        component = data.component_id(),
                        "Dropping update for unknown component"
                    ),
                }
            }
            WorkerOp::RemoveComponent { entity, component } => {
                if let Some(record) = self.entities.get_mut(entity) {
                    record.components.remove(component);
                    record.authority.remove(component);
                }
            }
            WorkerOp::AuthorityChange {
                entity,
                component,
                authority,
            } => self.set_authority(*entity, *component, *authority),
            WorkerOp::RemoveEntity { entity } => {
                self.entities.remove(entity);
            }
        }
    }

    pub fn set_authority(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        authority: Authority,
    ) {
        match self
            .entities
            .get_mut(&entity)
            .filter(|record| record.components.contains_key(&component))
        {
            Some(record) => {
                record.authority.insert(component, authority);
            }
            None => trace!(%entity, component, "Dropping authority change for unknown component"),
        }
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.component(entity, component).is_some()
    }

    pub fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentData> {
        self.entities.get(&entity)?.components.get(&component)
    }

    pub fn entity_acl(&self, entity: EntityId) -> Option<&EntityAcl> {
        match self.component(entity, ENTITY_ACL_COMPONENT_ID)? {
            ComponentData::EntityAcl(acl) => Some(acl),
            _ => None,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Visible entities, in no particular order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }
}

impl ComponentView for StaticComponentView {
    fn authority_intent(&self, entity: EntityId) -> Option<VirtualWorkerId> {
        match self.component(entity, AUTHORITY_INTENT_COMPONENT_ID)? {
            ComponentData::AuthorityIntent { virtual_worker } => Some(*virtual_worker),
            _ => None,
        }
    }

    fn component_presence(&self, entity: EntityId) -> Option<&[ComponentId]> {
        match self.component(entity, COMPONENT_PRESENCE_COMPONENT_ID)? {
            ComponentData::ComponentPresence { component_ids } => Some(component_ids.as_slice()),
            _ => None,
        }
    }

    fn authority(&self, entity: EntityId, component: ComponentId) -> Authority {
        self.entities
            .get(&entity)
            .and_then(|record| record.authority.get(&component))
            .copied()
            .unwrap_or_default()
    }
}
