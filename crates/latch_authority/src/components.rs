// components.rs - Well-known component ids and authority states
//
// These ids are fixed by the replication schema and shared by every worker.

use crate::ids::{ComponentId, PhysicalWorkerName, VirtualWorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity access control list: which worker may write which components.
pub const ENTITY_ACL_COMPONENT_ID: ComponentId = 50;
/// Holds the physical worker name for a server worker entity.
pub const SERVER_WORKER_COMPONENT_ID: ComponentId = 9974;
/// Intended owning virtual worker of an entity.
pub const AUTHORITY_INTENT_COMPONENT_ID: ComponentId = 9980;
/// Component ids currently attached to an entity.
pub const COMPONENT_PRESENCE_COMPONENT_ID: ComponentId = 9983;

/// Components the enforcer reacts to.
pub const LOAD_BALANCING_COMPONENT_IDS: [ComponentId; 3] = [
    ENTITY_ACL_COMPONENT_ID,
    AUTHORITY_INTENT_COMPONENT_ID,
    COMPONENT_PRESENCE_COMPONENT_ID,
];

/// Authority a worker holds over one component of one entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Authority {
    #[default]
    NotAuthoritative,
    Authoritative,
    /// Still authoritative, but the runtime has announced the handover.
    AuthorityLossImminent,
}

impl Authority {
    /// Only full authority permits writes.
    #[inline]
    pub fn is_authoritative(self) -> bool {
        self == Authority::Authoritative
    }
}

/// Whether `component` is one of the components driving enforcement.
pub fn is_load_balancing_component(component: ComponentId) -> bool {
    LOAD_BALANCING_COMPONENT_IDS.contains(&component)
}

/// Write access recorded in an entity's ACL: component id → writing worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAcl {
    pub write_acl: BTreeMap<ComponentId, PhysicalWorkerName>,
}

impl EntityAcl {
    pub fn writer_of(&self, component: ComponentId) -> Option<&PhysicalWorkerName> {
        self.write_acl.get(&component)
    }
}

/// Decoded value of a component the authority layer understands.
///
/// Components outside the load-balancing set only carry their id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentData {
    AuthorityIntent { virtual_worker: VirtualWorkerId },
    ComponentPresence { component_ids: Vec<ComponentId> },
    EntityAcl(EntityAcl),
    Opaque(ComponentId),
}

impl ComponentData {
    pub fn component_id(&self) -> ComponentId {
        match self {
            ComponentData::AuthorityIntent { .. } => AUTHORITY_INTENT_COMPONENT_ID,
            ComponentData::ComponentPresence { .. } => COMPONENT_PRESENCE_COMPONENT_ID,
            ComponentData::EntityAcl(_) => ENTITY_ACL_COMPONENT_ID,
            ComponentData::Opaque(id) => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_data_reports_schema_id() {
        let intent = ComponentData::AuthorityIntent { virtual_worker: VirtualWorkerId(1) };
        assert_eq!(intent.component_id(), AUTHORITY_INTENT_COMPONENT_ID);
        assert_eq!(ComponentData::Opaque(123).component_id(), 123);
        assert!(is_load_balancing_component(ENTITY_ACL_COMPONENT_ID));
        assert!(!is_load_balancing_component(SERVER_WORKER_COMPONENT_ID));
    }

    #[test]
    fn only_full_authority_permits_writes() {
        assert!(Authority::Authoritative.is_authoritative());
        assert!(!Authority::AuthorityLossImminent.is_authoritative());
        assert!(!Authority::default().is_authoritative());
    }
}
