//! Inbound notifications from the replication layer
//!
//! The same op stream feeds the component view (to update stored values)
//! and the enforcer (to decide what needs re-evaluation).

use crate::components::{Authority, ComponentData};
use crate::ids::{ComponentId, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerOp {
    /// Component became visible to this worker, with its initial value.
    AddComponent { entity: EntityId, data: ComponentData },
    /// New value for a component already visible to this worker.
    ComponentUpdate { entity: EntityId, data: ComponentData },
    RemoveComponent { entity: EntityId, component: ComponentId },
    /// This worker's authority over `component` on `entity` changed.
    AuthorityChange {
        entity: EntityId,
        component: ComponentId,
        authority: Authority,
    },
    RemoveEntity { entity: EntityId },
}

impl WorkerOp {
    pub fn entity(&self) -> EntityId {
        match self {
            WorkerOp::AddComponent { entity, .. }
            | WorkerOp::ComponentUpdate { entity, .. }
            | WorkerOp::RemoveComponent { entity, .. }
            | WorkerOp::AuthorityChange { entity, .. }
            | WorkerOp::RemoveEntity { entity } => *entity,
        }
    }

    /// Component the op concerns; `None` for entity removal.
    pub fn component_id(&self) -> Option<ComponentId> {
        match self {
            WorkerOp::AddComponent { data, .. } | WorkerOp::ComponentUpdate { data, .. } => {
                Some(data.component_id())
            }
            WorkerOp::RemoveComponent { component, .. }
            | WorkerOp::AuthorityChange { component, .. } => Some(*component),
            WorkerOp::RemoveEntity { .. } => None,
        }
    }
}
