// evaluate.rs - Decide whether a queued entity yields an ACL rewrite
//
// Pure over its inputs: the translator and the component view are read,
// never written.

use crate::components::EntityAcl;
use crate::ids::{ComponentId, EntityId, PhysicalWorkerName, VirtualWorkerId};
use crate::translator::VirtualWorkerTranslator;
use crate::view::ComponentView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Hand write authority over `component_ids` of `entity_id` to `owning_worker_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclWriteAuthorityRequest {
    pub entity_id: EntityId,
    pub owning_worker_id: PhysicalWorkerName,
    pub component_ids: BTreeSet<ComponentId>,
}

impl AclWriteAuthorityRequest {
    /// ACL contents granting every requested component to the owning worker.
    pub fn to_acl(&self) -> EntityAcl {
        EntityAcl {
            write_acl: self
                .component_ids
                .iter()
                .map(|&component| (component, self.owning_worker_id.clone()))
                .collect(),
        }
    }
}

/// Why a queued entity produced no request this pass.
///
/// All of these are transient; a later op re-queues the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("no authority intent")]
    MissingAuthorityIntent,

    #[error("virtual worker {0} has no known physical worker")]
    UnresolvedVirtualWorker(VirtualWorkerId),

    #[error("not authoritative over the entity ACL")]
    NotAclAuthoritative,

    #[error("no component presence")]
    MissingComponentPresence,
}

/// Compute the ACL rewrite for one entity.
pub fn evaluate<V>(
    entity: EntityId,
    view: &V,
    translator: &VirtualWorkerTranslator,
) -> Result<AclWriteAuthorityRequest, SkipReason>
where
    V: ComponentView + ?Sized,
{
    let intended = view
        .authority_intent(entity)
        .filter(|id| id.is_valid())
        .ok_or(SkipReason::MissingAuthorityIntent)?;

    let owning_worker_id = translator
        .is_ready()
        .then(|| translator.lookup_physical_worker(intended))
        .flatten()
        .filter(|name| name.is_valid())
        .ok_or(SkipReason::UnresolvedVirtualWorker(intended))?;

    // Authority may have moved since the entity was queued.
    if !view.has_acl_write_authority(entity) {
        return Err(SkipReason::NotAclAuthoritative);
    }

    let component_ids = view
        .component_presence(entity)
        .ok_or(SkipReason::MissingComponentPresence)?
        .iter()
        .copied()
        .collect();

    Ok(AclWriteAuthorityRequest {
        entity_id: entity,
        owning_worker_id: owning_worker_id.clone(),
        component_ids,
    })
}
