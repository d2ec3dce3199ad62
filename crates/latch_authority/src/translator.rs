//! Virtual worker translation
//!
//! Maps strategy-assigned virtual workers to running worker processes and
//! discovers which virtual worker the local process is.
//!
//! A translation dataset is either accepted whole, replacing the previous
//! map, or rejected whole. Two rejections exist:
//! - The dataset names the local worker under a different virtual id than
//!   the one already discovered. Accepting it would make this worker believe
//!   it owns two partitions.
//! - The dataset has no entry for the local worker although it already knows
//!   its id. This is what a stale dataset looks like right after a restart.
//! - An entry uses [`VirtualWorkerId::INVALID`] or an empty worker name.
//!
//! A dataset without a local entry is accepted while the local id is still
//! unknown (first boot).

use crate::error::MappingRejected;
use crate::identity_map::{MappingEntry, WorkerIdentityMap};
use crate::ids::{EntityId, PhysicalWorkerName, VirtualWorkerId, WorkerEntityId};
use crate::strategy::LoadBalanceStrategy;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// A complete translation dataset as delivered by the network layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUpdate {
    pub entries: Vec<MappingEntry>,
}

impl TranslationUpdate {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    /// Assign virtual workers `1..=N` to `workers`, in order.
    pub fn from_workers<I, N>(workers: I) -> Self
    where
        I: IntoIterator<Item = (N, WorkerEntityId)>,
        N: Into<PhysicalWorkerName>,
    {
        let entries = workers
            .into_iter()
            .enumerate()
            .map(|(index, (name, entity))| {
                MappingEntry::new(VirtualWorkerId(index as u32 + 1), name, entity)
            })
            .collect();
        Self { entries }
    }

    pub fn with_entry(
        mut self,
        virtual_worker: VirtualWorkerId,
        physical_worker: impl Into<PhysicalWorkerName>,
        worker_entity: WorkerEntityId,
    ) -> Self {
        self.entries
            .push(MappingEntry::new(virtual_worker, physical_worker, worker_entity));
        self
    }

    /// The virtual id the dataset assigns to `name`, if any (first match).
    pub fn virtual_worker_of(&self, name: &PhysicalWorkerName) -> Option<VirtualWorkerId> {
        self.entries
            .iter()
            .find(|entry| &entry.physical_worker == name)
            .map(|entry| entry.virtual_worker)
    }
}

/// Result of handing a dataset to [`VirtualWorkerTranslator::apply_mapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome {
    /// The map was replaced. `discovered` is set on the update that
    /// revealed the local virtual worker id.
    Applied { discovered: Option<VirtualWorkerId> },
    /// The previous map was kept.
    Rejected(MappingRejected),
}

impl MappingOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MappingOutcome::Applied { .. })
    }
}

/// Check a dataset against what the local worker already knows about itself.
pub fn validate_mapping(
    update: &TranslationUpdate,
    local_name: &PhysicalWorkerName,
    local_id: VirtualWorkerId,
) -> Result<(), MappingRejected> {
    if let Some(entry) = update
        .entries
        .iter()
        .find(|entry| !entry.virtual_worker.is_valid() || !entry.physical_worker.is_valid())
    {
        return Err(MappingRejected::SentinelEntry {
            virtual_worker: entry.virtual_worker,
            physical_worker: entry.physical_worker.clone(),
        });
    }

    match update.virtual_worker_of(local_name) {
        Some(received) if local_id.is_valid() && received != local_id => {
            Err(MappingRejected::LocalWorkerReassigned {
                local: local_name.clone(),
                existing: local_id,
                received,
            })
        }
        None if local_id.is_valid() => Err(MappingRejected::LocalWorkerMissing {
            local: local_name.clone(),
            existing: local_id,
        }),
        _ => Ok(()),
    }
}

/// Build the replacement map for `update`.
///
/// Returns the new map and the local virtual worker id if this update is the
/// one that reveals it.
pub fn resolve_mapping(
    update: &TranslationUpdate,
    local_name: &PhysicalWorkerName,
    local_id: VirtualWorkerId,
) -> Result<(WorkerIdentityMap, Option<VirtualWorkerId>), MappingRejected> {
    validate_mapping(update, local_name, local_id)?;

    let mut map = WorkerIdentityMap::with_capacity(update.entries.len());
    let mut discovered = None;
    for entry in &update.entries {
        map.insert(
            entry.virtual_worker,
            entry.physical_worker.clone(),
            entry.worker_entity,
        );

        if !local_id.is_valid()
            && discovered.is_none()
            && entry.virtual_worker.is_valid()
            && &entry.physical_worker == local_name
        {
            discovered = Some(entry.virtual_worker);
        }
    }

    Ok((map, discovered))
}

/// Owns the local worker's identity and the current translation map.
///
/// One instance per worker process, created at startup and lent to the
/// enforcer on every processing pass.
pub struct VirtualWorkerTranslator {
    strategy: Option<Rc<dyn LoadBalanceStrategy>>,
    is_ready: bool,
    local_physical_worker_name: PhysicalWorkerName,
    local_virtual_worker_id: VirtualWorkerId,
    mapping: WorkerIdentityMap,
}

impl VirtualWorkerTranslator {
    /// `strategy` may be `None` when nothing needs to hear about the local id.
    pub fn new(
        strategy: Option<Rc<dyn LoadBalanceStrategy>>,
        local_physical_worker_name: impl Into<PhysicalWorkerName>,
    ) -> Self {
        Self {
            strategy,
            is_ready: false,
            local_physical_worker_name: local_physical_worker_name.into(),
            local_virtual_worker_id: VirtualWorkerId::INVALID,
            mapping: WorkerIdentityMap::new(),
        }
    }

    /// Apply a freshly delivered translation dataset.
    ///
    /// Rejected datasets are logged and leave all state untouched.
    pub fn apply_mapping(&mut self, update: &TranslationUpdate) -> MappingOutcome {
        debug!(
            local_virtual_worker = %self.local_virtual_worker_id,
            entries = update.entries.len(),
            "Applying virtual worker mapping"
        );

        let (mapping, discovered) = match resolve_mapping(
            update,
            &self.local_physical_worker_name,
            self.local_virtual_worker_id,
        ) {
            Ok(resolved) => resolved,
            Err(rejection) => {
                match &rejection {
                    MappingRejected::LocalWorkerReassigned { .. }
                    | MappingRejected::SentinelEntry { .. } => {
                        error!(%rejection, "Rejected virtual worker mapping");
                    }
                    MappingRejected::LocalWorkerMissing { .. } => {
                        warn!(
                            %rejection,
                            "Ignoring virtual worker mapping, will wait for a valid version"
                        );
                    }
                }
                return MappingOutcome::Rejected(rejection);
            }
        };

        self.mapping = mapping;

        for (virtual_worker, physical_worker, worker_entity) in self.mapping.iter() {
            info!(
                %virtual_worker,
                %physical_worker,
                %worker_entity,
                "Translator assignment"
            );
        }

        if let Some(id) = discovered {
            self.local_virtual_worker_id = id;
            self.is_ready = true;

            if let Some(strategy) = &self.strategy {
                strategy.set_local_virtual_worker_id(id);
            }

            info!(
                worker = %self.local_physical_worker_name,
                virtual_worker = %id,
                "Virtual worker translator is now ready for load balancing"
            );
        }

        MappingOutcome::Applied { discovered }
    }

    pub fn lookup_physical_worker(&self, id: VirtualWorkerId) -> Option<&PhysicalWorkerName> {
        self.mapping.physical_worker(id)
    }

    pub fn lookup_worker_entity(&self, id: VirtualWorkerId) -> Option<WorkerEntityId> {
        self.mapping.worker_entity(id)
    }

    /// Like [`Self::lookup_worker_entity`], but yields [`EntityId::INVALID`] when unmapped.
    pub fn worker_entity_or_invalid(&self, id: VirtualWorkerId) -> WorkerEntityId {
        self.lookup_worker_entity(id).unwrap_or(EntityId::INVALID)
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn local_virtual_worker_id(&self) -> VirtualWorkerId {
        self.local_virtual_worker_id
    }

    pub fn local_physical_worker_name(&self) -> &PhysicalWorkerName {
        &self.local_physical_worker_name
    }

    pub fn mapping(&self) -> &WorkerIdentityMap {
        &self.mapping
    }
}
