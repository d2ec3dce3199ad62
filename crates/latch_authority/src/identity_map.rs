//! Virtual-to-physical worker mapping
//!
//! Pure data: the translator replaces the whole map on every accepted update.

use crate::ids::{PhysicalWorkerName, VirtualWorkerId, WorkerEntityId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of a translation dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub virtual_worker: VirtualWorkerId,
    pub physical_worker: PhysicalWorkerName,
    pub worker_entity: WorkerEntityId,
}

impl MappingEntry {
    pub fn new(
        virtual_worker: VirtualWorkerId,
        physical_worker: impl Into<PhysicalWorkerName>,
        worker_entity: WorkerEntityId,
    ) -> Self {
        Self {
            virtual_worker,
            physical_worker: physical_worker.into(),
            worker_entity,
        }
    }
}

/// Current virtual → (physical worker, worker entity) assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerIdentityMap {
    entries: HashMap<VirtualWorkerId, (PhysicalWorkerName, WorkerEntityId)>,
}

impl WorkerIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite the assignment for `virtual_worker`.
    pub fn insert(
        &mut self,
        virtual_worker: VirtualWorkerId,
        physical_worker: PhysicalWorkerName,
        worker_entity: WorkerEntityId,
    ) {
        self.entries
            .insert(virtual_worker, (physical_worker, worker_entity));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn physical_worker(&self, virtual_worker: VirtualWorkerId) -> Option<&PhysicalWorkerName> {
        self.entries.get(&virtual_worker).map(|(name, _)| name)
    }

    pub fn worker_entity(&self, virtual_worker: VirtualWorkerId) -> Option<WorkerEntityId> {
        self.entries.get(&virtual_worker).map(|(_, entity)| *entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate assignments in ascending virtual worker order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (VirtualWorkerId, &PhysicalWorkerName, WorkerEntityId)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|(&id, (name, entity))| (id, name, *entity))
            .collect();
        rows.sort_by_key(|(id, _, _)| *id);
        rows.into_iter()
    }
}

impl FromIterator<MappingEntry> for WorkerIdentityMap {
    fn from_iter<I: IntoIterator<Item = MappingEntry>>(iter: I) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.insert(entry.virtual_worker, entry.physical_worker, entry.worker_entity);
        }
        map
    }
}
