use crate::ids::{PhysicalWorkerName, VirtualWorkerId};
use thiserror::Error;

/// Reasons a translation dataset is refused as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingRejected {
    #[error(
        "mapping assigns worker '{local}' virtual worker {received}, but it already owns {existing}"
    )]
    LocalWorkerReassigned {
        local: PhysicalWorkerName,
        existing: VirtualWorkerId,
        received: VirtualWorkerId,
    },

    #[error(
        "mapping has no entry for worker '{local}' (owner of virtual worker {existing}); \
         likely stale after a restart"
    )]
    LocalWorkerMissing {
        local: PhysicalWorkerName,
        existing: VirtualWorkerId,
    },

    /// An entry uses the invalid virtual id or an empty worker name.
    #[error("mapping entry ({virtual_worker}, '{physical_worker}') uses a reserved sentinel")]
    SentinelEntry {
        virtual_worker: VirtualWorkerId,
        physical_worker: PhysicalWorkerName,
    },
}
