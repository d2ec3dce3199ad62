//! Load-balancing strategy seam
//!
//! The strategy decides where entities should live; this crate only tells it
//! which virtual worker the local process turned out to be.

use crate::ids::VirtualWorkerId;

pub trait LoadBalanceStrategy {
    /// Called once, when the translator discovers the local virtual worker id.
    fn set_local_virtual_worker_id(&self, id: VirtualWorkerId);
}
