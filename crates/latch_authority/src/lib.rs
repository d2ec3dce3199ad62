//! Latch Authority Layer
//!
//! Decides which worker process holds write authority over each replicated
//! entity and hands that authority over as the load balancer reassigns
//! entities between partitions:
//! - Virtual-to-physical worker translation
//! - Load-balance enforcement (ACL rewrite requests)
//! - In-memory component view used to answer enforcement queries

pub mod components;
pub mod enforcer;
pub mod error;
pub mod identity_map;
pub mod ids;
pub mod ops;
pub mod stats;
pub mod strategy;
pub mod translator;
pub mod view;

pub use components::Authority;
pub use enforcer::{AclWriteAuthorityRequest, LoadBalanceEnforcer, PendingAssignmentQueue};
pub use error::MappingRejected;
pub use identity_map::{MappingEntry, WorkerIdentityMap};
pub use ids::{ComponentId, EntityId, PhysicalWorkerName, VirtualWorkerId, WorkerEntityId};
pub use ops::WorkerOp;
pub use strategy::LoadBalanceStrategy;
pub use translator::{MappingOutcome, TranslationUpdate, VirtualWorkerTranslator};
pub use view::{ComponentView, StaticComponentView};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
