//! Identifiers shared by the translator and the enforcer
//!
//! Every identifier has a reserved sentinel meaning "unassigned". Sentinels
//! never appear in a valid mapping entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Component ids are plain integers, matching the replication schema.
pub type ComponentId = u32;

/// Abstract partition identifier assigned by the load-balancing strategy.
///
/// Stable across physical worker restarts. `0` is reserved as invalid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualWorkerId(pub u32);

impl VirtualWorkerId {
    pub const INVALID: Self = Self(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for VirtualWorkerId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for VirtualWorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replicated entity identifier. `0` is reserved as invalid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    pub const INVALID: Self = Self(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity representing a physical worker's presence in the simulation.
pub type WorkerEntityId = EntityId;

/// Name of a concrete running worker process.
///
/// The empty name is the "no such worker" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalWorkerName(String);

impl PhysicalWorkerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The "no such worker" sentinel.
    pub fn invalid() -> Self {
        Self(String::new())
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalWorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhysicalWorkerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PhysicalWorkerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for PhysicalWorkerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PhysicalWorkerName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
