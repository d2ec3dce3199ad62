//! Insertion-ordered set of entities awaiting evaluation

use crate::ids::EntityId;
use std::collections::{BTreeMap, HashMap};

/// Pending entities, drained in first-enqueued order.
///
/// Re-inserting a queued entity keeps its original position.
#[derive(Debug, Default, Clone)]
pub struct PendingAssignmentQueue {
    order: BTreeMap<u64, EntityId>,
    positions: HashMap<EntityId, u64>,
    next_seq: u64,
}

impl PendingAssignmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the entity was not already queued.
    pub fn insert(&mut self, entity: EntityId) -> bool {
        if self.positions.contains_key(&entity) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, entity);
        self.positions.insert(entity, seq);
        true
    }

    /// Returns `true` if the entity was queued.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        match self.positions.remove(&entity) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.positions.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.values().copied()
    }

    /// Take every queued entity, in order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<EntityId> {
        self.positions.clear();
        std::mem::take(&mut self.order).into_values().collect()
    }
}
