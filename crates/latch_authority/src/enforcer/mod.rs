//! Load-balance enforcement
//!
//! Watches the load-balancing components of every entity and, when this
//! worker may rewrite an entity's ACL, asks for authority to be handed to
//! the worker the load balancer intends to own it.
//!
//! Handlers only touch the pending set. All decisions happen in
//! [`LoadBalanceEnforcer::process_pending`], once per coordination tick, so
//! a burst of ops for one entity yields at most one request.

mod evaluate;
mod queue;

pub use evaluate::{evaluate, AclWriteAuthorityRequest, SkipReason};
pub use queue::PendingAssignmentQueue;

use crate::components::{
    Authority, AUTHORITY_INTENT_COMPONENT_ID, COMPONENT_PRESENCE_COMPONENT_ID,
    ENTITY_ACL_COMPONENT_ID,
};
use crate::ids::{EntityId, PhysicalWorkerName};
use crate::ops::WorkerOp;
use crate::stats::EnforcerStats;
use crate::translator::VirtualWorkerTranslator;
use crate::view::ComponentView;
use tracing::{debug, trace};

pub struct LoadBalanceEnforcer {
    local_worker_name: PhysicalWorkerName,
    pending: PendingAssignmentQueue,
    stats: EnforcerStats,
}

impl LoadBalanceEnforcer {
    pub fn new(local_worker_name: impl Into<PhysicalWorkerName>) -> Self {
        Self {
            local_worker_name: local_worker_name.into(),
            pending: PendingAssignmentQueue::new(),
            stats: EnforcerStats::new(),
        }
    }

    /// Queue `entity` for evaluation on the next pass.
    ///
    /// No filtering happens here; a queued entity may still yield nothing.
    pub fn maybe_queue(&mut self, entity: EntityId) {
        let newly_queued = self.pending.insert(entity);
        if newly_queued {
            trace!(worker = %self.local_worker_name, %entity, "Queued ACL assignment");
        }
        self.stats.record_queued(newly_queued);
    }

    fn dequeue(&mut self, entity: EntityId) {
        let was_queued = self.pending.remove(entity);
        if was_queued {
            trace!(worker = %self.local_worker_name, %entity, "Dropped queued ACL assignment");
        }
        self.stats.record_dequeued(was_queued);
    }

    pub fn on_authority_intent_changed(&mut self, entity: EntityId) {
        self.maybe_queue(entity);
    }

    pub fn on_component_presence_changed(&mut self, entity: EntityId) {
        self.maybe_queue(entity);
    }

    /// React to this worker gaining or losing write authority over the entity ACL.
    ///
    /// `AuthorityLossImminent` changes nothing: authority is still held.
    pub fn on_acl_authority_changed(&mut self, entity: EntityId, authority: Authority) {
        match authority {
            Authority::Authoritative => self.maybe_queue(entity),
            Authority::NotAuthoritative => self.dequeue(entity),
            Authority::AuthorityLossImminent => {}
        }
    }

    pub fn on_authority_intent_removed(&mut self, entity: EntityId) {
        self.dequeue(entity);
    }

    pub fn on_acl_component_removed(&mut self, entity: EntityId) {
        self.dequeue(entity);
    }

    pub fn on_component_presence_removed(&mut self, entity: EntityId) {
        self.dequeue(entity);
    }

    pub fn on_entity_removed(&mut self, entity: EntityId) {
        self.dequeue(entity);
    }

    /// Route an inbound op to the matching handler.
    ///
    /// Ops on components outside the load-balancing set are ignored.
    pub fn handle_op(&mut self, op: &WorkerOp) {
        match op {
            WorkerOp::AddComponent { entity, data }
            | WorkerOp::ComponentUpdate { entity, data } => {
                match data.component_id() {
                    AUTHORITY_INTENT_COMPONENT_ID => self.on_authority_intent_changed(*entity),
                    COMPONENT_PRESENCE_COMPONENT_ID => self.on_component_presence_changed(*entity),
                    _ => {}
                }
            }
            WorkerOp::RemoveComponent { entity, component } => match *component {
                AUTHORITY_INTENT_COMPONENT_ID => self.on_authority_intent_removed(*entity),
                ENTITY_ACL_COMPONENT_ID => self.on_acl_component_removed(*entity),
                COMPONENT_PRESENCE_COMPONENT_ID => self.on_component_presence_removed(*entity),
                _ => {}
            },
            WorkerOp::AuthorityChange {
                entity,
                component: ENTITY_ACL_COMPONENT_ID,
                authority,
            } => self.on_acl_authority_changed(*entity, *authority),
            WorkerOp::AuthorityChange { .. } => {}
            WorkerOp::RemoveEntity { entity } => self.on_entity_removed(*entity),
        }
    }

    pub fn is_queued(&self, entity: EntityId) -> bool {
        self.pending.contains(entity)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain the pending set and compute the ACL rewrites it calls for.
    ///
    /// Requests come out in the order entities were first queued. Entities
    /// that fail a check are dropped; a later op must queue them again.
    pub fn process_pending<V>(
        &mut self,
        view: &V,
        translator: &VirtualWorkerTranslator,
    ) -> Vec<AclWriteAuthorityRequest>
    where
        V: ComponentView + ?Sized,
    {
        let entities = self.pending.drain();
        let mut requests = Vec::with_capacity(entities.len());

        for entity in entities {
            match evaluate(entity, view, translator) {
                Ok(request) => {
                    debug!(
                        worker = %self.local_worker_name,
                        entity = %request.entity_id,
                        owner = %request.owning_worker_id,
                        components = request.component_ids.len(),
                        "Requesting ACL write authority change"
                    );
                    requests.push(request);
                }
                Err(reason) => {
                    debug!(
                        worker = %self.local_worker_name,
                        %entity,
                        %reason,
                        "Skipping ACL assignment"
                    );
                    self.stats.record_skip(&reason);
                }
            }
        }

        self.stats.record_pass(requests.len());
        requests
    }

    pub fn local_worker_name(&self) -> &PhysicalWorkerName {
        &self.local_worker_name
    }

    pub fn stats(&self) -> &EnforcerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentData, EntityAcl};
    use crate::ids::VirtualWorkerId;
    use crate::translator::TranslationUpdate;
    use crate::view::StaticComponentView;
    use std::collections::BTreeSet;

    const VALID_WORKER_ONE: &str = "ValidWorkerOne";
    const VALID_WORKER_TWO: &str = "ValidWorkerTwo";

    const VIRTUAL_WORKER_ONE: VirtualWorkerId = VirtualWorkerId(1);
    const VIRTUAL_WORKER_TWO: VirtualWorkerId = VirtualWorkerId(2);

    const ENTITY_ONE: EntityId = EntityId(1);
    const ENTITY_TWO: EntityId = EntityId(2);

    fn create_translator() -> VirtualWorkerTranslator {
        let mut translator = VirtualWorkerTranslator::new(None, VALID_WORKER_ONE);
        translator.apply_mapping(
            &TranslationUpdate::default()
                .with_entry(VIRTUAL_WORKER_ONE, VALID_WORKER_ONE, EntityId(1001))
                .with_entry(VIRTUAL_WORKER_TWO, VALID_WORKER_TWO, EntityId(1002)),
        );
        assert!(translator.is_ready());
        translator
    }

    /// Give `entity` all three load-balancing components, with ACL write
    /// authority held by this worker when `acl_authority` is set.
    fn add_entity(
        view: &mut StaticComponentView,
        entity: EntityId,
        intent: VirtualWorkerId,
        acl_authority: Authority,
    ) {
        view.add_component(
            entity,
            ComponentData::AuthorityIntent { virtual_worker: intent },
            Authority::NotAuthoritative,
        );
        view.add_component(entity, ComponentData::EntityAcl(EntityAcl::default()), acl_authority);
        view.add_component(
            entity,
            ComponentData::ComponentPresence { component_ids: vec![1, 2, 3] },
            Authority::NotAuthoritative,
        );
    }

    fn gain_acl(entity: EntityId) -> WorkerOp {
        WorkerOp::AuthorityChange {
            entity,
            component: ENTITY_ACL_COMPONENT_ID,
            authority: Authority::Authoritative,
        }
    }

    #[test]
    fn empty_view_yields_no_requests_until_data_and_authority_arrive() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_TWO);
        assert!(enforcer.process_pending(&view, &translator).is_empty());
        assert_eq!(enforcer.pending_count(), 0);

        // Data without ACL authority still yields nothing.
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
        add_entity(&mut view, ENTITY_TWO, VIRTUAL_WORKER_TWO, Authority::NotAuthoritative);
        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_TWO);
        assert!(enforcer.process_pending(&view, &translator).is_empty());
    }

    #[test]
    fn untouched_entities_yield_nothing() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_TWO, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        assert!(enforcer.process_pending(&view, &translator).is_empty());
    }

    #[test]
    fn valid_mapping_yields_request_per_entity_in_queue_order() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::Authoritative);
        add_entity(&mut view, ENTITY_TWO, VIRTUAL_WORKER_TWO, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_TWO);

        let requests = enforcer.process_pending(&view, &translator);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].entity_id, ENTITY_ONE);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_ONE);
        assert_eq!(requests[1].entity_id, ENTITY_TWO);
        assert_eq!(requests[1].owning_worker_id, VALID_WORKER_TWO);
    }

    #[test]
    fn queueing_twice_yields_one_request() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_ONE);

        let requests = enforcer.process_pending(&view, &translator);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].entity_id, ENTITY_ONE);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_ONE);
    }

    #[test]
    fn authority_intent_update_queues_request() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        let op = WorkerOp::ComponentUpdate {
            entity: ENTITY_ONE,
            data: ComponentData::AuthorityIntent { virtual_worker: VIRTUAL_WORKER_TWO },
        };
        enforcer.handle_op(&op);
        view.apply_op(&op);

        let requests = enforcer.process_pending(&view, &translator);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_TWO);
    }

    #[test]
    fn gaining_acl_authority_queues_request() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        let op = gain_acl(ENTITY_ONE);
        enforcer.handle_op(&op);
        view.apply_op(&op);
        assert!(enforcer.is_queued(ENTITY_ONE));

        let requests = enforcer.process_pending(&view, &translator);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].entity_id, ENTITY_ONE);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_ONE);
    }

    #[test]
    fn no_acl_authority_means_no_request_whatever_the_intent() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
        add_entity(&mut view, ENTITY_TWO, VIRTUAL_WORKER_TWO, Authority::NotAuthoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.on_authority_intent_changed(ENTITY_ONE);
        enforcer.on_authority_intent_changed(ENTITY_TWO);

        assert!(enforcer.process_pending(&view, &translator).is_empty());
    }

    #[test]
    fn losing_acl_authority_drops_queued_entity() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.handle_op(&gain_acl(ENTITY_ONE));
        assert!(enforcer.is_queued(ENTITY_ONE));

        enforcer.handle_op(&WorkerOp::AuthorityChange {
            entity: ENTITY_ONE,
            component: ENTITY_ACL_COMPONENT_ID,
            authority: Authority::NotAuthoritative,
        });
        assert!(!enforcer.is_queued(ENTITY_ONE));
        assert!(enforcer.process_pending(&view, &translator).is_empty());
    }

    #[test]
    fn authority_loss_between_queue_and_pass_is_caught_at_evaluation() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_TWO, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.on_authority_intent_changed(ENTITY_ONE);
        // The view sees the loss, but the enforcer is never told.
        view.set_authority(ENTITY_ONE, ENTITY_ACL_COMPONENT_ID, Authority::NotAuthoritative);

        assert!(enforcer.process_pending(&view, &translator).is_empty());
        assert!(!enforcer.is_queued(ENTITY_ONE));
    }

    #[test]
    fn authority_loss_imminent_keeps_entity_queued() {
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);
        enforcer.on_acl_authority_changed(ENTITY_ONE, Authority::Authoritative);
        enforcer.on_acl_authority_changed(ENTITY_ONE, Authority::AuthorityLossImminent);
        assert!(enforcer.is_queued(ENTITY_ONE));
    }

    #[test]
    fn authority_change_on_other_components_is_ignored() {
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);
        enforcer.handle_op(&WorkerOp::AuthorityChange {
            entity: ENTITY_ONE,
            component: AUTHORITY_INTENT_COMPONENT_ID,
            authority: Authority::Authoritative,
        });
        assert!(!enforcer.is_queued(ENTITY_ONE));
    }

    #[test]
    fn entity_removal_drops_queued_entity() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        let op = gain_acl(ENTITY_ONE);
        enforcer.handle_op(&op);
        view.apply_op(&op);
        assert!(enforcer.is_queued(ENTITY_ONE));

        enforcer.handle_op(&WorkerOp::RemoveEntity { entity: ENTITY_ONE });
        assert!(enforcer.process_pending(&view, &translator).is_empty());
    }

    #[test]
    fn removing_any_load_balancing_component_drops_queued_entity() {
        let translator = create_translator();

        for component in [
            AUTHORITY_INTENT_COMPONENT_ID,
            ENTITY_ACL_COMPONENT_ID,
            COMPONENT_PRESENCE_COMPONENT_ID,
        ] {
            let mut view = StaticComponentView::new();
            add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::NotAuthoritative);
            let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

            let op = gain_acl(ENTITY_ONE);
            enforcer.handle_op(&op);
            view.apply_op(&op);
            assert!(enforcer.is_queued(ENTITY_ONE));

            // Only the enforcer hears about the removal; the view still has
            // everything needed, so a request here would come from the queue.
            enforcer.handle_op(&WorkerOp::RemoveComponent { entity: ENTITY_ONE, component });
            assert!(!enforcer.is_queued(ENTITY_ONE), "component {component}");
            assert!(enforcer.process_pending(&view, &translator).is_empty());
        }
    }

    #[test]
    fn component_presence_update_sets_request_scope() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        let op = WorkerOp::ComponentUpdate {
            entity: ENTITY_ONE,
            data: ComponentData::ComponentPresence { component_ids: vec![123, 456] },
        };
        enforcer.handle_op(&op);
        view.apply_op(&op);

        let requests = enforcer.process_pending(&view, &translator);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].entity_id, ENTITY_ONE);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_ONE);
        assert_eq!(requests[0].component_ids, BTreeSet::from([123, 456]));
    }

    #[test]
    fn skipped_entities_are_not_requeued() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VirtualWorkerId(9), Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.maybe_queue(ENTITY_ONE);
        assert!(enforcer.process_pending(&view, &translator).is_empty());
        assert!(!enforcer.is_queued(ENTITY_ONE));

        // Once the intent points somewhere known, a fresh op is needed.
        let op = WorkerOp::ComponentUpdate {
            entity: ENTITY_ONE,
            data: ComponentData::AuthorityIntent { virtual_worker: VIRTUAL_WORKER_TWO },
        };
        view.apply_op(&op);
        assert!(enforcer.process_pending(&view, &translator).is_empty());

        enforcer.handle_op(&op);
        assert_eq!(enforcer.process_pending(&view, &translator).len(), 1);
    }

    #[test]
    fn workers_in_one_process_keep_separate_identities() {
        let update = TranslationUpdate::default()
            .with_entry(VIRTUAL_WORKER_ONE, VALID_WORKER_ONE, EntityId(1001))
            .with_entry(VIRTUAL_WORKER_TWO, VALID_WORKER_TWO, EntityId(1002));
        let mut one = VirtualWorkerTranslator::new(None, VALID_WORKER_ONE);
        let mut two = VirtualWorkerTranslator::new(None, VALID_WORKER_TWO);
        one.apply_mapping(&update);
        two.apply_mapping(&update);

        assert_eq!(one.local_virtual_worker_id(), VIRTUAL_WORKER_ONE);
        assert_eq!(two.local_virtual_worker_id(), VIRTUAL_WORKER_TWO);

        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_TWO, Authority::Authoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_TWO);
        enforcer.maybe_queue(ENTITY_ONE);

        let requests = enforcer.process_pending(&view, &two);
        assert_eq!(requests[0].owning_worker_id, VALID_WORKER_TWO);
    }

    #[test]
    #[cfg(feature = "metrics")]
    fn stats_track_queue_and_pass_outcomes() {
        let translator = create_translator();
        let mut view = StaticComponentView::new();
        add_entity(&mut view, ENTITY_ONE, VIRTUAL_WORKER_ONE, Authority::Authoritative);
        add_entity(&mut view, ENTITY_TWO, VIRTUAL_WORKER_TWO, Authority::NotAuthoritative);
        let mut enforcer = LoadBalanceEnforcer::new(VALID_WORKER_ONE);

        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_ONE);
        enforcer.maybe_queue(ENTITY_TWO);
        enforcer.process_pending(&view, &translator);

        let stats = enforcer.stats();
        assert_eq!(stats.queued(), 2);
        assert_eq!(stats.passes(), 1);
        assert_eq!(stats.emitted(), 1);
        assert_eq!(stats.skipped_not_authoritative(), 1);
    }
}
