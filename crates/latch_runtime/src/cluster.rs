//! In-process cluster simulation
//!
//! Stands in for the replication layer: holds the authoritative copy of every
//! entity's load-balancing state, delivers ops to each worker, and applies
//! the ACL rewrites the workers ask for. Every worker sees every entity.

use crate::settings::Settings;
use anyhow::{bail, Result};
use latch_authority::components::{
    Authority, ComponentData, EntityAcl, ENTITY_ACL_COMPONENT_ID,
};
use latch_authority::stats::EnforcerStats;
use latch_authority::{
    AclWriteAuthorityRequest, ComponentId, ComponentView, EntityId, LoadBalanceEnforcer,
    LoadBalanceStrategy, PhysicalWorkerName, StaticComponentView, TranslationUpdate,
    VirtualWorkerId, VirtualWorkerTranslator, WorkerOp,
};
use std::cell::Cell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Worker entities are numbered from here so they never clash with scenario entities.
const WORKER_ENTITY_BASE: i64 = 10_000;

/// Strategy stand-in that only remembers which virtual worker it runs on.
#[derive(Default)]
struct LocalIdentity {
    virtual_worker: Cell<VirtualWorkerId>,
}

impl LoadBalanceStrategy for LocalIdentity {
    fn set_local_virtual_worker_id(&self, id: VirtualWorkerId) {
        self.virtual_worker.set(id);
    }
}

#[derive(Debug, Clone)]
struct EntityState {
    intent: VirtualWorkerId,
    /// Holds write authority over the ACL and every other component.
    owner: PhysicalWorkerName,
    acl: EntityAcl,
    components: Vec<ComponentId>,
}

impl EntityState {
    /// Ops that make `entity` visible to `worker` from scratch.
    fn snapshot_ops(&self, entity: EntityId, worker: &PhysicalWorkerName) -> Vec<WorkerOp> {
        let mut ops = vec![
            WorkerOp::AddComponent {
                entity,
                data: ComponentData::AuthorityIntent {
                    virtual_worker: self.intent,
                },
            },
            WorkerOp::AddComponent {
                entity,
                data: ComponentData::EntityAcl(self.acl.clone()),
            },
            WorkerOp::AddComponent {
                entity,
                data: ComponentData::ComponentPresence {
                    component_ids: self.components.clone(),
                },
            },
        ];
        if &self.owner == worker {
            ops.push(WorkerOp::AuthorityChange {
                entity,
                component: ENTITY_ACL_COMPONENT_ID,
                authority: Authority::Authoritative,
            });
        }
        ops
    }
}

struct SimWorker {
    name: PhysicalWorkerName,
    identity: Rc<LocalIdentity>,
    translator: VirtualWorkerTranslator,
    enforcer: LoadBalanceEnforcer,
    view: StaticComponentView,
    inbox: Vec<WorkerOp>,
    /// Translation datasets not yet delivered, one per tick.
    mappings: VecDeque<TranslationUpdate>,
}

impl SimWorker {
    fn boot(name: PhysicalWorkerName) -> Self {
        let identity = Rc::new(LocalIdentity::default());
        let strategy: Rc<dyn LoadBalanceStrategy> = identity.clone();
        Self {
            translator: VirtualWorkerTranslator::new(Some(strategy), name.clone()),
            enforcer: LoadBalanceEnforcer::new(name.clone()),
            view: StaticComponentView::new(),
            inbox: Vec::new(),
            mappings: VecDeque::new(),
            identity,
            name,
        }
    }

    fn deliver(&mut self) {
        if let Some(mapping) = self.mappings.pop_front() {
            self.translator.apply_mapping(&mapping);
        }
        for op in self.inbox.drain(..) {
            self.view.apply_op(&op);
            self.enforcer.handle_op(&op);
        }
    }

    /// Re-queue every entity whose ACL this worker may write.
    fn rescan(&mut self) {
        let owned: Vec<EntityId> = self
            .view
            .entity_ids()
            .filter(|&entity| self.view.has_acl_write_authority(entity))
            .collect();
        for entity in owned {
            self.enforcer.maybe_queue(entity);
        }
    }

    fn process(&mut self) -> Vec<AclWriteAuthorityRequest> {
        self.enforcer.process_pending(&self.view, &self.translator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Handover,
    Unchanged,
    Rejected,
}

/// What happened during one coordination tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub requests: usize,
    pub handovers: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterReport {
    pub ticks: u64,
    pub handovers: usize,
    /// Entities whose owner does not match their intended virtual worker.
    pub misplaced: Vec<EntityId>,
}

impl ClusterReport {
    pub fn converged(&self) -> bool {
        self.misplaced.is_empty()
    }
}

pub struct Cluster {
    workers: Vec<SimWorker>,
    entities: BTreeMap<EntityId, EntityState>,
    mapping: TranslationUpdate,
    load_balancing: bool,
    rescan_interval: u64,
    intent_changes: BTreeMap<u64, Vec<(EntityId, VirtualWorkerId)>>,
    restarts: BTreeMap<u64, Vec<PhysicalWorkerName>>,
    tick: u64,
    handovers: usize,
}

impl Cluster {
    /// Build the cluster described by `settings`. Every entity starts out
    /// owned by the first worker.
    pub fn new(settings: &Settings) -> Result<Self> {
        let scenario = &settings.scenario;

        let Some(first) = scenario.workers.first() else {
            bail!("scenario needs at least one worker");
        };
        let mut seen = HashSet::new();
        for name in &scenario.workers {
            if name.is_empty() {
                bail!("worker names must not be empty");
            }
            if !seen.insert(name.as_str()) {
                bail!("worker '{name}' is listed twice");
            }
        }

        let mapping = TranslationUpdate::from_workers(
            scenario
                .workers
                .iter()
                .enumerate()
                .map(|(index, name)| (name.as_str(), EntityId(WORKER_ENTITY_BASE + index as i64))),
        );

        let first = PhysicalWorkerName::new(first.as_str());
        let mut entities = BTreeMap::new();
        for seed in &scenario.entities {
            if !seed.id.is_valid() {
                bail!("entity id {} is reserved", seed.id);
            }
            if !mapping.entries.iter().any(|entry| entry.virtual_worker == seed.intent) {
                warn!(
                    entity = %seed.id,
                    intent = %seed.intent,
                    "Entity intends an unknown virtual worker"
                );
            }
            let acl = EntityAcl {
                write_acl: seed
                    .components
                    .iter()
                    .map(|&component| (component, first.clone()))
                    .collect(),
            };
            let state = EntityState {
                intent: seed.intent,
                owner: first.clone(),
                acl,
                components: seed.components.clone(),
            };
            if entities.insert(seed.id, state).is_some() {
                bail!("entity {} is listed twice", seed.id);
            }
        }

        let mut intent_changes: BTreeMap<u64, Vec<_>> = BTreeMap::new();
        for change in &scenario.intent_changes {
            if !entities.contains_key(&change.entity) {
                bail!(
                    "intent change at tick {} names unknown entity {}",
                    change.tick,
                    change.entity
                );
            }
            intent_changes
                .entry(change.tick)
                .or_default()
                .push((change.entity, change.intent));
        }

        let mut restarts: BTreeMap<u64, Vec<_>> = BTreeMap::new();
        for restart in &scenario.restarts {
            if !seen.contains(restart.worker.as_str()) {
                bail!("restart at tick {} names unknown worker '{}'", restart.tick, restart.worker);
            }
            restarts
                .entry(restart.tick)
                .or_default()
                .push(PhysicalWorkerName::new(restart.worker.as_str()));
        }

        let mut cluster = Self {
            workers: Vec::with_capacity(scenario.workers.len()),
            entities,
            mapping,
            load_balancing: settings.load_balancing.enabled,
            rescan_interval: settings.coordination.rescan_interval_ticks,
            intent_changes,
            restarts,
            tick: 0,
            handovers: 0,
        };

        for name in &scenario.workers {
            let mut worker = SimWorker::boot(PhysicalWorkerName::new(name.as_str()));
            worker.mappings.push_back(cluster.mapping.clone());
            worker.inbox = cluster.snapshot_for(&worker.name);
            cluster.workers.push(worker);
        }

        info!(
            workers = cluster.workers.len(),
            entities = cluster.entities.len(),
            load_balancing = cluster.load_balancing,
            "Cluster booted"
        );
        Ok(cluster)
    }

    fn snapshot_for(&self, worker: &PhysicalWorkerName) -> Vec<WorkerOp> {
        self.entities
            .iter()
            .flat_map(|(&entity, state)| state.snapshot_ops(entity, worker))
            .collect()
    }

    fn broadcast(&mut self, op: WorkerOp) {
        for worker in &mut self.workers {
            worker.inbox.push(op.clone());
        }
    }

    fn send(&mut self, to: &PhysicalWorkerName, op: WorkerOp) {
        if let Some(worker) = self.workers.iter_mut().find(|worker| &worker.name == to) {
            worker.inbox.push(op);
        }
    }

    /// Advance one coordination tick.
    pub fn tick(&mut self) -> TickSummary {
        self.tick += 1;
        let tick = self.tick;

        for (entity, intent) in self.intent_changes.remove(&tick).unwrap_or_default() {
            self.set_intent(entity, intent);
        }
        for name in self.restarts.remove(&tick).unwrap_or_default() {
            self.restart(&name);
        }

        for worker in &mut self.workers {
            worker.deliver();
        }

        if self.rescan_interval > 0 && tick % self.rescan_interval == 0 {
            for worker in &mut self.workers {
                worker.rescan();
            }
        }

        let mut summary = TickSummary::default();
        if !self.load_balancing {
            return summary;
        }

        let mut requests = Vec::new();
        for worker in &mut self.workers {
            for request in worker.process() {
                requests.push((worker.name.clone(), request));
            }
        }
        summary.requests = requests.len();

        for (issuer, request) in requests {
            match self.apply_acl_write(&issuer, &request) {
                WriteOutcome::Handover => summary.handovers += 1,
                WriteOutcome::Rejected => summary.rejected += 1,
                WriteOutcome::Unchanged => {}
            }
        }
        self.handovers += summary.handovers;

        if summary.requests > 0 {
            debug!(tick, ?summary, "Coordination tick");
        }
        summary
    }

    fn set_intent(&mut self, entity: EntityId, intent: VirtualWorkerId) {
        let Some(state) = self.entities.get_mut(&entity) else {
            return;
        };
        state.intent = intent;
        info!(tick = self.tick, %entity, %intent, "Load balancer moved entity");
        self.broadcast(WorkerOp::ComponentUpdate {
            entity,
            data: ComponentData::AuthorityIntent {
                virtual_worker: intent,
            },
        });
    }

    /// Replace a worker with a freshly booted one.
    ///
    /// The new process first sees a stale dataset that predates it, then the
    /// current one on the following tick.
    fn restart(&mut self, name: &PhysicalWorkerName) {
        let stale = TranslationUpdate::new(
            self.mapping
                .entries
                .iter()
                .filter(|entry| &entry.physical_worker != name)
                .cloned()
                .collect(),
        );

        let mut worker = SimWorker::boot(name.clone());
        worker.mappings.push_back(stale);
        worker.mappings.push_back(self.mapping.clone());
        worker.inbox = self.snapshot_for(name);

        if let Some(slot) = self.workers.iter_mut().find(|worker| &worker.name == name) {
            *slot = worker;
            warn!(tick = self.tick, worker = %name, "Worker restarted");
        }
    }

    /// Apply one ACL rewrite the way the replication runtime would.
    fn apply_acl_write(
        &mut self,
        issuer: &PhysicalWorkerName,
        request: &AclWriteAuthorityRequest,
    ) -> WriteOutcome {
        let known_target = self
            .workers
            .iter()
            .any(|worker| worker.name == request.owning_worker_id);

        let Some(state) = self.entities.get_mut(&request.entity_id) else {
            warn!(entity = %request.entity_id, "ACL write for unknown entity");
            return WriteOutcome::Rejected;
        };
        if &state.owner != issuer {
            warn!(
                entity = %request.entity_id,
                %issuer,
                owner = %state.owner,
                "ACL write from a worker without ACL authority"
            );
            return WriteOutcome::Rejected;
        }
        if !known_target {
            warn!(
                entity = %request.entity_id,
                target = %request.owning_worker_id,
                "ACL write names unknown worker"
            );
            return WriteOutcome::Rejected;
        }
        if state.owner == request.owning_worker_id {
            return WriteOutcome::Unchanged;
        }

        let previous = std::mem::replace(&mut state.owner, request.owning_worker_id.clone());
        state.acl = request.to_acl();
        let acl = state.acl.clone();

        info!(
            tick = self.tick,
            entity = %request.entity_id,
            from = %previous,
            to = %request.owning_worker_id,
            "Authority handed over"
        );

        let entity = request.entity_id;
        self.broadcast(WorkerOp::ComponentUpdate {
            entity,
            data: ComponentData::EntityAcl(acl),
        });
        self.send(
            &previous,
            WorkerOp::AuthorityChange {
                entity,
                component: ENTITY_ACL_COMPONENT_ID,
                authority: Authority::NotAuthoritative,
            },
        );
        self.send(
            &request.owning_worker_id,
            WorkerOp::AuthorityChange {
                entity,
                component: ENTITY_ACL_COMPONENT_ID,
                authority: Authority::Authoritative,
            },
        );
        WriteOutcome::Handover
    }

    fn intended_owner(&self, intent: VirtualWorkerId) -> Option<&PhysicalWorkerName> {
        self.mapping
            .entries
            .iter()
            .find(|entry| entry.virtual_worker == intent)
            .map(|entry| &entry.physical_worker)
    }

    pub fn owner_of(&self, entity: EntityId) -> Option<&PhysicalWorkerName> {
        self.entities.get(&entity).map(|state| &state.owner)
    }

    pub fn report(&self) -> ClusterReport {
        let misplaced = self
            .entities
            .iter()
            .filter(|(_, state)| self.intended_owner(state.intent) != Some(&state.owner))
            .map(|(&entity, _)| entity)
            .collect();

        ClusterReport {
            ticks: self.tick,
            handovers: self.handovers,
            misplaced,
        }
    }

    /// Per-worker identity and enforcer counters.
    pub fn worker_stats(
        &self,
    ) -> impl Iterator<Item = (&PhysicalWorkerName, VirtualWorkerId, &EnforcerStats)> {
        self.workers.iter().map(|worker| {
            (
                &worker.name,
                worker.identity.virtual_worker.get(),
                worker.enforcer.stats(),
            )
        })
    }
}
