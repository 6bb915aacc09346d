//! Island worker
//!
//! One worker per island, owning a private registry that is only ever
//! mutated on the dispatcher thread currently running its `update` job. The
//! worker is a state machine driven by the job dispatcher:
//!
//! ```text
//! init -> step -> begin_step -> solve -> broadphase
//!                                        |- sync path -> narrowphase -> finish_step -> step
//!                                        '- broadphase_async -> narrowphase ...
//!                                    narrowphase may likewise suspend to narrowphase_async
//! ```
//!
//! Suspension happens exclusively by returning from `update` and being
//! rescheduled. The `reschedule_counter` guards against duplicate enqueues:
//! `reschedule` only enqueues on the 0 -> 1 transition, and the counter is
//! consumed at the end of a completed update; a value above one there means
//! an external event arrived mid-step and the worker reschedules
//! immediately instead of waiting out the fixed timestep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::broadphase::{Broadphase, BroadphaseReport};
use crate::components::{
    AabbComp, AngVel, ComponentKind, ComponentValue, Constraint, Continuous, Dirty, Island,
    IslandTimestamp, LinVel, ProceduralTag, SleepingDisabledTag, SleepingTag, TreeViewComp,
};
use crate::config::SimulationSettings;
use crate::delta::{DeltaBuilder, EntityMap, RegistryDelta};
use crate::graph::Graph;
use crate::job_dispatcher::{current_time, Job, JobData, JobDispatcher, JOB_DATA_SIZE};
use crate::message::{CoordinatorMessage, WorkerChannels, WorkerMessage};
use crate::narrowphase::Narrowphase;
use crate::registry::{Entity, Registry};
use crate::solver::Solver;
use crate::world::{external_init, external_post_step, external_pre_step};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Init,
    Step,
    BeginStep,
    Solve,
    Broadphase,
    BroadphaseAsync,
    Narrowphase,
    NarrowphaseAsync,
    FinishStep,
}

/// Everything the worker mutates; guarded by the worker's state lock.
struct WorkerState {
    worker_key: u64,
    registry: Registry,
    phase: Phase,
    broadphase: Broadphase,
    narrowphase: Narrowphase,
    solver: Solver,
    graph: Graph,
    channels: WorkerChannels,
    delta_builder: DeltaBuilder,
    entity_map: EntityMap,
    island_entity: Entity,
    settings: SimulationSettings,
    paused: bool,
    topology_changed: bool,
    pending_split: bool,
    split_timestamp: f64,
    sleep_timestamp: Option<f64>,
    step_start_time: f64,
    /// Manifolds imported from the coordinator awaiting contact generation.
    new_imported_manifolds: Vec<Entity>,
    /// Body entity -> graph node index.
    node_map: HashMap<Entity, u32>,
    /// Constraint/manifold entity -> graph edge index.
    edge_map: HashMap<Entity, u32>,
    /// `(local, remote)` pairs to announce in the next sync.
    pending_mappings: Vec<(Entity, Entity)>,
    /// Async phase results are ready to merge.
    pending_async_report: Option<BroadphaseReport>,
}

/// Per-island simulation driver scheduled on the global job dispatcher.
pub struct IslandWorker {
    key: u64,
    state: Mutex<WorkerState>,
    reschedule_counter: AtomicU32,
    terminating: AtomicBool,
    terminated: Mutex<bool>,
    terminate_signal: Condvar,
}

static WORKER_TABLE: OnceLock<Mutex<HashMap<u64, Arc<IslandWorker>>>> = OnceLock::new();
static NEXT_WORKER_KEY: AtomicU64 = AtomicU64::new(1);

fn worker_table() -> &'static Mutex<HashMap<u64, Arc<IslandWorker>>> {
    WORKER_TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lookup_worker(key: u64) -> Option<Arc<IslandWorker>> {
    worker_table().lock().get(&key).cloned()
}

fn encode_key(key: u64) -> JobData {
    let mut data = [0u8; JOB_DATA_SIZE];
    data[..8].copy_from_slice(&key.to_le_bytes());
    data
}

fn decode_key(data: JobData) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    u64::from_le_bytes(bytes)
}

/// Job entry point: resolve the worker from the payload on the executing
/// thread, then terminate or update.
fn island_worker_job(data: JobData) {
    let Some(worker) = lookup_worker(decode_key(data)) else {
        return;
    };
    if worker.terminating.load(Ordering::Acquire) {
        worker.do_terminate();
    } else {
        worker.update();
    }
}

/// Async continuation: run the parallel phase, then schedule `update`.
fn island_worker_async_job(data: JobData) {
    let Some(worker) = lookup_worker(decode_key(data)) else {
        return;
    };
    worker.run_async_phase();
    JobDispatcher::global().async_job(worker.update_job());
}

impl IslandWorker {
    /// Create a worker for the island entity `remote_island` (coordinator
    /// id), register it in the worker table and schedule its first update.
    pub fn spawn(
        remote_island: Entity,
        settings: SimulationSettings,
        channels: WorkerChannels,
    ) -> Arc<IslandWorker> {
        let mut registry = Registry::new();
        let island_entity = registry.create();
        registry.assign(island_entity, Island);
        registry.assign(island_entity, IslandTimestamp(current_time()));

        let mut entity_map = EntityMap::new();
        entity_map.insert(remote_island, island_entity);

        let key = NEXT_WORKER_KEY.fetch_add(1, Ordering::Relaxed);
        let state = WorkerState {
            worker_key: key,
            broadphase: Broadphase::new(&settings),
            narrowphase: Narrowphase::new(&settings),
            solver: Solver::new(settings.solver_iterations),
            graph: Graph::new(),
            registry,
            phase: Phase::Init,
            channels,
            delta_builder: DeltaBuilder::new(),
            entity_map,
            island_entity,
            settings,
            paused: false,
            topology_changed: false,
            pending_split: false,
            split_timestamp: 0.0,
            sleep_timestamp: None,
            step_start_time: 0.0,
            new_imported_manifolds: Vec::new(),
            node_map: HashMap::new(),
            edge_map: HashMap::new(),
            pending_mappings: vec![(island_entity, remote_island)],
            pending_async_report: None,
        };

        let worker = Arc::new(IslandWorker {
            key,
            state: Mutex::new(state),
            reschedule_counter: AtomicU32::new(0),
            terminating: AtomicBool::new(false),
            terminated: Mutex::new(false),
            terminate_signal: Condvar::new(),
        });
        worker_table().lock().insert(key, worker.clone());
        debug!(key, "island worker spawned");

        worker.reschedule();
        worker
    }

    fn update_job(&self) -> Job {
        Job::new(island_worker_job, encode_key(self.key))
    }

    fn async_continuation_job(&self) -> Job {
        Job::new(island_worker_async_job, encode_key(self.key))
    }

    /// Request an immediate update. Only the 0 -> 1 transition enqueues.
    pub fn reschedule(&self) {
        if self.reschedule_counter.fetch_add(1, Ordering::AcqRel) > 0 {
            return;
        }
        JobDispatcher::global().async_job(self.update_job());
    }

    fn reschedule_later(&self, delay: f64) {
        if self.reschedule_counter.fetch_add(1, Ordering::AcqRel) > 0 {
            return;
        }
        if delay > 0.0 {
            JobDispatcher::global().async_after(delay, self.update_job());
        } else {
            JobDispatcher::global().async_job(self.update_job());
        }
    }

    /// Consume the counter at the end of a completed update and re-arm.
    /// A count above one means an external event arrived while stepping.
    fn maybe_reschedule(&self, state: &WorkerState) {
        let count = self.reschedule_counter.swap(0, Ordering::AcqRel);
        debug_assert!(count != 0, "update ran without a reschedule");

        if count == 1 {
            let sleeping = state.registry.has::<SleepingTag>(state.island_entity);
            if !state.paused && !sleeping {
                let next = state.registry.get::<IslandTimestamp>(state.island_entity).0
                    + state.settings.fixed_dt as f64;
                self.reschedule_later(next - current_time());
            }
        } else {
            self.reschedule();
        }
    }

    /// One state-machine advance. Runs on a dispatcher thread.
    pub fn update(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let state = &mut *state;

        match state.phase {
            Phase::Init => {
                state.init();
                self.maybe_reschedule(state);
            }
            Phase::Step => {
                state.process_messages();
                if state.should_step() {
                    state.begin_step();
                    state.run_solver();
                    if state.run_broadphase(self) && state.run_narrowphase() {
                        state.finish_step();
                        self.maybe_reschedule(state);
                    }
                } else {
                    self.maybe_reschedule(state);
                }
            }
            Phase::BeginStep => {
                state.step_start_time = current_time();
                state.begin_step();
                state.run_solver();
                if state.run_broadphase(self) && state.run_narrowphase() {
                    state.finish_step();
                    self.maybe_reschedule(state);
                }
            }
            Phase::Solve => {
                state.run_solver();
                if state.run_broadphase(self) && state.run_narrowphase() {
                    state.finish_step();
                    self.maybe_reschedule(state);
                }
            }
            Phase::Broadphase => {
                if state.run_broadphase(self) && state.run_narrowphase() {
                    state.finish_step();
                    self.maybe_reschedule(state);
                }
            }
            Phase::BroadphaseAsync => {
                state.finish_broadphase();
                if state.run_narrowphase() {
                    state.finish_step();
                    self.maybe_reschedule(state);
                }
            }
            Phase::Narrowphase => {
                if state.run_narrowphase() {
                    state.finish_step();
                    self.maybe_reschedule(state);
                }
            }
            Phase::NarrowphaseAsync => {
                state.finish_narrowphase();
                state.finish_step();
                self.maybe_reschedule(state);
            }
            Phase::FinishStep => {
                state.finish_step();
                self.maybe_reschedule(state);
            }
        }
    }

    /// Runs the suspended parallel phase on a dispatcher thread.
    fn run_async_phase(&self) {
        let mut state = self.state.lock();
        let state = &mut *state;
        match state.phase {
            Phase::BroadphaseAsync => {
                let report = state.broadphase.update_async(&mut state.registry);
                state.pending_async_report = Some(report);
            }
            Phase::NarrowphaseAsync => {
                state.narrowphase.update_async(&mut state.registry);
            }
            other => debug_assert!(false, "async phase invoked in {other:?}"),
        }
    }

    /// Cooperative termination: observed at the next scheduled job.
    pub fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);
        self.reschedule();
    }

    fn do_terminate(&self) {
        worker_table().lock().remove(&self.key);
        {
            let mut terminated = self.terminated.lock();
            *terminated = true;
        }
        self.terminate_signal.notify_all();
        debug!(key = self.key, "island worker terminated");
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.lock()
    }

    /// Block until the worker has observed its termination request.
    pub fn join(&self) {
        let mut terminated = self.terminated.lock();
        while !*terminated {
            self.terminate_signal.wait(&mut terminated);
        }
    }
}

impl WorkerState {
    fn init(&mut self) {
        self.process_messages();

        if let Some(hook) = external_init() {
            hook(&mut self.registry);
        }

        let report = self.broadphase.update(&mut self.registry);
        self.apply_broadphase_report(report);

        let view = self.broadphase.view();
        self.registry
            .assign(self.island_entity, TreeViewComp(view.clone()));
        self.delta_builder
            .created(self.island_entity, ComponentValue::TreeView(TreeViewComp(view)));

        self.sync();
        self.phase = Phase::Step;
    }

    fn process_messages(&mut self) {
        while let Ok(message) = self.channels.rx.try_recv() {
            match message {
                CoordinatorMessage::Delta(delta) => self.on_delta(&delta),
                CoordinatorMessage::SetPaused(paused) => {
                    self.paused = paused;
                    self.registry
                        .get_mut::<IslandTimestamp>(self.island_entity)
                        .0 = current_time();
                }
                CoordinatorMessage::StepSimulation => {
                    if !self.registry.has::<SleepingTag>(self.island_entity) {
                        self.phase = Phase::BeginStep;
                    }
                }
                CoordinatorMessage::WakeUpIsland => self.on_wake_up_island(),
            }
        }
    }

    /// Import a coordinator delta, then mirror the new topology into the
    /// interaction graph.
    fn on_delta(&mut self, delta: &RegistryDelta) {

        // Resolve entities the coordinator is withdrawing before the import
        // consumes their mappings.
        let withdrawn: Vec<Entity> = delta
            .destroyed_entities
            .iter()
            .filter_map(|&remote| self.entity_map.local(remote))
            .collect();

        let result = delta.import(&mut self.registry, &mut self.entity_map);
        for (remote, local) in result.new_mappings {
            self.pending_mappings.push((local, remote));
        }

        for local in withdrawn {
            if let Some(edge) = self.edge_map.remove(&local) {
                self.graph.remove_edge(edge);
                self.topology_changed = true;
            }
            if let Some(node) = self.node_map.remove(&local) {
                // Incident edge entities die with the node.
                let mut dead_edges = Vec::new();
                self.graph.visit_edges(node, |_, entity| dead_edges.push(entity));
                for entity in dead_edges {
                    self.edge_map.remove(&entity);
                    if self.registry.alive(entity) {
                        self.registry.destroy(entity);
                    }
                }
                self.graph.remove_node(node);
                self.topology_changed = true;
            }
        }

        for (remote, value) in &delta.created {
            let Some(local) = self.entity_map.local(*remote) else {
                continue;
            };
            if !self.registry.alive(local) {
                continue;
            }
            match value {
                ComponentValue::DynamicTag
                | ComponentValue::StaticTag
                | ComponentValue::KinematicTag => {
                    self.ensure_node(local);
                }
                ComponentValue::ContactManifold(_) => {
                    if self.ensure_edge(local) {
                        self.new_imported_manifolds.push(local);
                    }
                }
                ComponentValue::Constraint(con) => {
                    // Contact constraints ride on their manifold's edge.
                    if !con.is_contact() {
                        self.ensure_edge(local);
                    }
                }
                _ => {}
            }
        }
    }

    fn ensure_node(&mut self, entity: Entity) -> u32 {
        if let Some(&node) = self.node_map.get(&entity) {
            return node;
        }
        let connecting = self.registry.has::<ProceduralTag>(entity);
        let node = self.graph.insert_node(entity, connecting);
        self.node_map.insert(entity, node);
        node
    }

    /// Insert a graph edge for a manifold or non-contact constraint entity.
    fn ensure_edge(&mut self, entity: Entity) -> bool {
        if self.edge_map.contains_key(&entity) {
            return false;
        }
        let body = if let Some(manifold) =
            self.registry.try_get::<crate::components::ContactManifold>(entity)
        {
            manifold.body
        } else if let Some(con) = self.registry.try_get::<Constraint>(entity) {
            con.body()
        } else {
            return false;
        };
        let node_a = self.ensure_node(body[0]);
        let node_b = self.ensure_node(body[1]);
        let edge = self.graph.insert_edge(entity, node_a, node_b);
        self.edge_map.insert(entity, edge);
        true
    }

    fn on_wake_up_island(&mut self) {
        if !self.registry.has::<SleepingTag>(self.island_entity) {
            return;
        }

        self.registry
            .get_mut::<IslandTimestamp>(self.island_entity)
            .0 = current_time();
        self.delta_builder.updated_from_registry(
            &self.registry,
            self.island_entity,
            ComponentKind::IslandTimestamp,
        );

        for entity in self.registry.entities_with::<SleepingTag>() {
            self.delta_builder
                .destroyed(entity, ComponentKind::SleepingTag);
        }
        self.registry.clear_pool::<SleepingTag>();

        let delta = self.delta_builder.finish();
        let _ = self.channels.tx.send(WorkerMessage::Delta(delta));
        trace!("island woke up");
    }

    fn should_step(&mut self) -> bool {
        let time = current_time();

        // A step-simulation message may have forced a single step.
        if self.phase == Phase::BeginStep {
            self.step_start_time = time;
            return true;
        }

        if self.paused || self.registry.has::<SleepingTag>(self.island_entity) {
            return false;
        }

        let island_time = self.registry.get::<IslandTimestamp>(self.island_entity).0;
        if time - island_time < self.settings.fixed_dt as f64 {
            return false;
        }

        self.step_start_time = time;
        true
    }

    fn begin_step(&mut self) {
        if let Some(hook) = external_pre_step() {
            hook(&mut self.registry);
        }

        // Contact generation for manifolds imported since the last step.
        let pending = std::mem::take(&mut self.new_imported_manifolds);
        self.narrowphase
            .update_contact_manifolds(&mut self.registry, &pending);

        self.phase = Phase::Solve;
    }

    fn run_solver(&mut self) {
        self.solver.update(&mut self.registry, self.settings.fixed_dt);
        self.phase = Phase::Broadphase;
    }

    /// Returns false when the broadphase suspended to the async phase.
    fn run_broadphase(&mut self, worker: &Arc<IslandWorker>) -> bool {
        if self.broadphase.parallelizable(&self.registry) {
            self.phase = Phase::BroadphaseAsync;
            JobDispatcher::global().async_job(worker.async_continuation_job());
            false
        } else {
            let report = self.broadphase.update(&mut self.registry);
            self.apply_broadphase_report(report);
            self.phase = Phase::Narrowphase;
            true
        }
    }

    fn finish_broadphase(&mut self) {
        let mut report = self
            .pending_async_report
            .take()
            .unwrap_or_default();
        let merge = self.broadphase.finish_async_update(&mut self.registry);
        report.created_manifolds.extend(merge.created_manifolds);
        report.destroyed_manifolds.extend(merge.destroyed_manifolds);
        self.apply_broadphase_report(report);
        self.phase = Phase::Narrowphase;
    }

    /// Returns false when the narrowphase suspended to the async phase.
    fn run_narrowphase(&mut self) -> bool {
        debug_assert_eq!(self.phase, Phase::Narrowphase);
        if self.narrowphase.parallelizable(&self.registry) {
            self.phase = Phase::NarrowphaseAsync;
            JobDispatcher::global().async_job(Job::new(
                island_worker_async_job,
                encode_key(self.worker_key),
            ));
            false
        } else {
            self.narrowphase.update(&mut self.registry);
            self.phase = Phase::FinishStep;
            true
        }
    }

    fn finish_narrowphase(&mut self) {
        self.narrowphase.finish_async_update(&mut self.registry);
        self.phase = Phase::FinishStep;
    }

    /// Mirror manifold lifecycle changes into the graph and the outgoing
    /// delta.
    fn apply_broadphase_report(&mut self, report: BroadphaseReport) {
        for entity in report.created_manifolds {
            self.ensure_edge(entity);
        }
        for entity in report.destroyed_manifolds {
            if let Some(edge) = self.edge_map.remove(&entity) {
                self.graph.remove_edge(edge);
                self.topology_changed = true;
            }
            self.delta_builder.destroyed_entity(entity);
        }
    }

    fn finish_step(&mut self) {
        let island_time = self.registry.get::<IslandTimestamp>(self.island_entity).0;
        let dt = self.step_start_time - island_time;
        let fixed_dt = self.settings.fixed_dt as f64;

        // Cap how far the island may lag behind wall time so a long stall
        // doesn't turn into an unbounded catch-up burst.
        let num_steps = (dt / fixed_dt).floor() as i64;
        let new_time = if num_steps > self.settings.max_lagging_steps as i64 {
            let remainder = dt - num_steps as f64 * fixed_dt;
            self.step_start_time
                - (remainder + self.settings.max_lagging_steps as f64 * fixed_dt)
        } else {
            island_time + fixed_dt
        };
        self.registry
            .get_mut::<IslandTimestamp>(self.island_entity)
            .0 = new_time;
        self.delta_builder.updated_from_registry(
            &self.registry,
            self.island_entity,
            ComponentKind::IslandTimestamp,
        );

        // Republish the broadphase tree for the coordinator.
        let view = self.broadphase.view();
        self.registry
            .assign(self.island_entity, TreeViewComp(view));
        self.delta_builder.updated_from_registry(
            &self.registry,
            self.island_entity,
            ComponentKind::TreeView,
        );

        self.maybe_go_to_sleep();

        if self.topology_changed {
            let time = current_time();
            if self.pending_split {
                if time - self.split_timestamp > self.settings.calculate_split_delay {
                    self.pending_split = false;
                    if !self.graph.is_single_connected_component() {
                        let _ = self.channels.tx.send(WorkerMessage::SplitIsland);
                        trace!("island requested split");
                    }
                    self.topology_changed = false;
                }
            } else {
                self.pending_split = true;
                self.split_timestamp = time;
            }
        }

        if let Some(hook) = external_post_step() {
            hook(&mut self.registry);
        }

        self.sync();
        self.phase = Phase::Step;
    }

    /// Publish a delta to the coordinator: entity-map announcements, every
    /// AABB, all `Continuous` kinds, and the precise `Dirty` records. The
    /// dirty markers are cleared afterwards.
    fn sync(&mut self) {
        for (local, remote) in std::mem::take(&mut self.pending_mappings) {
            self.delta_builder.insert_entity_mapping(local, remote);
        }

        // The coordinator owns the global broadphase view, so AABBs always
        // travel.
        for entity in self.registry.entities_with::<AabbComp>() {
            self.delta_builder
                .updated_from_registry(&self.registry, entity, ComponentKind::Aabb);
        }

        for (entity, continuous) in self.registry.iter::<Continuous>() {
            for &kind in &continuous.kinds {
                self.delta_builder
                    .updated_from_registry(&self.registry, entity, kind);
            }
        }

        for (entity, dirty) in self.registry.iter::<Dirty>() {
            if dirty.is_new_entity {
                self.delta_builder.created_entity(entity);
            }
            for &kind in &dirty.created {
                self.delta_builder
                    .created_from_registry(&self.registry, entity, kind);
            }
            for &kind in &dirty.updated {
                self.delta_builder
                    .updated_from_registry(&self.registry, entity, kind);
            }
            for &kind in &dirty.destroyed {
                self.delta_builder.destroyed(entity, kind);
            }
        }
        self.registry.clear_pool::<Dirty>();

        let delta = self.delta_builder.finish();
        if !delta.is_empty() {
            let _ = self.channels.tx.send(WorkerMessage::Delta(delta));
        }
    }

    fn maybe_go_to_sleep(&mut self) {
        if self.could_go_to_sleep() {
            let island_time = self.registry.get::<IslandTimestamp>(self.island_entity).0;
            match self.sleep_timestamp {
                None => self.sleep_timestamp = Some(island_time),
                Some(start) => {
                    if island_time - start > self.settings.island_time_to_sleep as f64 {
                        self.go_to_sleep();
                        self.sleep_timestamp = None;
                    }
                }
            }
        } else {
            self.sleep_timestamp = None;
        }
    }

    fn could_go_to_sleep(&self) -> bool {
        // One sleep-disabled entity pins the whole island awake; everything
        // in an island moves together.
        if self.registry.count::<SleepingDisabledTag>() > 0 {
            return false;
        }

        let lin_sq = self.settings.island_linear_sleep_threshold
            * self.settings.island_linear_sleep_threshold;
        let ang_sq = self.settings.island_angular_sleep_threshold
            * self.settings.island_angular_sleep_threshold;

        for entity in self.registry.entities_with::<ProceduralTag>() {
            if let Some(vel) = self.registry.try_get::<LinVel>(entity) {
                if vel.0.length_squared() > lin_sq {
                    return false;
                }
            }
            if let Some(vel) = self.registry.try_get::<AngVel>(entity) {
                if vel.0.length_squared() > ang_sq {
                    return false;
                }
            }
        }
        true
    }

    fn go_to_sleep(&mut self) {
        self.registry.assign(self.island_entity, SleepingTag);
        self.delta_builder
            .created(self.island_entity, ComponentValue::SleepingTag);

        for entity in self.registry.entities_with::<ProceduralTag>() {
            if let Some(vel) = self.registry.try_get_mut::<LinVel>(entity) {
                vel.0 = glam::Vec3::ZERO;
            }
            if let Some(vel) = self.registry.try_get_mut::<AngVel>(entity) {
                vel.0 = glam::Vec3::ZERO;
            }
            if self.registry.has::<LinVel>(entity) {
                self.delta_builder.updated_from_registry(
                    &self.registry,
                    entity,
                    ComponentKind::LinVel,
                );
            }
            if self.registry.has::<AngVel>(entity) {
                self.delta_builder.updated_from_registry(
                    &self.registry,
                    entity,
                    ComponentKind::AngVel,
                );
            }
            self.registry.assign(entity, SleepingTag);
            self.delta_builder
                .created(entity, ComponentValue::SleepingTag);
        }
        trace!("island went to sleep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding_roundtrip() {
        let key = 0x1234_5678_9ABC_DEF0u64;
        assert_eq!(decode_key(encode_key(key)), key);
    }
}
