//! Island coordinator
//!
//! Owns the main registry's simulation bookkeeping: the authoritative
//! interaction graph, one message-queue pair per island worker, and the
//! entity maps that pair main-registry ids with each worker's ids.
//!
//! Per tick it drains incoming worker deltas into the main registry, turns
//! newly created bodies and constraints into graph nodes/edges and islands,
//! sweeps the workers' published tree views against each other to discover
//! cross-island pairs (which become merge edges), recomputes connected
//! components when a worker reports that its island may split, and routes
//! user input to the right worker.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::broadphase::should_collide;
use crate::components::{
    ComponentKind, ComponentValue, Constraint, ConstraintImpulse, ContactManifold, Island,
    IslandContainer, IslandTimestamp, KinematicTag, ProceduralTag, StaticTag, TreeViewComp,
};
use crate::config::SimulationSettings;
use crate::delta::{DeltaBuilder, EntityMap};
use crate::island_worker::IslandWorker;
use crate::job_dispatcher::current_time;
use crate::message::{island_channels, CoordinatorChannels, CoordinatorMessage, WorkerMessage};
use crate::registry::{Entity, Registry};
use std::sync::Arc;

/// Component kinds shipped when a body is handed to a worker.
const BODY_KINDS: &[ComponentKind] = &[
    ComponentKind::Position,
    ComponentKind::Orientation,
    ComponentKind::LinVel,
    ComponentKind::AngVel,
    ComponentKind::LinAcc,
    ComponentKind::Gravity,
    ComponentKind::Mass,
    ComponentKind::MassInv,
    ComponentKind::Inertia,
    ComponentKind::InertiaInv,
    ComponentKind::InertiaWorldInv,
    ComponentKind::Aabb,
    ComponentKind::Shape,
    ComponentKind::CollisionFilter,
    ComponentKind::Material,
    ComponentKind::DynamicTag,
    ComponentKind::KinematicTag,
    ComponentKind::StaticTag,
    ComponentKind::ProceduralTag,
    ComponentKind::SleepingDisabledTag,
    ComponentKind::ContinuousContactsTag,
    ComponentKind::Continuous,
];

/// Kinds shipped for constraint/manifold entities.
const CONSTRAINT_KINDS: &[ComponentKind] = &[
    ComponentKind::ContactManifold,
    ComponentKind::Constraint,
    ComponentKind::ConstraintImpulse,
];

struct WorkerSlot {
    worker: Arc<IslandWorker>,
    channels: CoordinatorChannels,
    /// remote = worker-local ids, local = main-registry ids.
    entity_map: EntityMap,
    /// `(main_local, worker_remote)` pairs to announce in the next send.
    pending_mappings: Vec<(Entity, Entity)>,
}

impl WorkerSlot {
    fn send(&mut self, mut builder: DeltaBuilder) {
        for (local, remote) in self.pending_mappings.drain(..) {
            builder.insert_entity_mapping(local, remote);
        }
        let delta = builder.finish();
        if !delta.is_empty() {
            let _ = self.channels.tx.send(CoordinatorMessage::Delta(delta));
            self.worker.reschedule();
        }
    }
}

/// Splits and merges islands, routes deltas and user input.
pub struct IslandCoordinator {
    settings: SimulationSettings,
    graph: crate::graph::Graph,
    node_map: HashMap<Entity, u32>,
    edge_map: HashMap<Entity, u32>,
    workers: HashMap<Entity, WorkerSlot>,
    split_requests: Vec<Entity>,
    paused: bool,
}

impl IslandCoordinator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            graph: crate::graph::Graph::new(),
            node_map: HashMap::new(),
            edge_map: HashMap::new(),
            workers: HashMap::new(),
            split_requests: Vec::new(),
            paused: false,
        }
    }

    pub fn island_count(&self) -> usize {
        self.workers.len()
    }

    pub fn islands(&self) -> Vec<Entity> {
        self.workers.keys().copied().collect()
    }

    /// One coordinator tick.
    pub fn update(&mut self, registry: &mut Registry) {
        self.process_worker_messages(registry);
        self.init_new_entities(registry);
        self.intersect_islands(registry);
        self.process_split_requests(registry);
    }

    /// Terminate every worker and wait for them to exit.
    pub fn shutdown(&mut self) {
        for (_, slot) in self.workers.drain() {
            slot.worker.terminate();
            slot.worker.join();
        }
    }

    // ------------------------------------------------------------------
    // incoming deltas
    // ------------------------------------------------------------------

    fn process_worker_messages(&mut self, registry: &mut Registry) {
        let islands: Vec<Entity> = self.workers.keys().copied().collect();
        for island in islands {
            loop {
                let message = {
                    let Some(slot) = self.workers.get_mut(&island) else {
                        break;
                    };
                    match slot.channels.rx.try_recv() {
                        Ok(message) => message,
                        Err(_) => break,
                    }
                };
                match message {
                    WorkerMessage::Delta(delta) => {
                        // New worker-side entities: manifolds and non-contact
                        // constraints become graph edges on our side too.
                        let mut edge_candidates = Vec::new();
                        {
                            let slot = self.workers.get_mut(&island).unwrap();
                            let result = delta.import(registry, &mut slot.entity_map);
                            for (remote, local) in result.new_mappings {
                                slot.pending_mappings.push((local, remote));
                            }
                            for (remote, value) in &delta.created {
                                let Some(local) = slot.entity_map.local(*remote) else {
                                    continue;
                                };
                                if !registry.alive(local) {
                                    continue;
                                }
                                match value {
                                    ComponentValue::ContactManifold(_) => {
                                        edge_candidates.push(local);
                                    }
                                    ComponentValue::Constraint(con) if !con.is_contact() => {
                                        edge_candidates.push(local);
                                    }
                                    _ => {}
                                }
                            }
                        }
                        for local in edge_candidates {
                            self.ensure_edge(registry, local);
                        }
                        self.prune_dead_handles(registry);
                    }
                    WorkerMessage::SplitIsland => {
                        self.split_requests.push(island);
                    }
                }
            }
        }
    }

    fn prune_dead_handles(&mut self, registry: &Registry) {
        let dead_edges: Vec<(Entity, u32)> = self
            .edge_map
            .iter()
            .filter(|(&entity, _)| !registry.alive(entity))
            .map(|(&entity, &edge)| (entity, edge))
            .collect();
        for (entity, edge) in dead_edges {
            self.edge_map.remove(&entity);
            self.graph.remove_edge(edge);
        }

        let dead_nodes: Vec<(Entity, u32)> = self
            .node_map
            .iter()
            .filter(|(&entity, _)| !registry.alive(entity))
            .map(|(&entity, &node)| (entity, node))
            .collect();
        for (entity, node) in dead_nodes {
            self.node_map.remove(&entity);
            // Removing the node drops its incident edges with it.
            let mut incident = Vec::new();
            self.graph.visit_edges(node, |_, edge_entity| incident.push(edge_entity));
            for edge_entity in incident {
                self.edge_map.remove(&edge_entity);
            }
            self.graph.remove_node(node);
        }
    }

    // ------------------------------------------------------------------
    // new bodies and constraints
    // ------------------------------------------------------------------

    fn init_new_entities(&mut self, registry: &mut Registry) {
        let new_procedural = registry.take_constructed::<ProceduralTag>();
        let new_static: Vec<Entity> = registry
            .take_constructed::<StaticTag>()
            .into_iter()
            .chain(registry.take_constructed::<KinematicTag>())
            .collect();
        let new_constraints = registry.take_constructed::<Constraint>();

        for &entity in new_procedural.iter().chain(new_static.iter()) {
            if !registry.alive(entity) {
                continue;
            }
            self.ensure_node(registry, entity);
            if !registry.has::<IslandContainer>(entity) {
                registry.assign(entity, IslandContainer::default());
            }
        }

        // User-created constraints become edges; contact constraints created
        // by workers are handled on the delta path.
        for &entity in &new_constraints {
            if !registry.alive(entity) || registry.has::<ContactManifold>(entity) {
                continue;
            }
            if !registry.has::<ConstraintImpulse>(entity) {
                registry.assign(entity, ConstraintImpulse::default());
            }
            self.ensure_edge(registry, entity);

            // A constraint whose bodies already live in islands routes to
            // that worker; linking two islands merges them. Constraints among
            // brand-new bodies travel with the body handoff below.
            let pair = registry.get::<Constraint>(entity).body();
            let mut islands = Vec::new();
            for body in pair {
                if let Some(container) = registry.try_get::<IslandContainer>(body) {
                    for &island in &container.islands {
                        if self.workers.contains_key(&island) && !islands.contains(&island) {
                            islands.push(island);
                        }
                    }
                }
            }
            let target = match islands.len() {
                0 => continue,
                1 => islands[0],
                _ => self.merge_islands(registry, &islands),
            };
            let mut builder = DeltaBuilder::new();
            export_entity(registry, entity, CONSTRAINT_KINDS, &mut builder);
            if let Some(slot) = self.workers.get_mut(&target) {
                slot.send(builder);
            }
        }

        // Ship new static bodies to every existing island; every worker can
        // collide against all non-procedural geometry.
        if !new_static.is_empty() {
            let islands: Vec<Entity> = self.workers.keys().copied().collect();
            for island in islands {
                let mut builder = DeltaBuilder::new();
                for &body in &new_static {
                    if registry.alive(body) {
                        export_entity(registry, body, BODY_KINDS, &mut builder);
                        registry
                            .get_mut::<IslandContainer>(body)
                            .insert(island);
                    }
                }
                if let Some(slot) = self.workers.get_mut(&island) {
                    slot.send(builder);
                }
            }
        }

        // Group new procedural bodies by connectivity: bodies joined by a
        // user constraint start in the same island.
        let mut assigned: Vec<Entity> = Vec::new();
        for &body in &new_procedural {
            if !registry.alive(body) || assigned.contains(&body) {
                continue;
            }
            let component = self.collect_new_component(registry, body, &new_procedural);
            assigned.extend(component.iter().copied());

            // Joined to an existing island through a constraint? Then the
            // bodies go there instead of a fresh island.
            let existing = self.adjacent_islands(registry, &component);
            let target = match existing.len() {
                0 => self.create_island(registry),
                1 => existing[0],
                _ => self.merge_islands(registry, &existing),
            };
            self.add_bodies_to_island(registry, target, &component);
        }
    }

    /// New procedural bodies transitively connected to `start` by edges
    /// among the new body set.
    fn collect_new_component(
        &self,
        registry: &Registry,
        start: Entity,
        new_bodies: &[Entity],
    ) -> Vec<Entity> {
        let mut component = vec![start];
        let mut stack = vec![start];
        while let Some(body) = stack.pop() {
            let Some(&node) = self.node_map.get(&body) else {
                continue;
            };
            self.graph.visit_edges(node, |edge, _| {
                let other = self.graph.other_node(edge, node);
                let other_entity = self.graph.node_entity(other);
                if new_bodies.contains(&other_entity)
                    && registry.has::<ProceduralTag>(other_entity)
                    && !component.contains(&other_entity)
                {
                    component.push(other_entity);
                    stack.push(other_entity);
                }
            });
        }
        component
    }

    /// Islands already containing a body adjacent to this component.
    fn adjacent_islands(&self, registry: &Registry, component: &[Entity]) -> Vec<Entity> {
        let mut islands = Vec::new();
        for &body in component {
            let Some(&node) = self.node_map.get(&body) else {
                continue;
            };
            self.graph.visit_edges(node, |edge, _| {
                let other = self.graph.node_entity(self.graph.other_node(edge, node));
                if let Some(container) = registry.try_get::<IslandContainer>(other) {
                    for &island in &container.islands {
                        if self.workers.contains_key(&island) && !islands.contains(&island) {
                            islands.push(island);
                        }
                    }
                }
            });
        }
        islands
    }

    fn ensure_node(&mut self, registry: &Registry, entity: Entity) -> u32 {
        if let Some(&node) = self.node_map.get(&entity) {
            return node;
        }
        let connecting = registry.has::<ProceduralTag>(entity);
        let node = self.graph.insert_node(entity, connecting);
        self.node_map.insert(entity, node);
        node
    }

    fn ensure_edge(&mut self, registry: &Registry, entity: Entity) -> Option<u32> {
        if let Some(&edge) = self.edge_map.get(&entity) {
            return Some(edge);
        }
        let body = if let Some(m) = registry.try_get::<ContactManifold>(entity) {
            m.body
        } else if let Some(c) = registry.try_get::<Constraint>(entity) {
            c.body()
        } else {
            return None;
        };
        let node_a = self.ensure_node(registry, body[0]);
        let node_b = self.ensure_node(registry, body[1]);
        let edge = self.graph.insert_edge(entity, node_a, node_b);
        self.edge_map.insert(entity, edge);
        Some(edge)
    }

    // ------------------------------------------------------------------
    // island lifecycle
    // ------------------------------------------------------------------

    fn create_island(&mut self, registry: &mut Registry) -> Entity {
        let island = registry.create();
        registry.assign(island, Island);
        registry.assign(island, IslandTimestamp(current_time()));

        let (coordinator_channels, worker_channels) = island_channels();
        let worker = IslandWorker::spawn(island, self.settings, worker_channels);
        if self.paused {
            let _ = coordinator_channels
                .tx
                .send(CoordinatorMessage::SetPaused(true));
            worker.reschedule();
        }

        // The worker announces its local island id in its first sync, which
        // completes this slot's entity map.
        let mut slot = WorkerSlot {
            worker,
            channels: coordinator_channels,
            entity_map: EntityMap::new(),
            pending_mappings: Vec::new(),
        };

        // Seed the worker with every non-procedural body.
        let mut builder = DeltaBuilder::new();
        let mut statics: Vec<Entity> = registry.entities_with::<StaticTag>();
        statics.extend(registry.entities_with::<KinematicTag>());
        for body in statics {
            export_entity(registry, body, BODY_KINDS, &mut builder);
            if registry.has::<IslandContainer>(body) {
                registry.get_mut::<IslandContainer>(body).insert(island);
            }
        }
        slot.send(builder);

        self.workers.insert(island, slot);
        debug!(?island, islands = self.workers.len(), "island created");
        island
    }

    fn add_bodies_to_island(
        &mut self,
        registry: &mut Registry,
        island: Entity,
        bodies: &[Entity],
    ) {
        let mut builder = DeltaBuilder::new();
        for &body in bodies {
            export_entity(registry, body, BODY_KINDS, &mut builder);
            registry.get_mut::<IslandContainer>(body).insert(island);
        }

        // Constraints whose two bodies are now both in this island travel
        // along with them.
        for &body in bodies {
            let Some(&node) = self.node_map.get(&body) else {
                continue;
            };
            let mut edge_entities = Vec::new();
            self.graph.visit_edges(node, |_, entity| edge_entities.push(entity));
            for entity in edge_entities {
                if registry.has::<ContactManifold>(entity) {
                    continue; // contact manifolds are created by workers
                }
                if let Some(con) = registry.try_get::<Constraint>(entity) {
                    let pair = con.body();
                    let both_present = pair.iter().all(|b| {
                        registry
                            .try_get::<IslandContainer>(*b)
                            .is_some_and(|c| c.contains(island))
                            || bodies.contains(b)
                    });
                    if both_present {
                        export_entity(registry, entity, CONSTRAINT_KINDS, &mut builder);
                    }
                }
            }
        }

        if let Some(slot) = self.workers.get_mut(&island) {
            slot.send(builder);
        }
    }

    /// Bodies currently assigned to an island.
    fn island_members(&self, registry: &Registry, island: Entity) -> Vec<Entity> {
        registry
            .iter::<IslandContainer>()
            .filter(|(e, c)| c.contains(island) && registry.has::<ProceduralTag>(*e))
            .map(|(e, _)| e)
            .collect()
    }

    /// Merge several islands into the one with the most procedural bodies:
    /// every other island's state is sent to the survivor's worker and the
    /// other workers are terminated.
    fn merge_islands(&mut self, registry: &mut Registry, islands: &[Entity]) -> Entity {
        debug_assert!(islands.len() > 1);
        let survivor = *islands
            .iter()
            .max_by_key(|&&island| self.island_members(registry, island).len())
            .unwrap();

        for &island in islands {
            if island == survivor {
                continue;
            }
            let members = self.island_members(registry, island);

            // Hand every moved body and its constraints to the survivor.
            let mut builder = DeltaBuilder::new();
            for &body in &members {
                export_entity(registry, body, BODY_KINDS, &mut builder);
                let container = registry.get_mut::<IslandContainer>(body);
                container.remove(island);
                container.insert(survivor);
            }
            let mut moved_edges = Vec::new();
            for &body in &members {
                if let Some(&node) = self.node_map.get(&body) {
                    self.graph.visit_edges(node, |_, entity| {
                        if !moved_edges.contains(&entity) {
                            moved_edges.push(entity);
                        }
                    });
                }
            }
            for entity in moved_edges {
                export_entity(registry, entity, CONSTRAINT_KINDS, &mut builder);
            }

            if let Some(slot) = self.workers.remove(&island) {
                slot.worker.terminate();
            }
            if let Some(slot) = self.workers.get_mut(&survivor) {
                slot.send(builder);
            }

            registry.destroy(island);
            debug!(?island, ?survivor, "islands merged");
        }
        survivor
    }

    // ------------------------------------------------------------------
    // cross-island broadphase
    // ------------------------------------------------------------------

    /// Sweep workers' tree views against each other; an overlapping pair
    /// across two islands becomes a manifold in the main registry and the
    /// edge merges the islands.
    fn intersect_islands(&mut self, registry: &mut Registry) {
        let islands: Vec<Entity> = self.workers.keys().copied().collect();
        let mut new_pairs: Vec<(Entity, Entity, Entity, Entity)> = Vec::new();

        for i in 0..islands.len() {
            for j in (i + 1)..islands.len() {
                let (Some(view_i), Some(view_j)) = (
                    registry.try_get::<TreeViewComp>(islands[i]),
                    registry.try_get::<TreeViewComp>(islands[j]),
                ) else {
                    continue;
                };
                if !view_i.0.root_aabb.intersects(&view_j.0.root_aabb) {
                    continue;
                }
                for leaf in &view_i.0.leaves {
                    let query = leaf.aabb.inset(self.settings.aabb_offset);
                    view_j.0.query(&query, |other, _| {
                        if should_collide(registry, leaf.entity, other)
                            && !manifold_exists(registry, leaf.entity, other)
                        {
                            new_pairs.push((leaf.entity, other, islands[i], islands[j]));
                        }
                    });
                }
            }
        }

        for (body_a, body_b, island_a, island_b) in new_pairs {
            if manifold_exists(registry, body_a, body_b) {
                continue;
            }
            if !self.workers.contains_key(&island_a) || !self.workers.contains_key(&island_b) {
                continue; // already merged this tick
            }
            let manifold = crate::broadphase::make_contact_manifold(
                registry,
                body_a,
                body_b,
                self.settings.separation_threshold,
            );
            // Consumed here, not synced back out of the main registry.
            registry.remove::<crate::components::Dirty>(manifold);
            self.ensure_edge(registry, manifold);
            trace!(?body_a, ?body_b, "cross-island contact");

            let survivor = self.merge_islands(registry, &[island_a, island_b]);
            let mut builder = DeltaBuilder::new();
            builder.created_entity(manifold);
            export_entity(registry, manifold, CONSTRAINT_KINDS, &mut builder);
            if let Some(slot) = self.workers.get_mut(&survivor) {
                slot.send(builder);
            }
        }
    }

    // ------------------------------------------------------------------
    // splitting
    // ------------------------------------------------------------------

    fn process_split_requests(&mut self, registry: &mut Registry) {
        for island in std::mem::take(&mut self.split_requests) {
            if !self.workers.contains_key(&island) {
                continue;
            }
            let members = self.island_members(registry, island);
            if members.len() < 2 {
                continue;
            }

            // Partition members by global connected components.
            let components = self.graph.connected_components();
            let mut partitions: Vec<Vec<Entity>> = Vec::new();
            for component in &components {
                let bodies: Vec<Entity> = component
                    .nodes
                    .iter()
                    .map(|&n| self.graph.node_entity(n))
                    .filter(|e| members.contains(e))
                    .collect();
                if !bodies.is_empty() {
                    partitions.push(bodies);
                }
            }
            if partitions.len() < 2 {
                continue;
            }

            // The largest partition keeps the existing worker; the rest move
            // to fresh islands.
            partitions.sort_by_key(|p| std::cmp::Reverse(p.len()));
            debug!(?island, parts = partitions.len(), "island split");

            for part in partitions.into_iter().skip(1) {
                // Remove the moved bodies from the old worker.
                let mut removal = DeltaBuilder::new();
                for &body in &part {
                    removal.destroyed_entity(body);
                    registry.get_mut::<IslandContainer>(body).remove(island);
                }
                if let Some(slot) = self.workers.get_mut(&island) {
                    slot.send(removal);
                }

                let new_island = self.create_island(registry);
                self.add_bodies_to_island(registry, new_island, &part);
            }
        }
    }

    // ------------------------------------------------------------------
    // user input routing
    // ------------------------------------------------------------------

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        for slot in self.workers.values() {
            let _ = slot.channels.tx.send(CoordinatorMessage::SetPaused(paused));
            slot.worker.reschedule();
        }
    }

    /// Run a single step on every island while paused.
    pub fn step_simulation(&self) {
        for slot in self.workers.values() {
            let _ = slot.channels.tx.send(CoordinatorMessage::StepSimulation);
            slot.worker.reschedule();
        }
    }

    /// Wake the island containing `entity` (or the island entity itself).
    pub fn wake_up_island(&self, registry: &Registry, entity: Entity) {
        let islands: Vec<Entity> = if self.workers.contains_key(&entity) {
            vec![entity]
        } else if let Some(container) = registry.try_get::<IslandContainer>(entity) {
            container.islands.clone()
        } else {
            Vec::new()
        };
        for island in islands {
            if let Some(slot) = self.workers.get(&island) {
                let _ = slot.channels.tx.send(CoordinatorMessage::WakeUpIsland);
                slot.worker.reschedule();
            }
        }
    }
}

fn manifold_exists(registry: &Registry, a: Entity, b: Entity) -> bool {
    registry
        .iter::<ContactManifold>()
        .any(|(_, m)| (m.body[0] == a && m.body[1] == b) || (m.body[0] == b && m.body[1] == a))
}

/// Record `entity` and the given kinds as created into `builder`.
fn export_entity(
    registry: &Registry,
    entity: Entity,
    kinds: &[ComponentKind],
    builder: &mut DeltaBuilder,
) {
    builder.created_entity(entity);
    for &kind in kinds {
        builder.created_from_registry(registry, entity, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{make_rigidbody, RigidBodyDef};
    use glam::Vec3;
    use std::time::{Duration, Instant};

    fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn test_new_body_creates_island() {
        let mut registry = Registry::new();
        let mut coordinator = IslandCoordinator::new(SimulationSettings::default());

        let def = RigidBodyDef {
            position: Vec3::new(0.0, 5.0, 0.0),
            ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
        };
        make_rigidbody(&mut registry, &def).unwrap();

        coordinator.update(&mut registry);
        assert_eq!(coordinator.island_count(), 1);

        coordinator.shutdown();
    }

    #[test]
    fn test_two_distant_bodies_two_islands() {
        let mut registry = Registry::new();
        let mut coordinator = IslandCoordinator::new(SimulationSettings::default());

        for x in [0.0_f32, 100.0] {
            let def = RigidBodyDef {
                position: Vec3::new(x, 5.0, 0.0),
                gravity: None,
                ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
            };
            make_rigidbody(&mut registry, &def).unwrap();
        }

        coordinator.update(&mut registry);
        assert_eq!(coordinator.island_count(), 2);

        coordinator.shutdown();
    }

    #[test]
    fn test_close_islands_merge() {
        let mut registry = Registry::new();
        let mut coordinator = IslandCoordinator::new(SimulationSettings::default());

        for x in [0.0_f32, 0.9] {
            let def = RigidBodyDef {
                position: Vec3::new(x, 0.0, 0.0),
                gravity: None,
                ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
            };
            make_rigidbody(&mut registry, &def).unwrap();
        }

        coordinator.update(&mut registry);
        assert_eq!(coordinator.island_count(), 2, "bodies start in separate islands");

        // Once both workers publish tree views, the coordinator's sweep
        // must merge the overlapping islands.
        let merged = wait_until(
            || {
                coordinator.update(&mut registry);
                coordinator.island_count() == 1
            },
            Duration::from_secs(10),
        );
        assert!(merged, "overlapping islands should merge");

        coordinator.shutdown();
    }

    #[test]
    fn test_constrained_bodies_share_island() {
        let mut registry = Registry::new();
        let mut coordinator = IslandCoordinator::new(SimulationSettings::default());

        let a = make_rigidbody(
            &mut registry,
            &RigidBodyDef {
                position: Vec3::new(0.0, 10.0, 0.0),
                gravity: None,
                ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
            },
        )
        .unwrap();
        let b = make_rigidbody(
            &mut registry,
            &RigidBodyDef {
                position: Vec3::new(30.0, 10.0, 0.0),
                gravity: None,
                ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
            },
        )
        .unwrap();

        let constraint = registry.create();
        registry.assign(
            constraint,
            Constraint::Distance {
                body: [a, b],
                pivots: [Vec3::ZERO, Vec3::ZERO],
                distance: 30.0,
                stiffness: crate::math::LARGE_SCALAR,
                damping: crate::math::LARGE_SCALAR,
            },
        );

        coordinator.update(&mut registry);
        assert_eq!(
            coordinator.island_count(),
            1,
            "constrained bodies belong to one island"
        );

        coordinator.shutdown();
    }
}
