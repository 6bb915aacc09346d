//! Broadphase
//!
//! Maintains two bounding-volume trees: the *procedural* tree holds dynamic
//! bodies, the *non-procedural* tree static and kinematic ones. Per step it
//! initializes deferred AABB entities, destroys manifolds whose pair AABBs
//! separated beyond the manifold's threshold, refits moved proxies, and
//! queries both trees with each dynamic body's inflated AABB to create new
//! contact manifolds.
//!
//! The async path collects candidate pairs in per-task vectors from a rayon
//! sweep and merges them serially in [`Broadphase::finish_async_update`],
//! which keeps manifold-creation order deterministic.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::bvh::{DynamicTree, TreeView};
use crate::components::{
    mark_dirty, AabbComp, ComponentKind, ContactManifold, KinematicTag, ProceduralTag,
    TreeNodeId,
};
use crate::config::SimulationSettings;
use crate::filter::CollisionFilter;
use crate::math::Scalar;
use crate::registry::{Entity, Registry};

/// Manifold lifecycle changes produced by one broadphase update.
#[derive(Debug, Default)]
pub struct BroadphaseReport {
    pub created_manifolds: Vec<Entity>,
    pub destroyed_manifolds: Vec<Entity>,
}

/// Two-tree broadphase with manifold lifecycle management.
pub struct Broadphase {
    /// Dynamic bodies.
    tree: DynamicTree,
    /// Static and kinematic bodies.
    np_tree: DynamicTree,
    /// Proxy bookkeeping for explicit destruction: entity -> (node id, procedural).
    proxies: HashMap<Entity, (u32, bool)>,
    /// Per-task candidate pairs from the async sweep.
    pair_results: Vec<Vec<(Entity, Entity)>>,
    aabb_offset: Scalar,
    separation_threshold: Scalar,
}

impl Broadphase {
    pub fn new(settings: &SimulationSettings) -> Self {
        Self {
            tree: DynamicTree::new(),
            np_tree: DynamicTree::new(),
            proxies: HashMap::new(),
            pair_results: Vec::new(),
            aabb_offset: settings.aabb_offset,
            separation_threshold: settings.separation_threshold,
        }
    }

    /// Snapshot of the procedural tree for the coordinator.
    pub fn view(&self) -> TreeView {
        self.tree.view()
    }

    /// The async path pays off only with more than one dynamic body.
    pub fn parallelizable(&self, registry: &Registry) -> bool {
        registry
            .iter::<AabbComp>()
            .filter(|(e, _)| registry.has::<ProceduralTag>(*e))
            .count()
            > 1
    }

    /// Synchronous update: lifecycle plus pair search.
    pub fn update(&mut self, registry: &mut Registry) -> BroadphaseReport {
        let mut report = BroadphaseReport::default();
        self.common_update(registry, &mut report);

        let mut existing = existing_pairs(registry);
        for entity in self.procedural_entities(registry) {
            let offset_aabb = registry.get::<AabbComp>(entity).0.inset(self.aabb_offset);
            let mut candidates = Vec::new();
            self.tree.query(&offset_aabb, |id| candidates.push(self.tree.entity(id)));
            self.np_tree
                .query(&offset_aabb, |id| candidates.push(self.np_tree.entity(id)));

            for other in candidates {
                if !should_collide(registry, entity, other) {
                    continue;
                }
                if existing.contains(&pair_key(entity, other)) {
                    continue;
                }
                let other_aabb = registry.get::<AabbComp>(other).0;
                if !offset_aabb.intersects(&other_aabb) {
                    continue;
                }
                let manifold =
                    make_contact_manifold(registry, entity, other, self.separation_threshold);
                existing.insert(pair_key(entity, other));
                report.created_manifolds.push(manifold);
            }
        }
        report
    }

    /// Async update: lifecycle serially, then a parallel pair sweep writing
    /// into per-task vectors. Call [`Self::finish_async_update`] afterwards.
    pub fn update_async(&mut self, registry: &mut Registry) -> BroadphaseReport {
        debug_assert!(self.parallelizable(registry));
        let mut report = BroadphaseReport::default();
        self.common_update(registry, &mut report);

        let entities = self.procedural_entities(registry);
        let tree = &self.tree;
        let np_tree = &self.np_tree;
        let offset = self.aabb_offset;
        let registry_ref = &*registry;

        self.pair_results = entities
            .par_iter()
            .map(|&entity| {
                let offset_aabb = registry_ref.get::<AabbComp>(entity).0.inset(offset);
                let mut pairs = Vec::new();
                let mut visit = |other: Entity| {
                    if !should_collide(registry_ref, entity, other) {
                        return;
                    }
                    let other_aabb = registry_ref.get::<AabbComp>(other).0;
                    if offset_aabb.intersects(&other_aabb) {
                        pairs.push((entity, other));
                    }
                };
                tree.query(&offset_aabb, |id| visit(tree.entity(id)));
                np_tree.query(&offset_aabb, |id| visit(np_tree.entity(id)));
                pairs
            })
            .collect();

        report
    }

    /// Serial merge of the async sweep's candidate pairs.
    pub fn finish_async_update(&mut self, registry: &mut Registry) -> BroadphaseReport {
        let mut report = BroadphaseReport::default();
        let mut existing = existing_pairs(registry);
        for pairs in std::mem::take(&mut self.pair_results) {
            for (a, b) in pairs {
                if existing.contains(&pair_key(a, b)) {
                    continue;
                }
                let manifold = make_contact_manifold(registry, a, b, self.separation_threshold);
                existing.insert(pair_key(a, b));
                report.created_manifolds.push(manifold);
            }
        }
        report
    }

    fn procedural_entities(&self, registry: &Registry) -> Vec<Entity> {
        registry
            .entities_with::<AabbComp>()
            .into_iter()
            .filter(|&e| registry.has::<ProceduralTag>(e))
            .collect()
    }

    fn common_update(&mut self, registry: &mut Registry, report: &mut BroadphaseReport) {
        self.init_new_aabb_entities(registry);
        self.purge_dead_proxies(registry);

        report
            .destroyed_manifolds
            .extend(destroy_separated_manifolds(registry));

        // Refit procedural proxies.
        for entity in registry.entities_with::<TreeNodeId>() {
            if !registry.has::<ProceduralTag>(entity) {
                continue;
            }
            let id = registry.get::<TreeNodeId>(entity).0;
            let aabb = registry.get::<AabbComp>(entity).0;
            self.tree.move_proxy(id, aabb);
        }
        // Kinematic bodies move too, in the non-procedural tree.
        for entity in registry.entities_with::<TreeNodeId>() {
            if !registry.has::<KinematicTag>(entity) {
                continue;
            }
            let id = registry.get::<TreeNodeId>(entity).0;
            let aabb = registry.get::<AabbComp>(entity).0;
            self.np_tree.move_proxy(id, aabb);
        }
    }

    /// Entities whose AABB appeared since the last update are registered in
    /// the tree matching their procedural tag. Construction is observed via
    /// the registry log, so entities queue here until fully assembled.
    fn init_new_aabb_entities(&mut self, registry: &mut Registry) {
        for entity in registry.take_constructed::<AabbComp>() {
            if !registry.alive(entity) || self.proxies.contains_key(&entity) {
                continue;
            }
            let aabb = registry.get::<AabbComp>(entity).0;
            let procedural = registry.has::<ProceduralTag>(entity);
            let id = if procedural {
                self.tree.create(aabb, entity)
            } else {
                self.np_tree.create(aabb, entity)
            };
            registry.assign(entity, TreeNodeId(id));
            self.proxies.insert(entity, (id, procedural));
        }
    }

    fn purge_dead_proxies(&mut self, registry: &Registry) {
        let Self {
            proxies,
            tree,
            np_tree,
            ..
        } = self;
        proxies.retain(|&entity, &mut (id, procedural)| {
            if registry.alive(entity) {
                true
            } else {
                if procedural {
                    tree.destroy(id);
                } else {
                    np_tree.destroy(id);
                }
                false
            }
        });
    }
}

/// Destroy every manifold whose bodies' AABBs, inflated by the manifold's
/// separation threshold, no longer intersect. Returns the destroyed ids.
pub fn destroy_separated_manifolds(registry: &mut Registry) -> Vec<Entity> {
    let mut separated = Vec::new();
    for (entity, manifold) in registry.iter::<ContactManifold>() {
        let aabbs = (
            registry.try_get::<AabbComp>(manifold.body[0]),
            registry.try_get::<AabbComp>(manifold.body[1]),
        );
        // A manifold referencing a removed body is stale either way.
        let (Some(aabb_a), Some(aabb_b)) = aabbs else {
            separated.push(entity);
            continue;
        };
        if !aabb_a.0.inset(-manifold.separation_threshold).intersects(&aabb_b.0) {
            separated.push(entity);
        }
    }
    for &entity in &separated {
        registry.destroy(entity);
    }
    separated
}

/// Pair admission: distinct, alive, filters mutually accepting.
pub fn should_collide(registry: &Registry, a: Entity, b: Entity) -> bool {
    if a == b || !registry.alive(a) || !registry.alive(b) {
        return false;
    }
    let filter_a = registry.get::<CollisionFilter>(a);
    let filter_b = registry.get::<CollisionFilter>(b);
    CollisionFilter::should_collide(filter_a, filter_b)
}

/// Create a contact manifold entity for an intersecting pair.
pub fn make_contact_manifold(
    registry: &mut Registry,
    body_a: Entity,
    body_b: Entity,
    separation_threshold: Scalar,
) -> Entity {
    debug_assert!(body_a != body_b);
    let entity = registry.create();
    registry.assign(entity, ContactManifold::new([body_a, body_b], separation_threshold));
    mark_dirty(registry, entity)
        .set_new()
        .created(ComponentKind::ContactManifold);
    entity
}

fn pair_key(a: Entity, b: Entity) -> (Entity, Entity) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn existing_pairs(registry: &Registry) -> HashSet<(Entity, Entity)> {
    registry
        .iter::<ContactManifold>()
        .map(|(_, m)| pair_key(m.body[0], m.body[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::Aabb;
    use glam::Vec3;

    fn make_proc_body(registry: &mut Registry, center: Vec3) -> Entity {
        let e = registry.create();
        registry.assign(e, ProceduralTag);
        registry.assign(e, CollisionFilter::default());
        registry.assign(
            e,
            AabbComp(Aabb::from_center_half_extents(center, Vec3::splat(0.5))),
        );
        e
    }

    fn make_static_body(registry: &mut Registry, center: Vec3, half: Vec3) -> Entity {
        let e = registry.create();
        registry.assign(e, CollisionFilter::default());
        registry.assign(e, AabbComp(Aabb::from_center_half_extents(center, half)));
        e
    }

    #[test]
    fn test_overlapping_bodies_get_a_manifold() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        let a = make_proc_body(&mut registry, Vec3::ZERO);
        let b = make_proc_body(&mut registry, Vec3::new(0.8, 0.0, 0.0));

        let report = broadphase.update(&mut registry);
        assert_eq!(report.created_manifolds.len(), 1);

        let manifold = registry.get::<ContactManifold>(report.created_manifolds[0]);
        assert!(manifold.body.contains(&a));
        assert!(manifold.body.contains(&b));
        assert_ne!(manifold.body[0], manifold.body[1]);
    }

    #[test]
    fn test_no_duplicate_manifold_on_second_update() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        make_proc_body(&mut registry, Vec3::ZERO);
        make_proc_body(&mut registry, Vec3::new(0.8, 0.0, 0.0));

        let first = broadphase.update(&mut registry);
        assert_eq!(first.created_manifolds.len(), 1);
        let second = broadphase.update(&mut registry);
        assert!(second.created_manifolds.is_empty());
        assert_eq!(registry.count::<ContactManifold>(), 1);
    }

    #[test]
    fn test_separated_manifold_destroyed() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        let a = make_proc_body(&mut registry, Vec3::ZERO);
        let report = broadphase.update(&mut registry);
        assert!(report.created_manifolds.is_empty());

        let b = make_proc_body(&mut registry, Vec3::new(0.8, 0.0, 0.0));
        let report = broadphase.update(&mut registry);
        assert_eq!(report.created_manifolds.len(), 1);
        let manifold = report.created_manifolds[0];

        // Move B far away; the manifold must be destroyed and no manifold
        // with disjoint inflated AABBs may remain.
        registry.get_mut::<AabbComp>(b).0 =
            Aabb::from_center_half_extents(Vec3::new(50.0, 0.0, 0.0), Vec3::splat(0.5));
        let report = broadphase.update(&mut registry);
        assert_eq!(report.destroyed_manifolds, vec![manifold]);
        assert!(!registry.alive(manifold));
        assert_eq!(registry.count::<ContactManifold>(), 0);
        let _ = a;
    }

    #[test]
    fn test_filters_block_pairs() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        let a = make_proc_body(&mut registry, Vec3::ZERO);
        let b = make_proc_body(&mut registry, Vec3::new(0.5, 0.0, 0.0));
        registry.assign(a, CollisionFilter::new(0b01, 0b10));
        registry.assign(b, CollisionFilter::new(0b01, 0b10));

        let report = broadphase.update(&mut registry);
        assert!(report.created_manifolds.is_empty());
    }

    #[test]
    fn test_dynamic_body_never_in_np_tree() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        make_proc_body(&mut registry, Vec3::ZERO);
        make_static_body(&mut registry, Vec3::new(5.0, 0.0, 0.0), Vec3::splat(1.0));
        broadphase.update(&mut registry);

        assert_eq!(broadphase.tree.leaf_count(), 1);
        assert_eq!(broadphase.np_tree.leaf_count(), 1);
    }

    #[test]
    fn test_static_pair_discovered_via_np_tree() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        make_proc_body(&mut registry, Vec3::new(0.0, 0.6, 0.0));
        make_static_body(&mut registry, Vec3::ZERO, Vec3::new(10.0, 0.5, 10.0));

        let report = broadphase.update(&mut registry);
        assert_eq!(report.created_manifolds.len(), 1);
    }

    #[test]
    fn test_async_path_matches_sync_result() {
        let settings = SimulationSettings::default();

        let build = |registry: &mut Registry| {
            for i in 0..6 {
                make_proc_body(registry, Vec3::new(i as f32 * 0.7, 0.0, 0.0));
            }
        };

        let mut reg_sync = Registry::new();
        build(&mut reg_sync);
        let mut bp_sync = Broadphase::new(&settings);
        let sync_report = bp_sync.update(&mut reg_sync);

        let mut reg_async = Registry::new();
        build(&mut reg_async);
        let mut bp_async = Broadphase::new(&settings);
        assert!(bp_async.parallelizable(&reg_async));
        bp_async.update_async(&mut reg_async);
        let async_report = bp_async.finish_async_update(&mut reg_async);

        assert_eq!(
            sync_report.created_manifolds.len(),
            async_report.created_manifolds.len()
        );
        assert_eq!(
            reg_sync.count::<ContactManifold>(),
            reg_async.count::<ContactManifold>()
        );
    }

    #[test]
    fn test_dead_entity_proxy_is_purged() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut broadphase = Broadphase::new(&settings);

        let a = make_proc_body(&mut registry, Vec3::ZERO);
        broadphase.update(&mut registry);
        assert_eq!(broadphase.tree.leaf_count(), 1);

        registry.destroy(a);
        broadphase.update(&mut registry);
        assert_eq!(broadphase.tree.leaf_count(), 0);
    }
}
