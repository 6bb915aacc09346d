//! Narrowphase
//!
//! For every contact manifold, runs the collision dispatcher on the pair's
//! shapes and maintains the manifold's persistent points: refresh distances
//! from the current transforms, drop broken points, merge fresh collision
//! points into matching cached ones (preserving warm-start impulses and
//! lifetimes), and reduce to the four points spanning the largest contact
//! patch. Per-point restitution and friction come from the bodies'
//! materials.
//!
//! In the async path collision detection runs across manifolds in parallel;
//! manifold mutation is serialized afterwards.

use glam::Vec3;

use rayon::prelude::*;

use crate::collide::{collide, CollisionContext, CollisionPoint, CollisionResult};
use crate::components::{
    mark_dirty, AabbComp, ComponentKind, Constraint, ConstraintImpulse, ContactManifold,
    ContactPoint, Material, Orientation, Position, RotatedMesh, ShapeComp, MAX_CONTACTS,
};
use crate::config::SimulationSettings;
use crate::material::ContactMaterial;
use crate::math::{to_world_space, Scalar};
use crate::registry::{Entity, Registry};

/// Per-pair collision dispatch and manifold point maintenance.
pub struct Narrowphase {
    /// Detection results awaiting serial merge in the async path.
    results: Vec<(Entity, CollisionResult)>,
    breaking_threshold: Scalar,
    caching_threshold: Scalar,
}

impl Narrowphase {
    pub fn new(settings: &SimulationSettings) -> Self {
        Self {
            results: Vec::new(),
            breaking_threshold: settings.contact_breaking_threshold,
            caching_threshold: settings.contact_caching_threshold,
        }
    }

    pub fn parallelizable(&self, registry: &Registry) -> bool {
        registry.count::<ContactManifold>() > 1
    }

    /// Synchronous update over every manifold.
    pub fn update(&mut self, registry: &mut Registry) {
        let manifolds = registry.entities_with::<ContactManifold>();
        self.update_contact_manifolds(registry, &manifolds);
    }

    /// Run detection and point maintenance for the given manifolds. Also
    /// used to initialize manifolds freshly imported from the coordinator.
    pub fn update_contact_manifolds(&mut self, registry: &mut Registry, manifolds: &[Entity]) {
        for &entity in manifolds {
            if !registry.alive(entity) {
                continue;
            }
            let result = self.detect_collision(registry, entity);
            self.merge_result(registry, entity, result);
        }
    }

    /// Async update: parallel detection, then call
    /// [`Self::finish_async_update`] for the serialized merge.
    pub fn update_async(&mut self, registry: &mut Registry) {
        debug_assert!(self.parallelizable(registry));
        let manifolds = registry.entities_with::<ContactManifold>();
        let registry_ref = &*registry;
        self.results = manifolds
            .par_iter()
            .map(|&entity| (entity, detect_collision(registry_ref, entity, self.breaking_threshold)))
            .collect();
    }

    pub fn finish_async_update(&mut self, registry: &mut Registry) {
        for (entity, result) in std::mem::take(&mut self.results) {
            if registry.alive(entity) {
                self.merge_result(registry, entity, result);
            }
        }
    }

    fn detect_collision(&self, registry: &Registry, manifold_entity: Entity) -> CollisionResult {
        detect_collision(registry, manifold_entity, self.breaking_threshold)
    }

    /// Manifold point maintenance: refresh, drop, merge, reduce.
    fn merge_result(&self, registry: &mut Registry, entity: Entity, result: CollisionResult) {
        let manifold = registry.get::<ContactManifold>(entity).clone();
        let [body_a, body_b] = manifold.body;
        let pos_a = registry.get::<Position>(body_a).0;
        let orn_a = registry.get::<Orientation>(body_a).0;
        let pos_b = registry.get::<Position>(body_b).0;
        let orn_b = registry.get::<Orientation>(body_b).0;

        // Refresh surviving points from the current transforms and drop the
        // ones that broke away along the normal or drifted tangentially.
        let mut points: Vec<ContactPoint> = Vec::with_capacity(MAX_CONTACTS);
        for mut cp in manifold.points {
            let pivot_a_world = to_world_space(cp.pivot_a, pos_a, orn_a);
            let pivot_b_world = to_world_space(cp.pivot_b, pos_b, orn_b);
            let normal = orn_b * cp.normal_b;
            let d = pivot_a_world - pivot_b_world;
            let normal_dist = d.dot(normal);
            let tangential = d - normal * normal_dist;

            if normal_dist < self.breaking_threshold
                && tangential.length_squared() < self.breaking_threshold * self.breaking_threshold
            {
                cp.distance = normal_dist;
                cp.lifetime += 1;
                points.push(cp);
            }
        }

        // Merge the fresh detection results.
        let contact_material = combined_material(registry, body_a, body_b);
        for rp in &result.points {
            merge_point(
                &mut points,
                rp,
                &contact_material,
                self.caching_threshold,
            );
        }

        let has_points = !points.is_empty();
        let manifold_mut = registry.get_mut::<ContactManifold>(entity);
        manifold_mut.points = points;
        mark_dirty(registry, entity).updated(ComponentKind::ContactManifold);

        // A manifold between two material-bearing bodies responds with
        // impulses; sensors only report the manifold.
        if has_points
            && !registry.has::<Constraint>(entity)
            && registry.has::<Material>(body_a)
            && registry.has::<Material>(body_b)
        {
            let mixed = contact_material.expect("material-bearing pair must combine");
            registry.assign(
                entity,
                Constraint::Contact {
                    body: [body_a, body_b],
                    stiffness: mixed.stiffness,
                    damping: mixed.damping,
                },
            );
            registry.assign(entity, ConstraintImpulse::default());
            mark_dirty(registry, entity)
                .created(ComponentKind::Constraint)
                .created(ComponentKind::ConstraintImpulse);
        }
    }
}

/// Collision dispatch for a manifold's pair, honoring the one-extra check
/// that the pair AABBs still overlap within the breaking threshold. The
/// manifold may legitimately outlive tighter AABB separation.
fn detect_collision(
    registry: &Registry,
    manifold_entity: Entity,
    breaking_threshold: Scalar,
) -> CollisionResult {
    let manifold = registry.get::<ContactManifold>(manifold_entity);
    let [body_a, body_b] = manifold.body;

    let aabb_a = registry.get::<AabbComp>(body_a).0;
    let aabb_b = registry.get::<AabbComp>(body_b).0;
    if !aabb_a.inset(-breaking_threshold).intersects(&aabb_b) {
        return CollisionResult::new();
    }

    let ctx = CollisionContext {
        pos_a: registry.get::<Position>(body_a).0,
        orn_a: registry.get::<Orientation>(body_a).0,
        aabb_a,
        pos_b: registry.get::<Position>(body_b).0,
        orn_b: registry.get::<Orientation>(body_b).0,
        aabb_b,
        rotated_a: registry.try_get::<RotatedMesh>(body_a),
        rotated_b: registry.try_get::<RotatedMesh>(body_b),
        threshold: breaking_threshold,
    };
    let shape_a = &registry.get::<ShapeComp>(body_a).0;
    let shape_b = &registry.get::<ShapeComp>(body_b).0;
    collide(shape_a, shape_b, &ctx)
}

fn combined_material(
    registry: &Registry,
    body_a: Entity,
    body_b: Entity,
) -> Option<ContactMaterial> {
    let mat_a = registry.try_get::<Material>(body_a)?;
    let mat_b = registry.try_get::<Material>(body_b)?;
    if let Some(table) = registry.ctx::<crate::material::MaterialMixTable>() {
        Some(table.combine(mat_a, mat_b))
    } else {
        Some(ContactMaterial::mix(mat_a, mat_b))
    }
}

/// Insert one fresh collision point: replace a near-coincident cached point
/// in place (keeping its lifetime and warm-start impulses), append when
/// there is room, or evict down to the best four otherwise.
fn merge_point(
    points: &mut Vec<ContactPoint>,
    rp: &CollisionPoint,
    material: &Option<ContactMaterial>,
    caching_threshold: Scalar,
) {
    let (restitution, friction) = match material {
        Some(m) => (m.restitution, m.friction),
        None => (0.0, 0.0),
    };
    let fresh = ContactPoint {
        pivot_a: rp.pivot_a,
        pivot_b: rp.pivot_b,
        normal_b: rp.normal_b,
        distance: rp.distance,
        restitution,
        friction,
        lifetime: 0,
        normal_impulse: 0.0,
        friction_impulse: 0.0,
    };

    // Nearest cached point in pivot space.
    let threshold_sq = caching_threshold * caching_threshold;
    let mut nearest: Option<usize> = None;
    let mut nearest_dist = threshold_sq;
    for (i, cp) in points.iter().enumerate() {
        let da = (cp.pivot_a - rp.pivot_a).length_squared();
        let db = (cp.pivot_b - rp.pivot_b).length_squared();
        let d = da.min(db);
        if d < nearest_dist {
            nearest_dist = d;
            nearest = Some(i);
        }
    }

    if let Some(idx) = nearest {
        // Same feature pair: refresh geometry, keep warm-start state.
        let lifetime = points[idx].lifetime;
        let normal_impulse = points[idx].normal_impulse;
        let friction_impulse = points[idx].friction_impulse;
        points[idx] = ContactPoint {
            lifetime,
            normal_impulse,
            friction_impulse,
            ..fresh
        };
    } else if points.len() < MAX_CONTACTS {
        points.push(fresh);
    } else {
        reduce_points(points, fresh);
    }
}

/// Keep the deepest point plus the three that maximize the contact patch
/// area, choosing among the four cached points and the incoming one.
fn reduce_points(points: &mut Vec<ContactPoint>, fresh: ContactPoint) {
    let mut candidates: Vec<ContactPoint> = points.clone();
    candidates.push(fresh);

    let deepest = candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
        .map(|(i, _)| i)
        .unwrap();

    let rest: Vec<usize> = (0..candidates.len()).filter(|&i| i != deepest).collect();

    // Drop one of the remaining four; keep the combination spanning the
    // largest patch around the deepest point.
    let mut best_combo: Option<(Vec<usize>, Scalar)> = None;
    for skip in &rest {
        let combo: Vec<usize> = rest.iter().copied().filter(|i| i != skip).collect();
        let area = patch_area(
            candidates[deepest].pivot_a,
            combo.iter().map(|&i| candidates[i].pivot_a),
        );
        if best_combo.as_ref().is_none_or(|(_, best)| area > *best) {
            best_combo = Some((combo, area));
        }
    }

    let (combo, _) = best_combo.unwrap();
    let mut selected = vec![candidates[deepest]];
    selected.extend(combo.into_iter().map(|i| candidates[i]));
    *points = selected;
}

/// Total triangle-fan area around `origin`.
fn patch_area(origin: Vec3, others: impl Iterator<Item = Vec3>) -> Scalar {
    let others: Vec<Vec3> = others.collect();
    let mut area = 0.0;
    for i in 0..others.len() {
        for j in (i + 1)..others.len() {
            area += (others[i] - origin).cross(others[j] - origin).length();
        }
    }
    area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Shape;
    use glam::Quat;

    fn make_sphere_body(
        registry: &mut Registry,
        pos: Vec3,
        radius: Scalar,
        with_material: bool,
    ) -> Entity {
        let e = registry.create();
        registry.assign(e, Position(pos));
        registry.assign(e, Orientation(Quat::IDENTITY));
        let shape = Shape::Sphere { radius };
        registry.assign(e, AabbComp(shape.aabb(pos, Quat::IDENTITY)));
        registry.assign(e, ShapeComp(shape));
        if with_material {
            registry.assign(e, Material::new(0.0, 0.5));
        }
        e
    }

    fn make_manifold(registry: &mut Registry, a: Entity, b: Entity) -> Entity {
        let e = registry.create();
        registry.assign(e, ContactManifold::new([a, b], 0.1));
        e
    }

    #[test]
    fn test_contact_point_generated_for_overlapping_spheres() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut narrowphase = Narrowphase::new(&settings);

        let a = make_sphere_body(&mut registry, Vec3::new(0.0, 0.95, 0.0), 0.5, true);
        let b = make_sphere_body(&mut registry, Vec3::ZERO, 0.5, true);
        let m = make_manifold(&mut registry, a, b);

        narrowphase.update(&mut registry);

        let manifold = registry.get::<ContactManifold>(m);
        assert_eq!(manifold.num_points(), 1);
        let cp = &manifold.points[0];
        assert!(cp.distance < 0.0);
        assert_eq!(cp.lifetime, 0, "fresh point starts at lifetime zero");
        assert!((cp.friction - 0.5).abs() < 1.0e-6);
        assert!(registry.has::<Constraint>(m), "material pair gets a contact constraint");
    }

    #[test]
    fn test_point_persistence_preserves_warm_start() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut narrowphase = Narrowphase::new(&settings);

        let a = make_sphere_body(&mut registry, Vec3::new(0.0, 0.95, 0.0), 0.5, true);
        let b = make_sphere_body(&mut registry, Vec3::ZERO, 0.5, true);
        let m = make_manifold(&mut registry, a, b);

        narrowphase.update(&mut registry);
        registry.get_mut::<ContactManifold>(m).points[0].normal_impulse = 7.5;

        narrowphase.update(&mut registry);
        let manifold = registry.get::<ContactManifold>(m);
        assert_eq!(manifold.num_points(), 1);
        assert_eq!(manifold.points[0].normal_impulse, 7.5, "warm start preserved");
        assert_eq!(manifold.points[0].lifetime, 1, "lifetime incremented");
    }

    #[test]
    fn test_separating_point_is_dropped() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut narrowphase = Narrowphase::new(&settings);

        let a = make_sphere_body(&mut registry, Vec3::new(0.0, 0.95, 0.0), 0.5, true);
        let b = make_sphere_body(&mut registry, Vec3::ZERO, 0.5, true);
        let m = make_manifold(&mut registry, a, b);
        narrowphase.update(&mut registry);
        assert_eq!(registry.get::<ContactManifold>(m).num_points(), 1);

        // Move A away beyond the breaking threshold (but keep the manifold).
        let new_pos = Vec3::new(0.0, 1.2, 0.0);
        registry.get_mut::<Position>(a).0 = new_pos;
        registry.get_mut::<AabbComp>(a).0 =
            Shape::Sphere { radius: 0.5 }.aabb(new_pos, Quat::IDENTITY);

        narrowphase.update(&mut registry);
        assert_eq!(registry.get::<ContactManifold>(m).num_points(), 0);
    }

    #[test]
    fn test_sensor_pair_gets_no_constraint() {
        let mut registry = Registry::new();
        let settings = SimulationSettings::default();
        let mut narrowphase = Narrowphase::new(&settings);

        let a = make_sphere_body(&mut registry, Vec3::new(0.0, 0.95, 0.0), 0.5, false);
        let b = make_sphere_body(&mut registry, Vec3::ZERO, 0.5, true);
        let m = make_manifold(&mut registry, a, b);

        narrowphase.update(&mut registry);

        let manifold = registry.get::<ContactManifold>(m);
        assert_eq!(manifold.num_points(), 1, "sensors still generate manifolds");
        assert!(!registry.has::<Constraint>(m), "sensors never get impulses");
    }

    #[test]
    fn test_reduction_keeps_deepest() {
        let mut points: Vec<ContactPoint> = (0..4)
            .map(|i| ContactPoint {
                pivot_a: Vec3::new(i as Scalar, 0.0, 0.0),
                pivot_b: Vec3::new(i as Scalar, 0.0, 0.0),
                normal_b: Vec3::Y,
                distance: -0.01 * (i as Scalar + 1.0),
                restitution: 0.0,
                friction: 0.5,
                lifetime: 3,
                normal_impulse: 0.0,
                friction_impulse: 0.0,
            })
            .collect();

        let deepest = ContactPoint {
            pivot_a: Vec3::new(10.0, 0.0, 10.0),
            pivot_b: Vec3::new(10.0, 0.0, 10.0),
            normal_b: Vec3::Y,
            distance: -0.5,
            restitution: 0.0,
            friction: 0.5,
            lifetime: 0,
            normal_impulse: 0.0,
            friction_impulse: 0.0,
        };
        reduce_points(&mut points, deepest);
        assert_eq!(points.len(), MAX_CONTACTS);
        assert!(points.iter().any(|p| p.distance == -0.5), "deepest always kept");
    }

    #[test]
    fn test_async_matches_sync() {
        let settings = SimulationSettings::default();

        let build = |registry: &mut Registry| -> Vec<Entity> {
            let mut ms = Vec::new();
            for i in 0..4 {
                let a = make_sphere_body(
                    registry,
                    Vec3::new(i as f32 * 3.0, 0.95, 0.0),
                    0.5,
                    true,
                );
                let b = make_sphere_body(registry, Vec3::new(i as f32 * 3.0, 0.0, 0.0), 0.5, true);
                ms.push(make_manifold(registry, a, b));
            }
            ms
        };

        let mut reg_sync = Registry::new();
        let ms_sync = build(&mut reg_sync);
        let mut np_sync = Narrowphase::new(&settings);
        np_sync.update(&mut reg_sync);

        let mut reg_async = Registry::new();
        let ms_async = build(&mut reg_async);
        let mut np_async = Narrowphase::new(&settings);
        assert!(np_async.parallelizable(&reg_async));
        np_async.update_async(&mut reg_async);
        np_async.finish_async_update(&mut reg_async);

        for (s, a) in ms_sync.iter().zip(ms_async.iter()) {
            let m_s = reg_sync.get::<ContactManifold>(*s);
            let m_a = reg_async.get::<ContactManifold>(*a);
            assert_eq!(m_s.num_points(), m_a.num_points());
        }
    }
}
