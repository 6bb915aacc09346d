//! Sequential-impulse solver
//!
//! Fixed-iteration projected Gauss-Seidel over the row cache. One update
//! runs the full per-step pipeline: integrate external acceleration and
//! gravity, prepare constraint rows, iterate the solver, fold velocity
//! corrections back into the bodies, persist impulses for warm starting,
//! integrate velocities into transforms, and refresh the derived state
//! (AABBs, rotated mesh caches, world-space inertia).
//!
//! Rows are processed in cache order, which is registry iteration order per
//! kind; registry iteration is stable, so two runs of the same scene solve
//! identical row sequences.

use crate::components::{
    AabbComp, AngVel, DynamicTag, Gravity, InertiaInv, InertiaWorldInv, LinAcc, LinVel,
    Orientation, Position, ProceduralTag, RotatedMesh, ShapeComp,
};
use crate::constraint::{iterate_constraints, prepare_constraints, update_impulses};
use crate::math::{inertia_world_inverse, integrate_orientation, Scalar};
use crate::registry::Registry;
use crate::row_cache::RowCache;
use crate::shapes::Shape;

/// Default number of solver passes per step.
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Sequential-impulse constraint solver with its row cache.
pub struct Solver {
    pub iterations: u32,
    cache: RowCache,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl Solver {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            cache: RowCache::new(),
        }
    }

    /// Advance the dynamics of every body in the registry by `dt`.
    pub fn update(&mut self, registry: &mut Registry, dt: Scalar) {
        self.cache.clear();

        integrate_linacc(registry, dt);
        apply_gravity(registry, dt);

        prepare_constraints(registry, &mut self.cache, dt);
        debug_assert_eq!(
            self.cache.rows.len(),
            self.cache.con_num_rows.iter().sum::<u32>() as usize
        );

        for _ in 0..self.iterations {
            iterate_constraints(registry, &mut self.cache, dt);
            for row_idx in 0..self.cache.rows.len() {
                self.cache.solve_row(row_idx);
            }
        }

        // Fold the delta-velocity accumulators into the body velocities.
        for (entity, delta) in self.cache.drain_slots() {
            if !registry.has::<DynamicTag>(entity) {
                continue;
            }
            registry.get_mut::<LinVel>(entity).0 += delta.linear;
            registry.get_mut::<AngVel>(entity).0 += delta.angular;
        }

        update_impulses(registry, &self.cache);

        integrate_linvel(registry, dt);
        integrate_angvel(registry, dt);
        update_aabbs(registry);
        update_rotated_meshes(registry);
        update_inertia(registry);
    }
}

/// Apply per-body external acceleration.
pub fn integrate_linacc(registry: &mut Registry, dt: Scalar) {
    for entity in registry.entities_with::<LinAcc>() {
        if !registry.has::<DynamicTag>(entity) {
            continue;
        }
        let acc = registry.get::<LinAcc>(entity).0;
        registry.get_mut::<LinVel>(entity).0 += acc * dt;
    }
}

/// Apply per-body gravity.
pub fn apply_gravity(registry: &mut Registry, dt: Scalar) {
    for entity in registry.entities_with::<Gravity>() {
        if !registry.has::<DynamicTag>(entity) {
            continue;
        }
        let g = registry.get::<Gravity>(entity).0;
        registry.get_mut::<LinVel>(entity).0 += g * dt;
    }
}

/// Integrate linear velocity into position for dynamic bodies.
pub fn integrate_linvel(registry: &mut Registry, dt: Scalar) {
    for entity in registry.entities_with::<DynamicTag>() {
        let vel = registry.get::<LinVel>(entity).0;
        registry.get_mut::<Position>(entity).0 += vel * dt;
    }
}

/// Integrate angular velocity into orientation, renormalizing afterwards.
pub fn integrate_angvel(registry: &mut Registry, dt: Scalar) {
    for entity in registry.entities_with::<DynamicTag>() {
        let angvel = registry.get::<AngVel>(entity).0;
        let orn = registry.get::<Orientation>(entity).0;
        registry.get_mut::<Orientation>(entity).0 = integrate_orientation(orn, angvel, dt);
    }
}

/// Refresh world-space AABBs of procedural bodies after transforms changed.
pub fn update_aabbs(registry: &mut Registry) {
    for entity in registry.entities_with::<ProceduralTag>() {
        if !registry.has::<ShapeComp>(entity) || !registry.has::<AabbComp>(entity) {
            continue;
        }
        let pos = registry.get::<Position>(entity).0;
        let orn = registry.get::<Orientation>(entity).0;
        let aabb = registry.get::<ShapeComp>(entity).0.aabb(pos, orn);
        registry.get_mut::<AabbComp>(entity).0 = aabb;
    }
}

/// Refresh the world-rotated vertex/normal caches of polyhedron bodies.
pub fn update_rotated_meshes(registry: &mut Registry) {
    for entity in registry.entities_with::<RotatedMesh>() {
        let orn = registry.get::<Orientation>(entity).0;
        let Shape::Polyhedron(mesh) = registry.get::<ShapeComp>(entity).0.clone() else {
            continue;
        };
        let cache = registry.get_mut::<RotatedMesh>(entity);
        cache.vertices.clear();
        cache.normals.clear();
        cache.vertices.extend(mesh.vertices.iter().map(|&v| orn * v));
        cache.normals.extend(mesh.normals.iter().map(|&n| orn * n));
    }
}

/// Refresh world-space inverse inertia after orientation changes.
pub fn update_inertia(registry: &mut Registry) {
    for entity in registry.entities_with::<DynamicTag>() {
        if !registry.has::<InertiaInv>(entity) {
            continue;
        }
        let orn = registry.get::<Orientation>(entity).0;
        let inv_diag = registry.get::<InertiaInv>(entity).0;
        registry.get_mut::<InertiaWorldInv>(entity).0 = inertia_world_inverse(orn, inv_diag);
    }
}
