//! Collision dispatch
//!
//! Exhaustive dispatch over the `(Shape, Shape)` matrix. Each routine
//! produces up to [`MAX_CONTACTS`] points carrying pivots in each body's
//! object space, the contact normal in body B's object space, and the signed
//! separation along the normal (negative when penetrating).
//!
//! Ordered pairs come in both orders; asymmetric routines are written once
//! and reached through a swapped context.

use glam::{Quat, Vec3};

use crate::aabb::Aabb;
use crate::collide_polyhedron::{collide_convex_fallback, collide_hulls, collide_plane_hull, HullData};
use crate::collide_primitives::*;
use crate::collide_triangle::{collide_capsule_mesh, collide_hull_mesh, collide_sphere_mesh};
use crate::components::{RotatedMesh, MAX_CONTACTS};
use crate::math::{to_object_space, Scalar};
use crate::shapes::{ConvexMesh, Shape};

/// One generated contact point.
#[derive(Clone, Copy, Debug)]
pub struct CollisionPoint {
    /// Contact pivot in A's object space.
    pub pivot_a: Vec3,
    /// Contact pivot in B's object space.
    pub pivot_b: Vec3,
    /// Contact normal in B's object space, pointing from B toward A.
    pub normal_b: Vec3,
    /// Signed separation along the normal; negative when penetrating.
    pub distance: Scalar,
}

/// Up to [`MAX_CONTACTS`] collision points for one shape pair.
#[derive(Clone, Debug, Default)]
pub struct CollisionResult {
    pub points: Vec<CollisionPoint>,
}

impl CollisionResult {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Add a point; once full, the shallowest point is replaced if the new
    /// one penetrates deeper.
    pub fn maybe_add(&mut self, point: CollisionPoint) {
        if self.points.len() < MAX_CONTACTS {
            self.points.push(point);
            return;
        }
        let mut shallowest = 0;
        for (i, p) in self.points.iter().enumerate().skip(1) {
            if p.distance > self.points[shallowest].distance {
                shallowest = i;
            }
        }
        if point.distance < self.points[shallowest].distance {
            self.points[shallowest] = point;
        }
    }
}

/// Transforms and tuning for one dispatch call.
#[derive(Clone, Copy)]
pub struct CollisionContext<'a> {
    pub pos_a: Vec3,
    pub orn_a: Quat,
    pub aabb_a: Aabb,
    pub pos_b: Vec3,
    pub orn_b: Quat,
    pub aabb_b: Aabb,
    /// World-rotated vertex cache for polyhedron shapes, when available.
    pub rotated_a: Option<&'a RotatedMesh>,
    pub rotated_b: Option<&'a RotatedMesh>,
    /// Generate contacts while separation is at or below this.
    pub threshold: Scalar,
}

impl<'a> CollisionContext<'a> {
    fn swapped(&self) -> Self {
        Self {
            pos_a: self.pos_b,
            orn_a: self.orn_b,
            aabb_a: self.aabb_b,
            pos_b: self.pos_a,
            orn_b: self.orn_a,
            aabb_b: self.aabb_a,
            rotated_a: self.rotated_b,
            rotated_b: self.rotated_a,
            threshold: self.threshold,
        }
    }
}

/// Helper for collision routines working in world space: converts a world
/// point pair plus a world normal (pointing from B to A) into a
/// [`CollisionPoint`].
pub(crate) fn world_point(
    ctx: &CollisionContext,
    point_on_a: Vec3,
    point_on_b: Vec3,
    normal_world: Vec3,
) -> CollisionPoint {
    CollisionPoint {
        pivot_a: to_object_space(point_on_a, ctx.pos_a, ctx.orn_a),
        pivot_b: to_object_space(point_on_b, ctx.pos_b, ctx.orn_b),
        normal_b: ctx.orn_b.conjugate() * normal_world,
        distance: (point_on_a - point_on_b).dot(normal_world),
    }
}

fn swap_result(result: CollisionResult, ctx: &CollisionContext) -> CollisionResult {
    // The inner call saw A and B exchanged: its pivots are swapped and its
    // normal lives in our A's object space pointing from A to B.
    let mut out = CollisionResult::new();
    for p in result.points {
        let world_normal = -(ctx.orn_a * p.normal_b);
        out.points.push(CollisionPoint {
            pivot_a: p.pivot_b,
            pivot_b: p.pivot_a,
            normal_b: ctx.orn_b.conjugate() * world_normal,
            distance: p.distance,
        });
    }
    out
}

pub(crate) fn hull_from_box(half_extents: Vec3, pos: Vec3, orn: Quat) -> HullData {
    HullData::from_mesh(&ConvexMesh::box_hull(half_extents), pos, orn)
}

pub(crate) fn hull_from_polyhedron(
    mesh: &ConvexMesh,
    pos: Vec3,
    orn: Quat,
    rotated: Option<&RotatedMesh>,
) -> HullData {
    match rotated {
        Some(cache) if cache.vertices.len() == mesh.vertices.len() => {
            HullData::from_rotated(mesh, pos, cache)
        }
        _ => HullData::from_mesh(mesh, pos, orn),
    }
}

/// Collision dispatch over the exhaustive shape pair matrix.
pub fn collide(shape_a: &Shape, shape_b: &Shape, ctx: &CollisionContext) -> CollisionResult {
    use Shape::*;

    match (shape_a, shape_b) {
        // --- sphere ---
        (Sphere { radius: ra }, Sphere { radius: rb }) => collide_sphere_sphere(*ra, *rb, ctx),
        (Sphere { radius }, Plane { normal, constant }) => {
            collide_sphere_plane(*radius, *normal, *constant, ctx)
        }
        (Sphere { radius }, Box { half_extents }) => {
            collide_sphere_box(*radius, *half_extents, ctx)
        }
        (Sphere { radius: rs }, Capsule { radius, half_length }) => {
            collide_sphere_capsule(*rs, *radius, *half_length, ctx)
        }
        (Sphere { radius: rs }, Cylinder { radius, half_length }) => {
            collide_sphere_cylinder(*rs, *radius, *half_length, ctx)
        }
        (Sphere { radius }, Mesh(mesh)) => collide_sphere_mesh(*radius, mesh, ctx),
        (Sphere { .. }, Polyhedron(_)) => collide_convex_fallback(shape_a, shape_b, ctx),

        // --- box ---
        (Box { half_extents: ha }, Box { half_extents: hb }) => {
            let hull_a = hull_from_box(*ha, ctx.pos_a, ctx.orn_a);
            let hull_b = hull_from_box(*hb, ctx.pos_b, ctx.orn_b);
            collide_hulls(&hull_a, &hull_b, ctx)
        }
        (Box { half_extents }, Plane { normal, constant }) => {
            let hull = hull_from_box(*half_extents, ctx.pos_a, ctx.orn_a);
            collide_plane_hull(&hull, *normal, *constant, ctx)
        }
        (Box { half_extents }, Polyhedron(mesh)) => {
            let hull_a = hull_from_box(*half_extents, ctx.pos_a, ctx.orn_a);
            let hull_b = hull_from_polyhedron(mesh, ctx.pos_b, ctx.orn_b, ctx.rotated_b);
            collide_hulls(&hull_a, &hull_b, ctx)
        }
        (Box { half_extents }, Mesh(mesh)) => {
            let hull = hull_from_box(*half_extents, ctx.pos_a, ctx.orn_a);
            collide_hull_mesh(&hull, mesh, ctx)
        }
        (Box { .. }, Capsule { .. }) | (Box { .. }, Cylinder { .. }) => {
            collide_convex_fallback(shape_a, shape_b, ctx)
        }

        // --- capsule ---
        (Capsule { radius, half_length }, Plane { normal, constant }) => {
            collide_capsule_plane(*radius, *half_length, *normal, *constant, ctx)
        }
        (
            Capsule {
                radius: ra,
                half_length: la,
            },
            Capsule {
                radius: rb,
                half_length: lb,
            },
        ) => collide_capsule_capsule(*ra, *la, *rb, *lb, ctx),
        (Capsule { radius, half_length }, Mesh(mesh)) => {
            collide_capsule_mesh(*radius, *half_length, mesh, ctx)
        }
        (Capsule { .. }, Cylinder { .. }) | (Capsule { .. }, Polyhedron(_)) => {
            collide_convex_fallback(shape_a, shape_b, ctx)
        }

        // --- cylinder ---
        (Cylinder { radius, half_length }, Plane { normal, constant }) => {
            collide_cylinder_plane(*radius, *half_length, *normal, *constant, ctx)
        }
        (Cylinder { .. }, Cylinder { .. }) | (Cylinder { .. }, Polyhedron(_)) => {
            collide_convex_fallback(shape_a, shape_b, ctx)
        }
        (Cylinder { radius, half_length }, Mesh(mesh)) => {
            // The cylinder's lateral surface behaves like a capsule against
            // triangle soup; the flat caps matter against planes and hulls.
            collide_capsule_mesh(*radius, *half_length, mesh, ctx)
        }

        // --- polyhedron ---
        (Polyhedron(ma), Polyhedron(mb)) => {
            let hull_a = hull_from_polyhedron(ma, ctx.pos_a, ctx.orn_a, ctx.rotated_a);
            let hull_b = hull_from_polyhedron(mb, ctx.pos_b, ctx.orn_b, ctx.rotated_b);
            collide_hulls(&hull_a, &hull_b, ctx)
        }
        (Polyhedron(mesh), Plane { normal, constant }) => {
            let hull = hull_from_polyhedron(mesh, ctx.pos_a, ctx.orn_a, ctx.rotated_a);
            collide_plane_hull(&hull, *normal, *constant, ctx)
        }
        (Polyhedron(poly), Mesh(mesh)) => {
            let hull = hull_from_polyhedron(poly, ctx.pos_a, ctx.orn_a, ctx.rotated_a);
            collide_hull_mesh(&hull, mesh, ctx)
        }

        // --- compound ---
        (Compound(children), _) => {
            let mut result = CollisionResult::new();
            for child in children.iter() {
                let child_pos = ctx.pos_a + ctx.orn_a * child.position;
                let child_orn = ctx.orn_a * child.orientation;
                let child_ctx = CollisionContext {
                    pos_a: child_pos,
                    orn_a: child_orn,
                    aabb_a: child.shape.aabb(child_pos, child_orn),
                    rotated_a: None,
                    ..*ctx
                };
                let child_result = collide(&child.shape, shape_b, &child_ctx);
                for p in child_result.points {
                    // Re-express the pivot in the compound's own frame.
                    let world = child_pos + child_orn * p.pivot_a;
                    result.maybe_add(CollisionPoint {
                        pivot_a: to_object_space(world, ctx.pos_a, ctx.orn_a),
                        ..p
                    });
                }
            }
            result
        }
        (_, Compound(_)) => swap_result(collide(shape_b, shape_a, &ctx.swapped()), ctx),

        // --- static-static pairs produce nothing ---
        (Plane { .. }, Plane { .. }) | (Plane { .. }, Mesh(_)) | (Mesh(_), Plane { .. }) => {
            CollisionResult::new()
        }
        (Mesh(_), Mesh(_)) => CollisionResult::new(),

        // --- remaining asymmetric orders go through the swapped context ---
        (Plane { .. }, _) | (Mesh(_), _) | (Cylinder { .. }, Sphere { .. })
        | (Cylinder { .. }, Box { .. }) | (Cylinder { .. }, Capsule { .. })
        | (Capsule { .. }, Sphere { .. }) | (Capsule { .. }, Box { .. })
        | (Box { .. }, Sphere { .. }) | (Polyhedron(_), Sphere { .. })
        | (Polyhedron(_), Box { .. }) | (Polyhedron(_), Capsule { .. })
        | (Polyhedron(_), Cylinder { .. }) => {
            swap_result(collide(shape_b, shape_a, &ctx.swapped()), ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_at(pos_a: Vec3, pos_b: Vec3) -> CollisionContext<'static> {
        CollisionContext {
            pos_a,
            orn_a: Quat::IDENTITY,
            aabb_a: Aabb::from_center_half_extents(pos_a, Vec3::splat(2.0)),
            pos_b,
            orn_b: Quat::IDENTITY,
            aabb_b: Aabb::from_center_half_extents(pos_b, Vec3::splat(2.0)),
            rotated_a: None,
            rotated_b: None,
            threshold: 0.02,
        }
    }

    #[test]
    fn test_sphere_sphere_penetrating() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        let ctx = ctx_at(Vec3::new(0.0, 1.5, 0.0), Vec3::ZERO);

        let result = collide(&a, &b, &ctx);
        assert_eq!(result.num_points(), 1);
        let p = &result.points[0];
        assert!(p.distance < 0.0, "overlapping spheres must penetrate");
        assert!((p.distance + 0.5).abs() < 1.0e-5);
        // Normal points from B up toward A.
        assert!(p.normal_b.y > 0.99);
    }

    #[test]
    fn test_sphere_sphere_separated_beyond_threshold() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        let ctx = ctx_at(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO);
        let result = collide(&a, &b, &ctx);
        assert_eq!(result.num_points(), 0);
    }

    #[test]
    fn test_swapped_pair_mirrors_normal() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let plane = Shape::Plane {
            normal: Vec3::Y,
            constant: 0.0,
        };
        // Plane as A, sphere as B exercises the swap path.
        let ctx = ctx_at(Vec3::ZERO, Vec3::new(0.0, 0.4, 0.0));
        let result = collide(&plane, &sphere, &ctx);
        assert_eq!(result.num_points(), 1);
        let p = &result.points[0];
        assert!(p.distance < 0.0);
        // Normal must point from A (plane) toward B (sphere) when expressed
        // in B's space... i.e. from B's perspective it pushes B up, which in
        // our convention (normal from B to A) points down.
        assert!(p.normal_b.y < -0.99, "normal_b = {:?}", p.normal_b);
    }

    #[test]
    fn test_result_keeps_deepest_points() {
        let mut result = CollisionResult::new();
        for i in 0..4 {
            result.maybe_add(CollisionPoint {
                pivot_a: Vec3::ZERO,
                pivot_b: Vec3::ZERO,
                normal_b: Vec3::Y,
                distance: -0.1 * (i as Scalar + 1.0),
            });
        }
        // A deeper point replaces the shallowest.
        result.maybe_add(CollisionPoint {
            pivot_a: Vec3::ZERO,
            pivot_b: Vec3::ZERO,
            normal_b: Vec3::Y,
            distance: -1.0,
        });
        assert_eq!(result.num_points(), MAX_CONTACTS);
        assert!(result.points.iter().any(|p| p.distance == -1.0));
        assert!(result.points.iter().all(|p| p.distance <= -0.2 + 1.0e-6));
    }

    #[test]
    fn test_box_box_face_contact_produces_patch() {
        let a = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let b = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        // A rests on top of B with slight penetration.
        let ctx = ctx_at(Vec3::new(0.0, 0.98, 0.0), Vec3::ZERO);
        let result = collide(&a, &b, &ctx);
        assert!(
            result.num_points() >= 3,
            "face-face stacking should yield a patch, got {}",
            result.num_points()
        );
        for p in &result.points {
            assert!(p.distance < 0.0);
            assert!(p.normal_b.y > 0.9, "normal should be up, got {:?}", p.normal_b);
        }
    }

    #[test]
    fn test_compound_children_collide() {
        use crate::shapes::CompoundChild;
        use std::sync::Arc;

        let dumbbell = Shape::Compound(Arc::new(vec![
            CompoundChild {
                position: Vec3::new(-1.0, 0.0, 0.0),
                orientation: Quat::IDENTITY,
                shape: Shape::Sphere { radius: 0.5 },
            },
            CompoundChild {
                position: Vec3::new(1.0, 0.0, 0.0),
                orientation: Quat::IDENTITY,
                shape: Shape::Sphere { radius: 0.5 },
            },
        ]));
        let ground = Shape::Plane {
            normal: Vec3::Y,
            constant: 0.0,
        };
        let ctx = ctx_at(Vec3::new(0.0, 0.4, 0.0), Vec3::ZERO);
        let result = collide(&dumbbell, &ground, &ctx);
        assert_eq!(result.num_points(), 2, "both spheres should touch the plane");
    }
}
