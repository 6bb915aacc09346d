//! Collision against triangle meshes
//!
//! Mesh routines work in the mesh's object space: the moving shape is
//! transformed in, the mesh tree is queried for candidate triangles, and
//! each candidate goes through a per-triangle routine. Contacts whose
//! closest feature is a concave edge or vertex are suppressed, as are edge
//! and vertex contacts whose direction falls outside the dihedral cone of
//! the adjacent faces. Both produce the internal-edge snagging artifacts
//! this filtering exists to prevent.

use glam::Vec3;

use crate::aabb::Aabb;
use crate::collide::{world_point, CollisionContext, CollisionResult};
use crate::collide_polyhedron::{hull_sat_contacts, HullData, SatFeature};
use crate::math::{
    closest_point_segment, closest_points_segment_segment, Scalar, EPSILON,
};
use crate::trimesh::{TriMesh, TriangleInfo};

/// Tolerance for accepting a contact direction inside a feature's cone.
const CONE_TOLERANCE: Scalar = 1.0e-3;

/// Closest triangle feature to a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
enum TriFeature {
    Face,
    Edge(usize),
    Vertex(usize),
}

fn classify_point(tri: &TriangleInfo, point: Vec3) -> TriFeature {
    for (i, &v) in tri.vertices.iter().enumerate() {
        if (point - v).length_squared() < 1.0e-8 {
            return TriFeature::Vertex(i);
        }
    }
    for i in 0..3 {
        let a = tri.vertices[i];
        let b = tri.vertices[(i + 1) % 3];
        let on_edge = closest_point_segment(a, b, point);
        if (point - on_edge).length_squared() < 1.0e-8 {
            return TriFeature::Edge(i);
        }
    }
    TriFeature::Face
}

/// Whether a contact with direction `dir` (pointing away from the mesh
/// surface) is admissible on the given feature.
fn feature_allows_contact(tri: &TriangleInfo, feature: TriFeature, dir: Vec3) -> bool {
    // One-sided meshes: reject back-face contacts outright.
    if dir.dot(tri.normal) < 0.0 {
        return false;
    }
    match feature {
        TriFeature::Face => true,
        TriFeature::Edge(e) => {
            if tri.is_concave_edge[e] {
                return false;
            }
            dir.dot(tri.normal) >= tri.cos_angles[e] - CONE_TOLERANCE
        }
        TriFeature::Vertex(v) => {
            if tri.is_concave_vertex[v] {
                return false;
            }
            let incoming = (v + 2) % 3;
            let limit = tri.cos_angles[v].min(tri.cos_angles[incoming]);
            dir.dot(tri.normal) >= limit - CONE_TOLERANCE
        }
    }
}

/// Query AABB for the moving shape, expressed in mesh space.
fn query_aabb_in_mesh_space(ctx: &CollisionContext) -> Aabb {
    let inv = ctx.orn_b.conjugate();
    let corners = [
        Vec3::new(ctx.aabb_a.min.x, ctx.aabb_a.min.y, ctx.aabb_a.min.z),
        Vec3::new(ctx.aabb_a.max.x, ctx.aabb_a.min.y, ctx.aabb_a.min.z),
        Vec3::new(ctx.aabb_a.min.x, ctx.aabb_a.max.y, ctx.aabb_a.min.z),
        Vec3::new(ctx.aabb_a.min.x, ctx.aabb_a.min.y, ctx.aabb_a.max.z),
        Vec3::new(ctx.aabb_a.max.x, ctx.aabb_a.max.y, ctx.aabb_a.min.z),
        Vec3::new(ctx.aabb_a.max.x, ctx.aabb_a.min.y, ctx.aabb_a.max.z),
        Vec3::new(ctx.aabb_a.min.x, ctx.aabb_a.max.y, ctx.aabb_a.max.z),
        Vec3::new(ctx.aabb_a.max.x, ctx.aabb_a.max.y, ctx.aabb_a.max.z),
    ];
    let mut bounds = Aabb::INVERTED;
    for c in corners {
        let local = inv * (c - ctx.pos_b);
        bounds.min = bounds.min.min(local);
        bounds.max = bounds.max.max(local);
    }
    bounds.fattened(ctx.threshold)
}

fn closest_point_triangle(tri: &TriangleInfo, p: Vec3) -> Vec3 {
    let [a, b, c] = tri.vertices;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = va + vb + vc;
    if denom.abs() < EPSILON {
        return a;
    }
    let v = vb / denom;
    let w = vc / denom;
    a + ab * v + ac * w
}

pub(crate) fn collide_sphere_mesh(
    radius: Scalar,
    mesh: &TriMesh,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let center = ctx.orn_b.conjugate() * (ctx.pos_a - ctx.pos_b);
    let query = query_aabb_in_mesh_space(ctx);

    mesh.visit(&query, |_, tri| {
        let closest = closest_point_triangle(&tri, center);
        let delta = center - closest;
        let dist = delta.length();
        if dist - radius > ctx.threshold {
            return;
        }
        let dir = if dist > EPSILON { delta / dist } else { tri.normal };
        let feature = classify_point(&tri, closest);
        if !feature_allows_contact(&tri, feature, dir) {
            return;
        }

        let world_dir = ctx.orn_b * dir;
        let on_b = ctx.pos_b + ctx.orn_b * closest;
        let on_a = ctx.pos_a - world_dir * radius;
        result.maybe_add(world_point(ctx, on_a, on_b, world_dir));
    });
    result
}

pub(crate) fn collide_capsule_mesh(
    radius: Scalar,
    half_length: Scalar,
    mesh: &TriMesh,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let inv = ctx.orn_b.conjugate();
    let center = inv * (ctx.pos_a - ctx.pos_b);
    let tip = inv * (ctx.orn_a * Vec3::new(0.0, half_length, 0.0));
    let (seg_a, seg_b) = (center - tip, center + tip);
    let query = query_aabb_in_mesh_space(ctx);

    mesh.visit(&query, |_, tri| {
        // Closest pair between the capsule segment and the triangle:
        // endpoint projections plus segment-edge pairs.
        let mut best: Option<(Vec3, Vec3, Scalar)> = None;
        let mut offer = |on_seg: Vec3, on_tri: Vec3| {
            let d = (on_seg - on_tri).length_squared();
            if best.map_or(true, |(_, _, bd)| d < bd) {
                best = Some((on_seg, on_tri, d));
            }
        };
        for endpoint in [seg_a, seg_b] {
            offer(endpoint, closest_point_triangle(&tri, endpoint));
        }
        for i in 0..3 {
            let (c1, c2) = closest_points_segment_segment(
                seg_a,
                seg_b,
                tri.vertices[i],
                tri.vertices[(i + 1) % 3],
            );
            offer(c1, c2);
        }

        let (on_seg, on_tri, _) = best.unwrap();
        let delta = on_seg - on_tri;
        let dist = delta.length();
        if dist - radius > ctx.threshold {
            return;
        }
        let dir = if dist > EPSILON { delta / dist } else { tri.normal };
        let feature = classify_point(&tri, on_tri);
        if !feature_allows_contact(&tri, feature, dir) {
            return;
        }

        let world_dir = ctx.orn_b * dir;
        let on_b = ctx.pos_b + ctx.orn_b * on_tri;
        let on_a = ctx.pos_b + ctx.orn_b * (on_seg - dir * radius);
        result.maybe_add(world_point(ctx, on_a, on_b, world_dir));
    });
    result
}

/// Convex hull (box or polyhedron, pre-instanced in world space) against a
/// triangle mesh: per-candidate-triangle SAT with concave-feature filtering.
pub(crate) fn collide_hull_mesh(
    hull_world: &HullData,
    mesh: &TriMesh,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let hull = hull_world.to_frame(ctx.pos_b, ctx.orn_b);
    let query = query_aabb_in_mesh_space(ctx);

    mesh.visit(&query, |_, tri| {
        let tri_hull = triangle_hull(&tri);
        let Some((feature, contacts)) = hull_sat_contacts(&hull, &tri_hull, ctx.threshold)
        else {
            return;
        };

        // The triangle is hull B of the SAT; filter by the winning feature.
        match feature {
            SatFeature::FaceB(face) => {
                if face == 1 {
                    return; // back side of the one-sided triangle
                }
            }
            SatFeature::FaceA(_) => {}
            SatFeature::Edges(_, edge_b) => {
                let e = edge_b % 3;
                if tri.is_concave_edge[e] {
                    return;
                }
            }
        }

        for (on_a, on_b, normal) in contacts {
            // Contact direction must stay inside the triangle's normal cone.
            let feature_at = classify_point(&tri, on_b);
            if !feature_allows_contact(&tri, feature_at, normal) {
                continue;
            }
            let world_a = ctx.pos_b + ctx.orn_b * on_a;
            let world_b = ctx.pos_b + ctx.orn_b * on_b;
            let world_normal = ctx.orn_b * normal;
            result.maybe_add(world_point(ctx, world_a, world_b, world_normal));
        }
    });
    result
}

/// A triangle as a thin two-faced hull for the SAT.
fn triangle_hull(tri: &TriangleInfo) -> HullData {
    HullData::from_world_faces(
        tri.vertices.to_vec(),
        vec![
            (vec![0, 1, 2], tri.normal),
            (vec![2, 1, 0], -tri.normal),
        ],
        vec![(0, 1), (1, 2), (2, 0)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn flat_ground() -> TriMesh {
        // Two coplanar triangles sharing the diagonal from (-10,0,10)..(10,0,-10).
        let vertices = vec![
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(-10.0, 0.0, 10.0),
        ];
        let indices = vec![0, 2, 1, 0, 3, 2];
        TriMesh::new(vertices, indices)
    }

    fn mesh_ctx(pos_a: Vec3) -> CollisionContext<'static> {
        CollisionContext {
            pos_a,
            orn_a: Quat::IDENTITY,
            aabb_a: Aabb::from_center_half_extents(pos_a, Vec3::splat(1.5)),
            pos_b: Vec3::ZERO,
            orn_b: Quat::IDENTITY,
            aabb_b: Aabb::new(Vec3::splat(-20.0), Vec3::splat(20.0)),
            rotated_a: None,
            rotated_b: None,
            threshold: 0.02,
        }
    }

    #[test]
    fn test_sphere_resting_on_face() {
        let mesh = flat_ground();
        let ctx = mesh_ctx(Vec3::new(3.0, 0.45, 3.0));
        let result = collide_sphere_mesh(0.5, &mesh, &ctx);
        assert!(result.num_points() >= 1);
        for p in &result.points {
            assert!(p.normal_b.y > 0.99, "mesh contact normal must be up");
            assert!(p.distance < 0.0);
        }
    }

    #[test]
    fn test_sphere_on_coplanar_seam_has_no_tilted_normal() {
        let mesh = flat_ground();
        // Directly above the shared diagonal (x == -z on this diagonal).
        let ctx = mesh_ctx(Vec3::new(1.0, 0.45, 1.0));
        let result = collide_sphere_mesh(0.5, &mesh, &ctx);
        assert!(result.num_points() >= 1, "seam must still produce face contact");
        for p in &result.points {
            assert!(
                p.normal_b.y > 0.999,
                "no contact may lean against the seam, normal = {:?}",
                p.normal_b
            );
        }
    }

    #[test]
    fn test_sphere_in_concave_valley_skips_fold_edge() {
        // V-shaped valley: the fold edge is concave; the sphere touching both
        // slopes must only receive slope-normal contacts.
        let vertices = vec![
            Vec3::new(-1.0, 1.0, -2.0),
            Vec3::new(0.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(-1.0, 1.0, 2.0),
            Vec3::new(1.0, 1.0, -2.0),
            Vec3::new(1.0, 1.0, 2.0),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3, 1, 4, 5, 1, 5, 2];
        let mesh = TriMesh::new(vertices, indices);

        let ctx = mesh_ctx(Vec3::new(0.0, 0.6, 0.0));
        let result = collide_sphere_mesh(0.5, &mesh, &ctx);
        for p in &result.points {
            let n = p.normal_b;
            // Slope normals lean in x; a straight-up normal would mean the
            // concave fold produced a contact.
            assert!(
                n.x.abs() > 0.1,
                "contact leaning on the concave fold: {n:?}"
            );
        }
    }

    #[test]
    fn test_capsule_lying_on_mesh() {
        let mesh = flat_ground();
        let mut ctx = mesh_ctx(Vec3::new(0.0, 0.45, 0.0));
        ctx.orn_a = Quat::from_rotation_z(core::f32::consts::FRAC_PI_2);
        let result = collide_capsule_mesh(0.5, 1.0, &mesh, &ctx);
        assert!(result.num_points() >= 1);
        for p in &result.points {
            assert!(p.normal_b.y > 0.99);
        }
    }

    #[test]
    fn test_box_resting_on_mesh_patch() {
        use crate::collide::hull_from_box;
        let mesh = flat_ground();
        let ctx = mesh_ctx(Vec3::new(5.0, 0.48, 5.0));
        let hull = hull_from_box(Vec3::splat(0.5), ctx.pos_a, ctx.orn_a);
        let result = collide_hull_mesh(&hull, &mesh, &ctx);
        assert!(
            result.num_points() >= 3,
            "box on flat mesh should rest on a patch, got {}",
            result.num_points()
        );
        for p in &result.points {
            assert!(p.normal_b.y > 0.99, "normal = {:?}", p.normal_b);
        }
    }
}
