//! Convex hull collision: separating-axis search plus clipping
//!
//! Boxes and polyhedra collide through [`collide_hulls`], a SAT over face
//! normals and edge-edge cross products. When the winning axis is a face,
//! the incident face is clipped against the reference face's side planes to
//! produce a contact patch; an edge-edge axis produces the closest point
//! pair on the two edges.
//!
//! The remaining convex cross-pairs (cylinder against capsule and friends)
//! go through a support-function GJK/EPA pass that yields the single deepest
//! point.

use glam::Vec3;

use crate::collide::{world_point, CollisionContext, CollisionResult};
use crate::components::RotatedMesh;
use crate::math::{closest_points_segment_segment, Scalar, EPSILON};
use crate::shapes::{ConvexMesh, Shape};

/// A convex hull instanced into a common frame (usually world space).
pub(crate) struct HullData {
    pub vertices: Vec<Vec3>,
    /// Per face: vertex index list plus outward normal.
    pub faces: Vec<(Vec<u32>, Vec3)>,
    pub edges: Vec<(u32, u32)>,
    pub center: Vec3,
}

impl HullData {
    pub fn from_mesh(mesh: &ConvexMesh, pos: Vec3, orn: glam::Quat) -> Self {
        let vertices: Vec<Vec3> = mesh.vertices.iter().map(|&v| pos + orn * v).collect();
        let faces = mesh
            .faces
            .iter()
            .enumerate()
            .map(|(i, _)| {
                (
                    mesh.face_vertex_indices(i).to_vec(),
                    orn * mesh.normals[i],
                )
            })
            .collect();
        let center = average(&vertices);
        Self {
            vertices,
            faces,
            edges: mesh.edges.clone(),
            center,
        }
    }

    /// Build from a pre-rotated vertex/normal cache, adding the translation.
    pub fn from_rotated(mesh: &ConvexMesh, pos: Vec3, cache: &RotatedMesh) -> Self {
        let vertices: Vec<Vec3> = cache.vertices.iter().map(|&v| pos + v).collect();
        let faces = mesh
            .faces
            .iter()
            .enumerate()
            .map(|(i, _)| (mesh.face_vertex_indices(i).to_vec(), cache.normals[i]))
            .collect();
        let center = average(&vertices);
        Self {
            vertices,
            faces,
            edges: mesh.edges.clone(),
            center,
        }
    }

    /// Build directly from world-space data (used for triangles).
    pub fn from_world_faces(
        vertices: Vec<Vec3>,
        faces: Vec<(Vec<u32>, Vec3)>,
        edges: Vec<(u32, u32)>,
    ) -> Self {
        let center = average(&vertices);
        Self {
            vertices,
            faces,
            edges,
            center,
        }
    }

    /// Re-express this hull in the object space of the given transform.
    pub fn to_frame(&self, pos: Vec3, orn: glam::Quat) -> HullData {
        let inv = orn.conjugate();
        HullData {
            vertices: self.vertices.iter().map(|&v| inv * (v - pos)).collect(),
            faces: self
                .faces
                .iter()
                .map(|(indices, normal)| (indices.clone(), inv * *normal))
                .collect(),
            edges: self.edges.clone(),
            center: inv * (self.center - pos),
        }
    }

    fn project_max(&self, axis: Vec3) -> Scalar {
        self.vertices
            .iter()
            .map(|v| v.dot(axis))
            .fold(Scalar::MIN, Scalar::max)
    }

    fn project_min(&self, axis: Vec3) -> Scalar {
        self.vertices
            .iter()
            .map(|v| v.dot(axis))
            .fold(Scalar::MAX, Scalar::min)
    }
}

fn average(vertices: &[Vec3]) -> Vec3 {
    vertices.iter().sum::<Vec3>() / vertices.len().max(1) as Scalar
}

/// Which feature pair produced the separating axis of least penetration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SatFeature {
    FaceA(usize),
    FaceB(usize),
    Edges(usize, usize),
}

pub(crate) struct SatResult {
    pub feature: SatFeature,
    /// Separation along the winning axis; negative when penetrating.
    pub separation: Scalar,
}

/// Separating-axis search over both hulls' face normals and all edge-edge
/// cross products. Returns the axis of greatest separation (= least
/// penetration), or `None` when the hulls are separated beyond `threshold`.
pub(crate) fn sat_hulls(a: &HullData, b: &HullData, threshold: Scalar) -> Option<SatResult> {
    let mut best: Option<SatResult> = None;

    let mut consider = |feature: SatFeature, separation: Scalar| -> bool {
        if separation > threshold {
            return false; // separating axis found
        }
        match &best {
            Some(current) if separation <= current.separation => {}
            _ => best = Some(SatResult { feature, separation }),
        }
        true
    };

    for (i, (indices, normal)) in a.faces.iter().enumerate() {
        let face_point = a.vertices[indices[0] as usize];
        let separation = b.project_min(*normal) - face_point.dot(*normal);
        if !consider(SatFeature::FaceA(i), separation) {
            return None;
        }
    }

    for (i, (indices, normal)) in b.faces.iter().enumerate() {
        let face_point = b.vertices[indices[0] as usize];
        let separation = a.project_min(*normal) - face_point.dot(*normal);
        if !consider(SatFeature::FaceB(i), separation) {
            return None;
        }
    }

    for (ia, &(a0, a1)) in a.edges.iter().enumerate() {
        let dir_a = a.vertices[a1 as usize] - a.vertices[a0 as usize];
        for (ib, &(b0, b1)) in b.edges.iter().enumerate() {
            let dir_b = b.vertices[b1 as usize] - b.vertices[b0 as usize];
            let cross = dir_a.cross(dir_b);
            let len = cross.length();
            if len < EPSILON {
                continue; // parallel edges, axis is degenerate
            }
            let mut axis = cross / len;
            // Orient the axis from A toward B.
            if axis.dot(b.center - a.center) < 0.0 {
                axis = -axis;
            }
            let separation = b.project_min(axis) - a.project_max(axis);
            if !consider(SatFeature::Edges(ia, ib), separation) {
                return None;
            }
        }
    }

    best
}

/// Clip `polygon` against the half space `dot(p - plane_point, normal) >= 0`.
fn clip_polygon(polygon: &[Vec3], plane_point: Vec3, normal: Vec3) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for i in 0..polygon.len() {
        let current = polygon[i];
        let next = polygon[(i + 1) % polygon.len()];
        let d_current = (current - plane_point).dot(normal);
        let d_next = (next - plane_point).dot(normal);

        if d_current >= 0.0 {
            out.push(current);
        }
        if (d_current > 0.0) != (d_next > 0.0) && (d_current - d_next).abs() > EPSILON {
            let t = d_current / (d_current - d_next);
            out.push(current + (next - current) * t);
        }
    }
    out
}

/// Contact candidate in the hulls' common frame: point on A, point on B,
/// and the contact normal pointing from B toward A.
pub(crate) type HullContact = (Vec3, Vec3, Vec3);

/// SAT plus contact generation in the hulls' common frame. Returns the
/// winning feature and the candidate points; `None` when separated.
pub(crate) fn hull_sat_contacts(
    a: &HullData,
    b: &HullData,
    threshold: Scalar,
) -> Option<(SatFeature, Vec<HullContact>)> {
    let sat = sat_hulls(a, b, threshold)?;
    let mut contacts = Vec::new();

    match sat.feature {
        SatFeature::FaceA(face) => {
            clip_face_contact(a, b, face, false, threshold, &mut contacts);
        }
        SatFeature::FaceB(face) => {
            clip_face_contact(b, a, face, true, threshold, &mut contacts);
        }
        SatFeature::Edges(ia, ib) => {
            let (a0, a1) = a.edges[ia];
            let (b0, b1) = b.edges[ib];
            let (on_a, on_b) = closest_points_segment_segment(
                a.vertices[a0 as usize],
                a.vertices[a1 as usize],
                b.vertices[b0 as usize],
                b.vertices[b1 as usize],
            );
            let dir_a = a.vertices[a1 as usize] - a.vertices[a0 as usize];
            let dir_b = b.vertices[b1 as usize] - b.vertices[b0 as usize];
            let mut axis = dir_a.cross(dir_b).normalize_or_zero();
            if axis.dot(b.center - a.center) < 0.0 {
                axis = -axis;
            }
            // Normal points from B toward A.
            contacts.push((on_a, on_b, -axis));
        }
    }
    Some((sat.feature, contacts))
}

/// Generate a contact patch for two convex hulls in world space.
pub(crate) fn collide_hulls(
    a: &HullData,
    b: &HullData,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    if let Some((_, contacts)) = hull_sat_contacts(a, b, ctx.threshold) {
        for (on_a, on_b, normal) in contacts {
            result.maybe_add(world_point(ctx, on_a, on_b, normal));
        }
    }
    result
}

/// Reference-face clipping. `reference` owns the face; `incident` supplies
/// the polygon that gets clipped. `swapped` is true when the reference face
/// belongs to shape B of the dispatch pair.
fn clip_face_contact(
    reference: &HullData,
    incident: &HullData,
    face: usize,
    swapped: bool,
    threshold: Scalar,
    contacts: &mut Vec<HullContact>,
) {
    let (ref_indices, ref_normal) = &reference.faces[face];
    let ref_point = reference.vertices[ref_indices[0] as usize];

    // Incident face: most anti-parallel to the reference normal.
    let mut incident_face = 0;
    let mut min_dot = Scalar::MAX;
    for (i, (_, normal)) in incident.faces.iter().enumerate() {
        let d = normal.dot(*ref_normal);
        if d < min_dot {
            min_dot = d;
            incident_face = i;
        }
    }

    let mut polygon: Vec<Vec3> = incident.faces[incident_face]
        .0
        .iter()
        .map(|&i| incident.vertices[i as usize])
        .collect();

    // Clip by each side plane of the reference face.
    for k in 0..ref_indices.len() {
        let v0 = reference.vertices[ref_indices[k] as usize];
        let v1 = reference.vertices[ref_indices[(k + 1) % ref_indices.len()] as usize];
        let inward = ref_normal.cross(v1 - v0).normalize_or_zero();
        // Keep the side containing the face interior.
        let side = if inward.dot(reference.center - v0) >= 0.0 {
            inward
        } else {
            -inward
        };
        polygon = clip_polygon(&polygon, v0, side);
        if polygon.is_empty() {
            return;
        }
    }

    for p in polygon {
        let dist = (p - ref_point).dot(*ref_normal);
        if dist > threshold {
            continue;
        }
        let on_ref = p - *ref_normal * dist;
        if swapped {
            // Reference face is on B: p lies on A, the normal already points
            // from B toward A.
            contacts.push((p, on_ref, *ref_normal));
        } else {
            // Reference face is on A: p lies on B, push A along -normal.
            contacts.push((on_ref, p, -*ref_normal));
        }
    }
}

/// Hull of shape A against a plane carried by shape B: every vertex below
/// the threshold becomes a contact point.
pub(crate) fn collide_plane_hull(
    hull: &HullData,
    plane_normal: Vec3,
    constant: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let normal = ctx.orn_b * plane_normal;
    for &v in &hull.vertices {
        let dist = (v - ctx.pos_b).dot(normal) - constant;
        if dist <= ctx.threshold {
            result.maybe_add(world_point(ctx, v, v - normal * dist, normal));
        }
    }
    result
}

// ============================================================================
// GJK / EPA fallback for the remaining convex pairs
// ============================================================================

const GJK_MAX_ITERATIONS: usize = 64;
const EPA_MAX_ITERATIONS: usize = 64;
const EPA_TOLERANCE: Scalar = 1.0e-4;

#[inline]
fn minkowski_support(a: &Shape, b: &Shape, ctx: &CollisionContext, dir: Vec3) -> Vec3 {
    a.support_point(ctx.pos_a, ctx.orn_a, dir) - b.support_point(ctx.pos_b, ctx.orn_b, -dir)
}

/// Single-point contact for convex pairs with no specialized routine.
/// Produces a contact only on actual penetration.
pub(crate) fn collide_convex_fallback(
    a: &Shape,
    b: &Shape,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let Some(simplex) = gjk_intersect(a, b, ctx) else {
        return result;
    };
    let Some((normal, depth)) = epa_penetration(a, b, ctx, &simplex) else {
        return result;
    };
    // `normal` is the Minkowski face normal; A separates by moving along
    // `-normal`, so the contact normal from B to A is `-normal`.
    let on_a = a.support_point(ctx.pos_a, ctx.orn_a, normal);
    let on_b = b.support_point(ctx.pos_b, ctx.orn_b, -normal);
    let contact_normal = -normal;
    debug_assert!(depth >= 0.0);
    let mut point = world_point(ctx, on_a, on_b, contact_normal);
    // Support points can overshoot tangentially; the axis depth is reliable.
    point.distance = -depth;
    result.maybe_add(point);
    result
}

fn gjk_intersect(a: &Shape, b: &Shape, ctx: &CollisionContext) -> Option<Vec<Vec3>> {
    let mut dir = Vec3::X;
    let mut simplex: Vec<Vec3> = Vec::with_capacity(4);
    simplex.push(minkowski_support(a, b, ctx, dir));
    dir = -simplex[0];

    for _ in 0..GJK_MAX_ITERATIONS {
        if dir.length_squared() < EPSILON {
            // Origin lies on the simplex; treat as touching.
            while simplex.len() < 4 {
                let padding = minkowski_support(a, b, ctx, Vec3::Y);
                simplex.push(padding + Vec3::splat(1.0e-4) * simplex.len() as Scalar);
            }
            return Some(simplex);
        }
        let support = minkowski_support(a, b, ctx, dir);
        if support.dot(dir) < 0.0 {
            return None;
        }
        simplex.insert(0, support);
        if do_simplex(&mut simplex, &mut dir) {
            while simplex.len() < 4 {
                simplex.push(minkowski_support(a, b, ctx, Vec3::Y));
            }
            return Some(simplex);
        }
    }
    None
}

fn do_simplex(simplex: &mut Vec<Vec3>, dir: &mut Vec3) -> bool {
    match simplex.len() {
        2 => simplex_line(simplex, dir),
        3 => simplex_triangle(simplex, dir),
        4 => simplex_tetrahedron(simplex, dir),
        _ => false,
    }
}

fn simplex_line(simplex: &mut Vec<Vec3>, dir: &mut Vec3) -> bool {
    let a = simplex[0];
    let b = simplex[1];
    let ab = b - a;
    let ao = -a;
    if ab.dot(ao) > 0.0 {
        *dir = ab.cross(ao).cross(ab);
    } else {
        simplex.truncate(1);
        *dir = ao;
    }
    false
}

fn simplex_triangle(simplex: &mut Vec<Vec3>, dir: &mut Vec3) -> bool {
    let a = simplex[0];
    let b = simplex[1];
    let c = simplex[2];
    let ab = b - a;
    let ac = c - a;
    let ao = -a;
    let abc = ab.cross(ac);

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            *simplex = vec![a, c];
            *dir = ac.cross(ao).cross(ac);
        } else {
            *simplex = vec![a, b];
            return simplex_line(simplex, dir);
        }
    } else if ab.cross(abc).dot(ao) > 0.0 {
        *simplex = vec![a, b];
        return simplex_line(simplex, dir);
    } else if abc.dot(ao) > 0.0 {
        *dir = abc;
    } else {
        *simplex = vec![a, c, b];
        *dir = -abc;
    }
    false
}

fn simplex_tetrahedron(simplex: &mut Vec<Vec3>, dir: &mut Vec3) -> bool {
    let a = simplex[0];
    let b = simplex[1];
    let c = simplex[2];
    let d = simplex[3];
    let ao = -a;
    let abc = (b - a).cross(c - a);
    let acd = (c - a).cross(d - a);
    let adb = (d - a).cross(b - a);

    if abc.dot(ao) > 0.0 {
        *simplex = vec![a, b, c];
        return simplex_triangle(simplex, dir);
    }
    if acd.dot(ao) > 0.0 {
        *simplex = vec![a, c, d];
        return simplex_triangle(simplex, dir);
    }
    if adb.dot(ao) > 0.0 {
        *simplex = vec![a, d, b];
        return simplex_triangle(simplex, dir);
    }
    true
}

struct EpaFace {
    indices: [usize; 3],
    normal: Vec3,
    distance: Scalar,
}

fn epa_penetration(
    a: &Shape,
    b: &Shape,
    ctx: &CollisionContext,
    simplex: &[Vec3],
) -> Option<(Vec3, Scalar)> {
    if simplex.len() < 4 {
        return None;
    }
    let mut vertices: Vec<Vec3> = simplex.to_vec();
    let mut faces: Vec<EpaFace> = Vec::with_capacity(32);
    for (i, j, k) in [(0, 1, 2), (0, 3, 1), (0, 2, 3), (1, 3, 2)] {
        push_face(&mut faces, &vertices, i, j, k);
    }
    if faces.is_empty() {
        return None;
    }

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = faces
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.distance.total_cmp(&y.distance))
            .map(|(i, _)| i)?;
        let normal = faces[closest].normal;
        let distance = faces[closest].distance;

        let support = minkowski_support(a, b, ctx, normal);
        let support_dist = support.dot(normal);
        if support_dist - distance < EPA_TOLERANCE {
            return Some((normal, distance));
        }

        let new_idx = vertices.len();
        vertices.push(support);

        // Remove faces visible from the new vertex, keeping the horizon.
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let to_new = support - vertices[face.indices[0]];
            if face.normal.dot(to_new) > 0.0 {
                for i in 0..3 {
                    let edge = (face.indices[i], face.indices[(i + 1) % 3]);
                    if let Some(pos) = horizon.iter().position(|&e| e == (edge.1, edge.0)) {
                        horizon.remove(pos);
                    } else {
                        horizon.push(edge);
                    }
                }
                false
            } else {
                true
            }
        });
        for (i, j) in horizon {
            push_face(&mut faces, &vertices, i, j, new_idx);
        }
        if faces.is_empty() {
            return None;
        }
    }
    None
}

fn push_face(faces: &mut Vec<EpaFace>, vertices: &[Vec3], i: usize, j: usize, k: usize) {
    let a = vertices[i];
    let b = vertices[j];
    let c = vertices[k];
    let n = (b - a).cross(c - a);
    let len = n.length();
    if len < EPSILON {
        return;
    }
    let mut normal = n / len;
    let mut distance = a.dot(normal);
    if distance < 0.0 {
        normal = -normal;
        distance = -distance;
    }
    faces.push(EpaFace {
        indices: [i, j, k],
        normal,
        distance,
    });
}
