//! Collision shapes
//!
//! Shapes are a sum type dispatched by exhaustive match; adding a kind means
//! adding a variant plus entries in the collision dispatch matrix. Heavy
//! shape data (convex meshes, triangle meshes, compound children) is shared
//! behind `Arc` so bodies can reuse it.

use std::sync::Arc;

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::math::{Scalar, EPSILON, LARGE_SCALAR};
use crate::trimesh::TriMesh;

/// A convex polyhedron: vertices, faces as index ranges, edges and per-face
/// normals. Faces may have any number of vertices; winding is
/// counter-clockwise as seen from outside.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvexMesh {
    pub vertices: Vec<Vec3>,
    /// Vertex indices of all faces, concatenated.
    pub indices: Vec<u32>,
    /// Per face: (first index into `indices`, vertex count).
    pub faces: Vec<(u32, u32)>,
    /// Unique edges as vertex index pairs.
    pub edges: Vec<(u32, u32)>,
    /// Per-face outward normals.
    pub normals: Vec<Vec3>,
}

impl ConvexMesh {
    /// Build from vertices and per-face index lists; computes normals and the
    /// unique edge set.
    pub fn new(vertices: Vec<Vec3>, face_indices: Vec<Vec<u32>>) -> Self {
        let mut indices = Vec::new();
        let mut faces = Vec::new();
        for f in &face_indices {
            faces.push((indices.len() as u32, f.len() as u32));
            indices.extend_from_slice(f);
        }
        let mut mesh = Self {
            vertices,
            indices,
            faces,
            edges: Vec::new(),
            normals: Vec::new(),
        };
        mesh.calculate_normals();
        mesh.calculate_edges();
        mesh
    }

    /// Axis-aligned box hull with the given half extents.
    pub fn box_hull(half: Vec3) -> Self {
        let (x, y, z) = (half.x, half.y, half.z);
        let vertices = vec![
            Vec3::new(-x, -y, -z),
            Vec3::new(x, -y, -z),
            Vec3::new(x, y, -z),
            Vec3::new(-x, y, -z),
            Vec3::new(-x, -y, z),
            Vec3::new(x, -y, z),
            Vec3::new(x, y, z),
            Vec3::new(-x, y, z),
        ];
        let faces = vec![
            vec![0, 3, 2, 1], // -z
            vec![4, 5, 6, 7], // +z
            vec![0, 1, 5, 4], // -y
            vec![3, 7, 6, 2], // +y
            vec![0, 4, 7, 3], // -x
            vec![1, 2, 6, 5], // +x
        ];
        Self::new(vertices, faces)
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Vertex indices of face `face_idx`.
    pub fn face_vertex_indices(&self, face_idx: usize) -> &[u32] {
        let (first, count) = self.faces[face_idx];
        &self.indices[first as usize..(first + count) as usize]
    }

    fn calculate_normals(&mut self) {
        self.normals.clear();
        for i in 0..self.faces.len() {
            let idx = self.face_vertex_indices(i);
            debug_assert!(idx.len() >= 3);
            let a = self.vertices[idx[0] as usize];
            let b = self.vertices[idx[1] as usize];
            let c = self.vertices[idx[2] as usize];
            let n = (b - a).cross(c - a);
            let len = n.length();
            self.normals.push(if len > EPSILON { n / len } else { Vec3::Y });
        }
    }

    fn calculate_edges(&mut self) {
        self.edges.clear();
        for i in 0..self.faces.len() {
            let idx = self.face_vertex_indices(i).to_vec();
            for k in 0..idx.len() {
                let a = idx[k];
                let b = idx[(k + 1) % idx.len()];
                let edge = if a < b { (a, b) } else { (b, a) };
                if !self.edges.contains(&edge) {
                    self.edges.push(edge);
                }
            }
        }
    }

    /// Vertex with the greatest projection along `dir` (object space).
    pub fn support_point(&self, dir: Vec3) -> Vec3 {
        let mut best = self.vertices[0];
        let mut best_proj = best.dot(dir);
        for &v in &self.vertices[1..] {
            let proj = v.dot(dir);
            if proj > best_proj {
                best_proj = proj;
                best = v;
            }
        }
        best
    }

    /// Face whose normal is most aligned with `dir` (object space).
    pub fn support_face(&self, dir: Vec3) -> usize {
        let mut best = 0;
        let mut best_dot = self.normals[0].dot(dir);
        for (i, n) in self.normals.iter().enumerate().skip(1) {
            let d = n.dot(dir);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }
}

/// One child of a compound shape: a convex shape at a local transform.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompoundChild {
    pub position: Vec3,
    pub orientation: Quat,
    pub shape: Shape,
}

/// Tagged collision shape variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Shape {
    Sphere {
        radius: Scalar,
    },
    /// Box with half extents, axis-aligned in object space.
    Box {
        half_extents: Vec3,
    },
    /// Cylinder along the object-space Y axis.
    Cylinder {
        radius: Scalar,
        half_length: Scalar,
    },
    /// Capsule along the object-space Y axis.
    Capsule {
        radius: Scalar,
        half_length: Scalar,
    },
    Polyhedron(Arc<ConvexMesh>),
    /// Static triangle mesh.
    Mesh(Arc<TriMesh>),
    /// Static infinite plane with object-space normal and offset along it.
    Plane {
        normal: Vec3,
        constant: Scalar,
    },
    Compound(Arc<Vec<CompoundChild>>),
}

impl Shape {
    /// Diagonal of the body-frame inertia tensor for the given mass.
    pub fn inertia(&self, mass: Scalar) -> Vec3 {
        match self {
            Shape::Sphere { radius } => {
                let i = 0.4 * mass * radius * radius;
                Vec3::splat(i)
            }
            Shape::Box { half_extents } => {
                let e = *half_extents * 2.0;
                Vec3::new(
                    mass / 12.0 * (e.y * e.y + e.z * e.z),
                    mass / 12.0 * (e.x * e.x + e.z * e.z),
                    mass / 12.0 * (e.x * e.x + e.y * e.y),
                )
            }
            Shape::Cylinder {
                radius,
                half_length,
            } => {
                let h = 2.0 * half_length;
                let axial = 0.5 * mass * radius * radius;
                let radial = mass / 12.0 * (3.0 * radius * radius + h * h);
                Vec3::new(radial, axial, radial)
            }
            Shape::Capsule {
                radius,
                half_length,
            } => {
                // Cylinder plus two hemispheres, masses split by volume.
                let r = *radius;
                let h = 2.0 * half_length;
                let vol_cyl = core::f32::consts::PI * r * r * h;
                let vol_sph = 4.0 / 3.0 * core::f32::consts::PI * r * r * r;
                let total = vol_cyl + vol_sph;
                let m_cyl = mass * vol_cyl / total;
                let m_sph = mass * vol_sph / total;

                let axial = 0.5 * m_cyl * r * r + 0.4 * m_sph * r * r;
                let radial = m_cyl / 12.0 * (3.0 * r * r + h * h)
                    + m_sph * (0.4 * r * r + 0.5 * h * r + 0.25 * h * h);
                Vec3::new(radial, axial, radial)
            }
            Shape::Polyhedron(mesh) => {
                let bounds = vertices_aabb(&mesh.vertices);
                Shape::Box {
                    half_extents: bounds.extents() * 0.5,
                }
                .inertia(mass)
            }
            Shape::Compound(children) => {
                let mut bounds = Aabb::INVERTED;
                for child in children.iter() {
                    bounds = bounds.union(&child.shape.aabb(child.position, child.orientation));
                }
                Shape::Box {
                    half_extents: bounds.extents() * 0.5,
                }
                .inertia(mass)
            }
            Shape::Mesh(_) | Shape::Plane { .. } => Vec3::splat(LARGE_SCALAR),
        }
    }

    /// World-space AABB of this shape at the given transform.
    pub fn aabb(&self, pos: Vec3, orn: Quat) -> Aabb {
        match self {
            Shape::Sphere { radius } => {
                Aabb::from_center_half_extents(pos, Vec3::splat(*radius))
            }
            Shape::Box { half_extents } => {
                let basis = Mat3::from_quat(orn);
                let abs = Mat3::from_cols(
                    basis.x_axis.abs(),
                    basis.y_axis.abs(),
                    basis.z_axis.abs(),
                );
                Aabb::from_center_half_extents(pos, abs * *half_extents)
            }
            Shape::Cylinder {
                radius,
                half_length,
            }
            | Shape::Capsule {
                radius,
                half_length,
            } => {
                let tip = orn * Vec3::new(0.0, *half_length, 0.0);
                let a = pos + tip;
                let b = pos - tip;
                Aabb::new(a.min(b) - Vec3::splat(*radius), a.max(b) + Vec3::splat(*radius))
            }
            Shape::Polyhedron(mesh) => {
                let mut bounds = Aabb::INVERTED;
                for &v in &mesh.vertices {
                    let w = pos + orn * v;
                    bounds.min = bounds.min.min(w);
                    bounds.max = bounds.max.max(w);
                }
                bounds
            }
            Shape::Mesh(mesh) => {
                let b = mesh.bounds();
                let corners = [
                    Vec3::new(b.min.x, b.min.y, b.min.z),
                    Vec3::new(b.max.x, b.min.y, b.min.z),
                    Vec3::new(b.min.x, b.max.y, b.min.z),
                    Vec3::new(b.min.x, b.min.y, b.max.z),
                    Vec3::new(b.max.x, b.max.y, b.min.z),
                    Vec3::new(b.max.x, b.min.y, b.max.z),
                    Vec3::new(b.min.x, b.max.y, b.max.z),
                    Vec3::new(b.max.x, b.max.y, b.max.z),
                ];
                let mut bounds = Aabb::INVERTED;
                for c in corners {
                    let w = pos + orn * c;
                    bounds.min = bounds.min.min(w);
                    bounds.max = bounds.max.max(w);
                }
                bounds
            }
            Shape::Plane { .. } => {
                // Planes are unbounded; a very large box keeps them in every query.
                Aabb::from_center_half_extents(pos, Vec3::splat(LARGE_SCALAR))
            }
            Shape::Compound(children) => {
                let mut bounds = Aabb::INVERTED;
                for child in children.iter() {
                    let child_pos = pos + orn * child.position;
                    let child_orn = orn * child.orientation;
                    bounds = bounds.union(&child.shape.aabb(child_pos, child_orn));
                }
                bounds
            }
        }
    }

    /// World-space support point for convex variants. Concave variants
    /// (mesh, plane, compound) never reach the convex fallback path.
    pub fn support_point(&self, pos: Vec3, orn: Quat, dir: Vec3) -> Vec3 {
        let local_dir = orn.conjugate() * dir;
        let local = match self {
            Shape::Sphere { radius } => {
                local_dir.normalize_or_zero() * *radius
            }
            Shape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(local_dir.x),
                half_extents.y.copysign(local_dir.y),
                half_extents.z.copysign(local_dir.z),
            ),
            Shape::Cylinder {
                radius,
                half_length,
            } => {
                let radial = Vec3::new(local_dir.x, 0.0, local_dir.z);
                let rim = radial.normalize_or_zero() * *radius;
                rim + Vec3::new(0.0, half_length.copysign(local_dir.y), 0.0)
            }
            Shape::Capsule {
                radius,
                half_length,
            } => {
                let tip = Vec3::new(0.0, half_length.copysign(local_dir.y), 0.0);
                tip + local_dir.normalize_or_zero() * *radius
            }
            Shape::Polyhedron(mesh) => mesh.support_point(local_dir),
            Shape::Mesh(_) | Shape::Plane { .. } | Shape::Compound(_) => {
                debug_assert!(false, "support point queried on a non-convex shape");
                Vec3::ZERO
            }
        };
        pos + orn * local
    }

    /// Whether this shape can only ever be attached to a non-procedural body.
    pub fn is_static_only(&self) -> bool {
        matches!(self, Shape::Mesh(_) | Shape::Plane { .. })
    }
}

fn vertices_aabb(vertices: &[Vec3]) -> Aabb {
    let mut bounds = Aabb::INVERTED;
    for &v in vertices {
        bounds.min = bounds.min.min(v);
        bounds.max = bounds.max.max(v);
    }
    bounds
}
