//! Triangle mesh shape
//!
//! Static triangle meshes carry their own AABB tree for triangle lookup plus
//! per-edge adjacency data computed at build time: concavity flags and the
//! cosine of the angle between adjacent faces. The narrowphase uses the
//! flags to suppress contacts on interior edges, which is what prevents
//! bodies from snagging on the seams of flat ground made of many triangles.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::math::{Scalar, EPSILON};

/// One triangle handed to a collision routine, with its precomputed
/// adjacency information.
#[derive(Clone, Copy, Debug)]
pub struct TriangleInfo {
    pub vertices: [Vec3; 3],
    pub normal: Vec3,
    /// Edge `i` runs from vertex `i` to vertex `(i + 1) % 3`.
    pub is_concave_edge: [bool; 3],
    /// Cosine of the dihedral angle across each edge (1 = coplanar neighbor).
    pub cos_angles: [Scalar; 3],
    pub is_concave_vertex: [bool; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MeshNode {
    aabb: Aabb,
    /// Leaf when `count > 0`; then `first` indexes into `tri_order`.
    first: u32,
    count: u32,
    left: u32,
    right: u32,
}

/// Static triangle mesh with an internal AABB tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriMesh {
    vertices: Vec<Vec3>,
    indices: Vec<u32>,
    normals: Vec<Vec3>,
    is_concave_edge: Vec<bool>,
    cos_angles: Vec<Scalar>,
    is_concave_vertex: Vec<bool>,
    nodes: Vec<MeshNode>,
    tri_order: Vec<u32>,
    bounds: Aabb,
}

const LEAF_SIZE: u32 = 4;

impl TriMesh {
    /// Build from shared vertices and triangle indices (three per triangle).
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        debug_assert!(indices.len() % 3 == 0, "indices must come in triples");
        let tri_count = indices.len() / 3;

        let mut normals = Vec::with_capacity(tri_count);
        let mut tri_aabbs = Vec::with_capacity(tri_count);
        let mut bounds = Aabb::INVERTED;

        for t in 0..tri_count {
            let [a, b, c] = triangle_vertices(&vertices, &indices, t);
            let n = (b - a).cross(c - a);
            let len = n.length();
            normals.push(if len > EPSILON { n / len } else { Vec3::Y });

            let mut tri_bounds = Aabb::new(a.min(b).min(c), a.max(b).max(c));
            // Flat triangles still need a sliver of thickness for queries.
            tri_bounds = tri_bounds.fattened(1.0e-4);
            bounds = bounds.union(&tri_bounds);
            tri_aabbs.push(tri_bounds);
        }

        let mut mesh = Self {
            vertices,
            indices,
            normals,
            is_concave_edge: vec![false; tri_count * 3],
            cos_angles: vec![1.0; tri_count * 3],
            is_concave_vertex: vec![false; tri_count * 3],
            nodes: Vec::new(),
            tri_order: (0..tri_count as u32).collect(),
            bounds,
        };
        mesh.calculate_adjacency();
        mesh.build_tree(&tri_aabbs);
        mesh
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Triangle `t` with its adjacency flags.
    pub fn triangle(&self, t: usize) -> TriangleInfo {
        TriangleInfo {
            vertices: triangle_vertices(&self.vertices, &self.indices, t),
            normal: self.normals[t],
            is_concave_edge: [
                self.is_concave_edge[t * 3],
                self.is_concave_edge[t * 3 + 1],
                self.is_concave_edge[t * 3 + 2],
            ],
            cos_angles: [
                self.cos_angles[t * 3],
                self.cos_angles[t * 3 + 1],
                self.cos_angles[t * 3 + 2],
            ],
            is_concave_vertex: [
                self.is_concave_vertex[t * 3],
                self.is_concave_vertex[t * 3 + 1],
                self.is_concave_vertex[t * 3 + 2],
            ],
        }
    }

    /// Visit every triangle whose AABB intersects `aabb`.
    pub fn visit(&self, aabb: &Aabb, mut f: impl FnMut(usize, TriangleInfo)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0u32];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.count > 0 {
                for i in node.first..node.first + node.count {
                    let t = self.tri_order[i as usize] as usize;
                    f(t, self.triangle(t));
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    fn calculate_adjacency(&mut self) {
        use std::collections::HashMap;

        let tri_count = self.triangle_count();
        // Map each undirected edge to the triangles and edge slots using it.
        let mut edge_map: HashMap<(u32, u32), Vec<(usize, usize)>> = HashMap::new();
        for t in 0..tri_count {
            for e in 0..3 {
                let a = self.indices[t * 3 + e];
                let b = self.indices[t * 3 + (e + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                edge_map.entry(key).or_default().push((t, e));
            }
        }

        for users in edge_map.values() {
            if users.len() != 2 {
                continue;
            }
            let (t0, e0) = users[0];
            let (t1, e1) = users[1];
            let cos_angle = self.normals[t0].dot(self.normals[t1]);

            // The edge is concave when the neighbor's opposite vertex lies
            // above this triangle's plane.
            let opposite1 = self.indices[t1 * 3 + (e1 + 2) % 3];
            let edge_start = self.indices[t0 * 3 + e0];
            let to_opposite =
                self.vertices[opposite1 as usize] - self.vertices[edge_start as usize];
            let concave = self.normals[t0].dot(to_opposite) > 1.0e-4;

            for &(t, e) in &[(t0, e0), (t1, e1)] {
                self.cos_angles[t * 3 + e] = cos_angle;
                self.is_concave_edge[t * 3 + e] = concave;
            }
        }

        // A vertex is concave when any of its incident edges is.
        for t in 0..tri_count {
            for v in 0..3 {
                let incoming = (v + 2) % 3;
                self.is_concave_vertex[t * 3 + v] =
                    self.is_concave_edge[t * 3 + v] || self.is_concave_edge[t * 3 + incoming];
            }
        }
    }

    fn build_tree(&mut self, tri_aabbs: &[Aabb]) {
        self.nodes.clear();
        if tri_aabbs.is_empty() {
            return;
        }
        let count = self.tri_order.len() as u32;
        self.nodes.push(MeshNode {
            aabb: self.bounds,
            first: 0,
            count,
            left: 0,
            right: 0,
        });
        self.split_node(0, tri_aabbs);
    }

    fn split_node(&mut self, node_idx: usize, tri_aabbs: &[Aabb]) {
        let (first, count) = {
            let node = &self.nodes[node_idx];
            (node.first, node.count)
        };
        if count <= LEAF_SIZE {
            return;
        }

        // Median split along the widest axis of the node bounds.
        let extents = self.nodes[node_idx].aabb.extents();
        let axis = if extents.x >= extents.y && extents.x >= extents.z {
            0
        } else if extents.y >= extents.z {
            1
        } else {
            2
        };

        let range = &mut self.tri_order[first as usize..(first + count) as usize];
        range.sort_by(|&a, &b| {
            let ca = tri_aabbs[a as usize].center()[axis];
            let cb = tri_aabbs[b as usize].center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let half = count / 2;
        let left_idx = self.nodes.len() as u32;
        let right_idx = left_idx + 1;

        let mut left_aabb = Aabb::INVERTED;
        for &t in &self.tri_order[first as usize..(first + half) as usize] {
            left_aabb = left_aabb.union(&tri_aabbs[t as usize]);
        }
        let mut right_aabb = Aabb::INVERTED;
        for &t in &self.tri_order[(first + half) as usize..(first + count) as usize] {
            right_aabb = right_aabb.union(&tri_aabbs[t as usize]);
        }

        self.nodes.push(MeshNode {
            aabb: left_aabb,
            first,
            count: half,
            left: 0,
            right: 0,
        });
        self.nodes.push(MeshNode {
            aabb: right_aabb,
            first: first + half,
            count: count - half,
            left: 0,
            right: 0,
        });

        let node = &mut self.nodes[node_idx];
        node.count = 0;
        node.left = left_idx;
        node.right = right_idx;

        self.split_node(left_idx as usize, tri_aabbs);
        self.split_node(right_idx as usize, tri_aabbs);
    }
}

fn triangle_vertices(vertices: &[Vec3], indices: &[u32], t: usize) -> [Vec3; 3] {
    [
        vertices[indices[t * 3] as usize],
        vertices[indices[t * 3 + 1] as usize],
        vertices[indices[t * 3 + 2] as usize],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat ground made of two coplanar triangles sharing a diagonal edge.
    fn ground_mesh() -> TriMesh {
        let vertices = vec![
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(-10.0, 0.0, 10.0),
        ];
        let indices = vec![0, 2, 1, 0, 3, 2];
        TriMesh::new(vertices, indices)
    }

    #[test]
    fn test_build_and_bounds() {
        let mesh = ground_mesh();
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.bounds().min.x <= -10.0);
        assert!(mesh.bounds().max.z >= 10.0);
    }

    #[test]
    fn test_coplanar_shared_edge_not_concave() {
        let mesh = ground_mesh();
        for t in 0..2 {
            let info = mesh.triangle(t);
            assert!(
                info.is_concave_edge.iter().all(|&c| !c),
                "coplanar seam must not be flagged concave"
            );
        }
    }

    #[test]
    fn test_valley_edge_is_concave() {
        // Two triangles folded upward into a V; the shared edge is concave.
        let vertices = vec![
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        // Left slope: (0,1,2) (0,2,3); right slope: (1,4,5) (1,5,2).
        let indices = vec![0, 1, 2, 0, 2, 3, 1, 4, 5, 1, 5, 2];
        let mesh = TriMesh::new(vertices, indices);

        let mut saw_concave = false;
        for t in 0..mesh.triangle_count() {
            let info = mesh.triangle(t);
            saw_concave |= info.is_concave_edge.iter().any(|&c| c);
        }
        assert!(saw_concave, "valley fold should produce a concave edge");
    }

    #[test]
    fn test_visit_culls_far_triangles() {
        let mesh = ground_mesh();
        let mut visited = Vec::new();
        let query = Aabb::new(Vec3::new(-11.0, -1.0, -11.0), Vec3::new(11.0, 1.0, 11.0));
        mesh.visit(&query, |t, _| visited.push(t));
        assert_eq!(visited.len(), 2);

        visited.clear();
        let far = Aabb::new(Vec3::splat(100.0), Vec3::splat(101.0));
        mesh.visit(&far, |t, _| visited.push(t));
        assert!(visited.is_empty());
    }

    #[test]
    fn test_tree_handles_many_triangles() {
        // A strip of triangles; query a window in the middle.
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for i in 0..64u32 {
            let x = i as f32;
            vertices.push(Vec3::new(x, 0.0, 0.0));
            vertices.push(Vec3::new(x, 0.0, 1.0));
            if i > 0 {
                let base = (i - 1) * 2;
                indices.extend_from_slice(&[base, base + 1, base + 2]);
                indices.extend_from_slice(&[base + 1, base + 3, base + 2]);
            }
        }
        let mesh = TriMesh::new(vertices, indices);

        let mut count = 0;
        let query = Aabb::new(Vec3::new(30.0, -1.0, 0.0), Vec3::new(32.0, 1.0, 1.0));
        mesh.visit(&query, |_, _| count += 1);
        assert!(count > 0);
        assert!(
            count < mesh.triangle_count(),
            "query window should cull most of the strip"
        );
    }
}
