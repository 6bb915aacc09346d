//! Dynamic bounding-volume tree
//!
//! Incremental AABB tree used by the broadphase. Leaves are created with a
//! fattened AABB so small movements don't touch the tree; `move_proxy` only
//! re-inserts when the tight AABB escapes the stored fat one. Insertion
//! descends by surface-area cost and the tree re-balances with AVL-style
//! rotations on the way back up.
//!
//! Nodes are reference slots in a pooled array addressed by `u32` handles;
//! no pointers are exposed. [`TreeView`] is an immutable snapshot of the
//! leaf structure that can be shipped to another thread.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::math::Scalar;
use crate::registry::Entity;

/// Sentinel for "no node".
pub const NULL_NODE: u32 = u32::MAX;

/// Margin added on every side of a leaf AABB.
const AABB_MARGIN: Scalar = 0.1;

#[derive(Clone, Debug)]
struct Node {
    aabb: Aabb,
    entity: Option<Entity>,
    parent: u32,
    left: u32,
    right: u32,
    /// -1 marks a free slot, 0 a leaf.
    height: i32,
}

impl Node {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic AABB tree keyed by entity payloads.
pub struct DynamicTree {
    nodes: Vec<Node>,
    free_list: Vec<u32>,
    root: u32,
    margin: Scalar,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            margin: AABB_MARGIN,
        }
    }

    /// Insert a leaf for `entity`, returns its node id.
    pub fn create(&mut self, aabb: Aabb, entity: Entity) -> u32 {
        let id = self.alloc_node();
        self.nodes[id as usize].aabb = aabb.fattened(self.margin);
        self.nodes[id as usize].entity = Some(entity);
        self.nodes[id as usize].height = 0;
        self.insert_leaf(id);
        id
    }

    /// Remove a leaf.
    pub fn destroy(&mut self, id: u32) {
        if (id as usize) >= self.nodes.len() || self.nodes[id as usize].height < 0 {
            return;
        }
        self.remove_leaf(id);
        self.free_node(id);
    }

    /// Update a leaf's AABB. Re-inserts only when the new bounds escape the
    /// stored fat AABB; returns whether the tree changed.
    pub fn move_proxy(&mut self, id: u32, aabb: Aabb) -> bool {
        debug_assert!(self.nodes[id as usize].is_leaf());
        if self.nodes[id as usize].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(id);
        self.nodes[id as usize].aabb = aabb.fattened(self.margin);
        self.insert_leaf(id);
        true
    }

    /// Entity stored at a leaf.
    #[inline]
    pub fn entity(&self, id: u32) -> Entity {
        self.nodes[id as usize]
            .entity
            .expect("queried entity of an internal tree node")
    }

    /// Fat AABB of a node.
    #[inline]
    pub fn node_aabb(&self, id: u32) -> Aabb {
        self.nodes[id as usize].aabb
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.height == 0 && n.entity.is_some())
            .count()
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Visit the id of every leaf whose AABB intersects `aabb`.
    pub fn query(&self, aabb: &Aabb, mut visit: impl FnMut(u32)) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                visit(id);
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Immutable snapshot of the leaf structure.
    pub fn view(&self) -> TreeView {
        let mut leaves = Vec::with_capacity(self.leaf_count());
        let mut root_aabb = Aabb::INVERTED;
        if self.root != NULL_NODE {
            root_aabb = self.nodes[self.root as usize].aabb;
            self.query(&root_aabb, |id| {
                let node = &self.nodes[id as usize];
                leaves.push(TreeViewLeaf {
                    aabb: node.aabb,
                    entity: node.entity.unwrap(),
                });
            });
        }
        TreeView { leaves, root_aabb }
    }

    // ----- internals -----

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            id
        } else {
            let id = self.nodes.len() as u32;
            self.nodes.push(Node {
                aabb: Aabb::new(Vec3::ZERO, Vec3::ZERO),
                entity: None,
                parent: NULL_NODE,
                left: NULL_NODE,
                right: NULL_NODE,
                height: -1,
            });
            id
        }
    }

    fn free_node(&mut self, id: u32) {
        let node = &mut self.nodes[id as usize];
        node.entity = None;
        node.parent = NULL_NODE;
        node.left = NULL_NODE;
        node.right = NULL_NODE;
        node.height = -1;
        self.free_list.push(id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Descend toward the cheapest sibling by surface-area cost.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;
        while !self.nodes[sibling as usize].is_leaf() {
            let node = &self.nodes[sibling as usize];
            let left = node.left;
            let right = node.right;

            let area = node.aabb.surface_area();
            let combined_area = node.aabb.union(&leaf_aabb).surface_area();
            let cost_here = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);

            let cost_left = self.descend_cost(left, &leaf_aabb) + inheritance;
            let cost_right = self.descend_cost(right, &leaf_aabb) + inheritance;

            if cost_here < cost_left && cost_here < cost_right {
                break;
            }
            sibling = if cost_left < cost_right { left } else { right };
        }

        // Splice a fresh parent above the chosen sibling.
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_aabb = self.nodes[sibling as usize].aabb;
            let sibling_height = self.nodes[sibling as usize].height;
            let node = &mut self.nodes[new_parent as usize];
            node.aabb = sibling_aabb.union(&leaf_aabb);
            node.parent = old_parent;
            node.left = sibling;
            node.right = leaf;
            node.height = sibling_height + 1;
        }
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].left == sibling {
            self.nodes[old_parent as usize].left = new_parent;
        } else {
            self.nodes[old_parent as usize].right = new_parent;
        }

        self.refit_upwards(new_parent);
    }

    fn descend_cost(&self, child: u32, leaf_aabb: &Aabb) -> Scalar {
        let child_node = &self.nodes[child as usize];
        let combined = child_node.aabb.union(leaf_aabb).surface_area();
        if child_node.is_leaf() {
            combined
        } else {
            combined - child_node.aabb.surface_area()
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grandparent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        } else {
            if self.nodes[grandparent as usize].left == parent {
                self.nodes[grandparent as usize].left = sibling;
            } else {
                self.nodes[grandparent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.free_node(parent);
            self.refit_upwards(grandparent);
        }
    }

    /// Re-balance and refresh heights/AABBs from `start` to the root.
    fn refit_upwards(&mut self, start: u32) {
        let mut id = start;
        while id != NULL_NODE {
            id = self.balance(id);

            let left = self.nodes[id as usize].left;
            let right = self.nodes[id as usize].right;
            debug_assert!(left != NULL_NODE && right != NULL_NODE);

            let (l_aabb, l_h) = (
                self.nodes[left as usize].aabb,
                self.nodes[left as usize].height,
            );
            let (r_aabb, r_h) = (
                self.nodes[right as usize].aabb,
                self.nodes[right as usize].height,
            );
            let node = &mut self.nodes[id as usize];
            node.aabb = l_aabb.union(&r_aabb);
            node.height = 1 + l_h.max(r_h);

            id = self.nodes[id as usize].parent;
        }
    }

    /// Rotate `a` if its children heights differ by more than one. Returns
    /// the node occupying `a`'s position afterwards.
    fn balance(&mut self, a: u32) -> u32 {
        let node = &self.nodes[a as usize];
        if node.is_leaf() || node.height < 2 {
            return a;
        }
        let left = node.left;
        let right = node.right;
        let diff = self.nodes[right as usize].height - self.nodes[left as usize].height;

        if diff > 1 {
            self.rotate_up(a, right, left)
        } else if diff < -1 {
            self.rotate_up(a, left, right)
        } else {
            a
        }
    }

    /// Promote `child` above `a`; `other` is `a`'s remaining child. The
    /// shorter grandchild of `child` is handed down to `a`.
    fn rotate_up(&mut self, a: u32, child: u32, other: u32) -> u32 {
        let c_left = self.nodes[child as usize].left;
        let c_right = self.nodes[child as usize].right;
        let parent = self.nodes[a as usize].parent;

        self.nodes[child as usize].parent = parent;
        if parent == NULL_NODE {
            self.root = child;
        } else if self.nodes[parent as usize].left == a {
            self.nodes[parent as usize].left = child;
        } else {
            self.nodes[parent as usize].right = child;
        }

        let (keep, give) =
            if self.nodes[c_left as usize].height >= self.nodes[c_right as usize].height {
                (c_left, c_right)
            } else {
                (c_right, c_left)
            };

        self.nodes[child as usize].left = a;
        self.nodes[child as usize].right = keep;
        self.nodes[a as usize].parent = child;
        self.nodes[a as usize].left = other;
        self.nodes[a as usize].right = give;
        self.nodes[give as usize].parent = a;

        // Refresh `a` first, then `child` above it.
        for &id in &[a, child] {
            let left = self.nodes[id as usize].left;
            let right = self.nodes[id as usize].right;
            let (l_aabb, l_h) = (
                self.nodes[left as usize].aabb,
                self.nodes[left as usize].height,
            );
            let (r_aabb, r_h) = (
                self.nodes[right as usize].aabb,
                self.nodes[right as usize].height,
            );
            let node = &mut self.nodes[id as usize];
            node.aabb = l_aabb.union(&r_aabb);
            node.height = 1 + l_h.max(r_h);
        }

        child
    }
}

/// One leaf of a [`TreeView`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TreeViewLeaf {
    pub aabb: Aabb,
    pub entity: Entity,
}

/// Flat snapshot of a tree's leaves plus the root bounds. Good enough for
/// the coordinator's cross-island sweeps, which only need leaf queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeView {
    pub leaves: Vec<TreeViewLeaf>,
    pub root_aabb: Aabb,
}

impl TreeView {
    pub fn empty() -> Self {
        Self {
            leaves: Vec::new(),
            root_aabb: Aabb::INVERTED,
        }
    }

    /// Visit every leaf entity whose AABB intersects `aabb`.
    pub fn query(&self, aabb: &Aabb, mut visit: impl FnMut(Entity, &Aabb)) {
        if !self.root_aabb.intersects(aabb) {
            return;
        }
        for leaf in &self.leaves {
            if leaf.aabb.intersects(aabb) {
                visit(leaf.entity, &leaf.aabb);
            }
        }
    }

    /// Rewrite leaf entities through `map`, dropping unmapped leaves.
    pub fn map_entities(&mut self, map: impl Fn(Entity) -> Option<Entity>) {
        self.leaves.retain_mut(|leaf| match map(leaf.entity) {
            Some(local) => {
                leaf.entity = local;
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn unit_aabb(x: Scalar, y: Scalar, z: Scalar) -> Aabb {
        Aabb::new(Vec3::new(x, y, z), Vec3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    fn entities(n: usize) -> Vec<Entity> {
        let mut reg = Registry::new();
        (0..n).map(|_| reg.create()).collect()
    }

    #[test]
    fn test_create_and_query() {
        let es = entities(3);
        let mut tree = DynamicTree::new();
        tree.create(unit_aabb(0.0, 0.0, 0.0), es[0]);
        tree.create(unit_aabb(10.0, 10.0, 10.0), es[1]);
        tree.create(unit_aabb(20.0, 20.0, 20.0), es[2]);
        assert_eq!(tree.leaf_count(), 3);

        let mut found = Vec::new();
        tree.query(&unit_aabb(-0.5, -0.5, -0.5), |id| found.push(tree.entity(id)));
        assert_eq!(found, vec![es[0]]);

        found.clear();
        let everything = Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0));
        tree.query(&everything, |id| found.push(tree.entity(id)));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_destroy() {
        let es = entities(3);
        let mut tree = DynamicTree::new();
        tree.create(unit_aabb(0.0, 0.0, 0.0), es[0]);
        let middle = tree.create(unit_aabb(5.0, 5.0, 5.0), es[1]);
        tree.create(unit_aabb(10.0, 10.0, 10.0), es[2]);

        tree.destroy(middle);
        assert_eq!(tree.leaf_count(), 2);

        let mut found = Vec::new();
        let everything = Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0));
        tree.query(&everything, |id| found.push(tree.entity(id)));
        assert!(!found.contains(&es[1]));
    }

    #[test]
    fn test_move_within_fat_aabb_is_free() {
        let es = entities(1);
        let mut tree = DynamicTree::new();
        let id = tree.create(unit_aabb(0.0, 0.0, 0.0), es[0]);

        let nudged = unit_aabb(0.05, 0.0, 0.0);
        assert!(!tree.move_proxy(id, nudged), "tiny move must not touch the tree");

        let far = unit_aabb(50.0, 0.0, 0.0);
        assert!(tree.move_proxy(id, far), "large move must re-insert");

        let mut found = Vec::new();
        tree.query(&unit_aabb(49.5, -0.5, -0.5), |i| found.push(tree.entity(i)));
        assert_eq!(found, vec![es[0]]);
    }

    #[test]
    fn test_balanced_under_sequential_insertion() {
        let es = entities(128);
        let mut tree = DynamicTree::new();
        for (i, &e) in es.iter().enumerate() {
            tree.create(unit_aabb(i as Scalar * 2.0, 0.0, 0.0), e);
        }
        assert_eq!(tree.leaf_count(), 128);
        assert!(
            tree.height() < 24,
            "tree of 128 leaves should stay shallow, height={}",
            tree.height()
        );
    }

    #[test]
    fn test_slot_reuse_after_destroy() {
        let es = entities(2);
        let mut tree = DynamicTree::new();
        let a = tree.create(unit_aabb(0.0, 0.0, 0.0), es[0]);
        tree.destroy(a);
        let b = tree.create(unit_aabb(1.0, 1.0, 1.0), es[1]);
        assert_eq!(a, b, "freed slot should be reused");
    }

    #[test]
    fn test_view_snapshot() {
        let es = entities(2);
        let mut tree = DynamicTree::new();
        let first = tree.create(unit_aabb(0.0, 0.0, 0.0), es[0]);
        tree.create(unit_aabb(5.0, 0.0, 0.0), es[1]);

        let view = tree.view();
        assert_eq!(view.leaves.len(), 2);

        let mut found = Vec::new();
        view.query(&unit_aabb(-0.5, -0.5, -0.5), |e, _| found.push(e));
        assert_eq!(found, vec![es[0]]);

        // Mutating the tree afterwards must not affect the snapshot.
        tree.destroy(first);
        assert_eq!(view.leaves.len(), 2);
    }
}
