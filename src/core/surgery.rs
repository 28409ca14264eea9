//! Tree surgery
//!
//! Primitive mutations of the forest. Each keeps the child and sibling links
//! of the nodes it touches consistent, but leaves height order, local tree
//! status and caches stale until `Forest::reset_invariant`. Violated
//! preconditions are programming errors and panic.
//!

use super::forest::Forest;
use super::node::{Parent, TreeStatus};

impl Forest {
    /// Returns `count` empty node slots, lowest first, growing the forest as
    /// needed.
    pub fn allocate_empty(&mut self, count: usize) -> Vec<usize> {
        let slots = self.store.empty_slots(count);
        self.topology.resize(self.store.capacity());
        for &slot in &slots {
            self.topology.onechild[slot] = None;
            self.topology.siblings[slot] = None;
            self.topology.status[slot] = TreeStatus::Disjoint;
        }
        slots
    }

    /// Ensures the root `node` has a single child, inserting a new root at the
    /// same height above it if it has two. Returns the resulting root.
    pub fn make_unifurcating(&mut self, node: usize) -> usize {
        assert!(self.store.is_root(node), "Node {node} is not a root");
        let Some(child) = self.topology.child(node) else {
            panic!("Root {node} has no children");
        };
        if self.topology.sibling(child).is_none() {
            return node;
        }

        let root = self.allocate_empty(1)[0];
        self.store.set_parent(node, Parent::Node(root));
        self.store.set_parent(root, Parent::Root);
        self.store.set_height(root, self.store.height(node));
        self.topology.onechild[root] = Some(node);
        self.topology.siblings[root] = None;
        root
    }

    /// Cuts the branch above `node` at `height`. The upper part ends in a new
    /// leaf that takes the place of `node` below its old parent; the lower part
    /// gets a new root at `height`. Returns `(leaf, root)`.
    pub fn cut(&mut self, node: usize, height: f64) -> (usize, usize) {
        let Parent::Node(parent) = self.store.parent(node) else {
            panic!("Cannot cut above root or empty node {node}");
        };
        assert!(
            self.store.height(node) < height && height < self.store.height(parent),
            "Cut at {height} outside of branch {node} ({}, {})",
            self.store.height(node),
            self.store.height(parent)
        );

        let slots = self.allocate_empty(2);
        let (leaf, root) = (slots[0], slots[1]);

        // lower part
        self.store.set_parent(node, Parent::Node(root));
        let sibling = self.topology.siblings[node].take();

        self.store.set_parent(root, Parent::Root);
        self.store.set_height(root, height);
        self.topology.onechild[root] = Some(node);
        self.topology.siblings[root] = None;
        self.topology.status[root] = self.topology.status[node];

        // upper part
        self.store.set_parent(leaf, Parent::Node(parent));
        self.store.set_height(leaf, height);
        self.topology.onechild[leaf] = None;
        self.topology.siblings[leaf] = sibling;
        self.topology.status[leaf] = TreeStatus::Disjoint;
        if let Some(sibling) = sibling {
            self.topology.siblings[sibling] = Some(leaf);
        }
        self.topology.onechild[parent] = Some(leaf);

        (leaf, root)
    }

    /// Grafts the root `top`, which has at most one child, into the branch
    /// above `branch` at the height of `top`.
    pub fn splice(&mut self, top: usize, branch: usize) {
        let height = self.store.height(top);
        let Parent::Node(parent) = self.store.parent(branch) else {
            panic!("Cannot splice into the branch above root {branch}");
        };
        assert!(
            self.store.height(branch) < height && height < self.store.height(parent),
            "Splice at {height} outside of branch {branch} ({}, {})",
            self.store.height(branch),
            self.store.height(parent)
        );

        self.store.set_parent(top, Parent::Node(parent));
        self.store.set_parent(branch, Parent::Node(top));

        let old_sibling = self.topology.siblings[branch];
        match self.topology.onechild[top] {
            Some(child) => {
                assert!(
                    self.topology.siblings[child].is_none(),
                    "Splicing bifurcating node {top}"
                );
                self.topology.siblings[child] = Some(branch);
                self.topology.siblings[branch] = Some(child);
            }
            None => {
                self.topology.onechild[top] = Some(branch);
                self.topology.siblings[branch] = None;
            }
        }

        self.topology.siblings[top] = old_sibling;
        if let Some(old_sibling) = old_sibling {
            self.topology.siblings[old_sibling] = Some(top);
        }
        self.topology.onechild[parent] = Some(top);
    }

    /// Removes a root or a leaf.
    ///
    /// A lone root vanishes and the child of a unifurcating root becomes a
    /// root. A leaf with a sibling takes its parent with it, the sibling
    /// moving up to the grandparent. A leaf without a sibling hangs from a
    /// root, and both vanish. Removing a bifurcating root would split a tree
    /// and panics.
    pub fn remove(&mut self, node: usize) {
        assert!(node >= self.samples, "Cannot remove sample {node}");
        let parent = self.store.parent(node);
        self.store.set_parent(node, Parent::Empty);

        let parent = match parent {
            Parent::Empty => panic!("Cannot remove empty node {node}"),
            Parent::Root => {
                if let Some(child) = self.topology.onechild[node] {
                    assert!(
                        self.topology.siblings[child].is_none(),
                        "Cannot remove bifurcating root {node}"
                    );
                    self.store.set_parent(child, Parent::Root);
                }
                return;
            }
            Parent::Node(parent) => parent,
        };

        let Some(sibling) = self.topology.siblings[node] else {
            // floating branch
            assert!(
                self.store.is_root(parent),
                "Leaf {node} without sibling below non-root {parent}"
            );
            self.store.set_parent(parent, Parent::Empty);
            return;
        };
        assert_eq!(self.store.parent(sibling), Parent::Node(parent));

        match self.store.parent(parent) {
            Parent::Node(grandparent) => {
                self.store.set_parent(sibling, Parent::Node(grandparent));
                self.topology.onechild[grandparent] = Some(sibling);
                self.store.set_parent(parent, Parent::Empty);
                let parent_sibling = self.topology.siblings[parent];
                self.topology.siblings[sibling] = parent_sibling;
                if let Some(parent_sibling) = parent_sibling {
                    self.topology.siblings[parent_sibling] = Some(sibling);
                }
            }
            _ => {
                // parent is a root and keeps the sibling as its only child
                self.topology.onechild[parent] = Some(sibling);
                self.topology.siblings[sibling] = None;
            }
        }
    }

    /// Attaches the root `child` below the unifurcating root `top`, pairing it
    /// with the existing child of `top`.
    pub fn graft_root(&mut self, child: usize, top: usize) {
        assert!(self.store.is_root(child), "Node {child} is not a root");
        assert!(self.store.is_root(top), "Node {top} is not a root");
        let Some(other) = self.topology.child(top) else {
            panic!("Root {top} has no child to pair with");
        };
        assert!(
            self.topology.sibling(other).is_none(),
            "Root {top} is already bifurcating"
        );
        self.store.set_parent(child, Parent::Node(top));
        self.topology.siblings[other] = Some(child);
        self.topology.siblings[child] = Some(other);
    }
}
