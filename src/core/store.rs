//! Node store
//!
//! Flat arena of node slots. A slot holds the link to the parent and the
//! height of the node. Slots are addressed by index and reused once emptied.
//! Indices of used nodes are ordered by height after every
//! `Forest::reset_invariant`; in between, surgery may append nodes anywhere.
//!

use super::node::Parent;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeStore {
    parents: Vec<Parent>,
    heights: Vec<f64>,
}

impl NodeStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            parents: vec![Parent::Empty; capacity],
            heights: vec![0.; capacity],
        }
    }

    pub fn from_parts(parents: Vec<Parent>, heights: Vec<f64>) -> Self {
        assert_eq!(parents.len(), heights.len());
        Self { parents, heights }
    }

    pub fn capacity(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    pub fn parent(&self, idx: usize) -> Parent {
        self.parents[idx]
    }

    #[inline]
    pub fn height(&self, idx: usize) -> f64 {
        self.heights[idx]
    }

    #[inline]
    pub fn is_used(&self, idx: usize) -> bool {
        self.parents[idx].is_used()
    }

    #[inline]
    pub fn is_root(&self, idx: usize) -> bool {
        self.parents[idx].is_root()
    }

    pub fn set_parent(&mut self, idx: usize, parent: Parent) {
        self.parents[idx] = parent;
    }

    pub fn set_height(&mut self, idx: usize, height: f64) {
        self.heights[idx] = height;
    }

    /// Length of the branch above `idx`, if it has a parent.
    pub fn branch_length(&self, idx: usize) -> Option<f64> {
        self.parents[idx]
            .node()
            .map(|parent| self.heights[parent] - self.heights[idx])
    }

    /// Indices of used slots in increasing order.
    pub fn used(&self) -> impl Iterator<Item = usize> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_used())
            .map(|(idx, _)| idx)
    }

    /// First used slot at or after `from`.
    pub fn next_used(&self, from: usize) -> Option<usize> {
        (from..self.capacity()).find(|&idx| self.is_used(idx))
    }

    pub fn num_nodes(&self) -> usize {
        self.parents.iter().filter(|parent| parent.is_used()).count()
    }

    pub fn roots(&self) -> Vec<usize> {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_root())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Returns `count` empty slots, lowest first, growing the store if needed.
    pub fn empty_slots(&mut self, count: usize) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| !parent.is_used())
            .map(|(idx, _)| idx)
            .take(count)
            .collect();
        while slots.len() < count {
            slots.push(self.parents.len());
            self.parents.push(Parent::Empty);
            self.heights.push(0.);
        }
        slots
    }

    /// Renumbers used nodes by increasing height, ties broken by their
    /// previous index, and clears the trailing slots. Returns the map from old
    /// to new indices.
    pub fn sort_by_height(&mut self) -> Vec<Option<usize>> {
        let mut order: Vec<usize> = self.used().collect();
        order.sort_by(|&a, &b| {
            self.heights[a]
                .total_cmp(&self.heights[b])
                .then(a.cmp(&b))
        });

        let mut translation = vec![None; self.capacity()];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            translation[old_idx] = Some(new_idx);
        }

        let mut parents = vec![Parent::Empty; self.capacity()];
        let mut heights = vec![0.; self.capacity()];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            parents[new_idx] = match self.parents[old_idx] {
                Parent::Node(parent) => match translation[parent] {
                    Some(parent) => Parent::Node(parent),
                    None => panic!("Node {old_idx} points to empty slot {parent}"),
                },
                other => other,
            };
            heights[new_idx] = self.heights[old_idx];
        }
        self.parents = parents;
        self.heights = heights;
        translation
    }
}
