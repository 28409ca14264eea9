//! Derived topology annotations.
//!
//! Child and sibling links and the local tree status are functions of the
//! parent links in the `NodeStore`. They are rebuilt from scratch by linear
//! passes; surgery keeps child and sibling links in step only as far as its
//! own operations require.

use super::node::{Parent, TreeStatus};
use super::store::NodeStore;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyCache {
    pub(crate) onechild: Vec<Option<usize>>,
    pub(crate) siblings: Vec<Option<usize>>,
    pub(crate) status: Vec<TreeStatus>,
    pub(crate) local_mrca: usize,
    pub(crate) local_root: usize,
}

impl TopologyCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            onechild: vec![None; capacity],
            siblings: vec![None; capacity],
            status: vec![TreeStatus::Disjoint; capacity],
            local_mrca: 0,
            local_root: 0,
        }
    }

    /// Grow the annotation vectors to match the store.
    pub fn resize(&mut self, capacity: usize) {
        self.onechild.resize(capacity, None);
        self.siblings.resize(capacity, None);
        self.status.resize(capacity, TreeStatus::Disjoint);
    }

    #[inline]
    pub fn child(&self, idx: usize) -> Option<usize> {
        self.onechild[idx]
    }

    #[inline]
    pub fn sibling(&self, idx: usize) -> Option<usize> {
        self.siblings[idx]
    }

    #[inline]
    pub fn status(&self, idx: usize) -> TreeStatus {
        self.status[idx]
    }

    /// Both children of `idx`, the second one absent for unifurcating nodes.
    pub fn children(&self, idx: usize) -> Option<(usize, Option<usize>)> {
        self.onechild[idx].map(|child| (child, self.siblings[child]))
    }

    /// Moves statuses along with a renumbering of the store.
    pub fn translate(&mut self, translation: &[Option<usize>]) {
        let mut status = vec![TreeStatus::Disjoint; self.status.len()];
        for (old_idx, new_idx) in translation.iter().enumerate() {
            if let Some(new_idx) = new_idx {
                status[*new_idx] = self.status[old_idx];
            }
        }
        self.status = status;
    }

    /// Rebuilds child and sibling links from the parent links.
    pub fn populate_siblings(&mut self, store: &NodeStore) {
        self.onechild.iter_mut().for_each(|child| *child = None);
        self.siblings.iter_mut().for_each(|sibling| *sibling = None);

        for child in 0..store.capacity() {
            if let Parent::Node(parent) = store.parent(child) {
                match self.onechild[parent] {
                    None => self.onechild[parent] = Some(child),
                    Some(other) => {
                        self.siblings[other] = Some(child);
                        self.siblings[child] = Some(other);
                    }
                }
            }
        }
    }

    /// Classifies every node relative to the local tree and records the local
    /// MRCA and the local root.
    pub fn populate_local_tree_status(&mut self, store: &NodeStore, samples: usize) {
        self.status
            .iter_mut()
            .for_each(|status| *status = TreeStatus::Disjoint);

        // chain from sample 0 up to its root
        let mut node = Some(0);
        while let Some(idx) = node {
            self.status[idx] = TreeStatus::Local;
            node = store.parent(idx).node();
        }

        let mut mrca = 0;
        for sample in 1..samples {
            let mut idx = sample;
            while self.status[idx] == TreeStatus::Disjoint {
                self.status[idx] = TreeStatus::Local;
                match store.parent(idx).node() {
                    Some(parent) => idx = parent,
                    None => break,
                }
            }
            mrca = mrca.max(idx);
        }
        self.local_mrca = mrca;

        // the MRCA and everything above it are ancestral but off the local tree
        let mut node = Some(mrca);
        while let Some(idx) = node {
            self.status[idx] = TreeStatus::Ancestral;
            self.local_root = idx;
            node = store.parent(idx).node();
        }
    }
}
