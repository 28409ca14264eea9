//! Forest module
//!
//! The `Forest` owns the node store, the derived topology and the caches that
//! depend on them. It is the ancestral recombination graph at the current
//! genomic position: the local tree of the samples, plus branches that became
//! disjoint from it through recombinations further left.
//!
//! Mutation happens through the surgery primitives and `step`. Both leave the
//! derived state stale; `reset_invariant` brings it back in line and clears the
//! caches, so none of the public queries observes intermediate states.
//!

use std::cell::OnceCell;

use super::emission::EmissionPatterns;
use super::node::{Parent, TreeStatus};
use super::store::NodeStore;
use super::topology::TopologyCache;
use crate::config::{InitialGenealogy, Model};
use crate::errors::{GenealogyError, Result};
use crate::random::RandomSource;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BranchLengths {
    pub(crate) tree: f64,
    pub(crate) forest: f64,
}

#[derive(Clone, Debug)]
pub struct Forest {
    pub(crate) samples: usize,
    pub(crate) ne: f64,
    pub(crate) store: NodeStore,
    pub(crate) topology: TopologyCache,
    pub(crate) lengths: OnceCell<BranchLengths>,
    pub(crate) emissions: OnceCell<EmissionPatterns>,
    pub(crate) prune_counter: usize,
    pub(crate) recombination_branch: Option<usize>,
    pub(crate) recombination_height: Option<f64>,
    pub(crate) coalescence_height: Option<f64>,
}

impl Forest {
    /// Create the initial genealogy of `model`.
    pub fn new(model: &Model, rng: &mut dyn RandomSource) -> Result<Self> {
        model.validate()?;
        let store = match model.initial_genealogy {
            InitialGenealogy::Star => Self::star(model),
            InitialGenealogy::Coalescent => Self::coalescent(model, rng),
        };
        let mut forest = Self::from_store(model, store);
        forest.reset_invariant();
        forest.check_invariants()?;
        log::debug!(
            "Initialized {:?} genealogy of {} samples with tmrca {}",
            model.initial_genealogy,
            model.samples,
            forest.tmrca()
        );
        Ok(forest)
    }

    /// Create a forest from explicit parent links and heights. Slots below
    /// `model.samples` are the sample leaves.
    pub fn from_parents(model: &Model, parents: Vec<Parent>, heights: Vec<f64>) -> Result<Self> {
        model.validate()?;
        Self::validate_parents(model.samples, &parents, &heights)?;
        let mut forest = Self::from_store(model, NodeStore::from_parts(parents, heights));
        forest.reset_invariant();
        forest
            .check_invariants()
            .map_err(|err| GenealogyError::ConfigurationError(err.to_string()))?;
        Ok(forest)
    }

    fn from_store(model: &Model, store: NodeStore) -> Self {
        let topology = TopologyCache::with_capacity(store.capacity());
        Self {
            samples: model.samples,
            ne: model.ne(),
            store,
            topology,
            lengths: OnceCell::new(),
            emissions: OnceCell::new(),
            prune_counter: 0,
            recombination_branch: None,
            recombination_height: None,
            coalescence_height: None,
        }
    }

    /// Caterpillar with all internal nodes at height `2 Ne`.
    fn star(model: &Model) -> NodeStore {
        let samples = model.samples;
        let mut store = NodeStore::with_capacity(model.num_nodes());
        for idx in 0..samples {
            store.set_parent(idx, Parent::Node((idx + samples - 1).max(samples)));
            if idx > 0 {
                store.set_parent(idx + samples - 1, Parent::Node(idx + samples));
                store.set_height(idx + samples - 1, 2. * model.ne());
            }
        }
        store.set_parent(2 * samples - 2, Parent::Root);
        store
    }

    /// Genealogy drawn from the standard coalescent.
    fn coalescent(model: &Model, rng: &mut dyn RandomSource) -> NodeStore {
        let mut store = NodeStore::with_capacity(model.num_nodes());
        let mut lineages: Vec<usize> = (0..model.samples).collect();
        let mut next = model.samples;
        let mut time = 0.;
        while lineages.len() > 1 {
            let k = lineages.len() as f64;
            let rate = k * (k - 1.) / 2. / (2. * model.ne());
            time += rng.sample_expo(rate);
            let (first, second) = rng.sample_two_elements(lineages.len());
            let (first, second) = (lineages[first], lineages[second]);
            store.set_parent(first, Parent::Node(next));
            store.set_parent(second, Parent::Node(next));
            store.set_height(next, time);
            lineages.retain(|&lineage| lineage != first && lineage != second);
            lineages.push(next);
            next += 1;
        }
        store.set_parent(lineages[0], Parent::Root);
        store
    }

    fn validate_parents(samples: usize, parents: &[Parent], heights: &[f64]) -> Result<()> {
        let error = |message: String| Err(GenealogyError::ConfigurationError(message));
        if parents.len() != heights.len() {
            return error(format!(
                "{} parents but {} heights",
                parents.len(),
                heights.len()
            ));
        }
        if parents.len() < samples {
            return error(format!("Fewer slots than the {samples} samples"));
        }
        if let Some(sample) = (0..samples).find(|&idx| !parents[idx].is_used()) {
            return error(format!("Sample {sample} is empty"));
        }
        for (idx, parent) in parents.iter().enumerate() {
            if !parent.is_used() {
                continue;
            }
            if !(heights[idx] >= 0.) {
                return error(format!("Node {idx} has invalid height {}", heights[idx]));
            }
            if let Parent::Node(parent) = parent {
                if *parent >= parents.len() || !parents[*parent].is_used() {
                    return error(format!("Node {idx} points to unused slot {parent}"));
                }
                if heights[*parent] < heights[idx] {
                    return error(format!("Node {idx} is above its parent {parent}"));
                }
            }
            // every chain must end in a root
            let mut steps = 0;
            let mut node = idx;
            while let Parent::Node(parent) = parents[node] {
                node = parent;
                steps += 1;
                if steps > parents.len() {
                    return error(format!("Node {idx} is part of a cycle"));
                }
            }
        }
        Ok(())
    }

    /// Re-derives all annotations from the parent links: renumbers nodes by
    /// height, reclassifies the local tree, rebuilds child and sibling links and
    /// clears the caches.
    pub fn reset_invariant(&mut self) {
        self.reset_invariant_translating(None);
    }

    /// Like `reset_invariant`, returning the new index of `idx`.
    pub fn reset_invariant_translating(&mut self, idx: Option<usize>) -> Option<usize> {
        let translation = self.store.sort_by_height();
        self.topology.resize(self.store.capacity());
        self.topology.translate(&translation);
        self.lengths.take();
        self.emissions.take();
        self.topology
            .populate_local_tree_status(&self.store, self.samples);
        self.topology.populate_siblings(&self.store);
        log::trace!("Reset invariant:\n{}", self.debug_table());
        idx.and_then(|idx| translation.get(idx).copied().flatten())
    }

    /// Verifies height order, sibling pairing, binary fan-out and that no
    /// sample slot is empty.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |message: String| Err(GenealogyError::InvariantViolation(message));

        if let Some(sample) = (0..self.samples).find(|&idx| !self.store.is_used(idx)) {
            return violation(format!("sample {sample} is empty"));
        }

        let mut children = vec![0u8; self.store.capacity()];
        let mut previous: Option<usize> = None;
        for idx in self.store.used() {
            if let Some(previous) = previous {
                if self.store.height(previous) > self.store.height(idx) {
                    return violation(format!(
                        "node {idx} is lower than node {previous} before it"
                    ));
                }
            }
            previous = Some(idx);

            if let Some(sibling) = self.topology.sibling(idx) {
                if self.topology.sibling(sibling) != Some(idx) {
                    return violation(format!("siblings {idx} and {sibling} not paired"));
                }
            }

            match self.store.parent(idx) {
                Parent::Node(parent) => {
                    if !self.store.is_used(parent) {
                        return violation(format!("parent {parent} of node {idx} is empty"));
                    }
                    if self.store.height(parent) < self.store.height(idx) {
                        return violation(format!("node {idx} is above its parent {parent}"));
                    }
                    children[parent] += 1;
                    if children[parent] > 2 {
                        return violation(format!("node {parent} has more than two children"));
                    }
                    let child = self.topology.child(parent);
                    let reachable = child == Some(idx)
                        || child.and_then(|child| self.topology.sibling(child)) == Some(idx);
                    if !reachable {
                        return violation(format!(
                            "node {idx} is not a child of its parent {parent}"
                        ));
                    }
                }
                Parent::Root => {
                    if self.topology.sibling(idx).is_some() {
                        return violation(format!("root {idx} has a sibling"));
                    }
                }
                Parent::Empty => unreachable!(),
            }

        }
        Ok(())
    }

    pub(crate) fn lengths(&self) -> BranchLengths {
        *self.lengths.get_or_init(|| {
            let mut lengths = BranchLengths {
                tree: 0.,
                forest: 0.,
            };
            for idx in self.store.used() {
                if let Some(length) = self.store.branch_length(idx) {
                    if self.topology.status(idx) == TreeStatus::Local {
                        lengths.tree += length;
                    }
                    lengths.forest += length;
                }
            }
            lengths
        })
    }

    /// Total branch length of the local tree.
    pub fn tree_length(&self) -> f64 {
        self.lengths().tree
    }

    /// Total branch length of the forest.
    pub fn forest_length(&self) -> f64 {
        self.lengths().forest
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn ne(&self) -> f64 {
        self.ne
    }

    pub fn num_nodes(&self) -> usize {
        self.store.num_nodes()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn roots(&self) -> Vec<usize> {
        self.store.roots()
    }

    pub fn height(&self, idx: usize) -> f64 {
        self.store.height(idx)
    }

    pub fn parent(&self, idx: usize) -> Parent {
        self.store.parent(idx)
    }

    pub fn child(&self, idx: usize) -> Option<usize> {
        self.topology.child(idx)
    }

    pub fn sibling(&self, idx: usize) -> Option<usize> {
        self.topology.sibling(idx)
    }

    pub fn status(&self, idx: usize) -> TreeStatus {
        self.topology.status(idx)
    }

    pub fn local_mrca(&self) -> usize {
        self.topology.local_mrca
    }

    pub fn local_root(&self) -> usize {
        self.topology.local_root
    }

    /// Height of the MRCA of all samples.
    pub fn tmrca(&self) -> f64 {
        self.store.height(self.topology.local_mrca)
    }

    /// Most recent common ancestor of `nodes`, or `None` if they do not share a
    /// tree.
    pub fn mrca_of(&self, nodes: &[usize]) -> Option<usize> {
        let mut visited: Vec<usize> = nodes.to_vec();
        visited.sort_unstable();
        visited.dedup();
        // nodes are ordered by height, so the lowest index is the lowest node
        let mut pending = std::collections::BinaryHeap::new();
        for &node in &visited {
            pending.push(std::cmp::Reverse(node));
        }
        while pending.len() > 1 {
            let std::cmp::Reverse(node) = pending.pop()?;
            let parent = self.store.parent(node).node()?;
            if !visited.contains(&parent) {
                visited.push(parent);
                pending.push(std::cmp::Reverse(parent));
            }
        }
        pending.pop().map(|std::cmp::Reverse(node)| node)
    }

    /// Height of the MRCA of `nodes`.
    pub fn tmrca_of(&self, nodes: &[usize]) -> Option<f64> {
        self.mrca_of(nodes).map(|mrca| self.store.height(mrca))
    }

    /// Branch in which the last recombination happened, as indexed before the
    /// surgery that followed it.
    pub fn recombination_branch(&self) -> Option<usize> {
        self.recombination_branch
    }

    pub fn recombination_height(&self) -> Option<f64> {
        self.recombination_height
    }

    /// Height of the last coalescence, `None` if the last recombination was
    /// deferred.
    pub fn coalescence_height(&self) -> Option<f64> {
        self.coalescence_height
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::random::{ReplayRandom, SeededRandom};

    /// ((0:1,1:1)3:1,2:2)4 with mutation rate 0.01.
    pub(crate) fn three_leaves(model: &Model) -> Forest {
        Forest::from_parents(
            model,
            vec![
                Parent::Node(3),
                Parent::Node(3),
                Parent::Node(4),
                Parent::Node(4),
                Parent::Root,
            ],
            vec![0., 0., 0., 1., 2.],
        )
        .unwrap()
    }

    #[test]
    fn star_genealogy() {
        let model = Model::new(4);
        let forest = Forest::new(&model, &mut ReplayRandom::from_draws(vec![])).unwrap();
        assert_eq!(forest.num_nodes(), 7);
        assert_eq!(forest.capacity(), 8);
        assert_eq!(forest.parent(0), Parent::Node(4));
        assert_eq!(forest.parent(1), Parent::Node(4));
        assert_eq!(forest.parent(2), Parent::Node(5));
        assert_eq!(forest.parent(3), Parent::Node(6));
        assert_eq!(forest.parent(4), Parent::Node(5));
        assert_eq!(forest.parent(5), Parent::Node(6));
        assert_eq!(forest.parent(6), Parent::Root);
        assert_eq!(forest.roots(), vec![6]);
        assert_eq!(forest.local_mrca(), 6);
        assert_eq!(forest.local_root(), 6);
        assert_eq!(forest.tmrca(), 20000.);
        assert_eq!(forest.tree_length(), 4. * 20000.);
        assert_eq!(forest.forest_length(), forest.tree_length());
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn coalescent_genealogy() {
        let mut model = Model::new(6);
        model.initial_genealogy = InitialGenealogy::Coalescent;
        let forest = Forest::new(&model, &mut SeededRandom::new(3)).unwrap();
        assert_eq!(forest.num_nodes(), 11);
        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.local_mrca(), forest.local_root());
        assert!(forest.tmrca() > 0.);
        assert!(forest.check_invariants().is_ok());
        for sample in 0..6 {
            assert_eq!(forest.height(sample), 0.);
            assert_eq!(forest.status(sample), TreeStatus::Local);
        }
    }

    #[test]
    fn three_leaf_queries() {
        let forest = three_leaves(&Model::new(3));
        assert_eq!(forest.tree_length(), 5.);
        assert_eq!(forest.tmrca(), 2.);
        assert_eq!(forest.mrca_of(&[0, 1]), Some(3));
        assert_eq!(forest.tmrca_of(&[0, 1]), Some(1.));
        assert_eq!(forest.mrca_of(&[1, 2]), Some(4));
        assert_eq!(forest.mrca_of(&[2]), Some(2));
        assert_eq!(forest.status(3), TreeStatus::Local);
        assert_eq!(forest.status(4), TreeStatus::Ancestral);
    }

    #[test]
    fn mrca_of_disjoint_trees() {
        let model = Model::new(2);
        let forest = Forest::from_parents(
            &model,
            vec![
                Parent::Node(2),
                Parent::Node(2),
                Parent::Root,
                Parent::Node(4),
                Parent::Root,
            ],
            vec![0., 0., 1., 0.5, 2.],
        )
        .unwrap();
        assert_eq!(forest.mrca_of(&[0, 1]), Some(2));
        assert_eq!(forest.mrca_of(&[0, 3]), None);
        assert_eq!(forest.tree_length(), 2.);
        assert_eq!(forest.forest_length(), 3.5);
        assert_eq!(forest.status(3), TreeStatus::Disjoint);
    }

    #[test]
    fn reset_translates_indices() {
        let model = Model::new(2);
        let mut forest = Forest::from_parents(
            &model,
            vec![Parent::Node(2), Parent::Node(2), Parent::Root],
            vec![0., 0., 1.],
        )
        .unwrap();
        // new root above 2, stored before a lower node
        forest.store.set_parent(2, Parent::Node(3));
        let slots = forest.store.empty_slots(2);
        assert_eq!(slots, vec![3, 4]);
        forest.store.set_parent(3, Parent::Root);
        forest.store.set_height(3, 5.);
        forest.store.set_parent(4, Parent::Root);
        forest.store.set_height(4, 0.5);
        assert_eq!(forest.reset_invariant_translating(Some(3)), Some(4));
        // the floating root at 0.5 moves to 2, pushing the old root up to 3
        assert_eq!(forest.parent(3), Parent::Node(4));
        assert_eq!(forest.roots(), vec![2, 4]);
        assert_eq!(forest.local_mrca(), 3);
        assert_eq!(forest.local_root(), 4);
        assert_eq!(forest.status(2), TreeStatus::Disjoint);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn from_parents_rejects_bad_input() {
        let model = Model::new(2);
        let unused = Forest::from_parents(
            &model,
            vec![Parent::Node(2), Parent::Node(3), Parent::Root, Parent::Empty],
            vec![0., 0., 1., 0.],
        );
        assert!(matches!(unused, Err(GenealogyError::ConfigurationError(_))));
        let inverted = Forest::from_parents(
            &model,
            vec![Parent::Node(2), Parent::Node(2), Parent::Root],
            vec![0., 2., 1.],
        );
        assert!(inverted.is_err());
        let trifurcation = Forest::from_parents(
            &Model::new(3),
            vec![Parent::Node(3), Parent::Node(3), Parent::Node(3), Parent::Root],
            vec![0., 0., 0., 1.],
        );
        assert!(trifurcation.is_err());
    }

    #[test]
    fn third_child_is_reported() {
        let mut forest = three_leaves(&Model::new(3));
        forest.store.set_parent(2, Parent::Node(3));
        match forest.check_invariants() {
            Err(GenealogyError::InvariantViolation(message)) => {
                assert_eq!(message, "node 3 has more than two children")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invariants_of_large_forest() {
        let mut model = Model::new(1000);
        model.initial_genealogy = InitialGenealogy::Coalescent;
        let mut rng = SeededRandom::new(11);
        let mut forest = Forest::new(&model, &mut rng).unwrap();
        for _ in 0..200 {
            forest.step(&model, &mut rng).unwrap();
        }
        assert!(forest.num_nodes() >= 1999);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn corrupted_siblings_are_reported() {
        let mut forest = three_leaves(&Model::new(3));
        forest.topology.siblings[2] = Some(1);
        assert!(matches!(
            forest.check_invariants(),
            Err(GenealogyError::InvariantViolation(_))
        ));
    }
}
