//! Pruning of short twigs
//!
//! Recombinations off the local tree leave behind branches that end in a
//! non-sample leaf. They are needed for the exact process but make the forest
//! grow without bound; twigs up to a minimum length can be dropped at little
//! cost in accuracy.
//!

use super::forest::Forest;
use crate::config::Model;

impl Forest {
    /// Removes, below every internal node, the highest non-sample leaf child if
    /// the twig to it is at most `min_terminal_branch_length` long. Returns the
    /// number of removed twigs. Invariants are left stale.
    pub fn prune_tree(&mut self, min_terminal_branch_length: f64) -> usize {
        if min_terminal_branch_length <= 0. {
            return 0;
        }

        let mut pruned = 0;
        for idx in 0..self.store.capacity() {
            if !self.store.is_used(idx) {
                continue;
            }
            let Some(first) = self.topology.child(idx) else {
                continue;
            };
            let second = self.topology.sibling(first);
            // a leaf below a unifurcating inner node cannot be removed
            if second.is_none() && !self.store.is_root(idx) {
                continue;
            }

            let is_twig = |child: &usize| {
                *child >= self.samples && self.topology.child(*child).is_none()
            };
            // the higher leaf has the shorter twig; ties go to the first child
            let twig = match (Some(first).filter(is_twig), second.filter(is_twig)) {
                (Some(a), Some(b)) if self.store.height(b) > self.store.height(a) => b,
                (Some(a), _) => a,
                (None, Some(b)) => b,
                (None, None) => continue,
            };

            let length = self.store.height(idx) - self.store.height(twig);
            if length > min_terminal_branch_length {
                continue;
            }
            log::debug!("Removing twig {twig} of length {length} below node {idx}");
            self.remove(twig);
            pruned += 1;
        }
        pruned
    }

    /// Prunes once every `model.prune_interval` calls, re-deriving the
    /// invariants if anything was removed.
    pub fn prune_sometimes(&mut self, model: &Model) -> usize {
        self.prune_counter += 1;
        if self.prune_counter % model.prune_interval.max(1) != 0 {
            return 0;
        }
        let pruned = self.prune_tree(model.min_terminal_branch_length);
        if pruned > 0 {
            self.reset_invariant();
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::tests::three_leaves;

    /// Three leaves with a twig of length 0.2 left above a cut of sample 2.
    fn with_twig(model: &Model) -> Forest {
        let mut forest = three_leaves(model);
        let (_, root) = forest.cut(2, 1.8);
        // reattach the lower part just below, leaving the leaf as a twig
        forest.store.set_height(root, 1.5);
        forest.splice(root, 3);
        forest.reset_invariant();
        forest
    }

    #[test]
    fn zero_threshold_removes_nothing() {
        let model = Model::new(3);
        let mut forest = with_twig(&model);
        let before = forest.num_nodes();
        assert_eq!(forest.prune_tree(0.), 0);
        assert_eq!(forest.num_nodes(), before);
    }

    #[test]
    fn removes_short_twig() {
        let model = Model::new(3);
        let mut forest = with_twig(&model);
        assert_eq!(forest.num_nodes(), 7);
        assert_eq!(forest.prune_tree(0.1), 0);
        assert_eq!(forest.prune_tree(0.25), 1);
        forest.reset_invariant();
        assert!(forest.check_invariants().is_ok());
        // the old root stays on as a unifurcating root above the new MRCA
        assert_eq!(forest.num_nodes(), 6);
        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.tmrca(), 1.5);
        assert_eq!(forest.height(forest.local_root()), 2.);
    }

    #[test]
    fn prunes_on_interval() {
        let model = Model::truncated(3, 0.25, 2);
        let mut forest = with_twig(&model);
        assert_eq!(forest.prune_sometimes(&model), 0);
        assert_eq!(forest.num_nodes(), 7);
        assert_eq!(forest.prune_sometimes(&model), 1);
        assert_eq!(forest.num_nodes(), 6);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn samples_are_never_pruned() {
        let model = Model::new(3);
        let mut forest = three_leaves(&model);
        assert_eq!(forest.prune_tree(10.), 0);
        assert_eq!(forest.num_nodes(), 5);
    }
}
