//! Simulation step
//!
//! Moving along the genome, every recombination changes the genealogy. A step
//! samples the breakpoint, lets the recombined lineage coalesce back into the
//! ancestry of the samples and realizes the result by surgery on the forest.
//!

use super::forest::Forest;
use super::node::{Parent, TreeStatus};
use super::sampler::{self, ActiveRoot, CoalescencePlan, CoalescenceTarget};
use crate::config::{BreakpointScope, Model};
use crate::errors::{GenealogyError, Result};
use crate::random::RandomSource;

/// Summary of one step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    /// Branch carrying the recombination, indexed as before the step.
    pub recombination_branch: usize,
    pub recombination_height: f64,
    /// Whether the branch was part of the local tree.
    pub on_local_tree: bool,
    /// Whether the coalescence was postponed, leaving a disjoint branch.
    pub deferred: bool,
    pub coalescences: CoalescencePlan,
    /// Number of twigs pruned after the step.
    pub pruned: usize,
}

impl Forest {
    /// Samples a point uniformly by branch length, over the whole forest or
    /// the local tree only. Returns the branch and the height of the point.
    pub fn sample_branch_point(
        &self,
        scope: BreakpointScope,
        rng: &mut dyn RandomSource,
    ) -> Result<(usize, f64)> {
        let mut branches = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.;
        for idx in self.store.used() {
            let Some(length) = self.store.branch_length(idx) else {
                continue;
            };
            if scope == BreakpointScope::LocalTree && self.topology.status(idx) != TreeStatus::Local
            {
                continue;
            }
            total += length;
            branches.push(idx);
            cumulative.push(total);
        }
        if branches.is_empty() {
            return Err(GenealogyError::InvariantViolation(
                "no branch to place a point on".to_string(),
            ));
        }

        let point = rng.sample() * total;
        let position = cumulative
            .partition_point(|&length| length <= point)
            .min(branches.len() - 1);
        let offset = match position {
            0 => point,
            _ => point - cumulative[position - 1],
        };
        let branch = branches[position];
        let Parent::Node(parent) = self.store.parent(branch) else {
            return Err(GenealogyError::InvariantViolation(format!(
                "branch {branch} has no parent"
            )));
        };
        let low = self.store.height(branch);
        Ok((
            branch,
            sampler::strictly_between(low + offset, low, self.store.height(parent)),
        ))
    }

    /// Advances the genealogy across one recombination.
    pub fn step(&mut self, model: &Model, rng: &mut dyn RandomSource) -> Result<StepRecord> {
        let (branch, height) = self.sample_branch_point(model.breakpoint_scope, rng)?;
        let on_local_tree = self.topology.status(branch) == TreeStatus::Local;
        self.recombination_branch = Some(branch);
        self.recombination_height = Some(height);
        log::debug!("Recombination in branch {branch} at {height}");

        if !on_local_tree && !model.wiuf_hein {
            // the lineage stays disjoint until a recombination reaches it
            self.cut(branch, height);
            self.reset_invariant();
            self.coalescence_height = None;
            let pruned = self.prune_sometimes(model);
            log::debug!("Deferred coalescence of branch {branch}");
            return Ok(StepRecord {
                recombination_branch: branch,
                recombination_height: height,
                on_local_tree,
                deferred: true,
                coalescences: CoalescencePlan::default(),
                pruned,
            });
        }

        let plan = sampler::sample_coalescences(
            &self.store,
            &mut self.topology,
            model,
            branch,
            height,
            rng,
        )?;
        self.realize(model, branch, height, &plan);
        self.coalescence_height = plan.final_height();

        self.check_invariants()?;
        let pruned = self.prune_sometimes(model);
        log::debug!(
            "Step done with {} coalescences, tmrca {}, {} nodes",
            plan.len(),
            self.tmrca(),
            self.num_nodes()
        );
        Ok(StepRecord {
            recombination_branch: branch,
            recombination_height: height,
            on_local_tree,
            deferred: false,
            coalescences: plan,
            pruned,
        })
    }

    /// Cuts `branch` at `height` and applies the planned coalescences.
    fn realize(&mut self, model: &Model, branch: usize, height: f64, plan: &CoalescencePlan) {
        let (leaf, cut_root) = self.cut(branch, height);
        log::trace!("Cut {branch} at {height}: leaf {leaf}, root {cut_root}");

        // the part of the recombination branch above the cut is now the leaf
        let mut targets: Vec<CoalescenceTarget> = plan
            .iter()
            .map(|coalescence| match coalescence.target {
                CoalescenceTarget::Branch(target) if target == branch => {
                    CoalescenceTarget::Branch(leaf)
                }
                target => target,
            })
            .collect();
        for (number, coalescence) in plan.iter().enumerate() {
            let top = match coalescence.root {
                ActiveRoot::Recombined => cut_root,
                ActiveRoot::Node(node) => node,
            };
            let target = targets[number];

            let top = self.make_unifurcating(top);
            self.store.set_height(top, coalescence.height);

            // later coalescences into the same branch now end above top
            if let CoalescenceTarget::Branch(target) = target {
                for later in targets.iter_mut().skip(number + 1) {
                    if *later == CoalescenceTarget::Branch(target) {
                        *later = CoalescenceTarget::Branch(top);
                    }
                }
            }

            match target {
                CoalescenceTarget::Pairwise(other) => {
                    log::trace!("Pairwise coalescence of {top} and {other}");
                    let other = self.make_unifurcating(other);
                    let Some(child) = self.topology.child(other) else {
                        panic!("Active root {other} without child");
                    };
                    self.remove(other);
                    self.graft_root(child, top);
                }
                CoalescenceTarget::Branch(target) => {
                    log::trace!("Splicing {top} into {target} at {}", coalescence.height);
                    self.splice(top, target);
                }
            }
        }

        if model.is_sequentially_markov() {
            self.remove(leaf);
            self.reset_invariant();
            if self.topology.local_mrca != self.topology.local_root {
                log::trace!("Removing local root {}", self.topology.local_root);
                self.remove(self.topology.local_root);
                self.reset_invariant();
            }
        } else {
            self.reset_invariant();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::tests::three_leaves;
    use crate::random::{ReplayRandom, SeededRandom};

    fn unit_model(samples: usize) -> Model {
        let mut model = Model::new(samples);
        model.effective_population_size = 0.5;
        model
    }

    #[test]
    fn branch_point_by_length() {
        let model = unit_model(3);
        let forest = three_leaves(&model);
        // branches 0, 1, 2, 3 with cumulative lengths 1, 2, 4, 5
        let mut rng = ReplayRandom::from_draws(vec![0.5, 0.3, 0.99]);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::Forest, &mut rng)
            .unwrap();
        assert_eq!(branch, 2);
        assert!((height - 0.5).abs() < 1e-12);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::Forest, &mut rng)
            .unwrap();
        assert_eq!(branch, 1);
        assert!((height - 0.5).abs() < 1e-12);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::LocalTree, &mut rng)
            .unwrap();
        assert_eq!(branch, 3);
        assert!((height - 1.95).abs() < 1e-12);
    }

    #[test]
    fn branch_point_stays_inside_branch() {
        let model = unit_model(3);
        let forest = three_leaves(&model);
        // 0 and the boundary between branches 0 and 1 both land on a node
        let mut rng = ReplayRandom::from_draws(vec![0.0, 0.2, 0.8]);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::Forest, &mut rng)
            .unwrap();
        assert_eq!(branch, 0);
        assert!(height > 0. && height < 1e-12);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::Forest, &mut rng)
            .unwrap();
        assert_eq!(branch, 1);
        assert!(height > 0. && height < 1e-12);
        let (branch, height) = forest
            .sample_branch_point(BreakpointScope::Forest, &mut rng)
            .unwrap();
        assert_eq!(branch, 3);
        assert!(height > 1. && height < 1. + 1e-12);
    }

    #[test]
    fn zero_draw_step() {
        let model = Model::new(3);
        let mut forest = Forest::new(&model, &mut ReplayRandom::from_draws(vec![])).unwrap();
        let mut rng = ReplayRandom::from_draws(vec![0.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
        let record = forest.step(&model, &mut rng).unwrap();
        assert!(!rng.exhausted());
        assert_eq!(record.recombination_branch, 0);
        assert!(record.recombination_height > 0.);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn local_recombination_is_resolved() {
        let model = unit_model(3);
        let mut forest = three_leaves(&model);
        // sample 2 at 0.5, then into branch 1 at 0.5 + ln(2) / 3
        let mut rng = ReplayRandom::from_draws(vec![0.5, 0.5, 0.5]);
        let record = forest.step(&model, &mut rng).unwrap();
        assert!(record.on_local_tree);
        assert!(!record.deferred);
        assert_eq!(record.recombination_branch, 2);
        assert_eq!(record.coalescences.len(), 1);
        assert_eq!(forest.recombination_height(), Some(0.5));
        let height = 0.5 + 2f64.ln() / 3.;
        assert!((forest.coalescence_height().unwrap() - height).abs() < 1e-12);

        // 2 joined 1; the leaf left on the old branch stays as a twig
        assert!(forest.check_invariants().is_ok());
        assert_eq!(forest.num_nodes(), 7);
        assert!((forest.tmrca_of(&[1, 2]).unwrap() - height).abs() < 1e-12);
        assert_eq!(forest.tmrca(), 1.);
    }

    #[test]
    fn smc_prime_removes_twig() {
        let mut model = unit_model(3);
        model.remove_nonancestral_twig = true;
        let mut forest = three_leaves(&model);
        let mut rng = ReplayRandom::from_draws(vec![0.5, 0.5, 0.5]);
        forest.step(&model, &mut rng).unwrap();
        assert!(forest.check_invariants().is_ok());
        assert_eq!(forest.num_nodes(), 5);
        assert_eq!(forest.local_mrca(), forest.local_root());
        assert_eq!(forest.tmrca(), 1.);
        assert_eq!(forest.forest_length(), forest.tree_length());
    }

    #[test]
    fn pairwise_merge_above_root() {
        let mut model = unit_model(3);
        model.remove_nonancestral_twig = true;
        let mut forest = three_leaves(&model);
        // branch 3 at 1.5, no coalescence below 2, then the two roots merge
        let mut rng = ReplayRandom::from_draws(vec![0.9, 0.01, 0.0]);
        let record = forest.step(&model, &mut rng).unwrap();
        assert_eq!(record.recombination_branch, 3);
        assert!((record.recombination_height - 1.5).abs() < 1e-12);
        assert_eq!(record.coalescences.len(), 1);
        assert_eq!(
            record.coalescences[0].target,
            CoalescenceTarget::Pairwise(4)
        );
        assert!(forest.check_invariants().is_ok());
        assert_eq!(forest.num_nodes(), 5);
        assert_eq!(forest.roots().len(), 1);
        let height = 2. + (-(0.01f64).ln() - 1.);
        assert!((forest.tmrca() - height).abs() < 1e-9);
        assert!((forest.tmrca_of(&[0, 1]).unwrap() - 1.).abs() < 1e-12);
    }

    #[test]
    fn off_local_recombination_is_deferred() {
        let model = unit_model(2);
        // local tree (0,1) at 1.5 and a floating branch 2 (0.2) below root 3 (1)
        let mut forest = Forest::from_parents(
            &model,
            vec![
                Parent::Node(4),
                Parent::Node(4),
                Parent::Node(3),
                Parent::Root,
                Parent::Root,
            ],
            vec![0., 0., 0.2, 1., 1.5],
        )
        .unwrap();
        let tmrca = forest.tmrca();
        // cumulative lengths 1.5, 3, 3.8: the point lands on the floating branch
        let mut rng = ReplayRandom::from_draws(vec![0.9]);
        let record = forest.step(&model, &mut rng).unwrap();
        assert!(record.deferred);
        assert!(!record.on_local_tree);
        assert!(record.coalescences.is_empty());
        assert_eq!(forest.coalescence_height(), None);
        assert_eq!(forest.tmrca(), tmrca);
        assert_eq!(forest.roots().len(), 3);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn wiuf_hein_resolves_off_local_recombination() {
        let mut model = unit_model(2);
        model.wiuf_hein = true;
        let mut forest = Forest::from_parents(
            &model,
            vec![
                Parent::Node(4),
                Parent::Node(4),
                Parent::Node(3),
                Parent::Root,
                Parent::Root,
            ],
            vec![0., 0., 0.2, 1., 1.5],
        )
        .unwrap();
        let mut rng = SeededRandom::new(11);
        // draw until the breakpoint falls on the floating branch
        let mut draws = vec![0.9];
        for _ in 0..64 {
            draws.push(rng.sample());
        }
        let mut rng = ReplayRandom::from_draws(draws);
        let record = forest.step(&model, &mut rng).unwrap();
        assert!(!record.deferred);
        assert!(!record.on_local_tree);
        assert!(!record.coalescences.is_empty());
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn many_steps_keep_invariants() {
        let model = Model::new(4);
        let mut rng = SeededRandom::new(42);
        let mut forest = Forest::new(&model, &mut rng).unwrap();
        for _ in 0..200 {
            let record = forest.step(&model, &mut rng).unwrap();
            assert!(forest.check_invariants().is_ok());
            assert!(forest.forest_length() >= forest.tree_length());
            assert!(forest.num_nodes() >= 2 * model.samples - 1);
            if let Some(last) = record.coalescences.last() {
                assert!(last.height >= record.recombination_height);
            }
        }
    }
}
