//! Coalescent sampler
//!
//! After a recombination, the lineage above the breakpoint has to find its way
//! back into the ancestry of the samples. Two processes run side by side: the
//! recombined lineage (root 1) and the root of the local tree (root 2), each
//! active from its own height on. Walking up through the event intervals, each
//! active root coalesces into any contemporary branch at rate `1 / 2Ne`, and
//! the two roots into each other once both are active.
//!
//! The sampler does not touch the node store. It returns a plan that the
//! engine realizes afterwards, so the event walk can rely on the height order
//! of the store throughout.
//!

use derive_more::{Deref, DerefMut};

use super::events::{Event, EventIterator};
use super::node::{Parent, TreeStatus};
use super::store::NodeStore;
use super::topology::TopologyCache;
use crate::config::Model;
use crate::errors::{GenealogyError, Result};
use crate::random::RandomSource;

/// The lineage that coalesces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveRoot {
    /// Root above the recombination. It only exists once the branch is cut.
    Recombined,
    Node(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoalescenceTarget {
    /// Coalescence into the branch above the node.
    Branch(usize),
    /// Coalescence of the recombined lineage with the given active root.
    Pairwise(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedCoalescence {
    pub root: ActiveRoot,
    pub height: f64,
    pub target: CoalescenceTarget,
}

/// Coalescences in the order they have to be realized.
#[derive(Clone, Debug, Default, PartialEq, Deref, DerefMut)]
pub struct CoalescencePlan(Vec<PlannedCoalescence>);

impl CoalescencePlan {
    /// Height of the last coalescence.
    pub fn final_height(&self) -> Option<f64> {
        self.0.last().map(|coalescence| coalescence.height)
    }
}

/// Moves `height` into the open interval `(low, high)`, where rounding put it
/// on a bound.
pub(super) fn strictly_between(height: f64, low: f64, high: f64) -> f64 {
    height.max(low.next_up()).min(high.next_down())
}

/// Whether the branch above `node` crosses the interval starting at `height`.
fn crosses(store: &NodeStore, node: usize, height: f64) -> bool {
    match store.parent(node) {
        Parent::Node(parent) => store.height(node) <= height && height < store.height(parent),
        _ => false,
    }
}

fn next_event(events: &mut EventIterator) -> Result<Event> {
    events.next_event().ok_or_else(|| {
        GenealogyError::InvariantViolation("ran out of event intervals".to_string())
    })
}

/// Samples the coalescences joining a lineage cut from `branch` at `height`
/// back to the local tree.
///
/// Lineages that root 1 passes through while climbing disjoint branches are
/// marked `Ancestral` in `topology`; the marks are discarded by the next
/// `Forest::reset_invariant`.
pub fn sample_coalescences(
    store: &NodeStore,
    topology: &mut TopologyCache,
    model: &Model,
    branch: usize,
    height: f64,
    rng: &mut dyn RandomSource,
) -> Result<CoalescencePlan> {
    let two_ne = 2. * model.ne();
    let mut plan = CoalescencePlan::default();

    let mut root1 = ActiveRoot::Recombined;
    let mut height1 = height;
    let mut root2 = topology.local_root;
    let mut height2 = store.height(root2);
    let mut current = height1.min(height2);

    let mut events = EventIterator::new(store);
    let mut event = next_event(&mut events)?;

    // under SMC the recombination branch is no coalescence target
    let excluded = model.remove_recombination_branch.then_some(branch);
    let targets = |events: &EventIterator| -> Vec<usize> {
        events
            .contemporaries()
            .iter()
            .map(|contemporary| contemporary.branch)
            .filter(|&target| Some(target) != excluded)
            .collect()
    };

    loop {
        let mut variate = rng.sample_standard_exponential();

        // find the interval in which the next coalescence happens
        let (active1, active2, coalescence_height) = loop {
            if event.end <= current {
                event = next_event(&mut events)?;
                continue;
            }

            let active1 = current >= height1;
            let active2 = current >= height2;
            let mut crossing = events.contemporaries().len();
            if excluded.is_some_and(|branch| crosses(store, branch, event.start)) {
                crossing -= 1;
            }
            let lineages = crossing as f64;
            let rate = if active1 && active2 {
                (2. * lineages + 1.) / two_ne
            } else {
                lineages / two_ne
            };

            let start = current.max(event.start);
            let interval = event.end - start;
            if rate > 0. {
                let wait = variate / rate;
                if wait < interval {
                    let height = strictly_between(start + wait, start, event.end);
                    break (active1, active2, height);
                }
                // memoryless: rescale what is left of the variate
                variate = (wait - interval) * rate;
            } else if interval.is_infinite() {
                return Err(GenealogyError::InvariantViolation(format!(
                    "no lineage to coalesce into above {start}"
                )));
            }
            log::trace!(
                "No coalescence in [{}, {}] with {} contemporaries",
                start,
                event.end,
                crossing
            );

            current = event.end;
            event = next_event(&mut events)?;
        };

        let contemporaries = targets(&events);
        let lineages = contemporaries.len();
        let (root, target) = if active1 && active2 {
            let choice = rng.sample_int(2 * lineages + 1);
            if choice < lineages {
                (root1, CoalescenceTarget::Branch(contemporaries[choice]))
            } else if choice < 2 * lineages {
                (
                    ActiveRoot::Node(root2),
                    CoalescenceTarget::Branch(contemporaries[choice - lineages]),
                )
            } else {
                (root1, CoalescenceTarget::Pairwise(root2))
            }
        } else {
            let choice = rng.sample_int(lineages);
            let root = if active1 { root1 } else { ActiveRoot::Node(root2) };
            (root, CoalescenceTarget::Branch(contemporaries[choice]))
        };

        log::trace!("Coalescence of {root:?} into {target:?} at {coalescence_height}");
        plan.push(PlannedCoalescence {
            root,
            height: coalescence_height,
            target,
        });

        let mut target = match target {
            CoalescenceTarget::Pairwise(_) => break,
            CoalescenceTarget::Branch(target) => target,
        };

        if root == ActiveRoot::Node(root2) {
            // the local tree now extends up to the root above the target
            while let Parent::Node(parent) = store.parent(target) {
                target = parent;
            }
            root2 = target;
            height2 = store.height(target);
        } else {
            while topology.status[target] == TreeStatus::Disjoint && !store.is_root(target) {
                topology.status[target] = TreeStatus::Ancestral;
                if let Parent::Node(parent) = store.parent(target) {
                    target = parent;
                }
            }
            if topology.status[target] != TreeStatus::Disjoint {
                break;
            }
            root1 = ActiveRoot::Node(target);
            height1 = store.height(target);
        }

        if root1 == ActiveRoot::Node(root2) {
            break;
        }
        current = coalescence_height.max(height1.min(height2));
    }

    Ok(plan)
}
