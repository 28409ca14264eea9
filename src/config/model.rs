use serde::{Deserialize, Serialize};

use crate::errors::{GenealogyError, Result};

/// Model parameters of the genealogy process and its emissions.
///
/// The model is read-only once a `Forest` has been created from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Model {
    /// Number of sampled haploid genomes.
    pub samples: usize,

    /// Effective population size; `2 * effective_population_size` is the number of haploid
    /// chromosomes and sets the time scale of coalescence.
    #[serde(default = "default_effective_population_size")]
    pub effective_population_size: f64,

    /// Mutation rate per nucleotide per generation.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Recombination rate per nucleotide per generation.
    #[serde(default = "default_recombination_rate")]
    pub recombination_rate: f64,

    /// Maximum number of migrations. Placeholder, only reserves node capacity.
    #[serde(default)]
    pub max_migrations: usize,

    /// Whether emissions are phased (0/1 per sample) or unphased (0/1/2 per sample pair).
    #[serde(default)]
    pub phased: bool,

    /// Whether emission code 0 always denotes the ancestral state.
    #[serde(default)]
    pub rooted: bool,

    /// SMC: forbid coalescence back into the branch carrying the recombination.
    #[serde(default)]
    pub remove_recombination_branch: bool,

    /// SMC': remove the non-ancestral twig left behind by a recombination.
    #[serde(default)]
    pub remove_nonancestral_twig: bool,

    /// Wiuf and Hein: resolve every recombination straight away, also off the local tree.
    #[serde(default)]
    pub wiuf_hein: bool,

    /// Non-sample terminal branches up to this length are pruned.
    #[serde(default)]
    pub min_terminal_branch_length: f64,

    /// Number of steps between pruning passes.
    #[serde(default = "default_prune_interval")]
    pub prune_interval: usize,

    /// Branches eligible to carry a recombination breakpoint.
    #[serde(default)]
    pub breakpoint_scope: BreakpointScope,

    /// Genealogy the forest starts from.
    #[serde(default)]
    pub initial_genealogy: InitialGenealogy,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointScope {
    #[default]
    Forest,
    LocalTree,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialGenealogy {
    #[default]
    Star,
    Coalescent,
}

fn default_effective_population_size() -> f64 {
    10000.
}

fn default_mutation_rate() -> f64 {
    2.5e-8
}

fn default_recombination_rate() -> f64 {
    1e-8
}

fn default_prune_interval() -> usize {
    1
}

impl Model {
    /// Model with default parameters for `samples` genomes.
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            effective_population_size: default_effective_population_size(),
            mutation_rate: default_mutation_rate(),
            recombination_rate: default_recombination_rate(),
            max_migrations: 0,
            phased: false,
            rooted: false,
            remove_recombination_branch: false,
            remove_nonancestral_twig: false,
            wiuf_hein: false,
            min_terminal_branch_length: 0.,
            prune_interval: default_prune_interval(),
            breakpoint_scope: BreakpointScope::default(),
            initial_genealogy: InitialGenealogy::default(),
        }
    }

    /// SMC model.
    pub fn smc(samples: usize) -> Self {
        Self {
            remove_recombination_branch: true,
            ..Self::new(samples)
        }
    }

    /// SMC' model.
    pub fn smc_prime(samples: usize) -> Self {
        Self {
            remove_nonancestral_twig: true,
            ..Self::new(samples)
        }
    }

    /// Full model with pruning of short non-sample twigs every `interval` steps.
    pub fn truncated(samples: usize, min_terminal_branch_length: f64, interval: usize) -> Self {
        Self {
            min_terminal_branch_length,
            prune_interval: interval,
            ..Self::new(samples)
        }
    }

    /// Effective population size. Constant in time.
    pub fn ne(&self) -> f64 {
        self.effective_population_size
    }

    /// Initial node capacity of a forest.
    pub fn num_nodes(&self) -> usize {
        2 * self.samples + self.max_migrations
    }

    /// Whether the twig above a recombination is deleted after every step.
    pub fn is_sequentially_markov(&self) -> bool {
        self.remove_recombination_branch || self.remove_nonancestral_twig
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples < 2 {
            return Err(GenealogyError::ConfigurationError(format!(
                "At least two samples are required, got {}",
                self.samples
            )));
        }
        if !(self.effective_population_size > 0.) {
            return Err(GenealogyError::ConfigurationError(format!(
                "Effective population size must be positive, got {}",
                self.effective_population_size
            )));
        }
        if self.mutation_rate < 0. || self.recombination_rate < 0. {
            return Err(GenealogyError::ConfigurationError(
                "Mutation and recombination rates must not be negative".to_string(),
            ));
        }
        if self.min_terminal_branch_length < 0. {
            return Err(GenealogyError::ConfigurationError(format!(
                "Minimum terminal branch length must not be negative, got {}",
                self.min_terminal_branch_length
            )));
        }
        if self.prune_interval == 0 {
            return Err(GenealogyError::ConfigurationError(
                "Prune interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_sparse_yaml() {
        let model: Model = serde_yaml::from_str("samples: 4\nphased: true\n").unwrap();
        assert_eq!(model.samples, 4);
        assert!(model.phased);
        assert_eq!(model.ne(), 10000.);
        assert_eq!(model.mutation_rate, 2.5e-8);
        assert_eq!(model.recombination_rate, 1e-8);
        assert_eq!(model.prune_interval, 1);
        assert_eq!(model.breakpoint_scope, BreakpointScope::Forest);
        assert_eq!(model.initial_genealogy, InitialGenealogy::Star);
        assert_eq!(model.num_nodes(), 8);
    }

    #[test]
    fn presets() {
        assert!(Model::smc(4).is_sequentially_markov());
        assert!(Model::smc_prime(4).is_sequentially_markov());
        assert!(!Model::new(4).is_sequentially_markov());
        let truncated = Model::truncated(4, 2000., 10);
        assert_eq!(truncated.min_terminal_branch_length, 2000.);
        assert_eq!(truncated.prune_interval, 10);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(Model::new(4).validate().is_ok());
        assert!(Model::new(1).validate().is_err());
        let mut model = Model::new(4);
        model.effective_population_size = 0.;
        assert!(model.validate().is_err());
        let mut model = Model::new(4);
        model.prune_interval = 0;
        assert!(model.validate().is_err());
        let mut model = Model::new(4);
        model.min_terminal_branch_length = -1.;
        assert!(model.validate().is_err());
    }
}
