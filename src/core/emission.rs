//! Emissions
//!
//! A mutation on the branch above a node is carried by exactly the samples
//! below it. Each node therefore has an emission pattern: the bitmask of its
//! descendant samples, with bit `i` standing for sample `i`. Unphased data
//! treats samples `2k` and `2k + 1` as the two genomes of individual `k`, and
//! folds each pair of bits into a genotype code: `0` homozygous ancestral,
//! `1` heterozygous, `3` homozygous derived.
//!

use std::borrow::Cow;

use super::forest::Forest;
use super::node::Parent;
use crate::config::{BreakpointScope, Model};
use crate::errors::{GenealogyError, Result};
use crate::random::RandomSource;

/// Largest number of samples an emission pattern can hold.
pub const MAX_EMISSION_SAMPLES: usize = u128::BITS as usize;

#[derive(Clone, Debug, PartialEq)]
pub struct EmissionPatterns {
    phased: bool,
    patterns: Vec<u128>,
}

fn check_model(model: &Model) -> Result<()> {
    if model.samples > MAX_EMISSION_SAMPLES {
        return Err(GenealogyError::ConfigurationError(format!(
            "Emissions support at most {MAX_EMISSION_SAMPLES} samples, got {}",
            model.samples
        )));
    }
    if !model.phased && model.samples % 2 != 0 {
        return Err(GenealogyError::ConfigurationError(format!(
            "Unphased emissions need an even number of samples, got {}",
            model.samples
        )));
    }
    Ok(())
}

/// Mask with the lower bit of every sample pair set.
fn left_phase(samples: usize) -> u128 {
    (0..samples / 2).fold(0, |mask, pair| mask | 1 << (2 * pair))
}

impl Forest {
    fn build_emission_patterns(&self, phased: bool) -> Vec<u128> {
        let mut patterns = vec![0u128; self.store.capacity()];
        for idx in 0..self.store.capacity() {
            if idx < self.samples {
                patterns[idx] = 1 << idx;
            }
            if let Parent::Node(parent) = self.store.parent(idx) {
                patterns[parent] |= patterns[idx];
            }
        }

        if !phased {
            let left = left_phase(self.samples);
            let right = left << 1;
            for pattern in patterns.iter_mut() {
                let het = (*pattern & left) | ((*pattern & right) >> 1);
                let hom = ((*pattern & left) << 1) & (*pattern & right);
                *pattern = het | hom;
            }
        }
        patterns
    }

    /// Emission pattern of every node slot, empty slots included.
    pub fn emission_patterns(&self, model: &Model) -> Result<Cow<'_, [u128]>> {
        check_model(model)?;
        let cache = self.emissions.get_or_init(|| EmissionPatterns {
            phased: model.phased,
            patterns: self.build_emission_patterns(model.phased),
        });
        if cache.phased == model.phased {
            Ok(Cow::Borrowed(&cache.patterns))
        } else {
            Ok(Cow::Owned(self.build_emission_patterns(model.phased)))
        }
    }

    /// Likelihood of an emission: `mu` times the length of the branches whose
    /// mutation produces it.
    ///
    /// Phased emissions hold `0` or `1` per sample, unphased ones `0`, `1` or
    /// `2` per individual. Unless the model is rooted, an emission also matches
    /// with ancestral and derived states swapped.
    pub fn emission_probability(&self, mu: f64, emission: &[u8], model: &Model) -> Result<f64> {
        let patterns = self.emission_patterns(model)?;

        let mut ancestral_code: u128 = 0;
        let mut derived_code: u128 = 0;
        if model.phased {
            if emission.len() != model.samples {
                return Err(GenealogyError::ConfigurationError(format!(
                    "Phased emission of length {} for {} samples",
                    emission.len(),
                    model.samples
                )));
            }
            for (idx, &code) in emission.iter().enumerate() {
                match code {
                    0 => derived_code |= 1 << idx,
                    1 => ancestral_code |= 1 << idx,
                    _ => {
                        return Err(GenealogyError::ConfigurationError(format!(
                            "Invalid phased emission code {code}"
                        )));
                    }
                }
            }
        } else {
            if emission.len() != model.samples / 2 {
                return Err(GenealogyError::ConfigurationError(format!(
                    "Unphased emission of length {} for {} samples",
                    emission.len(),
                    model.samples
                )));
            }
            for (idx, &code) in emission.iter().enumerate() {
                let (ancestral, derived): (u128, u128) = match code {
                    0 => (0, 3),
                    1 => (1, 1),
                    2 => (3, 0),
                    _ => {
                        return Err(GenealogyError::ConfigurationError(format!(
                            "Invalid unphased emission code {code}"
                        )));
                    }
                };
                ancestral_code |= ancestral << (2 * idx);
                derived_code |= derived << (2 * idx);
            }
        }
        if model.rooted {
            derived_code = ancestral_code;
        }

        let likelihood = self
            .store
            .used()
            .filter(|&idx| {
                patterns[idx] == ancestral_code || patterns[idx] == derived_code
            })
            .filter_map(|idx| self.store.branch_length(idx))
            .sum::<f64>();
        Ok(likelihood * mu)
    }

    /// Emission of a mutation at a point drawn uniformly on the local tree.
    pub fn sample_emission(&self, model: &Model, rng: &mut dyn RandomSource) -> Result<Vec<u8>> {
        let patterns = self.emission_patterns(model)?;
        let (branch, _) = self.sample_branch_point(BreakpointScope::LocalTree, rng)?;
        let mut pattern = patterns[branch];

        let emission = if model.phased {
            (0..model.samples)
                .map(|_| {
                    let code = (pattern & 1) as u8;
                    pattern >>= 1;
                    code
                })
                .collect()
        } else {
            (0..model.samples / 2)
                .map(|_| {
                    let code = (pattern & 3) as u8;
                    pattern >>= 2;
                    code.min(2)
                })
                .collect()
        };
        Ok(emission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forest::tests::three_leaves;
    use crate::random::ReplayRandom;

    fn phased_model(samples: usize) -> Model {
        let mut model = Model::new(samples);
        model.phased = true;
        model
    }

    #[test]
    fn phased_patterns() {
        let model = phased_model(3);
        let forest = three_leaves(&model);
        let patterns = forest.emission_patterns(&model).unwrap();
        assert_eq!(&patterns[..5], &[0b001, 0b010, 0b100, 0b011, 0b111]);
    }

    #[test]
    fn unphased_patterns() {
        let model = Model::new(4);
        // ((0,1)4, (2,3)5)6
        let forest = Forest::from_parents(
            &model,
            vec![
                Parent::Node(4),
                Parent::Node(5),
                Parent::Node(4),
                Parent::Node(5),
                Parent::Node(6),
                Parent::Node(6),
                Parent::Root,
            ],
            vec![0., 0., 0., 0., 1., 1.5, 2.],
        )
        .unwrap();
        let patterns = forest.emission_patterns(&model).unwrap();
        // sample 0: het in individual 0; node 4 holds samples 0 and 2
        assert_eq!(patterns[0], 0b0001);
        assert_eq!(patterns[1], 0b0001);
        assert_eq!(patterns[4], 0b0101);
        assert_eq!(patterns[6], 0b1111);
    }

    #[test]
    fn rooted_singleton_likelihood() {
        let mut model = phased_model(3);
        model.rooted = true;
        let forest = three_leaves(&model);
        let likelihood = forest.emission_probability(0.01, &[0, 0, 1], &model).unwrap();
        assert!((likelihood - 0.02).abs() < 1e-12);
    }

    #[test]
    fn unrooted_likelihood_counts_both_states() {
        let model = phased_model(3);
        let forest = three_leaves(&model);
        // 0, 0, 1 or 1, 1, 0: branches above 2 and 3
        let likelihood = forest.emission_probability(0.01, &[0, 0, 1], &model).unwrap();
        assert!((likelihood - 0.03).abs() < 1e-12);
    }

    #[test]
    fn configuration_errors() {
        let model = phased_model(3);
        let forest = three_leaves(&model);
        assert!(matches!(
            forest.emission_probability(0.01, &[0, 1], &model),
            Err(GenealogyError::ConfigurationError(_))
        ));
        assert!(forest.emission_probability(0.01, &[0, 1, 2], &model).is_err());

        let unphased = Model::new(3);
        assert!(matches!(
            forest.emission_patterns(&unphased),
            Err(GenealogyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn sample_emission_decodes_branch() {
        let model = phased_model(3);
        let forest = three_leaves(&model);
        // local branches 0, 1, 2, 3 with cumulative lengths 1, 2, 4, 5
        let mut rng = ReplayRandom::from_draws(vec![0.5, 0.1, 0.9]);
        assert_eq!(forest.sample_emission(&model, &mut rng).unwrap(), vec![0, 0, 1]);
        assert_eq!(forest.sample_emission(&model, &mut rng).unwrap(), vec![1, 0, 0]);
        assert_eq!(forest.sample_emission(&model, &mut rng).unwrap(), vec![1, 1, 0]);
    }

    #[test]
    fn cache_follows_phasing() {
        let phased = phased_model(4);
        let unphased = Model::new(4);
        let forest = Forest::new(&phased, &mut ReplayRandom::from_draws(vec![])).unwrap();
        let first = forest.emission_patterns(&phased).unwrap().into_owned();
        let second = forest.emission_patterns(&unphased).unwrap().into_owned();
        assert_eq!(first[0], 0b0001);
        assert_eq!(second[3], 0b0100);
        assert_eq!(forest.emission_patterns(&phased).unwrap().into_owned(), first);
    }
}
