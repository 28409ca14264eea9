//! Random sources
//!
//! Every sampling operation of the genealogy engine draws from an injected
//! `RandomSource`. The number and order of draws is part of the observable
//! behaviour: a breakpoint takes one uniform, every coalescence one uniform for
//! its exponential variate and one for its target. `ReplayRandom` replays a
//! recorded sequence of uniforms, which makes runs comparable draw by draw.
//!

use rand::prelude::*;
use rand_distr::Exp;
use std::fs;

use crate::errors::{GenealogyError, Result};

pub trait RandomSource {
    /// Uniform variate in `[0, 1)`.
    fn sample(&mut self) -> f64;

    /// Uniform integer in `0..range`.
    fn sample_int(&mut self, range: usize) -> usize {
        ((self.sample() * range as f64) as usize).min(range.saturating_sub(1))
    }

    /// Exponential variate with rate `lambda`.
    fn sample_expo(&mut self, lambda: f64) -> f64 {
        self.sample_standard_exponential() / lambda
    }

    /// Exponential variate with rate one, consuming exactly one uniform.
    fn sample_standard_exponential(&mut self) -> f64 {
        -self.sample().max(f64::MIN_POSITIVE).ln()
    }

    /// Two distinct integers of `0..range`.
    fn sample_two_elements(&mut self, range: usize) -> (usize, usize) {
        assert!(range >= 2, "Need at least two elements to sample from");
        let first = self.sample_int(range);
        let mut second = self.sample_int(range - 1);
        if first == second {
            second = range - 1;
        }
        (first, second)
    }

    /// Whether the source ran out of draws. Only replayed sources can.
    fn exhausted(&self) -> bool {
        false
    }
}

/// Pseudo random source backed by a seeded `StdRng`.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn sample(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn sample_expo(&mut self, lambda: f64) -> f64 {
        match Exp::new(lambda) {
            Ok(distribution) => distribution.sample(&mut self.rng),
            Err(_) => f64::INFINITY,
        }
    }
}

/// Replays a fixed sequence of uniform draws.
///
/// Past the end of the sequence every draw is `0.5` and the source reports
/// itself as exhausted; callers check `exhausted` and abort the run.
#[derive(Clone, Debug)]
pub struct ReplayRandom {
    draws: Vec<f64>,
    position: usize,
    overrun: usize,
}

impl ReplayRandom {
    pub fn from_draws(draws: Vec<f64>) -> Self {
        Self {
            draws,
            position: 0,
            overrun: 0,
        }
    }

    /// Read draws from a text file with one float per line.
    pub fn read_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|err| GenealogyError::ReadError(format!("{path}: {err}")))?;
        let draws = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<f64>().map_err(|err| {
                    GenealogyError::ReadError(format!("{path}: invalid draw {line:?}: {err}"))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self::from_draws(draws))
    }

    /// Number of draws consumed so far.
    pub fn consumed(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.draws.len() - self.position
    }
}

impl RandomSource for ReplayRandom {
    fn sample(&mut self) -> f64 {
        let Some(&draw) = self.draws.get(self.position) else {
            self.overrun += 1;
            return 0.5;
        };
        self.position += 1;
        draw
    }

    fn exhausted(&self) -> bool {
        self.overrun > 0
    }
}
