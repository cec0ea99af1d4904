//! Reference targets and proposal kernels.
//!
//! These are the distributions the tests and the demo binary sample from:
//! an axis-aligned Gaussian with analytic gradients, the 2D Rosenbrock
//! density, and a Gaussian random-walk proposal kernel.

use std::f64::consts::PI;

use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::state::{ParameterState, VariableGroup};
use crate::target::{GradientTarget, Target};

/// A proposal kernel for Metropolis-style samplers.
///
/// `sample` draws a candidate given the current flattened group value;
/// `log_prob` evaluates `log q(to | from)` so asymmetric kernels get the
/// correct Hastings correction.
pub trait Proposal {
    fn sample(&self, current: &[f64], rng: &mut SmallRng) -> Vec<f64>;
    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64;
}

/// Independent Gaussian noise around the current value, the standard
/// symmetric random-walk kernel.
#[derive(Clone, Debug)]
pub struct GaussianProposal {
    pub std: f64,
}

impl GaussianProposal {
    pub fn new(std: f64) -> Result<Self> {
        if !(std > 0.0) {
            return Err(Error::NonPositiveStepSize(std));
        }
        Ok(Self { std })
    }
}

impl Proposal for GaussianProposal {
    fn sample(&self, current: &[f64], rng: &mut SmallRng) -> Vec<f64> {
        let normal = Normal::new(0.0, self.std).expect("std validated at construction");
        current.iter().map(|&x| x + normal.sample(rng)).collect()
    }

    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64 {
        let var = self.std * self.std;
        let norm = -0.5 * (2.0 * PI * var).ln();
        from.iter()
            .zip(to)
            .map(|(&f, &t)| {
                let diff = t - f;
                norm - diff * diff / (2.0 * var)
            })
            .sum()
    }
}

/// Axis-aligned Gaussian over the full flattened state, in natural space.
///
/// `mean` and `std` are indexed by the state's flattened insertion order.
#[derive(Clone, Debug)]
pub struct DiagonalGaussian {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl DiagonalGaussian {
    pub fn new(mean: Vec<f64>, std: Vec<f64>) -> Self {
        assert_eq!(mean.len(), std.len(), "mean and std must have equal length");
        Self { mean, std }
    }

    /// Isotropic standard normal in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        Self::new(vec![0.0; dim], vec![1.0; dim])
    }

    fn full_grad(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.mean)
            .zip(&self.std)
            .map(|((&x, &m), &s)| -(x - m) / (s * s))
            .collect()
    }
}

impl Target for DiagonalGaussian {
    fn unnorm_log_prob(&self, state: &ParameterState) -> f64 {
        let x = state.natural_position();
        x.iter()
            .zip(&self.mean)
            .zip(&self.std)
            .map(|((&x, &m), &s)| {
                let d = (x - m) / s;
                -0.5 * d * d
            })
            .sum()
    }
}

impl GradientTarget for DiagonalGaussian {
    fn unnorm_log_prob_and_grad(
        &self,
        state: &ParameterState,
        group: &VariableGroup,
    ) -> (f64, Vec<f64>) {
        let x = state.natural_position();
        let full = self.full_grad(&x);
        let grad = state
            .flat_indices(group)
            .into_iter()
            .map(|i| full[i])
            .collect();
        (self.unnorm_log_prob(state), grad)
    }
}

/// The banana-shaped Rosenbrock density over a two-scalar state.
#[derive(Clone, Copy, Debug)]
pub struct Rosenbrock2D {
    pub a: f64,
    pub b: f64,
}

impl Target for Rosenbrock2D {
    fn unnorm_log_prob(&self, state: &ParameterState) -> f64 {
        let p = state.natural_position();
        let (x, y) = (p[0], p[1]);
        -((self.a - x).powi(2) + self.b * (y - x * x).powi(2))
    }
}

impl GradientTarget for Rosenbrock2D {
    fn unnorm_log_prob_and_grad(
        &self,
        state: &ParameterState,
        group: &VariableGroup,
    ) -> (f64, Vec<f64>) {
        let p = state.natural_position();
        let (x, y) = (p[0], p[1]);
        let full = [
            2.0 * (self.a - x) + 4.0 * self.b * x * (y - x * x),
            -2.0 * self.b * (y - x * x),
        ];
        let grad = state
            .flat_indices(group)
            .into_iter()
            .map(|i| full[i])
            .collect();
        (self.unnorm_log_prob(state), grad)
    }
}
