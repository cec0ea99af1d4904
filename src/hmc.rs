//! Hamiltonian Monte Carlo over one variable block.
//!
//! The sampler links its group into unconstrained space, simulates
//! Hamiltonian dynamics with the leapfrog integrator, applies the Metropolis
//! correction, and (during warm-up) feeds the acceptance probability into
//! dual averaging while accumulating draw statistics for the diagonal mass
//! matrix. A non-finite log-density or gradient anywhere in a trajectory is
//! an automatic reject, never a crash.

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::adapt::AdaptationState;
use crate::core::{debug_check_cache, BlockSampler};
use crate::error::{Error, Result};
use crate::state::{ParameterState, VariableGroup};
use crate::target::GradientTarget;
use crate::transforms::Transform;

/// Tuning knobs for one HMC sampler.
#[derive(Debug, Clone, Copy)]
pub struct HmcConfig {
    /// Initial step size; the fixed production step size when adaptation is
    /// disabled.
    pub step_size: f64,
    /// Leapfrog steps per proposal.
    pub num_leapfrog: usize,
    /// Target acceptance probability for dual averaging.
    pub target_accept: f64,
    /// Warm-up iterations; 0 disables adaptation entirely.
    pub adapt_horizon: usize,
    /// Warm-up draws required before the mass-matrix estimate is trusted.
    pub mass_min_draws: usize,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            num_leapfrog: 10,
            target_accept: 0.65,
            adapt_horizon: 1000,
            mass_min_draws: 500,
        }
    }
}

/// Metropolis acceptance probability from initial and proposed energies:
/// exactly 1 when the energy does not increase, `exp(-ΔH)` otherwise. A
/// non-finite proposed energy marks a divergent trajectory and is never
/// accepted, even against a non-finite starting energy.
pub fn acceptance_probability(initial_energy: f64, proposed_energy: f64) -> f64 {
    if !proposed_energy.is_finite() {
        0.0
    } else if proposed_energy <= initial_energy {
        1.0
    } else {
        (initial_energy - proposed_energy).exp()
    }
}

pub(crate) fn kinetic_energy(momentum: &[f64], inv_mass: &[f64]) -> f64 {
    0.5 * momentum
        .iter()
        .zip(inv_mass)
        .map(|(p, im)| p * p * im)
        .sum::<f64>()
}

/// Linked-space log-density and gradient at `position`, written into the
/// state first so the oracle sees the trajectory's current point. `None`
/// when anything is non-finite.
fn gradient_at<M: GradientTarget>(
    target: &M,
    state: &mut ParameterState,
    group: &VariableGroup,
    transforms: &[Transform],
    position: &[f64],
) -> Option<(f64, Vec<f64>)> {
    state.set_position(group, position);
    let (mut lp, mut grad) = target.unnorm_log_prob_and_grad(state, group);
    for ((g, t), &z) in grad.iter_mut().zip(transforms).zip(position) {
        lp += t.log_jacobian(z);
        *g = t.grad_to_unconstrained(z, *g);
    }
    if !lp.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return None;
    }
    Some((lp, grad))
}

/// Advances a position/momentum pair through `num_steps` leapfrog steps.
///
/// Each step is the symmetric half/full/half update — half-step momentum,
/// full-step position scaled by the inverse mass diagonal, half-step
/// momentum — which makes the map exactly reversible and volume-preserving.
/// Returns `false` (aborting the trajectory) on any non-finite gradient or
/// log-density; the caller must treat that as a reject with infinite energy.
#[allow(clippy::too_many_arguments)]
pub fn leapfrog<M: GradientTarget>(
    target: &M,
    state: &mut ParameterState,
    group: &VariableGroup,
    transforms: &[Transform],
    position: &mut [f64],
    momentum: &mut [f64],
    inv_mass: &[f64],
    step_size: f64,
    num_steps: usize,
) -> bool {
    let half = 0.5 * step_size;
    let mut grad = match gradient_at(target, state, group, transforms, position) {
        Some((_, grad)) => grad,
        None => return false,
    };
    for _ in 0..num_steps {
        for (p, g) in momentum.iter_mut().zip(&grad) {
            *p += half * g;
        }
        for ((x, p), im) in position.iter_mut().zip(momentum.iter()).zip(inv_mass) {
            *x += step_size * im * p;
        }
        grad = match gradient_at(target, state, group, transforms, position) {
            Some((_, grad)) => grad,
            None => return false,
        };
        for (p, g) in momentum.iter_mut().zip(&grad) {
            *p += half * g;
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Warm,
    Sampling,
}

/// Gradient-based block sampler with optional warm-up adaptation.
#[derive(Debug, Clone)]
pub struct HmcSampler {
    group: VariableGroup,
    config: HmcConfig,
    step_size: f64,
    dim: usize,
    transforms: Vec<Transform>,
    adapt: Option<AdaptationState>,
    phase: Phase,
    accepted: Vec<bool>,
    rng: SmallRng,
}

impl HmcSampler {
    /// Validates the configuration up front; nothing is reported at step
    /// time that could have been reported here.
    pub fn new(group: VariableGroup, config: HmcConfig) -> Result<Self> {
        if !(config.step_size > 0.0) {
            return Err(Error::NonPositiveStepSize(config.step_size));
        }
        if config.num_leapfrog == 0 {
            return Err(Error::NonPositiveCount {
                what: "leapfrog steps",
            });
        }
        if !(config.target_accept > 0.0 && config.target_accept < 1.0) {
            return Err(Error::TargetAcceptOutOfRange(config.target_accept));
        }
        Ok(Self {
            group,
            config,
            step_size: config.step_size,
            dim: 0,
            transforms: Vec::new(),
            adapt: None,
            phase: Phase::Uninitialized,
            accepted: Vec::new(),
            rng: SmallRng::seed_from_u64(thread_rng().gen::<u64>()),
        })
    }

    /// Sets a new random seed for reproducibility.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// The step size currently in use (exploratory while warm, frozen after
    /// the adaptation horizon).
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Whether the sampler is still inside its warm-up window.
    pub fn is_adapting(&self) -> bool {
        self.phase == Phase::Warm
    }

    /// Accept/reject history, one entry per step taken.
    pub fn acceptance(&self) -> &[bool] {
        &self.accepted
    }

    fn initialize<M: GradientTarget>(
        &mut self,
        state: &mut ParameterState,
        target: &M,
    ) -> Result<()> {
        state.resolve(&self.group)?;
        self.dim = state.group_dim(&self.group);
        if self.dim == 0 {
            return Err(Error::EmptyVariableGroup);
        }
        self.transforms = state.transforms(&self.group);
        // First evaluation populates the cache and checks the oracle's
        // gradient dimension once, before any dynamics run.
        let (lp, grad) = target.unnorm_log_prob_and_grad(state, &self.group);
        if grad.len() != self.dim {
            return Err(Error::GradientDimMismatch {
                got: grad.len(),
                expected: self.dim,
            });
        }
        state.set_log_prob(lp);
        if self.config.adapt_horizon > 0 {
            self.adapt = Some(AdaptationState::new(
                self.config.step_size,
                self.dim,
                self.config.adapt_horizon,
                self.config.mass_min_draws,
            ));
            self.phase = Phase::Warm;
        } else {
            self.phase = Phase::Sampling;
        }
        Ok(())
    }

    /// Closes out one step: while warm, every step (accepted, rejected, or
    /// divergent before integration) feeds exactly one adaptation update, so
    /// the horizon counts outer iterations.
    fn finish_step(&mut self, accept: bool, alpha: f64, draw: &[f64]) {
        if self.phase == Phase::Warm {
            if let Some(adapt) = self.adapt.as_mut() {
                adapt.update(alpha, self.config.target_accept, draw);
                self.step_size = adapt.step_size();
                if adapt.is_frozen() {
                    self.phase = Phase::Sampling;
                }
            }
        }
        self.accepted.push(accept);
    }
}

impl<M: GradientTarget> BlockSampler<M> for HmcSampler {
    fn group(&self) -> &VariableGroup {
        &self.group
    }

    fn step(&mut self, state: &mut ParameterState, target: &M) -> Result<bool> {
        if self.phase == Phase::Uninitialized {
            self.initialize(state, target)?;
        }
        let current_lp = match state.log_prob() {
            Some(lp) => lp,
            None => {
                let lp = target.unnorm_log_prob(state);
                state.set_log_prob(lp);
                lp
            }
        };
        let snapshot = state.snapshot();

        state.link(&self.group);
        let lp0 = current_lp + state.log_jacobian(&self.group);
        let position0 = state.position(&self.group);
        let inv_mass: Vec<f64> = match &self.adapt {
            Some(adapt) => adapt.inv_mass().to_vec(),
            None => vec![1.0; self.dim],
        };

        // Fresh momentum per step, scaled by the mass diagonal.
        let mut momentum: Vec<f64> = inv_mass
            .iter()
            .map(|&im| {
                let n: f64 = self.rng.sample(StandardNormal);
                n / im.sqrt()
            })
            .collect();
        let initial_energy = -lp0 + kinetic_energy(&momentum, &inv_mass);
        if !initial_energy.is_finite() {
            // No valid starting Hamiltonian: the log-density is non-finite,
            // or a constrained site sits on its boundary and links to an
            // infinite coordinate. Guaranteed reject; the pre-link state
            // comes back untouched and no NaN survives the step.
            state.restore(&snapshot);
            self.finish_step(false, 0.0, &position0);
            return Ok(false);
        }

        let mut position = position0.clone();
        let valid = leapfrog(
            target,
            state,
            &self.group,
            &self.transforms,
            &mut position,
            &mut momentum,
            &inv_mass,
            self.step_size,
            self.config.num_leapfrog,
        );

        let (proposed_energy, proposed_lp) = if valid {
            let lp = target.unnorm_log_prob(state) + state.log_jacobian(&self.group);
            if lp.is_finite() {
                (-lp + kinetic_energy(&momentum, &inv_mass), lp)
            } else {
                (f64::INFINITY, lp)
            }
        } else {
            (f64::INFINITY, f64::NEG_INFINITY)
        };

        let alpha = acceptance_probability(initial_energy, proposed_energy);
        let accept = self.rng.gen::<f64>() < alpha;
        if accept {
            state.set_log_prob(proposed_lp);
            state.unlink(&self.group);
        } else {
            state.restore(&snapshot);
            debug_check_cache(state, target);
        }

        let draw = if accept { position } else { position0 };
        self.finish_step(accept, alpha, &draw);
        Ok(accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::DiagonalGaussian;
    use crate::target::Target;
    use approx::assert_abs_diff_eq;

    fn gaussian_state(values: &[f64]) -> ParameterState {
        let mut state = ParameterState::new();
        state.insert("x", values.to_vec()).unwrap();
        state
    }

    #[test]
    fn acceptance_probability_is_exact() {
        // Never above 1, and exactly 1 whenever the energy does not grow.
        assert_eq!(acceptance_probability(3.0, 3.0), 1.0);
        assert_eq!(acceptance_probability(3.0, 1.0), 1.0);
        assert_eq!(acceptance_probability(0.0, -10.0), 1.0);
        // exp(-dH) above.
        assert_abs_diff_eq!(
            acceptance_probability(1.0, 2.5),
            (-1.5_f64).exp(),
            epsilon = 1e-15
        );
        assert_eq!(acceptance_probability(0.0, f64::INFINITY), 0.0);
        // A divergent proposal never wins, not even against a divergent
        // starting energy.
        assert_eq!(acceptance_probability(f64::INFINITY, f64::INFINITY), 0.0);
        assert_eq!(acceptance_probability(0.0, f64::NAN), 0.0);
    }

    #[test]
    fn constructor_rejects_bad_configuration() {
        let group = VariableGroup::all();
        let bad_step = HmcConfig {
            step_size: 0.0,
            ..HmcConfig::default()
        };
        assert!(matches!(
            HmcSampler::new(group.clone(), bad_step),
            Err(Error::NonPositiveStepSize(_))
        ));
        let bad_steps = HmcConfig {
            num_leapfrog: 0,
            ..HmcConfig::default()
        };
        assert!(matches!(
            HmcSampler::new(group.clone(), bad_steps),
            Err(Error::NonPositiveCount { .. })
        ));
        let bad_accept = HmcConfig {
            target_accept: 1.0,
            ..HmcConfig::default()
        };
        assert!(matches!(
            HmcSampler::new(group, bad_accept),
            Err(Error::TargetAcceptOutOfRange(_))
        ));
    }

    #[test]
    fn unknown_group_variable_fails_on_first_step() {
        let target = DiagonalGaussian::standard(1);
        let mut state = gaussian_state(&[0.0]);
        let mut sampler =
            HmcSampler::new(VariableGroup::of(&["missing"]), HmcConfig::default()).unwrap();
        assert!(matches!(
            sampler.step(&mut state, &target),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn leapfrog_is_reversible() {
        let target = DiagonalGaussian::standard(2);
        let group = VariableGroup::all();
        let mut state = gaussian_state(&[1.0, -0.5]);
        let transforms = state.transforms(&group);
        let inv_mass = [1.0, 1.0];

        let position0 = vec![1.0, -0.5];
        let momentum0 = vec![0.3, 0.7];
        let mut position = position0.clone();
        let mut momentum = momentum0.clone();

        let ok = leapfrog(
            &target, &mut state, &group, &transforms, &mut position, &mut momentum, &inv_mass,
            0.1, 25,
        );
        assert!(ok);

        // Flip momentum and integrate back with the same step size.
        for p in momentum.iter_mut() {
            *p = -*p;
        }
        let ok = leapfrog(
            &target, &mut state, &group, &transforms, &mut position, &mut momentum, &inv_mass,
            0.1, 25,
        );
        assert!(ok);

        for (x, x0) in position.iter().zip(&position0) {
            assert_abs_diff_eq!(x, x0, epsilon = 1e-9);
        }
        // The returned momentum is the negation of the original.
        for (p, p0) in momentum.iter().zip(&momentum0) {
            assert_abs_diff_eq!(*p, -p0, epsilon = 1e-9);
        }
    }

    /// Largest |ΔH| along a fixed-time trajectory on a standard normal,
    /// used to verify the second-order error of the integrator.
    fn energy_error(step_size: f64) -> f64 {
        let target = DiagonalGaussian::standard(2);
        let group = VariableGroup::all();
        let mut state = gaussian_state(&[1.2, -0.4]);
        let transforms = state.transforms(&group);
        let inv_mass = [1.0, 1.0];

        let mut position = vec![1.2, -0.4];
        let mut momentum = vec![0.8, -0.9];
        let h0 = -target.unnorm_log_prob(&state) + kinetic_energy(&momentum, &inv_mass);

        // Halving the step size doubles the step count so every trajectory
        // covers the same integration time.
        let num_steps = (2.0 / step_size).round() as usize;
        let mut max_err = 0.0_f64;
        for _ in 0..num_steps {
            let ok = leapfrog(
                &target, &mut state, &group, &transforms, &mut position, &mut momentum,
                &inv_mass, step_size, 1,
            );
            assert!(ok);
            let h = -target.unnorm_log_prob(&state) + kinetic_energy(&momentum, &inv_mass);
            max_err = max_err.max((h - h0).abs());
        }
        max_err
    }

    #[test]
    fn energy_error_shrinks_quadratically_with_step_size() {
        let coarse = energy_error(0.4);
        let medium = energy_error(0.2);
        let fine = energy_error(0.1);
        // Halving the step size should cut the error by about four.
        assert!(medium < 0.5 * coarse, "medium={medium} coarse={coarse}");
        assert!(fine < 0.5 * medium, "fine={fine} medium={medium}");
    }

    /// Finite log-density but a gradient that is always NaN: every
    /// trajectory diverges immediately.
    struct BrokenGradient;

    impl Target for BrokenGradient {
        fn unnorm_log_prob(&self, state: &ParameterState) -> f64 {
            let x = state.natural_position();
            -0.5 * x.iter().map(|v| v * v).sum::<f64>()
        }
    }

    impl GradientTarget for BrokenGradient {
        fn unnorm_log_prob_and_grad(
            &self,
            state: &ParameterState,
            group: &VariableGroup,
        ) -> (f64, Vec<f64>) {
            let dim = state.group_dim(group);
            (self.unnorm_log_prob(state), vec![f64::NAN; dim])
        }
    }

    #[test]
    fn divergent_trajectory_restores_state_exactly() {
        let target = BrokenGradient;
        let mut state = gaussian_state(&[0.7, -1.3]);
        let mut sampler = HmcSampler::new(
            VariableGroup::all(),
            HmcConfig {
                adapt_horizon: 0,
                ..HmcConfig::default()
            },
        )
        .unwrap()
        .set_seed(3);

        // The first step initializes the cache, then must reject.
        let accepted = sampler.step(&mut state, &target).unwrap();
        assert!(!accepted);
        let after_first = state.clone();

        let accepted = sampler.step(&mut state, &target).unwrap();
        assert!(!accepted);
        // Values and cached log-density are bit-identical to the pre-step
        // snapshot.
        assert_eq!(state, after_first);
        assert_eq!(state.value("x").unwrap(), &[0.7, -1.3]);
        assert_eq!(sampler.acceptance(), &[false, false]);
    }

    #[test]
    fn boundary_value_on_constrained_site_rejects_cleanly() {
        use crate::transforms::Transform;

        // A positive site pinned at 0 links to ln(0) = -inf: no valid
        // starting Hamiltonian exists, so the step must reject and leave
        // the state finite and untouched.
        let target = DiagonalGaussian::new(vec![2.0], vec![0.5]);
        let mut state = ParameterState::new();
        state
            .insert_transformed("scale", vec![0.0], Transform::LogPositive)
            .unwrap();
        let mut sampler = HmcSampler::new(
            VariableGroup::all(),
            HmcConfig {
                adapt_horizon: 0,
                ..HmcConfig::default()
            },
        )
        .unwrap()
        .set_seed(19);

        let accepted = sampler.step(&mut state, &target).unwrap();
        assert!(!accepted);
        assert_eq!(state.value("scale").unwrap(), &[0.0]);
        assert!(!state.is_linked("scale"));
        let lp = state.log_prob().unwrap();
        assert!(lp.is_finite(), "cached log-density became {lp}");
    }

    /// Log-density that is -inf everywhere; every step must reject before
    /// integration even starts.
    struct Bottomless;

    impl Target for Bottomless {
        fn unnorm_log_prob(&self, _state: &ParameterState) -> f64 {
            f64::NEG_INFINITY
        }
    }

    impl GradientTarget for Bottomless {
        fn unnorm_log_prob_and_grad(
            &self,
            state: &ParameterState,
            group: &VariableGroup,
        ) -> (f64, Vec<f64>) {
            (f64::NEG_INFINITY, vec![0.0; state.group_dim(group)])
        }
    }

    #[test]
    fn rejected_steps_still_advance_the_adaptation_horizon() {
        let target = Bottomless;
        let mut state = gaussian_state(&[0.0]);
        let horizon = 30;
        let mut sampler = HmcSampler::new(
            VariableGroup::all(),
            HmcConfig {
                adapt_horizon: horizon,
                mass_min_draws: 10,
                ..HmcConfig::default()
            },
        )
        .unwrap()
        .set_seed(2);

        for _ in 0..horizon {
            let accepted = sampler.step(&mut state, &target).unwrap();
            assert!(!accepted);
        }
        // One adaptation update per outer iteration, even when every step
        // rejects before integrating.
        assert!(!sampler.is_adapting());
        assert_eq!(sampler.acceptance().len(), horizon);
    }

    #[test]
    fn step_size_freezes_after_horizon() {
        let target = DiagonalGaussian::standard(1);
        let mut state = gaussian_state(&[0.5]);
        let horizon = 100;
        let mut sampler = HmcSampler::new(
            VariableGroup::all(),
            HmcConfig {
                step_size: 0.5,
                num_leapfrog: 8,
                adapt_horizon: horizon,
                mass_min_draws: 50,
                ..HmcConfig::default()
            },
        )
        .unwrap()
        .set_seed(42);

        for _ in 0..horizon {
            sampler.step(&mut state, &target).unwrap();
        }
        assert!(!sampler.is_adapting());
        let frozen = sampler.step_size();
        for _ in 0..50 {
            sampler.step(&mut state, &target).unwrap();
        }
        assert_eq!(sampler.step_size(), frozen);
    }

    #[test]
    fn dual_averaging_reaches_the_target_acceptance() {
        let target = DiagonalGaussian::standard(1);
        let mut state = gaussian_state(&[1.0]);
        let horizon = 500;
        // Start from a deliberately bad step size.
        let mut sampler = HmcSampler::new(
            VariableGroup::all(),
            HmcConfig {
                step_size: 2.5,
                num_leapfrog: 10,
                target_accept: 0.65,
                adapt_horizon: horizon,
                mass_min_draws: 200,
            },
        )
        .unwrap()
        .set_seed(7);

        for _ in 0..horizon {
            sampler.step(&mut state, &target).unwrap();
        }
        assert!(!sampler.is_adapting());

        let post = 1000;
        let mut accepted = 0usize;
        for _ in 0..post {
            if sampler.step(&mut state, &target).unwrap() {
                accepted += 1;
            }
        }
        // Monte Carlo noise over 1000 draws is a few percent; a band of
        // ±0.12 around the target still catches a mis-adapted step size.
        let rate = accepted as f64 / post as f64;
        assert!(
            (0.53..=0.77).contains(&rate),
            "post-warm-up acceptance rate {rate} off the 0.65 target"
        );
    }

    #[test]
    fn hmc_respects_its_group() {
        let target = DiagonalGaussian::standard(2);
        let mut state = ParameterState::new();
        state.insert("a", vec![0.3]).unwrap();
        state.insert("b", vec![-0.8]).unwrap();
        let mut sampler = HmcSampler::new(
            VariableGroup::of(&["a"]),
            HmcConfig {
                adapt_horizon: 50,
                mass_min_draws: 10,
                ..HmcConfig::default()
            },
        )
        .unwrap()
        .set_seed(11);

        for _ in 0..100 {
            sampler.step(&mut state, &target).unwrap();
            assert_eq!(state.value("b").unwrap(), &[-0.8]);
        }
    }
}
