//! Warm-up adaptation: dual-averaging step-size control and diagonal
//! mass-matrix estimation.
//!
//! The scalar controllers are generic over [`num_traits::Float`];
//! [`AdaptationState`] wires them together for one HMC sampler and owns the
//! freeze logic. Once the adaptation horizon is reached the step size is
//! pinned to the dual-averaging running average and the mass matrix stops
//! moving; neither changes again for the life of the sampler.

use num_traits::Float;

/// Fixed shrinkage parameters of the Nesterov dual-averaging scheme.
#[derive(Debug, Clone, Copy)]
pub struct DualAverageOptions<T> {
    pub kappa: T,
    pub t0: T,
    pub gamma: T,
    pub initial_step: T,
}

impl<T> Default for DualAverageOptions<T>
where
    T: Float,
{
    fn default() -> DualAverageOptions<T> {
        DualAverageOptions {
            kappa: T::from(0.75).unwrap(),
            t0: T::from(10.0).unwrap(),
            gamma: T::from(0.05).unwrap(),
            initial_step: T::from(0.1).unwrap(),
        }
    }
}

/// Dual-averaging controller driving the step size toward a target
/// acceptance probability.
#[derive(Clone, Debug)]
pub struct DualAverage<T> {
    log_step: T,
    log_step_bar: T,
    h_bar: T,
    mu: T,
    count: usize,
    options: DualAverageOptions<T>,
}

impl<T> DualAverage<T>
where
    T: Float,
{
    pub fn new(options: DualAverageOptions<T>) -> DualAverage<T> {
        let initial_step = options.initial_step;
        DualAverage {
            log_step: initial_step.ln(),
            log_step_bar: initial_step.ln(),
            h_bar: T::zero(),
            // The anchor point the raw step size shrinks toward.
            mu: (T::from(10.0).unwrap() * initial_step).ln(),
            count: 1,
            options,
        }
    }

    /// One adaptation update from the current step's acceptance probability.
    pub fn advance(&mut self, accept_prob: T, target: T) {
        let m = T::from(self.count).unwrap();
        let w = T::one() / (m + self.options.t0);
        self.h_bar = (T::one() - w) * self.h_bar + w * (target - accept_prob);
        self.log_step = self.mu - self.h_bar * m.sqrt() / self.options.gamma;
        let mk = m.powf(-self.options.kappa);
        self.log_step_bar = mk * self.log_step + (T::one() - mk) * self.log_step_bar;
        self.count += 1;
    }

    /// The raw (exploratory) step size.
    pub fn current_step_size(&self) -> T {
        self.log_step.exp()
    }

    /// The converged running-average estimate; what production sampling
    /// should use after warm-up.
    pub fn adapted_step_size(&self) -> T {
        self.log_step_bar.exp()
    }
}

/// Welford online mean/variance accumulator, one slot per coordinate.
#[derive(Clone, Debug)]
pub struct RunningMoments<T> {
    mean: Vec<T>,
    m2: Vec<T>,
    count: usize,
}

impl<T> RunningMoments<T>
where
    T: Float,
{
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![T::zero(); dim],
            m2: vec![T::zero(); dim],
            count: 0,
        }
    }

    pub fn push(&mut self, value: &[T]) {
        self.count += 1;
        let n = T::from(self.count).unwrap();
        for ((mean, m2), &x) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(value) {
            let delta = x - *mean;
            *mean = *mean + delta / n;
            *m2 = *m2 + delta * (x - *mean);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> &[T] {
        &self.mean
    }

    /// Sample variance per coordinate with a small floor against
    /// near-constant coordinates; `None` until two samples are seen.
    pub fn variance(&self) -> Option<Vec<T>> {
        if self.count < 2 {
            return None;
        }
        let n1 = T::from(self.count - 1).unwrap();
        let floor = T::from(1e-10).unwrap();
        Some(self.m2.iter().map(|&m2| m2 / n1 + floor).collect())
    }
}

/// Everything one HMC sampler adapts during warm-up, owned one-to-one by
/// that sampler and never shared.
#[derive(Clone, Debug)]
pub struct AdaptationState {
    dual_average: DualAverage<f64>,
    moments: RunningMoments<f64>,
    inv_mass: Vec<f64>,
    horizon: usize,
    min_draws: usize,
    iteration: usize,
    frozen: bool,
}

impl AdaptationState {
    /// `horizon` is the number of warm-up iterations; `min_draws` is how
    /// many draws the variance estimate needs before it is trusted as the
    /// inverse mass diagonal.
    pub fn new(initial_step: f64, dim: usize, horizon: usize, min_draws: usize) -> Self {
        Self {
            dual_average: DualAverage::new(DualAverageOptions {
                initial_step,
                ..DualAverageOptions::default()
            }),
            moments: RunningMoments::new(dim),
            inv_mass: vec![1.0; dim],
            horizon,
            min_draws,
            iteration: 0,
            frozen: false,
        }
    }

    /// Inverse mass diagonal (identity until the estimate is trusted).
    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }

    /// The step size the sampler should use right now: the exploratory one
    /// while warm, the converged running average once frozen.
    pub fn step_size(&self) -> f64 {
        if self.frozen {
            self.dual_average.adapted_step_size()
        } else {
            self.dual_average.current_step_size()
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// One warm-up update: feeds the acceptance probability of the step just
    /// taken into dual averaging and the unconstrained draw into the
    /// variance estimate. No-op once frozen.
    pub fn update(&mut self, accept_prob: f64, target_accept: f64, draw: &[f64]) {
        if self.frozen {
            return;
        }
        self.dual_average.advance(accept_prob, target_accept);
        // Divergent or boundary positions carry no scale information and
        // must not poison the variance estimate.
        if draw.iter().all(|v| v.is_finite()) {
            self.moments.push(draw);
        }
        if self.moments.count() >= self.min_draws {
            if let Some(variance) = self.moments.variance() {
                self.inv_mass = variance;
            }
        }
        self.iteration += 1;
        if self.iteration >= self.horizon {
            self.freeze();
        }
    }

    fn freeze(&mut self) {
        // Normalize so the smallest per-variable scale is exactly 1, which
        // keeps the frozen step size and the metric from fighting each other.
        if self.moments.count() >= self.min_draws {
            if let Some(min) = self
                .inv_mass
                .iter()
                .cloned()
                .reduce(f64::min)
                .filter(|m| *m > 0.0)
            {
                for v in self.inv_mass.iter_mut() {
                    *v /= min;
                }
            }
        }
        self.frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dual_average_follows_the_published_recursion() {
        let options = DualAverageOptions {
            kappa: 0.75,
            t0: 10.0,
            gamma: 0.05,
            initial_step: 0.1,
        };
        let mut da = DualAverage::new(options);
        // One update by hand: m = 1, delta = 0.65, alpha = 0.2.
        let (delta, alpha) = (0.65, 0.2);
        let mu = (10.0 * 0.1_f64).ln();
        let w = 1.0 / (1.0 + 10.0);
        let h_bar = w * (delta - alpha);
        let log_step = mu - h_bar * 1.0_f64.sqrt() / 0.05;
        let log_step_bar = log_step; // m^-kappa = 1 at m = 1
        da.advance(alpha, delta);
        assert_abs_diff_eq!(da.current_step_size(), log_step.exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(da.adapted_step_size(), log_step_bar.exp(), epsilon = 1e-12);
    }

    #[test]
    fn dual_average_shrinks_step_when_rejecting() {
        let mut da = DualAverage::new(DualAverageOptions::default());
        let start = da.current_step_size();
        // Persistent rejections must drive the step size down.
        for _ in 0..50 {
            da.advance(0.0, 0.65);
        }
        assert!(da.current_step_size() < start);
        assert!(da.adapted_step_size() < start);
    }

    #[test]
    fn dual_average_grows_step_when_over_accepting() {
        let mut da = DualAverage::new(DualAverageOptions::default());
        let start = da.current_step_size();
        for _ in 0..50 {
            da.advance(1.0, 0.65);
        }
        assert!(da.current_step_size() > start);
    }

    #[test]
    fn welford_matches_two_pass_moments() {
        let data = [
            vec![1.0, -2.0],
            vec![2.5, 0.5],
            vec![-0.5, 3.0],
            vec![4.0, 1.5],
            vec![0.25, -1.25],
        ];
        let mut moments = RunningMoments::new(2);
        for row in &data {
            moments.push(row);
        }
        for j in 0..2 {
            let mean = data.iter().map(|r| r[j]).sum::<f64>() / data.len() as f64;
            let var = data.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>()
                / (data.len() - 1) as f64;
            assert_abs_diff_eq!(moments.mean()[j], mean, epsilon = 1e-12);
            assert_abs_diff_eq!(moments.variance().unwrap()[j], var, epsilon = 1e-9);
        }
    }

    #[test]
    fn variance_needs_two_samples() {
        let mut moments = RunningMoments::<f64>::new(1);
        assert!(moments.variance().is_none());
        moments.push(&[1.0]);
        assert!(moments.variance().is_none());
        moments.push(&[2.0]);
        assert!(moments.variance().is_some());
    }

    #[test]
    fn frozen_state_stops_moving_and_normalizes_mass() {
        let mut adapt = AdaptationState::new(0.1, 2, 20, 5);
        // Feed draws with very different scales per coordinate.
        let mut x = 0.0;
        for i in 0..20 {
            x += 1.0;
            let draw = [x * if i % 2 == 0 { 1.0 } else { -1.0 }, 0.01 * x];
            adapt.update(0.7, 0.65, &draw);
        }
        assert!(adapt.is_frozen());
        let step = adapt.step_size();
        let mass = adapt.inv_mass().to_vec();
        // Smallest scale is normalized to 1 and the wide coordinate is wider.
        let min = mass.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_abs_diff_eq!(min, 1.0, epsilon = 1e-12);
        assert!(mass[0] > mass[1]);

        // Further updates are ignored after the horizon.
        adapt.update(0.0, 0.65, &[100.0, 100.0]);
        adapt.update(1.0, 0.65, &[-100.0, -100.0]);
        assert_eq!(adapt.step_size(), step);
        assert_eq!(adapt.inv_mass(), mass.as_slice());
    }

    #[test]
    fn non_finite_draws_do_not_enter_the_variance_estimate() {
        let mut adapt = AdaptationState::new(0.1, 1, 50, 5);
        for i in 0..20 {
            adapt.update(0.7, 0.65, &[i as f64]);
        }
        let before = adapt.inv_mass().to_vec();
        adapt.update(0.0, 0.65, &[f64::NEG_INFINITY]);
        adapt.update(0.0, 0.65, &[f64::NAN]);
        assert_eq!(adapt.inv_mass(), before.as_slice());
        assert!(adapt.inv_mass().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn mass_stays_identity_below_min_draws() {
        let mut adapt = AdaptationState::new(0.1, 1, 3, 100);
        for _ in 0..3 {
            adapt.update(0.5, 0.65, &[3.0]);
        }
        assert!(adapt.is_frozen());
        assert_eq!(adapt.inv_mass(), &[1.0]);
    }
}
