//! The contracts tying samplers, state, and output together.

use crate::error::Result;
use crate::state::{ParameterState, VariableGroup};
use crate::target::Target;

/// A sampler responsible for one disjoint block of variables.
///
/// `step` receives exclusive, temporary access to the shared state, mutates
/// only the variables in its group, and reports whether the proposal was
/// accepted. Accept/reject is an ordinary return value; errors are reserved
/// for configuration problems surfaced on the first call.
pub trait BlockSampler<M> {
    /// The variables this sampler owns.
    fn group(&self) -> &VariableGroup;

    /// One proposal/accept-reject cycle against the shared state.
    fn step(&mut self, state: &mut ParameterState, target: &M) -> Result<bool>;
}

/// Receives one record per collected outer iteration. On a rejected
/// iteration the run loop re-emits the previous state, so the recorded
/// sequence always has exactly one entry per iteration.
pub trait ChainCollector {
    fn record(&mut self, accepted: bool, state: &ParameterState);
}

/// In-memory collector storing flattened natural-space draws.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    pub accepted: Vec<bool>,
    pub draws: Vec<Vec<f64>>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainCollector for MemoryCollector {
    fn record(&mut self, accepted: bool, state: &ParameterState) {
        self.accepted.push(accepted);
        self.draws.push(state.natural_position());
    }
}

/// Debug-build check that a restored cache still matches a fresh
/// evaluation. A mismatch means a sampler broke the state contract.
#[cfg(debug_assertions)]
pub(crate) fn debug_check_cache<M: Target>(state: &ParameterState, target: &M) {
    if let Some(cached) = state.log_prob() {
        if cached.is_finite() {
            let fresh = target.unnorm_log_prob(state);
            debug_assert!(
                (cached - fresh).abs() <= 1e-8 * cached.abs().max(1.0),
                "cached log-density {cached} inconsistent with fresh evaluation {fresh}"
            );
        }
    }
}

#[cfg(not(debug_assertions))]
pub(crate) fn debug_check_cache<M: Target>(_state: &ParameterState, _target: &M) {}
