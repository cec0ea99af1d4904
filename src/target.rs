//! Oracle traits for the distribution being sampled.
//!
//! The engine never differentiates anything itself: gradients come from the
//! oracle (hand-derived, autodiff, whatever the caller has). Oracles are
//! evaluated at the state's *natural* values — [`crate::state::ParameterState::natural_value`]
//! undoes any active transform — and must be pure given those values.
//! Non-finite results are tolerated and treated as divergences by the
//! samplers, never as errors.

use crate::state::{ParameterState, VariableGroup};

/// A target distribution known through its unnormalized log-density.
pub trait Target {
    /// Log of the unnormalized density at the state's natural values.
    fn unnorm_log_prob(&self, state: &ParameterState) -> f64;
}

/// A target that can additionally supply gradients, enabling Hamiltonian
/// dynamics on the group it is asked about.
pub trait GradientTarget: Target {
    /// Log-density and its gradient with respect to the natural values of
    /// the group's scalars (in state insertion order), with all other
    /// variables held at their current values.
    fn unnorm_log_prob_and_grad(
        &self,
        state: &ParameterState,
        group: &VariableGroup,
    ) -> (f64, Vec<f64>);
}
