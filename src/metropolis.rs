//! Random-walk Metropolis-Hastings over one variable block.
//!
//! Works directly in natural space and needs no gradients, which makes it
//! the fallback sampler for blocks whose oracle cannot differentiate. The
//! Hastings correction is always applied, so asymmetric proposal kernels
//! are handled correctly.

use rand::prelude::*;

use crate::core::BlockSampler;
use crate::distributions::Proposal;
use crate::error::{Error, Result};
use crate::state::{ParameterState, VariableGroup};
use crate::target::Target;

/// Gradient-free block sampler driven by a [`Proposal`] kernel.
#[derive(Clone, Debug)]
pub struct RandomWalkSampler<Q> {
    group: VariableGroup,
    proposal: Q,
    accepted: Vec<bool>,
    rng: SmallRng,
}

impl<Q: Proposal> RandomWalkSampler<Q> {
    pub fn new(group: VariableGroup, proposal: Q) -> Self {
        Self {
            group,
            proposal,
            accepted: Vec::new(),
            rng: SmallRng::seed_from_u64(thread_rng().gen::<u64>()),
        }
    }

    /// Sets a new random seed for reproducibility.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Accept/reject history, one entry per step taken.
    pub fn acceptance(&self) -> &[bool] {
        &self.accepted
    }
}

impl<M: Target, Q: Proposal> BlockSampler<M> for RandomWalkSampler<Q> {
    fn group(&self) -> &VariableGroup {
        &self.group
    }

    fn step(&mut self, state: &mut ParameterState, target: &M) -> Result<bool> {
        state.resolve(&self.group)?;
        let current_lp = match state.log_prob() {
            Some(lp) => lp,
            None => {
                let lp = target.unnorm_log_prob(state);
                state.set_log_prob(lp);
                lp
            }
        };
        let snapshot = state.snapshot();

        let current = state.position(&self.group);
        let candidate = self.proposal.sample(&current, &mut self.rng);
        if candidate.len() != current.len() {
            return Err(Error::ProposalDimMismatch {
                got: candidate.len(),
                expected: current.len(),
            });
        }
        let log_q_forward = self.proposal.log_prob(&current, &candidate);
        let log_q_backward = self.proposal.log_prob(&candidate, &current);

        state.set_position(&self.group, &candidate);
        let candidate_lp = target.unnorm_log_prob(state);
        let log_ratio = candidate_lp - current_lp + log_q_backward - log_q_forward;

        // A NaN ratio fails the comparison and rejects, which is exactly
        // what a divergent candidate deserves.
        let accept = log_ratio >= 0.0 || self.rng.gen::<f64>().ln() < log_ratio;
        if accept {
            state.set_log_prob(candidate_lp);
        } else {
            state.restore(&snapshot);
        }
        self.accepted.push(accept);
        Ok(accept)
    }
}
