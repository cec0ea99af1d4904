//! Composing block samplers over one shared parameter state.
//!
//! A [`Composer`] owns the state and the target, plus an ordered list of
//! block samplers with pairwise disjoint variable groups. One outer
//! iteration steps every sampler once, in registration order, each seeing
//! the updates of the ones before it.

use std::collections::VecDeque;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{aview1, Array2};

use crate::core::{BlockSampler, ChainCollector};
use crate::error::{Error, Result};
use crate::state::ParameterState;
use crate::target::Target;

/// Runs a fixed set of block samplers round-robin over a shared state.
pub struct Composer<M> {
    target: M,
    state: ParameterState,
    samplers: Vec<Box<dyn BlockSampler<M>>>,
}

impl<M: Target> Composer<M> {
    pub fn new(target: M, state: ParameterState) -> Self {
        Self {
            target,
            state,
            samplers: Vec::new(),
        }
    }

    /// Registers a sampler for its variable group.
    ///
    /// Fails if the group names a variable the state does not hold, or if it
    /// shares any variable with an already registered group. The
    /// all-variables sentinel overlaps everything, so it is only accepted as
    /// the sole sampler.
    pub fn register(&mut self, sampler: Box<dyn BlockSampler<M>>) -> Result<()> {
        self.state.resolve(sampler.group())?;
        for existing in &self.samplers {
            if let Some(witness) = existing.group().overlap_witness(sampler.group()) {
                return Err(Error::OverlappingGroups(witness));
            }
        }
        self.samplers.push(sampler);
        Ok(())
    }

    /// One outer iteration: every sampler steps once in registration order.
    /// Reports whether any block accepted its proposal.
    pub fn step(&mut self) -> Result<bool> {
        let mut any_accepted = false;
        for sampler in self.samplers.iter_mut() {
            any_accepted |= sampler.step(&mut self.state, &self.target)?;
        }
        Ok(any_accepted)
    }

    /// Discards `n_discard` outer iterations, then collects `n_collect`
    /// draws as rows of flattened natural-space values.
    pub fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Array2<f64>> {
        if n_collect == 0 {
            return Err(Error::NonPositiveCount {
                what: "collected draws",
            });
        }
        for _ in 0..n_discard {
            self.step()?;
        }
        let mut out = Array2::zeros((n_collect, self.state.dim()));
        for i in 0..n_collect {
            self.step()?;
            let row = self.state.natural_position();
            out.row_mut(i).assign(&aview1(&row));
        }
        Ok(out)
    }

    /// Like [`Composer::run`] but streams every collected iteration into a
    /// caller-supplied collector instead of materializing a matrix.
    pub fn run_collect(
        &mut self,
        n_collect: usize,
        n_discard: usize,
        collector: &mut dyn ChainCollector,
    ) -> Result<()> {
        if n_collect == 0 {
            return Err(Error::NonPositiveCount {
                what: "collected draws",
            });
        }
        for _ in 0..n_discard {
            self.step()?;
        }
        for _ in 0..n_collect {
            let accepted = self.step()?;
            collector.record(accepted, &self.state);
        }
        Ok(())
    }

    /// [`Composer::run`] with a terminal progress bar and a rolling
    /// acceptance estimate over the last 100 outer iterations.
    pub fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Array2<f64>> {
        if n_collect == 0 {
            return Err(Error::NonPositiveCount {
                what: "collected draws",
            });
        }
        let total = n_discard + n_collect;
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .expect("template is valid")
                .progress_chars("=>-"),
        );
        pb.set_prefix("sampling");

        let mut window: VecDeque<bool> = VecDeque::with_capacity(100);
        let mut observe = |accepted: bool, pb: &ProgressBar| {
            if window.len() == 100 {
                window.pop_front();
            }
            window.push_back(accepted);
            let rate = window.iter().filter(|&&a| a).count() as f64 / window.len() as f64;
            pb.set_message(format!("p(accept)≈{rate:.2}"));
            pb.inc(1);
        };

        for _ in 0..n_discard {
            let accepted = self.step()?;
            observe(accepted, &pb);
        }
        let mut out = Array2::zeros((n_collect, self.state.dim()));
        for i in 0..n_collect {
            let accepted = self.step()?;
            observe(accepted, &pb);
            let row = self.state.natural_position();
            out.row_mut(i).assign(&aview1(&row));
        }
        pb.finish();
        Ok(out)
    }

    /// The shared state after however many iterations have run.
    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    pub fn target(&self) -> &M {
        &self.target
    }

    pub fn num_samplers(&self) -> usize {
        self.samplers.len()
    }
}
