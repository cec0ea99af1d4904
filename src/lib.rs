//! Block-structured MCMC over a shared, named parameter state.
//!
//! The crate splits a model's variables into disjoint blocks and assigns
//! each block its own sampler: Hamiltonian Monte Carlo with dual-averaging
//! step-size adaptation and diagonal mass-matrix estimation where gradients
//! are available, random-walk Metropolis-Hastings where they are not. A
//! [`compose::Composer`] steps every block once per outer iteration over one
//! [`state::ParameterState`], so each sampler sees the others' latest values.
//!
//! Constrained variables are handled by per-site transforms: a sampler links
//! its block into unconstrained space, moves there with the correct Jacobian
//! correction, and unlinks afterwards, while target oracles only ever see
//! natural values.
//!
//! ```
//! # fn main() -> Result<(), block_mcmc::error::Error> {
//! use block_mcmc::compose::Composer;
//! use block_mcmc::distributions::DiagonalGaussian;
//! use block_mcmc::hmc::{HmcConfig, HmcSampler};
//! use block_mcmc::state::{ParameterState, VariableGroup};
//!
//! let mut state = ParameterState::new();
//! state.insert("theta", vec![0.0, 0.0])?;
//!
//! let sampler = HmcSampler::new(
//!     VariableGroup::all(),
//!     HmcConfig {
//!         adapt_horizon: 200,
//!         mass_min_draws: 50,
//!         ..HmcConfig::default()
//!     },
//! )?
//! .set_seed(42);
//!
//! let mut composer = Composer::new(DiagonalGaussian::standard(2), state);
//! composer.register(Box::new(sampler))?;
//!
//! let draws = composer.run(200, 200)?;
//! assert_eq!(draws.shape(), &[200, 2]);
//! # Ok(())
//! # }
//! ```

/// Warm-up adaptation: dual averaging and mass-matrix estimation.
pub mod adapt;

/// The composer running block samplers round-robin.
pub mod compose;

/// Sampler, collector, and consistency-check contracts.
pub mod core;

/// Reference targets and proposal kernels.
pub mod distributions;

/// Configuration-class errors.
pub mod error;

/// Hamiltonian Monte Carlo and the leapfrog integrator.
pub mod hmc;

/// Random-walk Metropolis-Hastings.
pub mod metropolis;

/// The shared parameter state and variable groups.
pub mod state;

/// Log-density oracle traits.
pub mod target;

/// Per-site constraint transforms.
pub mod transforms;
