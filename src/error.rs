//! Error types shared across the crate.
//!
//! Only configuration-class problems surface as errors: they are fatal and
//! reported at construction or on the first step. Numeric divergences inside
//! a trajectory are handled locally as rejected proposals, and accept/reject
//! itself is an ordinary return value.

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("step size must be positive, got {0}")]
    NonPositiveStepSize(f64),

    #[error("number of {what} must be positive")]
    NonPositiveCount { what: &'static str },

    #[error("target acceptance rate must lie strictly in (0, 1), got {0}")]
    TargetAcceptOutOfRange(f64),

    #[error("variable {0:?} is not part of the parameter state")]
    UnknownVariable(String),

    #[error("variable {0:?} already exists in the parameter state")]
    DuplicateVariable(String),

    #[error("variable group selects no scalars")]
    EmptyVariableGroup,

    #[error("variable group overlaps an already registered group at {0:?}")]
    OverlappingGroups(String),

    #[error("gradient has length {got}, expected {expected}")]
    GradientDimMismatch { got: usize, expected: usize },

    #[error("proposal candidate has length {got}, expected {expected}")]
    ProposalDimMismatch { got: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
