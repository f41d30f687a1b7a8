//! Defines the `Error` type for the chimera library, along with a few numeric helpers shared by
//! the factor types.

use crate::variable::Key;

use ndarray::{ArrayBase, Data, Dimension};
use thiserror::Error;

use std::result;

pub type Result<T> = result::Result<T, ChimeraError>;

/// Default tolerance used by the `equals` family of methods.
pub const DEFAULT_TOL: f64 = 1e-9;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ChimeraError {

    /// A DC factor that is not a Gaussian mixture was found where only Gaussian mixtures are
    /// allowed. Usually means the graph was not linearized before summation.
    #[error("sum can only handle Gaussian mixture factors, found a {found} factor at DC position {index}")]
    TypeMismatch { index: usize, found: &'static str },

    /// A continuous value required for evaluation or linearization was not provided
    #[error("no value provided for key {0}")]
    MissingValue(Key),

    /// Vector or matrix dimensions did not line up
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The continuous linearization of a factor failed
    #[error("linearization failed: {0}")]
    LinearizationFailure(String),

    /// Represents an incomplete assignment where a complete assignment was required.
    /// The value is the first key that was missing.
    #[error("missing assignment to discrete key {0}")]
    IncompleteAssignment(Key),

    /// An assignment gave a value outside of a key's cardinality
    #[error("value {value} is out of range for key {key} with cardinality {cardinality}")]
    InvalidAssignment { key: Key, value: usize, cardinality: usize },

    /// Represents an error where a certain constraint on a scope was not satisfied
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// A key was present multiple times where it may only appear once
    #[error("key {0} appears more than once")]
    DuplicateKey(Key),

    /// The same discrete key was used with two different cardinalities
    #[error("key {key} has cardinality {left} in one operand and {right} in the other")]
    CardinalityMismatch { key: Key, left: usize, right: usize },

    /// Noise sigmas must be strictly positive and finite
    #[error("invalid noise sigma {0}")]
    InvalidNoise(f64),

    /// Represents a situation in which there was a negative value in a discrete table
    #[error("encountered a negative probability")]
    NonPositiveProbability,

    /// A general error with the given description
    #[error("{0}")]
    General(String),
}

/// Compare two arrays elementwise to within `tol`. Arrays of different shapes are never equal.
pub fn arrays_equal<S, T, D>(a: &ArrayBase<S, D>, b: &ArrayBase<T, D>, tol: f64) -> bool
    where S: Data<Elem = f64>,
          T: Data<Elem = f64>,
          D: Dimension
{
    a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

/// Indent every line of `text` by two spaces. Used when nesting printed sub-objects.
pub(crate) fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {}\n", l)).collect()
}
