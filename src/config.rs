//! Numerical tolerances shared by the filters and the validating decorator.

use serde::{Deserialize, Serialize};

/// Tolerances for the invariant checks.
///
/// They interact with the floating point precision of the filter, so they
/// are configurable rather than hard-coded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Allowed deviation of the sum of mode probabilities from one
    pub probability_sum: f64,
    /// Allowed deviation of a Markov matrix row sum from one
    pub transition_row_sum: f64,
    /// Relative slack for covariance symmetry and negative eigenvalues
    pub covariance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            probability_sum: 1e-8,
            transition_row_sum: 1e-5,
            covariance: 1e-9,
        }
    }
}
