//! Error types returned by every filter in the crate.

use std::fmt;

pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors that can occur while predicting or updating a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Size of an input vector or matrix disagrees with the configured size
    DimensionMismatch {
        /// Which quantity was checked (e.g. "measurement", "control")
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Markov transition matrix is not row-stochastic or has the wrong shape
    InvalidTransitionMatrix { reason: String },

    /// Innovation covariance could not be factorised
    FilterDivergence { context: &'static str },

    /// Raised by [`Validated`](crate::state_estimator::validated::Validated)
    /// after the wrapped filter has run
    SanityCheck(SanityCheck),

    /// Filter was assembled from inconsistent parts
    Configuration { description: String },
}

/// Invariant violations detected by the validating decorator.
#[derive(Debug, Clone, PartialEq)]
pub enum SanityCheck {
    /// Mean has NaN/Inf entries. `hypothesis` is `None` for single filters.
    BadState { hypothesis: Option<usize> },
    /// Covariance has non-finite entries, is asymmetric or not PSD
    BadCovariance { hypothesis: Option<usize> },
    /// Mode probabilities out of [0, 1] or not summing to one
    BadProbabilities { sum: f64 },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::DimensionMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "Dimension mismatch for {}: expected {}, got {}",
                context, expected, actual
            ),
            FilterError::InvalidTransitionMatrix { reason } => {
                write!(f, "Invalid transition matrix: {}", reason)
            }
            FilterError::FilterDivergence { context } => {
                write!(f, "Filter diverged: {}", context)
            }
            FilterError::SanityCheck(check) => write!(f, "Sanity check failed: {}", check),
            FilterError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
        }
    }
}

impl fmt::Display for SanityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanityCheck::BadState { hypothesis: None } => write!(f, "non-finite state"),
            SanityCheck::BadState {
                hypothesis: Some(i),
            } => write!(f, "non-finite state in hypothesis {}", i),
            SanityCheck::BadCovariance { hypothesis: None } => write!(f, "invalid covariance"),
            SanityCheck::BadCovariance {
                hypothesis: Some(i),
            } => write!(f, "invalid covariance in hypothesis {}", i),
            SanityCheck::BadProbabilities { sum } => {
                write!(f, "mode probabilities sum to {}", sum)
            }
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::SanityCheck(check) => Some(check),
            _ => None,
        }
    }
}

impl std::error::Error for SanityCheck {}

impl From<SanityCheck> for FilterError {
    fn from(check: SanityCheck) -> Self {
        FilterError::SanityCheck(check)
    }
}

/// Returns `DimensionMismatch` unless `actual == expected`.
pub(crate) fn ensure_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FilterError::DimensionMismatch {
            context,
            expected,
            actual,
        })
    }
}
