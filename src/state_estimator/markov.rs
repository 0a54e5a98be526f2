//! Markov mode-switching matrices for the IMM.
//!
//! `PI[(i, j)]` is the probability of switching from mode `i` to mode `j`
//! between two cycles; every row sums to one.

use crate::config::Tolerances;
use crate::error::{FilterError, Result};
use nalgebra::DMatrix;

/// Supplies the transition matrix, possibly depending on elapsed time.
pub trait MarkovTransition {
    fn modes(&self) -> usize;

    fn matrix(&mut self, ts: f64) -> &DMatrix<f64>;
}

/// Checks that `PI` is square, has entries in [0, 1] and rows summing to one.
pub fn validate_transition_matrix(PI: &DMatrix<f64>, tolerances: &Tolerances) -> Result<()> {
    let (m, n) = PI.shape();
    if m != n || m == 0 {
        return Err(FilterError::InvalidTransitionMatrix {
            reason: format!("expected a non-empty square matrix, got {}x{}", m, n),
        });
    }
    for (i, row) in PI.row_iter().enumerate() {
        if let Some(p) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(FilterError::InvalidTransitionMatrix {
                reason: format!("row {} has entry {} outside [0, 1]", i, p),
            });
        }
        let sum = row.sum();
        if (sum - 1.0).abs() > tolerances.transition_row_sum {
            return Err(FilterError::InvalidTransitionMatrix {
                reason: format!("row {} sums to {}, expected 1", i, sum),
            });
        }
    }
    Ok(())
}

/// Time-invariant transition matrix, validated once at construction.
#[derive(Debug, Clone)]
pub struct FixedTransition {
    PI: DMatrix<f64>,
}

impl FixedTransition {
    pub fn new(PI: DMatrix<f64>, tolerances: &Tolerances) -> Result<Self> {
        validate_transition_matrix(&PI, tolerances)?;
        Ok(FixedTransition { PI })
    }
}

impl MarkovTransition for FixedTransition {
    fn modes(&self) -> usize {
        self.PI.nrows()
    }

    fn matrix(&mut self, _ts: f64) -> &DMatrix<f64> {
        &self.PI
    }
}

/// Transition matrix derived from mean sojourn times `tau`.
///
/// Mode `i` persists over `ts` with probability `exp(-ts / tau_i)`; the
/// rest is split evenly over the other modes. A single mode always stays.
#[derive(Debug, Clone)]
pub struct SojournTransition {
    tau: Vec<f64>,
    PI: DMatrix<f64>,
}

impl SojournTransition {
    pub fn new(tau: Vec<f64>) -> Result<Self> {
        if tau.is_empty() {
            return Err(FilterError::Configuration {
                description: "at least one sojourn time is required".into(),
            });
        }
        if let Some(t) = tau.iter().find(|t| !(**t > 0.0)) {
            return Err(FilterError::Configuration {
                description: format!("sojourn times must be positive, got {}", t),
            });
        }
        let n = tau.len();
        Ok(SojournTransition {
            tau,
            PI: DMatrix::identity(n, n),
        })
    }
}

impl MarkovTransition for SojournTransition {
    fn modes(&self) -> usize {
        self.tau.len()
    }

    fn matrix(&mut self, ts: f64) -> &DMatrix<f64> {
        let n = self.tau.len();
        if n == 1 {
            return &self.PI;
        }
        for (i, tau) in self.tau.iter().enumerate() {
            let stay = (-ts.max(0.0) / tau).exp();
            let leave = (1.0 - stay) / (n - 1) as f64;
            for j in 0..n {
                self.PI[(i, j)] = if i == j { stay } else { leave };
            }
        }
        &self.PI
    }
}
