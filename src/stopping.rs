//! Termination test for iterative numeric procedures.

/// Error change below which two successive iterations count as a plateau.
pub const DEFAULT_PLATEAU_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BelowThreshold,
    Plateau,
    MaxIterations,
}

/// Tracks iteration count and previous error of an iterative fit.
///
/// Independent of any filter; copy it to reuse a configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingCondition {
    max_iterations: usize,
    threshold: f64,
    epsilon: f64,
    iteration: usize,
    previous_error: Option<f64>,
}

impl StoppingCondition {
    pub fn new(max_iterations: usize, threshold: f64) -> Self {
        StoppingCondition {
            max_iterations,
            threshold,
            epsilon: DEFAULT_PLATEAU_EPSILON,
            iteration: 0,
            previous_error: None,
        }
    }

    pub fn with_plateau(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Records `error` for one iteration and reports why to stop, if at all.
    pub fn check(&mut self, error: f64) -> Option<StopReason> {
        self.iteration += 1;
        let previous = self.previous_error.replace(error);

        let reason = if error < self.threshold {
            Some(StopReason::BelowThreshold)
        } else if matches!(previous, Some(p) if (p - error).abs() < self.epsilon) {
            Some(StopReason::Plateau)
        } else if self.iteration >= self.max_iterations {
            Some(StopReason::MaxIterations)
        } else {
            None
        };
        if let Some(reason) = reason {
            log::debug!(
                "stopping after {} iterations ({:?}), error {:e}",
                self.iteration,
                reason,
                error
            );
        }
        reason
    }

    pub fn is_finished(&mut self, error: f64) -> bool {
        self.check(error).is_some()
    }

    pub fn reset(&mut self) {
        self.iteration = 0;
        self.previous_error = None;
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn previous_error(&self) -> Option<f64> {
        self.previous_error
    }
}
