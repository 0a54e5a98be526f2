//! Invariant checking wrapper around any [`StateEstimator`].

use super::ekf::{GaussParams, EKF};
use super::imm::ImmState;
use super::kf::KF;
use super::models::{DynamicModel, MeasurementModel};
use super::{Measurement, StateEstimator};
use crate::config::Tolerances;
use crate::error::{Result, SanityCheck};
use nalgebra::DMatrix;

/// Checks of the filter's own configuration, e.g. a time-dependent
/// Markov matrix evaluated at the elapsed time.
pub trait SelfCheck {
    fn self_check(&mut self, _ts: f64, _tolerances: &Tolerances) -> Result<()> {
        Ok(())
    }
}

impl SelfCheck for KF {}

impl<D: DynamicModel, M: MeasurementModel> SelfCheck for EKF<D, M> {}

/// Invariant check of an estimator's state.
pub trait Inspect {
    fn inspect(&self, tolerances: &Tolerances) -> std::result::Result<(), SanityCheck>;
}

/// Finite, symmetric and positive semi-definite within `tol`.
pub fn covariance_is_valid(P: &DMatrix<f64>, tol: f64) -> bool {
    if !P.is_square() || !P.iter().all(|p| p.is_finite()) {
        return false;
    }
    if P.is_empty() {
        return true;
    }
    let scale = P.amax().max(1.0);
    if (P - P.transpose()).amax() > tol * scale {
        return false;
    }
    if P.diagonal().iter().any(|d| *d < -tol) {
        return false;
    }
    let trace = P.trace();
    if trace < 0.0 {
        return false;
    }
    P.clone().symmetric_eigenvalues().min() >= -tol * trace.max(1.0)
}

fn inspect_gaussian(
    state: &GaussParams,
    hypothesis: Option<usize>,
    tolerances: &Tolerances,
) -> std::result::Result<(), SanityCheck> {
    if !state.x.iter().all(|x| x.is_finite()) {
        return Err(SanityCheck::BadState { hypothesis });
    }
    if state.P.nrows() != state.x.len() || !covariance_is_valid(&state.P, tolerances.covariance) {
        return Err(SanityCheck::BadCovariance { hypothesis });
    }
    Ok(())
}

impl Inspect for GaussParams {
    fn inspect(&self, tolerances: &Tolerances) -> std::result::Result<(), SanityCheck> {
        inspect_gaussian(self, None, tolerances)
    }
}

impl Inspect for ImmState {
    fn inspect(&self, tolerances: &Tolerances) -> std::result::Result<(), SanityCheck> {
        for (i, hypothesis) in self.hypotheses().enumerate() {
            inspect_gaussian(hypothesis.state, Some(i), tolerances)?;
        }
        let probabilities = self.probabilities();
        let sum: f64 = probabilities.iter().sum();
        let in_range = probabilities.iter().all(|p| (0.0..=1.0).contains(p));
        if !in_range || !((sum - 1.0).abs() <= tolerances.probability_sum) {
            return Err(SanityCheck::BadProbabilities { sum });
        }
        if let Some(combined) = &self.combined {
            inspect_gaussian(combined, None, tolerances)?;
        }
        Ok(())
    }
}

/// Delegates to `inner` and then checks the result.
///
/// The wrapped filter's result is written to the state before the check
/// runs, so a failed check leaves the flagged state in place for the
/// caller to inspect or discard.
#[derive(Debug, Clone)]
pub struct Validated<S> {
    inner: S,
    tolerances: Tolerances,
}

impl<S> Validated<S>
where
    S: StateEstimator + SelfCheck,
    S::Params: Inspect,
{
    /// Checks `inner` and the state it will start from before any cycle runs.
    pub fn new(mut inner: S, initial: &S::Params, tolerances: Tolerances) -> Result<Self> {
        inner.self_check(0.0, &tolerances)?;
        initial.inspect(&tolerances)?;
        Ok(Validated { inner, tolerances })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }
}

impl<S> StateEstimator for Validated<S>
where
    S: StateEstimator + SelfCheck,
    S::Params: Inspect,
{
    type Params = S::Params;
    type Control = S::Control;

    fn predict(&mut self, eststate: &mut S::Params, u: Option<&S::Control>, ts: f64) -> Result<()> {
        self.inner.predict(eststate, u, ts)?;
        self.inner.self_check(ts, &self.tolerances)?;
        eststate.inspect(&self.tolerances)?;
        Ok(())
    }

    fn update(&mut self, z: &Measurement, eststate: &mut S::Params) -> Result<()> {
        self.inner.update(z, eststate)?;
        eststate.inspect(&self.tolerances)?;
        Ok(())
    }

    fn update_loglikelihood(&mut self, z: &Measurement, eststate: &mut S::Params) -> Result<f64> {
        let llh = self.inner.update_loglikelihood(z, eststate)?;
        eststate.inspect(&self.tolerances)?;
        Ok(llh)
    }

    fn estimate(&self, eststate: &S::Params) -> Result<GaussParams> {
        self.inner.estimate(eststate)
    }

    fn loglikelihood(&mut self, z: &Measurement, eststate: &S::Params) -> Result<f64> {
        self.inner.loglikelihood(z, eststate)
    }

    fn gate(&mut self, z: &Measurement, eststate: &S::Params, gate_size_square: f64) -> Result<bool> {
        self.inner.gate(z, eststate, gate_size_square)
    }
}
