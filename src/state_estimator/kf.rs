//! Linear Kalman filter and the correction step it shares with the EKF.
//!
//! Transition `F`, control input `G`, process noise `Q` and observation `H`
//! are fixed at construction and may be swapped between cycles with
//! [`KF::set_transition`] / [`KF::set_observation`]. Models recomputed
//! every cycle go through [`EKF`](super::ekf::EKF) instead.

use super::ekf::GaussParams;
use super::{Measurement, StateEstimator};
use crate::consistency::Consistency;
use crate::error::{ensure_dim, FilterError, Result};
use crate::mixture::{reduce_gaussian_mixture, ReduceMixture};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::TAU as _2_PI;

/// Factorised innovation covariance `S = H·P·Hᵀ + R` and gain `W = P·Hᵀ·S⁻¹`.
pub(crate) struct Gain {
    pub W: DMatrix<f64>,
    pub S: Cholesky<f64, Dyn>,
}

pub(crate) fn gain(P: &DMatrix<f64>, H: &DMatrix<f64>, R: &DMatrix<f64>) -> Result<Gain> {
    let HP = H * P;
    let S = &HP * H.transpose() + R;
    if !S.iter().all(|s| s.is_finite()) {
        return Err(FilterError::FilterDivergence {
            context: "non-finite innovation covariance",
        });
    }
    let S = S.cholesky().ok_or(FilterError::FilterDivergence {
        context: "innovation covariance not positive definite",
    })?;
    // P is symmetric, so (S⁻¹·H·P)ᵀ = P·Hᵀ·S⁻¹
    let W = S.solve(&HP).transpose();
    Ok(Gain { W, S })
}

/// Joseph form covariance update, symmetrised.
pub(crate) fn joseph(
    P: &DMatrix<f64>,
    W: &DMatrix<f64>,
    H: &DMatrix<f64>,
    R: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = P.nrows();
    let Jo = DMatrix::identity(n, n) - W * H;
    symmetrize(&Jo * P * Jo.transpose() + W * R * W.transpose())
}

pub(crate) fn symmetrize(P: DMatrix<f64>) -> DMatrix<f64> {
    (&P + P.transpose()) * 0.5
}

/// Log density of innovation `v` under `N(0, S)`.
pub(crate) fn loglikelihood(v: &DVector<f64>, S: &Cholesky<f64, Dyn>) -> f64 {
    let m = v.len() as f64;
    let nis = v.dot(&S.solve(v));
    let log_det = 2.0 * S.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    -0.5 * (nis + log_det + m * _2_PI.ln())
}

pub(crate) fn nis(v: &DVector<f64>, S: &Cholesky<f64, Dyn>) -> f64 {
    v.dot(&S.solve(v))
}

/// Kalman correction with innovation `v`. Returns the log-likelihood of
/// `v`. On error `eststate` is left untouched.
pub(crate) fn correct(
    eststate: &mut GaussParams,
    v: &DVector<f64>,
    H: &DMatrix<f64>,
    R: &DMatrix<f64>,
) -> Result<f64> {
    let Gain { W, S } = gain(&eststate.P, H, R)?;
    let llh = loglikelihood(v, &S);
    let P = joseph(&eststate.P, &W, H, R);
    eststate.x += &W * v;
    eststate.P = P;
    Ok(llh)
}

#[derive(Debug, Clone)]
pub struct KF {
    F: DMatrix<f64>,
    Q: DMatrix<f64>,
    G: Option<DMatrix<f64>>,
    H: DMatrix<f64>,
}

impl KF {
    pub fn init(F: DMatrix<f64>, Q: DMatrix<f64>, H: DMatrix<f64>) -> Result<Self> {
        let n = F.nrows();
        ensure_dim("transition cols", n, F.ncols())?;
        ensure_dim("process noise rows", n, Q.nrows())?;
        ensure_dim("process noise cols", n, Q.ncols())?;
        ensure_dim("observation cols", n, H.ncols())?;
        Ok(KF { F, Q, G: None, H })
    }

    /// Adds a control input matrix `G`, making `x ← F·x + G·u`.
    pub fn with_control(mut self, G: DMatrix<f64>) -> Result<Self> {
        ensure_dim("control matrix rows", self.system_size(), G.nrows())?;
        self.G = Some(G);
        Ok(self)
    }

    pub fn set_transition(&mut self, F: DMatrix<f64>, Q: DMatrix<f64>) -> Result<()> {
        let n = self.system_size();
        ensure_dim("transition rows", n, F.nrows())?;
        ensure_dim("transition cols", n, F.ncols())?;
        ensure_dim("process noise rows", n, Q.nrows())?;
        ensure_dim("process noise cols", n, Q.ncols())?;
        self.F = F;
        self.Q = Q;
        Ok(())
    }

    pub fn set_observation(&mut self, H: DMatrix<f64>) -> Result<()> {
        ensure_dim("observation cols", self.system_size(), H.ncols())?;
        self.H = H;
        Ok(())
    }

    pub fn system_size(&self) -> usize {
        self.F.nrows()
    }

    pub fn measurement_size(&self) -> usize {
        self.H.nrows()
    }

    fn innovation(&self, z: &Measurement, eststate: &GaussParams) -> Result<DVector<f64>> {
        eststate.ensure_dim(self.system_size())?;
        z.ensure_dim(self.measurement_size())?;
        Ok(&z.z - &self.H * &eststate.x)
    }
}

impl StateEstimator for KF {
    type Params = GaussParams;
    type Control = DVector<f64>;

    fn predict(
        &mut self,
        eststate: &mut GaussParams,
        u: Option<&DVector<f64>>,
        _ts: f64,
    ) -> Result<()> {
        eststate.ensure_dim(self.system_size())?;
        let mut x = &self.F * &eststate.x;
        // Without G a supplied control has nowhere to enter and is omitted.
        if let (Some(G), Some(u)) = (&self.G, u) {
            ensure_dim("control", G.ncols(), u.len())?;
            x += G * u;
        }
        let F = &self.F;
        eststate.P = symmetrize(F * &eststate.P * F.transpose() + &self.Q);
        eststate.x = x;
        Ok(())
    }

    fn update(&mut self, z: &Measurement, eststate: &mut GaussParams) -> Result<()> {
        self.update_loglikelihood(z, eststate).map(|_| ())
    }

    fn update_loglikelihood(&mut self, z: &Measurement, eststate: &mut GaussParams) -> Result<f64> {
        let v = self.innovation(z, eststate)?;
        correct(eststate, &v, &self.H, &z.R)
    }

    fn estimate(&self, eststate: &GaussParams) -> Result<GaussParams> {
        Ok(eststate.clone())
    }

    fn loglikelihood(&mut self, z: &Measurement, eststate: &GaussParams) -> Result<f64> {
        let v = self.innovation(z, eststate)?;
        let Gain { S, .. } = gain(&eststate.P, &self.H, &z.R)?;
        Ok(loglikelihood(&v, &S))
    }

    fn gate(&mut self, z: &Measurement, eststate: &GaussParams, gate_size_square: f64) -> Result<bool> {
        Ok(self.NIS(eststate, z)? <= gate_size_square)
    }
}

impl Consistency for KF {
    fn NIS(&mut self, eststate: &GaussParams, z: &Measurement) -> Result<f64> {
        let v = self.innovation(z, eststate)?;
        let Gain { S, .. } = gain(&eststate.P, &self.H, &z.R)?;
        Ok(nis(&v, &S))
    }
}

impl ReduceMixture<GaussParams> for KF {
    fn reduce_mixture(&self, weights: &[f64], components: &[GaussParams]) -> GaussParams {
        reduce_gaussian_mixture(weights, components)
    }
}
