pub mod ekf;
pub mod imm;
pub mod kf;
pub mod markov;
pub mod models;
pub mod validated;

use crate::error::{ensure_dim, Result};
use ekf::GaussParams;
use nalgebra::{DMatrix, DVector};

/// A measurement value together with its noise covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub z: DVector<f64>,
    pub R: DMatrix<f64>,
}

impl Measurement {
    pub fn new(z: DVector<f64>, R: DMatrix<f64>) -> Self {
        Measurement { z, R }
    }

    /// Measurement with isotropic noise `sigma`.
    pub fn isotropic(z: DVector<f64>, sigma: f64) -> Self {
        let m = z.len();
        let R = DMatrix::identity(m, m) * sigma.powi(2);
        Measurement { z, R }
    }

    pub fn dim(&self) -> usize {
        self.z.len()
    }

    /// Checks that `z` and `R` both have dimension `m`.
    pub(crate) fn ensure_dim(&self, m: usize) -> Result<()> {
        ensure_dim("measurement", m, self.z.len())?;
        ensure_dim("measurement noise rows", m, self.R.nrows())?;
        ensure_dim("measurement noise cols", m, self.R.ncols())
    }
}

/// Recursive Bayesian estimator operating in place on caller owned state.
///
/// Implementors own scratch buffers that every call overwrites, hence the
/// `&mut self` receivers: one estimator serves one thread at a time.
pub trait StateEstimator {
    type Params;
    type Control;

    fn predict(
        &mut self,
        eststate: &mut Self::Params,
        u: Option<&Self::Control>,
        ts: f64,
    ) -> Result<()>;

    fn update(&mut self, z: &Measurement, eststate: &mut Self::Params) -> Result<()>;

    fn step(
        &mut self,
        z: &Measurement,
        eststate: &mut Self::Params,
        u: Option<&Self::Control>,
        ts: f64,
    ) -> Result<()> {
        self.predict(eststate, u, ts)?;
        self.update(z, eststate)
    }

    /// Single Gaussian summary of `eststate`.
    fn estimate(&self, eststate: &Self::Params) -> Result<GaussParams>;

    /// Log density of `z` under the predicted measurement distribution.
    fn loglikelihood(&mut self, z: &Measurement, eststate: &Self::Params) -> Result<f64>;

    /// Updates `eststate` with `z` and returns the log-likelihood of `z`
    /// evaluated before the update.
    fn update_loglikelihood(&mut self, z: &Measurement, eststate: &mut Self::Params) -> Result<f64> {
        let llh = self.loglikelihood(z, eststate)?;
        self.update(z, eststate)?;
        Ok(llh)
    }

    fn gate(
        &mut self,
        z: &Measurement,
        eststate: &Self::Params,
        gate_size_square: f64,
    ) -> Result<bool>;
}
