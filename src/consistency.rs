//! Filter consistency measures.

use crate::error::Result;
use crate::state_estimator::ekf::GaussParams;
use crate::state_estimator::Measurement;
use nalgebra::DVector;

pub trait Consistency {
    /// Normalised innovation squared of `z` against the predicted measurement.
    fn NIS(&mut self, eststate: &GaussParams, z: &Measurement) -> Result<f64>;

    /// Normalised estimation error squared against ground truth.
    fn NEES(&self, eststate: &GaussParams, x_gt: &DVector<f64>) -> Result<f64> {
        eststate.nees(x_gt)
    }
}
