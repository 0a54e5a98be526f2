pub mod dynamic;
pub mod measurement;
pub mod memoize;

use nalgebra::{DMatrix, DVector};

/// Motion model (predictor).
///
/// `predict` fills the model's own buffers; the accessors read the result
/// of the last call. Buffers are reused, so one model must not be shared
/// between concurrent predictions.
pub trait DynamicModel {
    type Control;

    fn system_size(&self) -> usize;

    fn predict(&mut self, x: &DVector<f64>, u: Option<&Self::Control>, ts: f64);

    /// Predicted mean of the last `predict`
    fn predicted_state(&self) -> &DVector<f64>;

    /// Jacobian of the transition w.r.t. the prior state
    fn F(&self) -> &DMatrix<f64>;

    /// Process noise covariance
    fn Q(&self) -> &DMatrix<f64>;
}

/// Measurement model (projector), same buffer discipline as [`DynamicModel`].
pub trait MeasurementModel {
    fn system_size(&self) -> usize;

    fn measurement_size(&self) -> usize;

    fn compute(&mut self, x: &DVector<f64>);

    fn predicted_measurement(&self) -> &DVector<f64>;

    fn H(&self) -> &DMatrix<f64>;

    /// Innovation `z - zpred`. Override for angular components.
    fn residual(&self, z: &DVector<f64>, zpred: &DVector<f64>) -> DVector<f64> {
        z - zpred
    }
}

// Lets one IMM bank hold different motion models behind `Box<dyn ..>`.
impl<D: DynamicModel + ?Sized> DynamicModel for Box<D> {
    type Control = D::Control;

    fn system_size(&self) -> usize {
        (**self).system_size()
    }

    fn predict(&mut self, x: &DVector<f64>, u: Option<&Self::Control>, ts: f64) {
        (**self).predict(x, u, ts)
    }

    fn predicted_state(&self) -> &DVector<f64> {
        (**self).predicted_state()
    }

    fn F(&self) -> &DMatrix<f64> {
        (**self).F()
    }

    fn Q(&self) -> &DMatrix<f64> {
        (**self).Q()
    }
}

impl<M: MeasurementModel + ?Sized> MeasurementModel for Box<M> {
    fn system_size(&self) -> usize {
        (**self).system_size()
    }

    fn measurement_size(&self) -> usize {
        (**self).measurement_size()
    }

    fn compute(&mut self, x: &DVector<f64>) {
        (**self).compute(x)
    }

    fn predicted_measurement(&self) -> &DVector<f64> {
        (**self).predicted_measurement()
    }

    fn H(&self) -> &DMatrix<f64> {
        (**self).H()
    }

    fn residual(&self, z: &DVector<f64>, zpred: &DVector<f64>) -> DVector<f64> {
        (**self).residual(z, zpred)
    }
}

/// Linear dynamics whose transition and noise depend only on elapsed time.
///
/// Turned into a [`DynamicModel`] by [`memoize::Discretized`] or
/// [`memoize::Memoized`].
pub trait LinearDynamics {
    fn system_size(&self) -> usize;

    /// Writes the transition matrix and process noise for `ts` into `F`, `Q`.
    fn transition(&self, ts: f64, F: &mut DMatrix<f64>, Q: &mut DMatrix<f64>);
}

/// Wraps an angle to (-pi, pi].
pub fn wrap_angle(a: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let w = (a + PI).rem_euclid(TAU) - PI;
    if w <= -PI {
        w + TAU
    } else {
        w
    }
}
