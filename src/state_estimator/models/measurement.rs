use super::{wrap_angle, MeasurementModel};
use nalgebra::{DMatrix, DVector, Vector2};

/// Observes the position, assumed to be the first two states.
#[derive(Debug, Clone)]
pub struct CartesianPosition {
    z_pred: DVector<f64>,
    H: DMatrix<f64>,
}

impl CartesianPosition {
    pub fn new(n: usize) -> Self {
        CartesianPosition {
            z_pred: DVector::zeros(2),
            H: DMatrix::identity(2, n),
        }
    }
}

impl MeasurementModel for CartesianPosition {
    fn system_size(&self) -> usize {
        self.H.ncols()
    }

    fn measurement_size(&self) -> usize {
        2
    }

    fn compute(&mut self, x: &DVector<f64>) {
        self.z_pred.copy_from(&x.rows(0, 2));
    }

    fn predicted_measurement(&self) -> &DVector<f64> {
        &self.z_pred
    }

    fn H(&self) -> &DMatrix<f64> {
        &self.H
    }
}

/// Range and bearing from a robot pose `[x, y, theta, ...]` to a landmark.
///
/// The landmark is reconfigured with [`RangeBearing::set_landmark`] before
/// each `compute` when several landmarks are observed in one cycle.
#[derive(Debug, Clone)]
pub struct RangeBearing {
    landmark: Vector2<f64>,
    z_pred: DVector<f64>,
    H: DMatrix<f64>,
}

impl RangeBearing {
    pub fn new(n: usize, landmark: Vector2<f64>) -> Self {
        RangeBearing {
            landmark,
            z_pred: DVector::zeros(2),
            H: DMatrix::zeros(2, n.max(3)),
        }
    }

    pub fn set_landmark(&mut self, landmark: Vector2<f64>) {
        self.landmark = landmark;
    }

    pub fn landmark(&self) -> &Vector2<f64> {
        &self.landmark
    }
}

impl MeasurementModel for RangeBearing {
    fn system_size(&self) -> usize {
        self.H.ncols()
    }

    fn measurement_size(&self) -> usize {
        2
    }

    fn compute(&mut self, x: &DVector<f64>) {
        let dx = self.landmark[0] - x[0];
        let dy = self.landmark[1] - x[1];
        let q = dx * dx + dy * dy;
        let r = q.sqrt();

        self.z_pred[0] = r;
        self.z_pred[1] = wrap_angle(dy.atan2(dx) - x[2]);

        // The landmark coinciding with the robot leaves the bearing undefined;
        // the Jacobian is zeroed rather than NaN.
        self.H.fill(0.0);
        if r > f64::EPSILON {
            self.H[(0, 0)] = -dx / r;
            self.H[(0, 1)] = -dy / r;
            self.H[(1, 0)] = dy / q;
            self.H[(1, 1)] = -dx / q;
            self.H[(1, 2)] = -1.0;
        }
    }

    fn predicted_measurement(&self) -> &DVector<f64> {
        &self.z_pred
    }

    fn H(&self) -> &DMatrix<f64> {
        &self.H
    }

    fn residual(&self, z: &DVector<f64>, zpred: &DVector<f64>) -> DVector<f64> {
        let mut v = z - zpred;
        v[1] = wrap_angle(v[1]);
        v
    }
}
