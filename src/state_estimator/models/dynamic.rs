use super::{wrap_angle, DynamicModel, LinearDynamics};
use nalgebra::{DMatrix, DVector, Matrix3x2, Vector2};
use serde::{Deserialize, Serialize};

/// Constant velocity in the plane, state `[x, y, u, v, ...]`.
///
/// Extra trailing states (e.g. a turn rate shared with [`CT`] in an IMM
/// bank) are held constant without process noise.
#[derive(Debug, Clone)]
pub struct CV {
    // Acceleration noise std
    sigma_a: f64,
    n: usize,
}

impl CV {
    pub fn new(sigma_a: f64) -> Self {
        CV { sigma_a, n: 4 }
    }

    /// CV acting on an `n >= 4` dimensional state.
    pub fn with_dim(sigma_a: f64, n: usize) -> Self {
        CV {
            sigma_a,
            n: n.max(4),
        }
    }
}

impl LinearDynamics for CV {
    fn system_size(&self) -> usize {
        self.n
    }

    fn transition(&self, ts: f64, F: &mut DMatrix<f64>, Q: &mut DMatrix<f64>) {
        F.fill_with_identity();
        F.view_mut((0, 2), (2, 2)).fill_diagonal(ts);

        Q.fill(0.0);
        Q.view_mut((0, 0), (2, 2)).fill_diagonal(ts.powi(3) / 3.0);
        Q.view_mut((2, 2), (2, 2)).fill_diagonal(ts);
        Q.view_mut((0, 2), (2, 2)).fill_diagonal(ts.powi(2) / 2.0);
        Q.view_mut((2, 0), (2, 2)).fill_diagonal(ts.powi(2) / 2.0);
        *Q *= self.sigma_a.powi(2);
    }
}

/// Constant acceleration along one axis, state `[p, v, a]`, driven by
/// white jerk.
#[derive(Debug, Clone)]
pub struct CA {
    sigma_j: f64,
}

impl CA {
    pub fn new(sigma_j: f64) -> Self {
        CA { sigma_j }
    }
}

impl LinearDynamics for CA {
    fn system_size(&self) -> usize {
        3
    }

    fn transition(&self, ts: f64, F: &mut DMatrix<f64>, Q: &mut DMatrix<f64>) {
        let t2 = ts * ts;
        let t3 = t2 * ts;
        // Column-major
        #[rustfmt::skip]
        let f = [
            1., 0., 0.,
            ts, 1., 0.,
            t2 / 2.0, ts, 1.,
        ];
        #[rustfmt::skip]
        let q = [
            t3 * t2 / 20.0, t2 * t2 / 8.0, t3 / 6.0,
            t2 * t2 / 8.0,  t3 / 3.0,      t2 / 2.0,
            t3 / 6.0,       t2 / 2.0,      ts,
        ];
        F.copy_from_slice(&f);
        Q.copy_from_slice(&q);
        *Q *= self.sigma_j.powi(2);
    }
}

/// Coordinated turn, state `[x, y, u, v, omega]`.
#[derive(Debug, Clone)]
pub struct CT {
    sigma_a: f64,
    sigma_w: f64,
    x_pred: DVector<f64>,
    F: DMatrix<f64>,
    Q: DMatrix<f64>,
}

impl CT {
    pub fn new(sigma_a: f64, sigma_w: f64) -> Self {
        CT {
            sigma_a,
            sigma_w,
            x_pred: DVector::zeros(5),
            F: DMatrix::identity(5, 5),
            Q: DMatrix::zeros(5, 5),
        }
    }
}

// Computes sin(x)/x
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        1.0 - x.powi(2) / 6.0
    } else {
        x.sin() / x
    }
}

// Computes (1 - cos(x))/x
fn cosc(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        x / 2.0 - x.powi(3) / 24.0
    } else {
        (1.0 - x.cos()) / x
    }
}

fn dsinc(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        -x / 3.0
    } else {
        (x.cos() - sinc(x)) / x
    }
}

fn dcosc(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        0.5 - x.powi(2) / 6.0
    } else {
        (x.sin() - cosc(x)) / x
    }
}

impl DynamicModel for CT {
    type Control = ();

    fn system_size(&self) -> usize {
        5
    }

    fn predict(&mut self, x: &DVector<f64>, _u: Option<&()>, ts: f64) {
        let (x0, y0, u0, v0, omega) = (x[0], x[1], x[2], x[3], x[4]);

        let theta = omega * ts;
        let sth = theta.sin();
        let cth = theta.cos();

        let sincth = sinc(theta);
        let coscth = cosc(theta);
        let dsincth = dsinc(theta);
        let dcoscth = dcosc(theta);

        self.x_pred.copy_from_slice(&[
            x0 + ts * u0 * sincth - ts * v0 * coscth,
            y0 + ts * u0 * coscth + ts * v0 * sincth,
            u0 * cth - v0 * sth,
            u0 * sth + v0 * cth,
            omega,
        ]);

        #[rustfmt::skip]
        let jac = DMatrix::from_row_slice(5, 5, &[
            1., 0., ts * sincth, -ts * coscth, ts.powi(2) * (u0 * dsincth - v0 * dcoscth),
            0., 1., ts * coscth,  ts * sincth, ts.powi(2) * (u0 * dcoscth + v0 * dsincth),
            0., 0., cth,         -sth,         -ts * (u0 * sth + v0 * cth),
            0., 0., sth,          cth,          ts * (u0 * cth - v0 * sth),
            0., 0., 0.,           0.,           1.,
        ]);
        self.F.copy_from(&jac);

        self.Q.fill(0.0);
        self.Q.view_mut((0, 0), (2, 2)).fill_diagonal(ts.powi(3) / 3.0);
        self.Q.view_mut((2, 2), (2, 2)).fill_diagonal(ts);
        self.Q.view_mut((0, 2), (2, 2)).fill_diagonal(ts.powi(2) / 2.0);
        self.Q.view_mut((2, 0), (2, 2)).fill_diagonal(ts.powi(2) / 2.0);
        self.Q *= self.sigma_a.powi(2);
        self.Q[(4, 4)] = ts * self.sigma_w.powi(2);
    }

    fn predicted_state(&self) -> &DVector<f64> {
        &self.x_pred
    }

    fn F(&self) -> &DMatrix<f64> {
        &self.F
    }

    fn Q(&self) -> &DMatrix<f64> {
        &self.Q
    }
}

/// Relative motion reported by wheel odometry between two filter cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    /// Distance travelled along the mid-motion heading
    pub translation: f64,
    /// Heading change
    pub rotation: f64,
}

/// Odometry noise, variances grow with the magnitude of the motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryNoise {
    pub translation_per_translation: f64,
    pub translation_per_rotation: f64,
    pub rotation_per_rotation: f64,
    pub rotation_per_translation: f64,
    /// Per-second variance added to every state, keeps Q non-singular when
    /// the robot stands still
    pub stationary: f64,
}

impl Default for OdometryNoise {
    fn default() -> Self {
        OdometryNoise {
            translation_per_translation: 0.01,
            translation_per_rotation: 0.001,
            rotation_per_rotation: 0.01,
            rotation_per_translation: 0.001,
            stationary: 1e-6,
        }
    }
}

/// Planar robot pose `[x, y, theta]` driven by [`OdometryDelta`] controls.
#[derive(Debug, Clone)]
pub struct Odometry {
    noise: OdometryNoise,
    x_pred: DVector<f64>,
    F: DMatrix<f64>,
    Q: DMatrix<f64>,
}

impl Odometry {
    pub fn new(noise: OdometryNoise) -> Self {
        Odometry {
            noise,
            x_pred: DVector::zeros(3),
            F: DMatrix::identity(3, 3),
            Q: DMatrix::zeros(3, 3),
        }
    }
}

impl DynamicModel for Odometry {
    type Control = OdometryDelta;

    fn system_size(&self) -> usize {
        3
    }

    fn predict(&mut self, x: &DVector<f64>, u: Option<&OdometryDelta>, ts: f64) {
        self.x_pred.copy_from(x);
        self.F.fill_with_identity();
        self.Q.fill_with_identity();
        self.Q *= self.noise.stationary * ts.abs();

        // No odometry: the pose is held, only the stationary noise grows.
        let u = match u {
            Some(u) => u,
            None => return,
        };

        let (t, r) = (u.translation, u.rotation);
        let heading = x[2] + r / 2.0;
        let (s, c) = heading.sin_cos();

        self.x_pred[0] += t * c;
        self.x_pred[1] += t * s;
        self.x_pred[2] = wrap_angle(x[2] + r);

        self.F[(0, 2)] = -t * s;
        self.F[(1, 2)] = t * c;

        // Jacobian of the motion w.r.t. (translation, rotation)
        let V = Matrix3x2::new(c, -t * s / 2.0, s, t * c / 2.0, 0., 1.);
        let n = &self.noise;
        let M = Vector2::new(
            n.translation_per_translation * t * t + n.translation_per_rotation * r * r,
            n.rotation_per_rotation * r * r + n.rotation_per_translation * t * t,
        );
        let Qu = V * nalgebra::Matrix2::from_diagonal(&M) * V.transpose();
        for i in 0..3 {
            for j in 0..3 {
                self.Q[(i, j)] += Qu[(i, j)];
            }
        }
    }

    fn predicted_state(&self) -> &DVector<f64> {
        &self.x_pred
    }

    fn F(&self) -> &DMatrix<f64> {
        &self.F
    }

    fn Q(&self) -> &DMatrix<f64> {
        &self.Q
    }
}
