use super::kf::{correct, gain, joseph, loglikelihood, nis, Gain};
use super::models::{DynamicModel, MeasurementModel};
use super::{Measurement, StateEstimator};
use crate::consistency::Consistency;
use crate::error::{ensure_dim, FilterError, Result};
use crate::mixture::{reduce_gaussian_mixture, ReduceMixture};
use crate::stopping::StoppingCondition;
use nalgebra::{DMatrix, DVector};

/// Gaussian belief: mean `x` and covariance `P`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussParams {
    pub x: DVector<f64>,
    pub P: DMatrix<f64>,
}

impl GaussParams {
    pub fn new(x: DVector<f64>, P: DMatrix<f64>) -> Self {
        GaussParams { x, P }
    }

    pub fn dim(&self) -> usize {
        self.x.len()
    }

    pub(crate) fn ensure_dim(&self, n: usize) -> Result<()> {
        ensure_dim("state", n, self.x.len())?;
        ensure_dim("covariance rows", n, self.P.nrows())?;
        ensure_dim("covariance cols", n, self.P.ncols())
    }

    /// Normalised estimation error squared against ground truth `x_gt`.
    pub fn nees(&self, x_gt: &DVector<f64>) -> Result<f64> {
        ensure_dim("ground truth", self.dim(), x_gt.len())?;
        let x_err = &self.x - x_gt;
        let chol = self.P.clone().cholesky().ok_or(FilterError::FilterDivergence {
            context: "state covariance not positive definite",
        })?;
        Ok(x_err.dot(&chol.solve(&x_err)))
    }
}

/// Extended Kalman filter, linearising `dynmod` and `measmod` at the
/// current estimate every cycle.
#[derive(Debug, Clone)]
pub struct EKF<D, M> {
    dynmod: D,
    measmod: M,
}

impl<D, M> EKF<D, M>
where
    D: DynamicModel,
    M: MeasurementModel,
{
    pub fn init(dynmod: D, measmod: M) -> Result<Self> {
        if dynmod.system_size() != measmod.system_size() {
            return Err(FilterError::Configuration {
                description: format!(
                    "motion model has {} states, measurement model expects {}",
                    dynmod.system_size(),
                    measmod.system_size()
                ),
            });
        }
        Ok(EKF { dynmod, measmod })
    }

    pub fn system_size(&self) -> usize {
        self.dynmod.system_size()
    }

    pub fn dynamic_model(&self) -> &D {
        &self.dynmod
    }

    pub fn measurement_model(&self) -> &M {
        &self.measmod
    }

    /// Mutable access for models reconfigured between updates, e.g. the
    /// landmark of a range-bearing sensor.
    pub fn measurement_model_mut(&mut self) -> &mut M {
        &mut self.measmod
    }

    fn check(&self, eststate: &GaussParams, z: &Measurement) -> Result<()> {
        eststate.ensure_dim(self.system_size())?;
        z.ensure_dim(self.measmod.measurement_size())
    }

    /// Innovation `z - h(x)` at the current mean. Leaves `H` in the
    /// measurement model's buffer.
    pub fn innovation_mean(&mut self, eststate: &GaussParams, z: &Measurement) -> Result<DVector<f64>> {
        self.check(eststate, z)?;
        self.measmod.compute(&eststate.x);
        Ok(self.measmod.residual(&z.z, self.measmod.predicted_measurement()))
    }

    /// Innovation and its covariance `S = H·P·Hᵀ + R`.
    pub fn innovation(
        &mut self,
        eststate: &GaussParams,
        z: &Measurement,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let v = self.innovation_mean(eststate, z)?;
        let H = self.measmod.H();
        let S = H * &eststate.P * H.transpose() + &z.R;
        Ok((v, S))
    }

    /// Iterated EKF update: relinearises the measurement model at each
    /// iterate until `stop` reports the step norm has settled. Returns the
    /// number of iterations. On error `eststate` is left untouched.
    pub fn update_iterated(
        &mut self,
        z: &Measurement,
        eststate: &mut GaussParams,
        mut stop: StoppingCondition,
    ) -> Result<usize> {
        self.check(eststate, z)?;
        stop.reset();

        let x_prior = &eststate.x;
        let P = &eststate.P;
        let mut xi = x_prior.clone();
        loop {
            self.measmod.compute(&xi);
            let H = self.measmod.H();
            let v = self.measmod.residual(&z.z, self.measmod.predicted_measurement())
                - H * (x_prior - &xi);
            let Gain { W, .. } = gain(P, H, &z.R)?;
            let x_next = x_prior + W * v;
            let step = (&x_next - &xi).norm();
            xi = x_next;
            log::trace!("iterated update step {} norm {:e}", stop.iteration(), step);
            if stop.is_finished(step) {
                break;
            }
        }

        self.measmod.compute(&xi);
        let H = self.measmod.H();
        let Gain { W, .. } = gain(P, H, &z.R)?;
        let P_new = joseph(P, &W, H, &z.R);
        eststate.x = xi;
        eststate.P = P_new;
        Ok(stop.iteration())
    }
}

impl<D, M> StateEstimator for EKF<D, M>
where
    D: DynamicModel,
    M: MeasurementModel,
{
    type Params = GaussParams;
    type Control = D::Control;

    fn predict(&mut self, eststate: &mut GaussParams, u: Option<&D::Control>, ts: f64) -> Result<()> {
        eststate.ensure_dim(self.system_size())?;
        self.dynmod.predict(&eststate.x, u, ts);

        // F only propagates the covariance, the mean comes from the model.
        let F = self.dynmod.F();
        let P = F * &eststate.P * F.transpose() + self.dynmod.Q();
        eststate.P = super::kf::symmetrize(P);
        eststate.x.copy_from(self.dynmod.predicted_state());
        Ok(())
    }

    fn update(&mut self, z: &Measurement, eststate: &mut GaussParams) -> Result<()> {
        self.update_loglikelihood(z, eststate).map(|_| ())
    }

    fn update_loglikelihood(&mut self, z: &Measurement, eststate: &mut GaussParams) -> Result<f64> {
        let v = self.innovation_mean(eststate, z)?;
        correct(eststate, &v, self.measmod.H(), &z.R)
    }

    fn estimate(&self, eststate: &GaussParams) -> Result<GaussParams> {
        Ok(eststate.clone())
    }

    fn loglikelihood(&mut self, z: &Measurement, eststate: &GaussParams) -> Result<f64> {
        let v = self.innovation_mean(eststate, z)?;
        let Gain { S, .. } = gain(&eststate.P, self.measmod.H(), &z.R)?;
        Ok(loglikelihood(&v, &S))
    }

    fn gate(&mut self, z: &Measurement, eststate: &GaussParams, gate_size_square: f64) -> Result<bool> {
        let nis = self.NIS(eststate, z)?;
        Ok(nis <= gate_size_square)
    }
}

impl<D, M> Consistency for EKF<D, M>
where
    D: DynamicModel,
    M: MeasurementModel,
{
    fn NIS(&mut self, eststate: &GaussParams, z: &Measurement) -> Result<f64> {
        let v = self.innovation_mean(eststate, z)?;
        let Gain { S, .. } = gain(&eststate.P, self.measmod.H(), &z.R)?;
        Ok(nis(&v, &S))
    }
}

impl<D, M> ReduceMixture<GaussParams> for EKF<D, M> {
    fn reduce_mixture(&self, weights: &[f64], components: &[GaussParams]) -> GaussParams {
        reduce_gaussian_mixture(weights, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_estimator::models::dynamic::{Odometry, OdometryDelta, OdometryNoise, CV};
    use crate::state_estimator::models::measurement::{CartesianPosition, RangeBearing};
    use crate::state_estimator::models::memoize::{Discretized, Memoized};
    use crate::state_estimator::models::dynamic::CA;
    use crate::state_estimator::kf::KF;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn pose_filter() -> EKF<Odometry, RangeBearing> {
        EKF::init(
            Odometry::new(OdometryNoise::default()),
            RangeBearing::new(3, Vector2::new(10.0, 0.0)),
        )
        .unwrap()
    }

    #[test]
    fn mismatched_models_are_rejected() {
        let err = EKF::init(Discretized::new(CV::new(1.0)), CartesianPosition::new(5)).unwrap_err();
        assert!(matches!(err, FilterError::Configuration { .. }));
    }

    #[test]
    fn predict_uses_nonlinear_mean() {
        let mut ekf = pose_filter();
        let mut state = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.]), DMatrix::identity(3, 3) * 0.01);
        let u = OdometryDelta {
            translation: 1.0,
            rotation: std::f64::consts::PI,
        };
        ekf.predict(&mut state, Some(&u), 1.0).unwrap();

        // Mid-heading pi/2: straight up, then facing backwards
        assert_relative_eq!(state.x[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(state.x[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(state.x[2].abs(), std::f64::consts::PI, epsilon = 1e-12);
        assert_relative_eq!(state.P.clone(), state.P.transpose(), epsilon = 1e-15);
    }

    #[test]
    fn innovation_at_landmark_ahead() {
        let mut ekf = pose_filter();
        let state = GaussParams::new(DVector::zeros(3), DMatrix::identity(3, 3) * 0.01);
        let z = Measurement::new(
            DVector::from_row_slice(&[10.5, 0.1]),
            DMatrix::from_diagonal(&DVector::from_row_slice(&[0.04, 0.001])),
        );
        let (v, S) = ekf.innovation(&state, &z).unwrap();
        assert_relative_eq!(v, DVector::from_row_slice(&[0.5, 0.1]), epsilon = 1e-12);
        // H = [[-1, 0, 0], [0, -0.1, -1]]
        let S_correct = DMatrix::from_diagonal(&DVector::from_row_slice(&[0.05, 0.0111]));
        assert_relative_eq!(S, S_correct, epsilon = 1e-12);
        assert_relative_eq!(ekf.NIS(&state, &z).unwrap(), 5.0 + 0.01 / 0.0111, epsilon = 1e-9);
    }

    #[test]
    fn linear_models_agree_with_kf() {
        // Same constant-acceleration system through the EKF and the KF
        let ts = 0.5;
        let ca = CA::new(0.2);
        let mut F = DMatrix::zeros(3, 3);
        let mut Q = DMatrix::zeros(3, 3);
        crate::state_estimator::models::LinearDynamics::transition(&ca, ts, &mut F, &mut Q);
        let H = DMatrix::from_row_slice(1, 3, &[1., 0., 0.]);
        let mut kf = KF::init(F, Q, H).unwrap();

        struct PositionOnly(DVector<f64>, DMatrix<f64>);
        impl MeasurementModel for PositionOnly {
            fn system_size(&self) -> usize {
                3
            }
            fn measurement_size(&self) -> usize {
                1
            }
            fn compute(&mut self, x: &DVector<f64>) {
                self.0[0] = x[0];
            }
            fn predicted_measurement(&self) -> &DVector<f64> {
                &self.0
            }
            fn H(&self) -> &DMatrix<f64> {
                &self.1
            }
        }
        let proj = PositionOnly(DVector::zeros(1), DMatrix::from_row_slice(1, 3, &[1., 0., 0.]));
        let mut ekf = EKF::init(Memoized::new(ca), proj).unwrap();

        let init = GaussParams::new(DVector::from_row_slice(&[0., 1., 0.]), DMatrix::identity(3, 3));
        let (mut a, mut b) = (init.clone(), init);
        for k in 0..8 {
            let z = Measurement::new(DVector::from_element(1, 0.3 * k as f64), DMatrix::from_element(1, 1, 0.5));
            kf.step(&z, &mut a, None, ts).unwrap();
            ekf.step(&z, &mut b, None, ts).unwrap();
        }
        assert_relative_eq!(a.x, b.x, epsilon = 1e-10);
        assert_relative_eq!(a.P, b.P, epsilon = 1e-10);
    }

    #[test]
    fn range_bearing_update_pulls_towards_measurement() {
        let mut ekf = pose_filter();
        let mut state = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.]), DMatrix::identity(3, 3));
        // Landmark at (10, 0) seen 9 m away: robot is closer than believed
        let z = Measurement::new(
            DVector::from_row_slice(&[9.0, 0.0]),
            DMatrix::from_diagonal(&DVector::from_row_slice(&[0.01, 0.001])),
        );
        let before = state.P.trace();
        ekf.update(&z, &mut state).unwrap();
        assert!(state.x[0] > 0.5);
        assert!(state.P.trace() < before);
    }

    #[test]
    fn landmark_can_be_reconfigured_between_updates() {
        let mut ekf = pose_filter();
        let mut state = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.]), DMatrix::identity(3, 3));
        ekf.measurement_model_mut().set_landmark(Vector2::new(0.0, 5.0));
        let z = Measurement::new(
            DVector::from_row_slice(&[5.0, std::f64::consts::FRAC_PI_2]),
            DMatrix::identity(2, 2) * 0.01,
        );
        let v = ekf.innovation_mean(&state, &z).unwrap();
        assert_relative_eq!(v, DVector::zeros(2), epsilon = 1e-12);
        ekf.update(&z, &mut state).unwrap();
        assert_relative_eq!(state.x, DVector::zeros(3), epsilon = 1e-12);
    }

    #[test]
    fn iterated_update_converges() {
        let mut ekf = pose_filter();
        let mut state = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.]), DMatrix::identity(3, 3));
        let z = Measurement::new(
            DVector::from_row_slice(&[8.0, 0.2]),
            DMatrix::from_diagonal(&DVector::from_row_slice(&[0.01, 0.001])),
        );
        let stop = StoppingCondition::new(20, 1e-10);
        let iterations = ekf.update_iterated(&z, &mut state, stop).unwrap();
        assert!(iterations > 1 && iterations < 20, "iterations = {}", iterations);
        // The converged iterate explains the measurement better than the prior
        let v = ekf.innovation_mean(&state, &z).unwrap();
        assert!(v.norm() < 1.0);
    }

    #[test]
    fn nis_and_nees() {
        let mut ekf = pose_filter();
        let state = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.]), DMatrix::identity(3, 3));
        let z = Measurement::new(DVector::from_row_slice(&[10.0, 0.0]), DMatrix::identity(2, 2));
        assert_relative_eq!(ekf.NIS(&state, &z).unwrap(), 0.0, epsilon = 1e-12);
        let x_gt = DVector::from_row_slice(&[1., 2., 0.]);
        assert_relative_eq!(ekf.NEES(&state, &x_gt).unwrap(), 5.0, epsilon = 1e-12);
    }
}
