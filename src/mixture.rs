//! Weighted collections of estimates and their moment-matched reduction.

use crate::state_estimator::ekf::GaussParams;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, PartialEq)]
pub struct MixtureParameters<T> {
    pub weights: Vec<f64>,
    pub components: Vec<T>,
}

impl<T> MixtureParameters<T> {
    pub fn new(weights: Vec<f64>, components: Vec<T>) -> Self {
        MixtureParameters {
            weights,
            components,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.weights.iter().copied().zip(self.components.iter())
    }
}

pub trait ReduceMixture<T> {
    fn reduce_mixture(&self, weights: &[f64], components: &[T]) -> T;
}

/// Moment matches a Gaussian mixture with a single Gaussian.
///
/// Mean is the weighted mean; covariance is the weighted covariance plus the
/// weighted spread of the component means around it. Weights are used as
/// given and must sum to one.
pub fn reduce_gaussian_mixture(weights: &[f64], components: &[GaussParams]) -> GaussParams {
    let n = components.first().map_or(0, |c| c.x.len());

    let mut x = DVector::zeros(n);
    for (w, c) in weights.iter().zip(components) {
        x.axpy(*w, &c.x, 1.0);
    }

    let mut P = DMatrix::zeros(n, n);
    for (w, c) in weights.iter().zip(components) {
        let dx = &c.x - &x;
        P += (&c.P + &dx * dx.transpose()) * *w;
    }
    GaussParams::new(x, crate::state_estimator::kf::symmetrize(P))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn single_component_is_identity() {
        let c = GaussParams::new(
            DVector::from_row_slice(&[1., 2.]),
            DMatrix::from_row_slice(2, 2, &[2., 0.5, 0.5, 1.]),
        );
        let r = reduce_gaussian_mixture(&[1.0], &[c.clone()]);
        assert_relative_eq!(r.x, c.x, epsilon = 1e-15);
        assert_relative_eq!(r.P, c.P, epsilon = 1e-15);
    }

    #[test]
    fn spread_of_means_adds_to_covariance() {
        let a = GaussParams::new(DVector::from_row_slice(&[-1.]), DMatrix::from_element(1, 1, 1.));
        let b = GaussParams::new(DVector::from_row_slice(&[1.]), DMatrix::from_element(1, 1, 1.));
        let r = reduce_gaussian_mixture(&[0.5, 0.5], &[a, b]);
        assert_relative_eq!(r.x[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(r.P[(0, 0)], 2.0, epsilon = 1e-15);
    }

    #[test]
    fn unequal_weights() {
        let a = GaussParams::new(DVector::from_row_slice(&[0., 0.]), DMatrix::identity(2, 2));
        let b = GaussParams::new(DVector::from_row_slice(&[4., 0.]), DMatrix::identity(2, 2) * 3.);
        let r = reduce_gaussian_mixture(&[0.75, 0.25], &[a, b]);
        assert_relative_eq!(r.x, DVector::from_row_slice(&[1., 0.]), epsilon = 1e-15);
        // 0.75*(1 + 1) + 0.25*(3 + 9)
        assert_relative_eq!(r.P[(0, 0)], 4.5, epsilon = 1e-12);
        assert_relative_eq!(r.P[(1, 1)], 1.5, epsilon = 1e-12);
        assert_relative_eq!(r.P[(0, 1)], 0.0, epsilon = 1e-15);
    }
}
