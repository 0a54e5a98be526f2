//! Adapters turning [`LinearDynamics`] into a [`DynamicModel`].
//!
//! [`Memoized`] caches `F` and `Q` keyed by the last elapsed time and only
//! recomputes them when it changes. The predicted mean is always
//! recomputed from the incoming state, so caching never changes results.

use super::{DynamicModel, LinearDynamics};
use nalgebra::{DMatrix, DVector};

/// Recomputes `F` and `Q` on every prediction.
#[derive(Debug, Clone)]
pub struct Discretized<L> {
    model: L,
    x_pred: DVector<f64>,
    F: DMatrix<f64>,
    Q: DMatrix<f64>,
}

impl<L: LinearDynamics> Discretized<L> {
    pub fn new(model: L) -> Self {
        let n = model.system_size();
        Discretized {
            model,
            x_pred: DVector::zeros(n),
            F: DMatrix::identity(n, n),
            Q: DMatrix::zeros(n, n),
        }
    }

    pub fn model(&self) -> &L {
        &self.model
    }
}

impl<L: LinearDynamics> DynamicModel for Discretized<L> {
    type Control = ();

    fn system_size(&self) -> usize {
        self.model.system_size()
    }

    fn predict(&mut self, x: &DVector<f64>, _u: Option<&()>, ts: f64) {
        self.model.transition(ts, &mut self.F, &mut self.Q);
        self.F.mul_to(x, &mut self.x_pred);
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

/// Recomputes `F` and `Q` only when the elapsed time differs from the
/// previous call.
#[derive(Debug, Clone)]
pub struct Memoized<L> {
    inner: Discretized<L>,
    last_ts: Option<f64>,
    recomputations: usize,
}

impl<L: LinearDynamics> Memoized<L> {
    pub fn new(model: L) -> Self {
        Memoized {
            inner: Discretized::new(model),
            last_ts: None,
            recomputations: 0,
        }
    }

    /// Number of times `F` and `Q` were rebuilt.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }

    /// Forgets the cached elapsed time.
    pub fn invalidate(&mut self) {
        self.last_ts = None;
    }
}

impl<L: LinearDynamics> DynamicModel for Memoized<L> {
    type Control = ();

    fn system_size(&self) -> usize {
        self.inner.system_size()
    }

    fn predict(&mut self, x: &DVector<f64>, _u: Option<&()>, ts: f64) {
        // Bitwise comparison, any change in ts forces a rebuild
        let hit = matches!(self.last_ts, Some(last) if last.to_bits() == ts.to_bits());
        if hit {
            log::trace!("memoized transition reused for ts = {}", ts);
        } else {
            log::trace!("memoized transition rebuilt for ts = {}", ts);
            let inner = &mut self.inner;
            inner.model.transition(ts, &mut inner.F, &mut inner.Q);
            self.last_ts = Some(ts);
            self.recomputations += 1;
        }
        let inner = &mut self.inner;
        inner.F.mul_to(x, &mut inner.x_pred);
    }

    fn predicted_state(&self) -> &DVector<f64> {
        self.inner.predicted_state()
    }

    fn F(&self) -> &DMatrix<f64> {
        self.inner.F()
    }

    fn Q(&self) -> &DMatrix<f64> {
        self.inner.Q()
    }
}
