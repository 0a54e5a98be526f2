//! Interacting multiple model filter over a bank of Gaussian filters.
//!
//! One cycle runs mixing, mode-matched prediction, mode-matched update and
//! mode probability reweighting, in that order. [`StateEstimator::predict`]
//! covers the first two steps together with the predicted mode
//! probabilities, [`StateEstimator::update`] the last two, so the ordering
//! cannot be broken from outside.

use super::ekf::GaussParams;
use super::markov::{validate_transition_matrix, FixedTransition, MarkovTransition};
use super::validated::SelfCheck;
use super::{Measurement, StateEstimator};
use crate::config::Tolerances;
use crate::error::{ensure_dim, FilterError, Result};
use crate::mixture::{MixtureParameters, ReduceMixture};
use itertools::{izip, Itertools};
use nalgebra::DMatrix;

/// All hypotheses share the state dimension of the first one.
fn check_components(components: &[GaussParams]) -> Result<()> {
    let n = components.first().map_or(0, |c| c.x.len());
    for c in components {
        ensure_dim("hypothesis state", n, c.x.len())?;
        ensure_dim("hypothesis covariance rows", n, c.P.nrows())?;
        ensure_dim("hypothesis covariance cols", n, c.P.ncols())?;
    }
    Ok(())
}

/// Flips the conditioning of the mode probabilities with Bayes' rule.
///
/// `pr` holds the previous mode probabilities and `cond_pr[(i, j)]` the
/// probability of mode `j` now given mode `i` before. Returns the predicted
/// probabilities `c_j = sum_i cond_pr[(i, j)] pr_i` and the mixing matrix
/// whose row `j` holds `mu(i | j)`. A mode that cannot be reached keeps its
/// own state, so its row is the unit vector.
fn discrete_bayes(pr: &[f64], cond_pr: &DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let n = pr.len();
    let joint = DMatrix::from_fn(n, n, |i, j| cond_pr[(i, j)] * pr[i]);
    let marginal: Vec<f64> = joint.row_sum().iter().copied().collect();

    let conditional = DMatrix::from_fn(n, n, |j, i| {
        if marginal[j] > 0.0 {
            joint[(i, j)] / marginal[j]
        } else if i == j {
            1.0
        } else {
            0.0
        }
    });
    (marginal, conditional)
}

fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
}

/// `ln(sum(exp(l)))`, `-inf` when every term is `-inf`.
fn logsumexp(logs: &[f64]) -> f64 {
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + logs.iter().map(|l| (l - max).exp()).sum::<f64>().ln()
}

/// Belief of an IMM: one Gaussian per mode with its probability, and the
/// combined estimate when it has been computed for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmState {
    pub mixture: MixtureParameters<GaussParams>,
    pub combined: Option<GaussParams>,
}

/// One mode's view of an [`ImmState`].
#[derive(Debug, Clone, Copy)]
pub struct ImmHypothesis<'a> {
    pub probability: f64,
    pub state: &'a GaussParams,
}

impl ImmState {
    pub fn new(weights: Vec<f64>, components: Vec<GaussParams>) -> Self {
        ImmState {
            mixture: MixtureParameters::new(weights, components),
            combined: None,
        }
    }

    /// Every mode starts from `state` with equal probability.
    pub fn uniform(state: GaussParams, modes: usize) -> Self {
        let weights = vec![1.0 / modes as f64; modes];
        ImmState::new(weights, vec![state; modes])
    }

    pub fn len(&self) -> usize {
        self.mixture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture.is_empty()
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.mixture.weights
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = ImmHypothesis<'_>> {
        self.mixture
            .iter()
            .map(|(probability, state)| ImmHypothesis { probability, state })
    }
}

/// IMM over `filters`, one per mode, switching by the Markov chain `transition`.
#[derive(Debug, Clone)]
pub struct IMM<S, T = FixedTransition> {
    filters: Vec<S>,
    transition: T,
    combine_every_cycle: bool,
}

impl<S, T> IMM<S, T>
where
    S: StateEstimator<Params = GaussParams> + ReduceMixture<GaussParams>,
    T: MarkovTransition,
{
    pub fn init(filters: Vec<S>, transition: T) -> Result<Self> {
        if filters.is_empty() {
            return Err(FilterError::Configuration {
                description: "an IMM needs at least one mode".into(),
            });
        }
        if filters.len() != transition.modes() {
            return Err(FilterError::Configuration {
                description: format!(
                    "{} filters but the transition matrix has {} modes",
                    filters.len(),
                    transition.modes()
                ),
            });
        }
        Ok(IMM {
            filters,
            transition,
            combine_every_cycle: false,
        })
    }

    /// Refresh [`ImmState::combined`] after every predict and update.
    pub fn with_combination(mut self, combine_every_cycle: bool) -> Self {
        self.combine_every_cycle = combine_every_cycle;
        self
    }

    pub fn modes(&self) -> usize {
        self.filters.len()
    }

    pub fn filters(&self) -> &[S] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [S] {
        &mut self.filters
    }

    pub fn transition_mut(&mut self) -> &mut T {
        &mut self.transition
    }

    /// Fills `immstate.combined` with the moment-matched mixture.
    pub fn combine(&self, immstate: &mut ImmState) -> Result<()> {
        self.check(immstate)?;
        immstate.combined = Some(self.reduce(immstate));
        Ok(())
    }

    /// Index of the mode with the highest probability.
    pub fn most_probable(&self, immstate: &ImmState) -> usize {
        immstate
            .mixture
            .weights
            .iter()
            .position_max_by(|a, b| a.total_cmp(b))
            .unwrap_or(0)
    }

    fn reduce(&self, immstate: &ImmState) -> GaussParams {
        self.filters[0].reduce_mixture(&immstate.mixture.weights, &immstate.mixture.components)
    }

    fn check(&self, immstate: &ImmState) -> Result<()> {
        ensure_dim("hypotheses", self.filters.len(), immstate.mixture.components.len())?;
        ensure_dim("mode probabilities", self.filters.len(), immstate.mixture.weights.len())?;
        check_components(&immstate.mixture.components)
    }

    /// Leaves `immstate` untouched if the new hypotheses disagree in dimension.
    fn commit(&self, immstate: &mut ImmState, weights: Vec<f64>, components: Vec<GaussParams>) -> Result<()> {
        check_components(&components)?;
        immstate.mixture = MixtureParameters::new(weights, components);
        immstate.combined = None;
        if self.combine_every_cycle {
            immstate.combined = Some(self.reduce(immstate));
        }
        log::debug!("mode probabilities {:?}", immstate.mixture.weights);
        Ok(())
    }

    /// Mode-conditioned log-likelihoods of `z`.
    fn mode_loglikelihoods(&mut self, z: &Measurement, immstate: &ImmState) -> Result<Vec<f64>> {
        self.filters
            .iter_mut()
            .zip(immstate.mixture.components.iter())
            .map(|(fs, cs)| fs.loglikelihood(z, cs))
            .collect()
    }
}

impl<S, T> StateEstimator for IMM<S, T>
where
    S: StateEstimator<Params = GaussParams> + ReduceMixture<GaussParams>,
    T: MarkovTransition,
{
    type Params = ImmState;
    type Control = S::Control;

    fn predict(&mut self, immstate: &mut ImmState, u: Option<&S::Control>, ts: f64) -> Result<()> {
        self.check(immstate)?;
        let PI = self.transition.matrix(ts);
        ensure_dim("transition matrix rows", self.filters.len(), PI.nrows())?;
        ensure_dim("transition matrix cols", self.filters.len(), PI.ncols())?;

        let (mut predicted_probabilities, mixing_probabilities) =
            discrete_bayes(&immstate.mixture.weights, PI);

        // Mixed initial conditions, then each mode predicts its own
        let mut mode_states = Vec::with_capacity(self.filters.len());
        for (fs, mix_pr) in self.filters.iter_mut().zip(mixing_probabilities.row_iter()) {
            let mix_pr: Vec<f64> = mix_pr.iter().copied().collect();
            let mut mixed = fs.reduce_mixture(&mix_pr, &immstate.mixture.components);
            fs.predict(&mut mixed, u, ts)?;
            mode_states.push(mixed);
        }

        normalize(&mut predicted_probabilities);
        self.commit(immstate, predicted_probabilities, mode_states)
    }

    fn update(&mut self, z: &Measurement, immstate: &mut ImmState) -> Result<()> {
        self.update_loglikelihood(z, immstate).map(|_| ())
    }

    /// Mode-matched update followed by reweighting with the mode
    /// likelihoods. The weights in `immstate` serve as the predicted mode
    /// probabilities. Returns the mixture log-likelihood of `z`.
    fn update_loglikelihood(&mut self, z: &Measurement, immstate: &mut ImmState) -> Result<f64> {
        self.check(immstate)?;

        let mut updated_states = immstate.mixture.components.clone();
        let mut logjoint = Vec::with_capacity(self.filters.len());
        for (j, (fs, cs, w)) in izip!(
            self.filters.iter_mut(),
            updated_states.iter_mut(),
            immstate.mixture.weights.iter()
        )
        .enumerate()
        {
            let llh = fs.update_loglikelihood(z, cs).map_err(|err| {
                log::warn!("mode {} rejected measurement: {}", j, err);
                err
            })?;
            logjoint.push(llh + w.ln());
        }

        let total = logsumexp(&logjoint);
        if !total.is_finite() {
            log::warn!("all mode likelihoods vanished: {:?}", logjoint);
            return Err(FilterError::FilterDivergence {
                context: "mode likelihoods vanished",
            });
        }
        let mut updated_probabilities: Vec<f64> =
            logjoint.iter().map(|l| (l - total).exp()).collect();
        normalize(&mut updated_probabilities);

        self.commit(immstate, updated_probabilities, updated_states)?;
        Ok(total)
    }

    fn estimate(&self, immstate: &ImmState) -> Result<GaussParams> {
        self.check(immstate)?;
        Ok(match &immstate.combined {
            Some(combined) => combined.clone(),
            None => self.reduce(immstate),
        })
    }

    /// `ln(sum_j p_j L_j)` over the mode likelihoods `L_j`.
    fn loglikelihood(&mut self, z: &Measurement, immstate: &ImmState) -> Result<f64> {
        self.check(immstate)?;
        let logjoint: Vec<f64> = self
            .mode_loglikelihoods(z, immstate)?
            .into_iter()
            .zip(immstate.mixture.weights.iter())
            .map(|(ll, w)| ll + w.ln())
            .collect();
        Ok(logsumexp(&logjoint))
    }

    /// True if any mode gates `z`.
    fn gate(&mut self, z: &Measurement, immstate: &ImmState, gate_size_square: f64) -> Result<bool> {
        self.check(immstate)?;
        for (fs, ds) in self.filters.iter_mut().zip(immstate.mixture.components.iter()) {
            if fs.gate(z, ds, gate_size_square)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<S, T> SelfCheck for IMM<S, T>
where
    T: MarkovTransition,
{
    fn self_check(&mut self, ts: f64, tolerances: &Tolerances) -> Result<()> {
        let PI = self.transition.matrix(ts);
        validate_transition_matrix(PI, tolerances)?;
        if PI.nrows() != self.filters.len() {
            return Err(FilterError::InvalidTransitionMatrix {
                reason: format!("{} modes for {} filters", PI.nrows(), self.filters.len()),
            });
        }
        Ok(())
    }
}
