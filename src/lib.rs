//! Kalman filter, extended Kalman filter and interacting multiple model
//! filter over `nalgebra` dynamic matrices.
//!
//! Filters operate in place on caller owned state:
//!
//! - [`KF`] for fixed linear models,
//! - [`EKF`] composing a [`DynamicModel`] with a [`MeasurementModel`],
//! - [`IMM`] running a bank of Gaussian filters under Markov switching,
//! - [`Validated`] wrapping any of them with invariant checks.
#![allow(non_snake_case)]
pub mod config;
pub mod consistency;
pub mod error;
pub mod mixture;
pub mod state_estimator;
pub mod stopping;

pub use config::Tolerances;
pub use consistency::Consistency;
pub use error::{FilterError, Result, SanityCheck};
pub use mixture::{MixtureParameters, ReduceMixture};
pub use state_estimator::ekf::{GaussParams, EKF};
pub use state_estimator::imm::{ImmHypothesis, ImmState, IMM};
pub use state_estimator::kf::KF;
pub use state_estimator::markov::{FixedTransition, MarkovTransition, SojournTransition};
pub use state_estimator::models::{DynamicModel, LinearDynamics, MeasurementModel};
pub use state_estimator::validated::{Inspect, SelfCheck, Validated};
pub use state_estimator::{Measurement, StateEstimator};
pub use stopping::{StopReason, StoppingCondition};
