//! Defines the error types for grids, priors and model assembly.
use super::prior::{Density, PriorKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Unknown prior kind '{0}', expected one of value, dage, dtime")]
    UnknownPriorKind(String),
    #[error("A {density} prior requires the '{missing}' parameter")]
    PriorFamily { density: Density, missing: &'static str },
    #[error("Prior mean must be a finite number, found {0}")]
    NonFiniteMean(f64),
    #[error("Prior mean {mean} lies outside its bounds [{lower}, {upper}]")]
    PriorBounds { mean: f64, lower: f64, upper: f64 },
    #[error("No grid point lies in ages [{age_lower}, {age_upper}] x times [{time_lower}, {time_upper}] for {kind} priors")]
    EmptyRange { kind: PriorKind, age_lower: f64, age_upper: f64, time_lower: f64, time_upper: f64 },
    #[error("Grid {axis} values must be finite and strictly increasing: {values:?}")]
    NotIncreasing { axis: &'static str, values: Vec<f64> },
    #[error("Grid has no {axis} values")]
    EmptyAxis { axis: &'static str },
    #[error("No {kind} prior was assigned at age {age}, time {time}")]
    UnassignedCell { kind: PriorKind, age: f64, time: f64 },
}

/// A structural rule of the model container was broken while attaching a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Covariate '{0}' must be added to the model before a multiplier uses it")]
    UnknownCovariate(String),
    #[error("Rate '{0}' is not among the model's nonzero rates")]
    RateNotNonzero(String),
    #[error("Random effect for {rate} names location {location}, which is not a child of the parent location")]
    NotAChild { rate: String, location: i64 },
    #[error("Covariate '{0}' was added twice")]
    DuplicateCovariate(String),
    #[error("Weight '{0}' must be finite and non-negative at every grid point")]
    InvalidWeight(String),
    #[error("Integrand {integrand} uses weight '{weight}', which the model does not define")]
    UnknownWeight { integrand: String, weight: String },
}
