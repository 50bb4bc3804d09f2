//! Defines the error types for settings and model assembly.
use crate::hierarchy::HierarchyError;
use crate::model::{Integrand, ModelError};
use thiserror::Error;

/// A rate-value multiplier named an integrand that does not observe exactly one rate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate-value multipliers need a primary integrand, but '{integrand}' is not one. Valid primary integrands: {}", valid_names(.valid))]
pub struct UnsupportedMultiplierTargetError {
    pub integrand: Integrand,
    pub valid: Vec<Integrand>,
}

fn valid_names(valid: &[Integrand]) -> String {
    valid.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(", ")
}

/// Bad or missing settings. Every variant names the offending field path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{path}: unknown rate '{name}'")]
    UnknownRate { path: String, name: String },
    #[error("{path}: rate '{rate}' has no rate smoothing, so it cannot carry this entry")]
    RateNotInModel { path: String, rate: String },
    #[error("{path}: unknown integrand '{name}'")]
    UnknownIntegrand { path: String, name: String },
    #[error("{path}: covariate '{name}' is not listed as a study or country covariate")]
    UnknownCovariate { path: String, name: String },
    #[error("{path}: unknown covariate transformation {id}")]
    UnknownTransform { path: String, id: u32 },
    #[error("{path}: {source}")]
    UnsupportedMultiplierTarget { path: String, source: UnsupportedMultiplierTargetError },
    #[error("Covariate '{covariate}' with transform '{transform}' is listed as both a study and a country covariate")]
    CovariateCollision { covariate: String, transform: String },
    #[error("{path}: location {location} is not in the hierarchy")]
    UnknownLocation { path: String, location: i64 },
    #[error("{path}: random effects for {rate} leave children {children:?} without a smoothing; add a default (no location) entry")]
    MissingRandomEffect { path: String, rate: String, children: Vec<i64> },
    #[error("{path}: {source}")]
    Model { path: String, source: ModelError },
    #[error("model.drill_location_start: {source}")]
    Drill { source: HierarchyError },
    #[error("option.{name}: unknown solver option")]
    UnknownOption { name: String },
    #[error("option.{name}: {reason}")]
    InvalidOption { name: String, reason: String },
    #[error("No value of country covariate '{covariate}' for location {location} or any ancestor")]
    MissingCovariateValue { covariate: String, location: i64 },
    #[error("Covariate '{covariate}' is {value} after its transform, for {row} at location {location}")]
    NonFiniteCovariate { covariate: String, location: i64, row: String, value: f64 },
    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl ConfigurationError {
    /// Field path of the offending setting, when it is a single field.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConfigurationError::UnknownRate { path, .. }
            | ConfigurationError::RateNotInModel { path, .. }
            | ConfigurationError::UnknownIntegrand { path, .. }
            | ConfigurationError::UnknownCovariate { path, .. }
            | ConfigurationError::UnknownTransform { path, .. }
            | ConfigurationError::UnsupportedMultiplierTarget { path, .. }
            | ConfigurationError::UnknownLocation { path, .. }
            | ConfigurationError::MissingRandomEffect { path, .. }
            | ConfigurationError::Model { path, .. }
            | ConfigurationError::Invalid { path, .. } => Some(path),
            ConfigurationError::Drill { .. } => Some("model.drill_location_start"),
            _ => None,
        }
    }
}
