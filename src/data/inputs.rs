//! Raw input rows and the source they are fetched from.
use crate::error::CascadeError;
use crate::hierarchy::LocationId;
use crate::model::{Density, Integrand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn gaussian() -> Density { Density::Gaussian }

/// One measured value of an integrand over an age-time rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub integrand: Integrand,
    pub location_id: LocationId,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    pub mean: f64,
    pub std: f64,
    #[serde(default = "gaussian")]
    pub density: Density,
    #[serde(default)]
    pub hold_out: bool,
    /// GBD sex id: 1 male, 2 female, 3 both. Absent means both.
    #[serde(default)]
    pub sex_id: Option<u8>,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub nu: Option<f64>,
    /// Raw study covariate values keyed by covariate name.
    #[serde(default)]
    pub study_covariates: BTreeMap<String, f64>,
}

/// GBD sex id of rows that pool both sexes.
pub const BOTH_SEXES: u8 = 3;

impl Observation {
    /// Whether the row informs a fit restricted to `sex`.
    pub fn matches_sex(&self, sex: u8) -> bool {
        match self.sex_id {
            Some(id) => id == sex || id == BOTH_SEXES,
            None => true,
        }
    }

    pub fn time_midpoint(&self) -> f64 {
        0.5 * (self.time_lower + self.time_upper)
    }
}

/// A raw country covariate value for one location and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCovariateRow {
    pub covariate: String,
    pub location_id: LocationId,
    pub time: f64,
    pub value: f64,
}

/// A point at which the fitted model should be integrated for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgintRow {
    pub integrand: Integrand,
    pub location_id: LocationId,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
}

impl AvgintRow {
    pub fn time_midpoint(&self) -> f64 {
        0.5 * (self.time_lower + self.time_upper)
    }
}

/// Where a location's raw inputs come from.
///
/// Implementations are shared by parallel workers and must not hold per-call state.
pub trait InputSource: Send + Sync {
    /// Observations located at any of `locations`.
    fn observations(&self, locations: &BTreeSet<LocationId>) -> Result<Vec<Observation>, CascadeError>;

    /// Values of the named country covariates at any of `locations`.
    fn country_covariates(
        &self,
        names: &BTreeSet<String>,
        locations: &BTreeSet<LocationId>,
    ) -> Result<Vec<CountryCovariateRow>, CascadeError>;

    /// Prediction points requested for `location`.
    fn prediction_points(&self, location: LocationId) -> Result<Vec<AvgintRow>, CascadeError>;
}

/// Inputs held in memory, as read from a run file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryInputs {
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub country_covariates: Vec<CountryCovariateRow>,
    #[serde(default)]
    pub avgint: Vec<AvgintRow>,
}

impl InputSource for InMemoryInputs {
    fn observations(&self, locations: &BTreeSet<LocationId>) -> Result<Vec<Observation>, CascadeError> {
        Ok(self.observations.iter().filter(|o| locations.contains(&o.location_id)).cloned().collect())
    }

    fn country_covariates(
        &self,
        names: &BTreeSet<String>,
        locations: &BTreeSet<LocationId>,
    ) -> Result<Vec<CountryCovariateRow>, CascadeError> {
        Ok(self
            .country_covariates
            .iter()
            .filter(|r| names.contains(&r.covariate) && locations.contains(&r.location_id))
            .cloned()
            .collect())
    }

    fn prediction_points(&self, location: LocationId) -> Result<Vec<AvgintRow>, CascadeError> {
        Ok(self.avgint.iter().filter(|r| r.location_id == location).cloned().collect())
    }
}
