//! The settings document, as delivered by the upstream configuration system.
//!
//! Field names follow the upstream form so documents deserialize unchanged.

use crate::model::{Density, Prior, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model: ModelSettings,
    #[serde(default)]
    pub rate: Vec<SmoothingSettings>,
    #[serde(default)]
    pub random_effect: Vec<SmoothingSettings>,
    #[serde(default)]
    pub study_covariate: Vec<MulcovSettings>,
    #[serde(default)]
    pub country_covariate: Vec<MulcovSettings>,
    #[serde(default)]
    pub policies: Policies,
    /// Passed through to the solver's option table after validation.
    #[serde(default)]
    pub option: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrillMode {
    Cascade,
    Drill,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DrillStartSetting {
    Level(i64),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub title: Option<String>,
    pub drill: DrillMode,
    #[serde(default)]
    pub drill_location: Option<i64>,
    #[serde(default)]
    pub drill_location_start: Option<DrillStartSetting>,
    #[serde(default)]
    pub drill_sex: Option<u8>,
    pub default_age_grid: Vec<f64>,
    pub default_time_grid: Vec<f64>,
}

/// Rates appear by name or by GBD measure id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateRef {
    MeasureId(u32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSetting {
    GbdId(u32),
    Named(Transform),
}

impl Default for TransformSetting {
    fn default() -> Self {
        TransformSetting::Named(Transform::Identity)
    }
}

/// One prior distribution as entered on the form. Bounds may be left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorSettings {
    pub density: Density,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub std: Option<f64>,
    #[serde(default)]
    pub nu: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
}

impl PriorSettings {
    /// Empty bounds are infinite. A missing mean is zero clamped into the bounds.
    pub fn to_prior(&self) -> Prior {
        let lower = self.min.unwrap_or(f64::NEG_INFINITY);
        let upper = self.max.unwrap_or(f64::INFINITY);
        let mean = self.mean.unwrap_or_else(|| 0.0_f64.max(lower).min(upper));
        Prior { density: self.density, mean, lower, upper, std: self.std, nu: self.nu, eta: self.eta }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorGroupSettings {
    pub value: PriorSettings,
    #[serde(default)]
    pub dage: Option<PriorSettings>,
    #[serde(default)]
    pub dtime: Option<PriorSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulstdSettings {
    #[serde(default)]
    pub value: Option<PriorSettings>,
    #[serde(default)]
    pub dage: Option<PriorSettings>,
    #[serde(default)]
    pub dtime: Option<PriorSettings>,
}

/// Overrides one prior kind on a rectangle of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPrior {
    pub prior_type: String,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    #[serde(flatten)]
    pub prior: PriorSettings,
}

/// Grid and priors shared by rate, random-effect and multiplier entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    #[serde(default)]
    pub age_grid: Option<Vec<f64>>,
    #[serde(default)]
    pub time_grid: Option<Vec<f64>>,
    pub default: PriorGroupSettings,
    #[serde(default)]
    pub mulstd: Option<MulstdSettings>,
    #[serde(default)]
    pub detail: Vec<DetailPrior>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingSettings {
    pub rate: RateRef,
    /// Random effects only: the child this applies to, or every child when absent.
    #[serde(default)]
    pub location: Option<i64>,
    #[serde(flatten)]
    pub grid: GridSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MulcovType {
    RateValue,
    MeasValue,
    MeasStd,
}

impl MulcovType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MulcovType::RateValue => "rate_value",
            MulcovType::MeasValue => "meas_value",
            MulcovType::MeasStd => "meas_std",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulcovSettings {
    /// Raw covariate name.
    pub covariate: String,
    #[serde(default)]
    pub transformation: TransformSetting,
    pub mulcov_type: MulcovType,
    /// Target: a rate or integrand name for rate_value, an integrand otherwise.
    pub measure: String,
    #[serde(flatten)]
    pub grid: GridSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policies {
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_solver_retries")]
    pub solver_retries: u32,
    #[serde(default)]
    pub solver_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub minimum_meas_cv: f64,
}

fn default_num_samples() -> usize { 10 }
fn default_solver_retries() -> u32 { 2 }

impl Default for Policies {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            solver_retries: default_solver_retries(),
            solver_timeout_seconds: None,
            minimum_meas_cv: 0.0,
        }
    }
}
