//! tables.rs
//! Row types of the relational image exchanged with the solver.
//!
//! Every table is addressed by integer surrogate keys. Floating-point ages and
//! times appear only in the `age` and `time` tables and in data extents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRow {
    pub age_id: usize,
    pub age: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRow {
    pub time_id: usize,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub node_id: usize,
    pub node_name: String,
    pub parent: Option<usize>,
    pub c_location_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrandRow {
    pub integrand_id: usize,
    pub integrand_name: String,
    pub minimum_meas_cv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateRow {
    pub covariate_id: usize,
    pub covariate_name: String,
    pub reference: f64,
    pub max_difference: Option<f64>,
}

/// Infinite bounds are stored as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRow {
    pub prior_id: usize,
    pub prior_name: String,
    pub density_id: usize,
    pub density_name: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub mean: f64,
    pub std: Option<f64>,
    pub eta: Option<f64>,
    pub nu: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothRow {
    pub smooth_id: usize,
    pub smooth_name: String,
    pub n_age: usize,
    pub n_time: usize,
    pub mulstd_value_prior_id: Option<usize>,
    pub mulstd_dage_prior_id: Option<usize>,
    pub mulstd_dtime_prior_id: Option<usize>,
}

/// One grid point of one smoothing. No age difference exists at the last age,
/// and no time difference at the last time. A point with `const_value` has no
/// value prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothGridRow {
    pub smooth_grid_id: usize,
    pub smooth_id: usize,
    pub age_id: usize,
    pub time_id: usize,
    pub value_prior_id: Option<usize>,
    pub dage_prior_id: Option<usize>,
    pub dtime_prior_id: Option<usize>,
    pub const_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRow {
    pub weight_id: usize,
    pub weight_name: String,
    pub n_age: usize,
    pub n_time: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGridRow {
    pub weight_grid_id: usize,
    pub weight_id: usize,
    pub age_id: usize,
    pub time_id: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub rate_id: usize,
    pub rate_name: String,
    pub parent_smooth_id: Option<usize>,
    pub child_smooth_id: Option<usize>,
    pub child_nslist_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NslistRow {
    pub nslist_id: usize,
    pub nslist_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NslistPairRow {
    pub nslist_pair_id: usize,
    pub nslist_id: usize,
    pub node_id: usize,
    pub smooth_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulcovRow {
    pub mulcov_id: usize,
    pub mulcov_type: String,
    pub rate_id: Option<usize>,
    pub integrand_id: Option<usize>,
    pub covariate_id: usize,
    pub smooth_id: usize,
}

/// One model variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRow {
    pub var_id: usize,
    pub var_type: String,
    pub smooth_id: usize,
    pub age_id: Option<usize>,
    pub time_id: Option<usize>,
    pub node_id: Option<usize>,
    pub rate_id: Option<usize>,
    pub integrand_id: Option<usize>,
    pub covariate_id: Option<usize>,
    pub mulcov_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartVarRow {
    pub start_var_id: usize,
    pub start_var_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub data_id: usize,
    pub integrand_id: usize,
    pub node_id: usize,
    pub density_id: usize,
    pub hold_out: bool,
    /// No weight means a constant weighting.
    #[serde(default)]
    pub weight_id: Option<usize>,
    pub meas_value: f64,
    pub meas_std: f64,
    pub eta: Option<f64>,
    pub nu: Option<f64>,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    /// Covariate values in covariate-table order.
    pub x: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgintRow {
    pub avgint_id: usize,
    pub integrand_id: usize,
    pub node_id: usize,
    #[serde(default)]
    pub weight_id: Option<usize>,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    pub x: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRow {
    pub option_id: usize,
    pub option_name: String,
    pub option_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitVarRow {
    pub fit_var_id: usize,
    pub fit_var_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub sample_id: usize,
    pub sample_index: usize,
    pub var_id: usize,
    pub var_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRow {
    pub predict_id: usize,
    pub sample_index: Option<usize>,
    pub avgint_id: usize,
    pub avg_integrand: f64,
}

/// The whole file handed to the solver. The last three tables are written by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalImage {
    pub age: Vec<AgeRow>,
    pub time: Vec<TimeRow>,
    pub node: Vec<NodeRow>,
    pub integrand: Vec<IntegrandRow>,
    pub covariate: Vec<CovariateRow>,
    pub prior: Vec<PriorRow>,
    pub smooth: Vec<SmoothRow>,
    pub smooth_grid: Vec<SmoothGridRow>,
    #[serde(default)]
    pub weight: Vec<WeightRow>,
    #[serde(default)]
    pub weight_grid: Vec<WeightGridRow>,
    pub rate: Vec<RateRow>,
    pub nslist: Vec<NslistRow>,
    pub nslist_pair: Vec<NslistPairRow>,
    pub mulcov: Vec<MulcovRow>,
    pub var: Vec<VarRow>,
    pub start_var: Vec<StartVarRow>,
    pub data: Vec<DataRow>,
    pub avgint: Vec<AvgintRow>,
    pub option: Vec<OptionRow>,
    #[serde(default)]
    pub fit_var: Vec<FitVarRow>,
    #[serde(default)]
    pub sample: Vec<SampleRow>,
    #[serde(default)]
    pub predict: Vec<PredictRow>,
}

impl RelationalImage {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.option.iter().find(|o| o.option_name == name).map(|o| o.option_value.as_str())
    }

    /// Clears everything the solver writes, so a stale result cannot be read back.
    pub fn clear_outputs(&mut self) {
        self.fit_var.clear();
        self.sample.clear();
        self.predict.clear();
    }
}
