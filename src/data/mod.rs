//! Observations, covariates and prediction points for one estimation.
pub mod inputs;
pub mod prepare;

pub use inputs::{AvgintRow, CountryCovariateRow, InMemoryInputs, InputSource, Observation, BOTH_SEXES};
pub use prepare::{fetch_inputs, prepare_data, Prepared, PreparedData};
