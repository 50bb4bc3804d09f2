//! echo.rs
//! An in-process stand-in for the optimizer that returns its inputs.
//!
//! Fits equal the start values, samples repeat the fit, and each predicted
//! integrand is the mean of the parent-level rate vars behind it. Used for
//! dry runs and tests, where the cascade mechanics matter and the numbers do not.
use super::command::SolverCommand;
use super::error::SolverError;
use super::file::{read_image, write_image};
use super::Solver;
use crate::compiler::tables::{FitVarRow, PredictRow, SampleRow};
use crate::compiler::{RelationalImage, PARENT_NODE_OPTION};
use crate::model::{Integrand, RateName};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoSolver;

impl EchoSolver {
    pub fn apply(&self, image: &mut RelationalImage, command: &SolverCommand) -> Result<(), String> {
        match command {
            SolverCommand::Init => {
                image.clear_outputs();
            }
            SolverCommand::FitFixed | SolverCommand::FitBoth => {
                image.fit_var = image
                    .start_var
                    .iter()
                    .map(|s| FitVarRow { fit_var_id: s.start_var_id, fit_var_value: s.start_var_value })
                    .collect();
            }
            SolverCommand::Sample(n) => {
                if image.fit_var.is_empty() {
                    return Err("sample requires a fit".into());
                }
                image.sample = (0..*n)
                    .flat_map(|index| image.fit_var.iter().map(move |f| (index, f.fit_var_id, f.fit_var_value)))
                    .enumerate()
                    .map(|(sample_id, (sample_index, var_id, var_value))| SampleRow {
                        sample_id,
                        sample_index,
                        var_id,
                        var_value,
                    })
                    .collect();
            }
            SolverCommand::Predict => {
                if image.fit_var.is_empty() {
                    return Err("predict requires fit_var".into());
                }
                let parent = image.option(PARENT_NODE_OPTION).and_then(|v| v.parse::<usize>().ok());
                let predict = image
                    .avgint
                    .iter()
                    .enumerate()
                    .map(|(predict_id, point)| PredictRow {
                        predict_id,
                        sample_index: None,
                        avgint_id: point.avgint_id,
                        avg_integrand: parent_rate_mean(image, parent, point.integrand_id),
                    })
                    .collect();
                image.predict = predict;
            }
        }
        Ok(())
    }
}

fn parent_rate_mean(image: &RelationalImage, parent: Option<usize>, integrand_id: usize) -> f64 {
    let rate: Option<RateName> =
        Integrand::ALL.into_iter().find(|i| i.integrand_id() == integrand_id).and_then(|i| i.primary_rate());
    let Some(rate) = rate else { return 0.0 };
    let values: Vec<f64> = image
        .var
        .iter()
        .filter(|v| v.var_type == "rate" && v.rate_id == Some(rate.rate_id()) && v.node_id == parent)
        .filter_map(|v| image.fit_var.iter().find(|f| f.fit_var_id == v.var_id))
        .map(|f| f.fit_var_value)
        .collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Solver for EchoSolver {
    fn name(&self) -> &str {
        "echo"
    }

    fn run(&self, path: &Path, command: &SolverCommand) -> Result<(), SolverError> {
        let mut image = read_image(path)?;
        self.apply(&mut image, command).map_err(|stderr| SolverError::Failed {
            command: command.to_string(),
            status: Some(1),
            stderr,
        })?;
        write_image(path, &image)
    }
}
