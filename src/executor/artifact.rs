//! artifact.rs
//! The result of one stage, as held in the cache.
use crate::compiler::Prediction;
use crate::data::{InMemoryInputs, PreparedData};
use crate::model::{FittedModel, Model};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Artifact {
    Inputs(Arc<InMemoryInputs>),
    Data(Arc<PreparedData>),
    Model(Arc<Model>),
    /// An initial guess or an initial fit.
    Fit(Arc<FittedModel>),
    Draws(Arc<Vec<FittedModel>>),
    Predictions(Arc<Vec<Prediction>>),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Inputs(_) => "inputs",
            Artifact::Data(_) => "data",
            Artifact::Model(_) => "model",
            Artifact::Fit(_) => "fit",
            Artifact::Draws(_) => "draws",
            Artifact::Predictions(_) => "predictions",
        }
    }

    /// One line for the job log.
    pub fn summary(&self) -> String {
        match self {
            Artifact::Inputs(i) => format!(
                "{} observations, {} covariate values, {} prediction points",
                i.observations.len(),
                i.country_covariates.len(),
                i.avgint.len()
            ),
            Artifact::Data(d) => format!("{} data rows with {} covariates", d.data.len(), d.covariates.len()),
            Artifact::Model(m) => format!("{} fields, {} variables", m.fields.len(), m.variable_count()),
            Artifact::Fit(f) => format!("{} fitted fields", f.len()),
            Artifact::Draws(d) => format!("{} draws", d.len()),
            Artifact::Predictions(p) => format!("{} predictions", p.len()),
        }
    }
}
