//! estimate.rs
//! The work of each stage for one location.
//!
//! Every stage reads what it needs through the cache. A result that was
//! evicted, or never computed in this process, is recomputed from its own
//! dependencies, so any job can run on its own.

use super::artifact::Artifact;
use crate::cache::{CacheKey, LocalCache};
use crate::compiler::{self, ImageBuilder, Prediction, RelationalImage};
use crate::data::{fetch_inputs, prepare_data, InMemoryInputs, InputSource, PreparedData};
use crate::error::CascadeError;
use crate::hierarchy::LocationHierarchy;
use crate::model::{FittedModel, Model};
use crate::plan::{CascadePlan, JobId, LocationWork, Stage};
use crate::settings::options::solver_options;
use crate::settings::{CovariateSpec, ModelBuilder};
use crate::solver::{Solver, SolverCommand, SolverSession};
use log::{debug, info};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub struct JobContext<'a> {
    pub plan: &'a CascadePlan,
    pub hierarchy: &'a LocationHierarchy,
    pub inputs: &'a dyn InputSource,
    pub solver: &'a dyn Solver,
    pub cache: &'a LocalCache<CacheKey, Artifact>,
    pub work_dir: &'a Path,
}

impl<'a> JobContext<'a> {
    /// Runs one job. A failure names the stage that caused it, which may be a dependency.
    pub fn run_job(&self, job: JobId) -> Result<Artifact, CascadeError> {
        let work = self
            .plan
            .work(job.location)
            .ok_or_else(|| crate::plan::PlanError::UnknownJob(job.to_string()))?;
        let artifact = self.artifact(job.stage, work)?;
        info!("{} done: {}", job, artifact.summary());
        Ok(artifact)
    }

    fn artifact(&self, stage: Stage, work: &LocationWork) -> Result<Artifact, CascadeError> {
        let key = CacheKey::new(work.location, stage, work.fingerprint);
        self.cache.get_or_compute(key, || {
            debug!("Computing {}@{}", stage, work.location);
            self.compute(stage, work).map_err(|e| e.in_job(work.location, stage))
        })
    }

    fn compute(&self, stage: Stage, work: &LocationWork) -> Result<Artifact, CascadeError> {
        match stage {
            Stage::Setup => {
                let inputs = fetch_inputs(self.inputs, self.hierarchy, &self.specs(work)?, work.location)?;
                Ok(Artifact::Inputs(Arc::new(inputs)))
            }
            Stage::PrepareData => {
                let inputs = self.inputs_for(work)?;
                let data =
                    prepare_data(&inputs, self.hierarchy, &work.settings, &self.specs(work)?, work.location)?;
                Ok(Artifact::Data(Arc::new(data)))
            }
            Stage::ConstructModel => {
                let data = self.data_for(work)?;
                let model = ModelBuilder::new(&work.settings, self.hierarchy).build(work.location, &data.covariates)?;
                Ok(Artifact::Model(Arc::new(model)))
            }
            Stage::InitialGuess => {
                let parent_fit = match work.parent.and_then(|p| self.plan.work(p)) {
                    Some(parent) => Some(self.fit_for(Stage::InitialFit, parent)?),
                    None => None,
                };
                let fit = self.fit(work, stage, parent_fit.as_deref(), &[SolverCommand::Init, SolverCommand::FitFixed])?;
                Ok(Artifact::Fit(Arc::new(fit)))
            }
            Stage::InitialFit => {
                let guess = self.fit_for(Stage::InitialGuess, work)?;
                let fit = self.fit(work, stage, Some(guess.as_ref()), &[SolverCommand::Init, SolverCommand::FitBoth])?;
                Ok(Artifact::Fit(Arc::new(fit)))
            }
            Stage::Draws => Ok(Artifact::Draws(Arc::new(self.draws(work)?))),
            Stage::SavePredictions => Ok(Artifact::Predictions(Arc::new(self.save_predictions(work)?))),
        }
    }

    fn specs(&self, work: &LocationWork) -> Result<Vec<CovariateSpec>, CascadeError> {
        Ok(ModelBuilder::new(&work.settings, self.hierarchy).covariate_specs()?)
    }

    fn inputs_for(&self, work: &LocationWork) -> Result<Arc<InMemoryInputs>, CascadeError> {
        match self.artifact(Stage::Setup, work)? {
            Artifact::Inputs(inputs) => Ok(inputs),
            other => unreachable!("BUG: setup produced {}", other.kind()),
        }
    }

    fn data_for(&self, work: &LocationWork) -> Result<Arc<PreparedData>, CascadeError> {
        match self.artifact(Stage::PrepareData, work)? {
            Artifact::Data(data) => Ok(data),
            other => unreachable!("BUG: prepare_data produced {}", other.kind()),
        }
    }

    fn model_for(&self, work: &LocationWork) -> Result<Arc<Model>, CascadeError> {
        match self.artifact(Stage::ConstructModel, work)? {
            Artifact::Model(model) => Ok(model),
            other => unreachable!("BUG: construct_model produced {}", other.kind()),
        }
    }

    fn fit_for(&self, stage: Stage, work: &LocationWork) -> Result<Arc<FittedModel>, CascadeError> {
        match self.artifact(stage, work)? {
            Artifact::Fit(fit) => Ok(fit),
            other => unreachable!("BUG: {} produced {}", stage, other.kind()),
        }
    }

    fn image_path(&self, work: &LocationWork, stage: Stage) -> PathBuf {
        self.work_dir.join(work.location.to_string()).join(format!("{}.json", stage.short_name()))
    }

    /// The full image for this location's model and data, optionally started from `start`.
    fn encode(
        &self,
        work: &LocationWork,
        model: &Model,
        data: &PreparedData,
        start: Option<&FittedModel>,
    ) -> Result<RelationalImage, CascadeError> {
        let mut image = ImageBuilder::new(model, self.hierarchy)
            .with_data(data)
            .with_options(solver_options(&work.settings.option)?)
            .with_minimum_meas_cv(work.settings.policies.minimum_meas_cv)
            .build()?;
        if let Some(start) = start {
            compiler::set_start_values(&mut image, start)?;
        }
        Ok(image)
    }

    fn session(&self, work: &LocationWork, stage: Stage) -> SolverSession<'_> {
        SolverSession::new(self.solver, self.image_path(work, stage), work.settings.policies.solver_retries)
    }

    fn fit(
        &self,
        work: &LocationWork,
        stage: Stage,
        start: Option<&FittedModel>,
        commands: &[SolverCommand],
    ) -> Result<FittedModel, CascadeError> {
        let model = self.model_for(work)?;
        let data = self.data_for(work)?;
        let image = self.session(work, stage).run(|| self.encode(work, &model, &data, start), commands)?;
        Ok(compiler::decode(&image, &image.fit_var)?)
    }

    /// Samples around this location's fit, whose parent seeded its start.
    fn draws(&self, work: &LocationWork) -> Result<Vec<FittedModel>, CascadeError> {
        let model = self.model_for(work)?;
        let data = self.data_for(work)?;
        let fit = self.fit_for(Stage::InitialFit, work)?;
        let commands = [
            SolverCommand::Init,
            SolverCommand::FitBoth,
            SolverCommand::Sample(work.settings.policies.num_samples),
        ];
        let image =
            self.session(work, Stage::Draws).run(|| self.encode(work, &model, &data, Some(fit.as_ref())), &commands)?;
        Ok(compiler::decode_samples(&image)?)
    }

    fn save_predictions(&self, work: &LocationWork) -> Result<Vec<Prediction>, CascadeError> {
        let model = self.model_for(work)?;
        let data = self.data_for(work)?;
        let fit = self.fit_for(Stage::InitialFit, work)?;
        let encode = || -> Result<RelationalImage, CascadeError> {
            let mut image = self.encode(work, &model, &data, Some(fit.as_ref()))?;
            compiler::set_fit_values(&mut image, &fit)?;
            Ok(image)
        };
        let image = self.session(work, Stage::SavePredictions).run(encode, &[SolverCommand::Predict])?;
        let predictions = compiler::predictions(&image)?;

        let path = self.work_dir.join(work.location.to_string()).join("predictions.json");
        write_json(&path, &predictions)?;
        info!("Wrote {} predictions to {}", predictions.len(), path.display());
        Ok(predictions)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CascadeError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CascadeError::work_dir_io("create", dir, e))?;
    let tmp = NamedTempFile::new_in(dir).map_err(|e| CascadeError::work_dir_io("create a temporary file in", dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| CascadeError::work_dir_io("write", path, std::io::Error::from(e)))?;
        writer.flush().map_err(|e| CascadeError::work_dir_io("write", path, e))?;
    }
    tmp.persist(path).map_err(|e| CascadeError::work_dir_io("replace", path, e.error))?;
    Ok(())
}
