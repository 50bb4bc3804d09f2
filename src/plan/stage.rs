//! Stages of a location's estimation and the job identifiers built from them.
use super::error::PlanError;
use crate::hierarchy::LocationId;
use std::fmt;
use std::str::FromStr;

/// Work done for one location, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Fetch raw inputs for the location.
    Setup,
    PrepareData,
    ConstructModel,
    /// Fit fixed effects, starting from the parent's fit when there is one.
    InitialGuess,
    /// Fit fixed and random effects, starting from the initial guess.
    InitialFit,
    /// Sample around the fit.
    Draws,
    SavePredictions,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Setup,
        Stage::PrepareData,
        Stage::ConstructModel,
        Stage::InitialGuess,
        Stage::InitialFit,
        Stage::Draws,
        Stage::SavePredictions,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Stage::Setup => "bundle_setup",
            Stage::PrepareData => "estimate_location:prepare_data",
            Stage::ConstructModel => "estimate_location:construct_model",
            Stage::InitialGuess => "estimate_location:initial_guess_from_fit_fixed",
            Stage::InitialFit => "estimate_location:compute_initial_fit",
            Stage::Draws => "estimate_location:compute_draws_from_parent_fit",
            Stage::SavePredictions => "estimate_location:save_predictions",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| s.tag() == tag)
    }

    /// The stage of the same location that must finish first.
    pub fn previous(&self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| s == self)?;
        idx.checked_sub(1).map(|i| Stage::ALL[i])
    }

    /// Short name for file names and cache keys.
    pub fn short_name(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::PrepareData => "prepare_data",
            Stage::ConstructModel => "construct_model",
            Stage::InitialGuess => "initial_guess",
            Stage::InitialFit => "initial_fit",
            Stage::Draws => "draws",
            Stage::SavePredictions => "save_predictions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One job of a plan: a stage at a location. Written `<stage-tag>@<location>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    pub stage: Stage,
    pub location: LocationId,
}

impl JobId {
    pub fn new(stage: Stage, location: LocationId) -> Self {
        Self { stage, location }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stage.tag(), self.location)
    }
}

impl FromStr for JobId {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || PlanError::UnknownJob(s.to_string());
        let (tag, location) = s.rsplit_once('@').ok_or_else(unknown)?;
        let stage = Stage::from_tag(tag).ok_or_else(unknown)?;
        let location = location.parse::<i64>().map_err(|_| unknown())?;
        Ok(JobId::new(stage, LocationId(location)))
    }
}
