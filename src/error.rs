//! Defines the crate-level error and its classification.
use crate::compiler::CompileError;
use crate::hierarchy::{HierarchyError, LocationId, MalformedHierarchyError};
use crate::model::GridError;
use crate::plan::{PlanError, Stage};
use crate::settings::ConfigurationError;
use crate::solver::SolverError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// How a failure propagates through a cascade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad settings. Aborts the run.
    Configuration,
    /// Broken hierarchy or plan. Aborts the run.
    Structural,
    /// A model could not be painted or compiled. Aborts one location's subtree.
    Grid,
    /// The solver failed, timed out or produced unusable output. Aborts one location's subtree.
    SolverInvocation,
}

impl ErrorClass {
    pub fn aborts_run(&self) -> bool {
        matches!(self, ErrorClass::Configuration | ErrorClass::Structural)
    }
}

/// Which side of a run a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSide {
    /// Run files and other inputs read before any job starts.
    Input,
    /// Images and predictions under the work directory.
    WorkDir,
}

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Malformed hierarchy: {0}")]
    Structural(#[from] MalformedHierarchyError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error("Grid error in {field}: {source}")]
    Grid { field: String, source: GridError },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Could not {action} {path}: {source}")]
    Io { side: IoSide, action: &'static str, path: PathBuf, source: io::Error },
    #[error("Could not parse {what}: {source}")]
    Parse { what: String, source: serde_json::Error },
    #[error("{stage} failed for location {location}: {source}")]
    Job { location: LocationId, stage: Stage, source: Box<CascadeError> },
}

impl CascadeError {
    pub fn grid(field: impl Into<String>, source: GridError) -> Self {
        CascadeError::Grid { field: field.into(), source }
    }

    pub fn input_io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CascadeError::Io { side: IoSide::Input, action, path: path.into(), source }
    }

    pub fn work_dir_io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CascadeError::Io { side: IoSide::WorkDir, action, path: path.into(), source }
    }

    /// Attaches the job that was running. Already-attributed errors are left alone.
    pub fn in_job(self, location: LocationId, stage: Stage) -> Self {
        match self {
            CascadeError::Job { .. } => self,
            other => CascadeError::Job { location, stage, source: Box::new(other) },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CascadeError::Configuration(_) | CascadeError::Parse { .. } => ErrorClass::Configuration,
            CascadeError::Plan(PlanError::UnknownJob(_)) => ErrorClass::Configuration,
            CascadeError::Structural(_) | CascadeError::Plan(PlanError::DependencyCycle { .. }) => {
                ErrorClass::Structural
            }
            CascadeError::Hierarchy(HierarchyError::Malformed(_)) => ErrorClass::Structural,
            CascadeError::Hierarchy(_) => ErrorClass::Configuration,
            CascadeError::Grid { .. } => ErrorClass::Grid,
            CascadeError::Compile(e) => e.class(),
            CascadeError::Io { side: IoSide::Input, .. } => ErrorClass::Configuration,
            CascadeError::Solver(_) | CascadeError::Io { side: IoSide::WorkDir, .. } => {
                ErrorClass::SolverInvocation
            }
            CascadeError::Job { source, .. } => source.class(),
        }
    }

    /// Only solver failures are worth repeating with the same inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            CascadeError::Solver(e) => e.is_retryable(),
            CascadeError::Job { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorKind;

    #[test]
    fn test_job_context_keeps_class() {
        let err = CascadeError::grid("rate[0].detail[1]", GridError::UnknownPriorKind("slope".into()))
            .in_job(LocationId(102), Stage::ConstructModel);
        assert_eq!(err.class(), ErrorClass::Grid);
        assert!(!err.class().aborts_run());
        let text = err.to_string();
        assert!(text.contains("102"), "{}", text);
        assert!(text.contains("rate[0].detail[1]"), "{}", text);
    }

    #[test]
    fn test_timeouts_are_retryable() {
        let err = CascadeError::from(SolverError::TimedOut { command: "fit both".into(), seconds: 5 })
            .in_job(LocationId(1), Stage::InitialFit);
        assert!(err.is_retryable());
        assert_eq!(err.class(), ErrorClass::SolverInvocation);
    }

    #[test]
    fn test_file_errors_follow_their_side() {
        let missing = || io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = CascadeError::input_io("read", "run.json", missing());
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.class().aborts_run());
        assert!(!err.is_retryable());

        let err = CascadeError::work_dir_io("replace", "work/2/predictions.json", missing())
            .in_job(LocationId(2), Stage::SavePredictions);
        assert_eq!(err.class(), ErrorClass::SolverInvocation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_level_errors_are_configuration() {
        let err = CascadeError::from(HierarchyError::UnknownLocation(LocationId(9)));
        assert!(err.class().aborts_run());
        let err = CascadeError::grid(
            "rate[0]",
            GridError::UnassignedCell { kind: PriorKind::Value, age: 0.0, time: 2000.0 },
        );
        assert!(!err.is_retryable());
    }
}
