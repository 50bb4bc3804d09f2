//! Defines the error types for the cascade plan.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Unknown job '{0}'")]
    UnknownJob(String),
    #[error("Job dependencies form a cycle; {scheduled} of {total} jobs could be ordered")]
    DependencyCycle { scheduled: usize, total: usize },
}
