//! Defines the error types for solver invocation.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Could not start solver '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("Solver command '{command}' exited with status {status:?}: {stderr}")]
    Failed { command: String, status: Option<i32>, stderr: String },
    #[error("Solver command '{command}' did not finish within {seconds}s")]
    TimedOut { command: String, seconds: u64 },
    #[error("Solver command '{command}' was cancelled")]
    Cancelled { command: String },
    #[error("Solver still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SolverError> },
    #[error("Could not {action} image file {path}: {source}")]
    File { action: &'static str, path: PathBuf, source: io::Error },
    #[error("Unusable solver output in {path}: {reason}")]
    Output { path: PathBuf, reason: String },
}

impl SolverError {
    /// Failures that may pass when the same inputs are tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SolverError::Failed { .. } | SolverError::TimedOut { .. })
    }
}
