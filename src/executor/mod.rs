//! Executes a cascade plan: stage functions plus sequential and parallel runners.
pub mod artifact;
pub mod estimate;
pub mod run_file;
pub mod runner;

pub use artifact::Artifact;
pub use estimate::JobContext;
pub use run_file::RunFile;
pub use runner::{JobFailure, RunConfig, RunReport, Runner};
