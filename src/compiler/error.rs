//! Defines the error types for the model compiler.
use crate::error::ErrorClass;
use crate::hierarchy::{HierarchyError, LocationId};
use crate::model::GridError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("The model has no rate fields, so there is nothing to fit")]
    EmptyModel,
    #[error("Cannot compile {field}: {source}")]
    Grid { field: String, source: GridError },
    #[error("Location {0} is not in the hierarchy")]
    UnknownLocation(LocationId),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error("Prepared data has no column for model covariate '{0}'")]
    MissingCovariate(String),
    #[error("Solver output has no value for var {var_id} ({field} at age {age}, time {time})")]
    MissingResult { var_id: usize, field: String, age: f64, time: f64 },
    #[error("Table {table} refers to missing id {id}")]
    BrokenReference { table: &'static str, id: usize },
    #[error("The image has no '{0}' option")]
    MissingOption(&'static str),
}

impl CompileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CompileError::EmptyModel | CompileError::Grid { .. } | CompileError::MissingCovariate(_) => {
                ErrorClass::Grid
            }
            CompileError::UnknownLocation(_) | CompileError::Hierarchy(_) => ErrorClass::Structural,
            CompileError::MissingResult { .. }
            | CompileError::BrokenReference { .. }
            | CompileError::MissingOption(_) => ErrorClass::SolverInvocation,
        }
    }
}
