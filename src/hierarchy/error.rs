//! Defines the error types for the hierarchy module.
use super::storage::LocationId;
use thiserror::Error;

/// The flat location table does not describe a single rooted tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedHierarchyError {
    #[error("Location {location} names parent {parent}, which is not in the hierarchy")]
    MissingParent { location: LocationId, parent: LocationId },
    #[error("Cycle detected involving location {location}")]
    Cycle { location: LocationId },
    #[error("Hierarchy has more than one root: {roots:?}")]
    MultipleRoots { roots: Vec<LocationId> },
    #[error("Hierarchy has no root location")]
    NoRoot,
    #[error("Location {location} appears more than once")]
    DuplicateLocation { location: LocationId },
    #[error("Location {location} declares level {declared} but sits at depth {actual}")]
    LevelMismatch { location: LocationId, declared: u32, actual: u32 },
}

/// A drill was requested from a level the location cannot reach.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("Level {requested} selected but location {location} sits at level {location_level}, higher in the hierarchy than that")]
    AboveLocation { location: LocationId, location_level: u32, requested: u32 },
    #[error("Most detailed level selected but location {location} has child locations {children:?}")]
    NotMostDetailed { location: LocationId, children: Vec<LocationId> },
    #[error("Expected a location level greater than 0 but found {0}")]
    NonPositive(i64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error(transparent)]
    Malformed(#[from] MalformedHierarchyError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("Location {0} is not in the hierarchy")]
    UnknownLocation(LocationId),
}
