//! The location hierarchy: a single rooted tree loaded once per run.
pub mod error;
pub mod storage;
pub mod topology;
pub mod tree;

pub use error::{HierarchyError, LevelError, MalformedHierarchyError};
pub use storage::{LocationId, LocationRow};
pub use tree::{DrillStart, LocationHierarchy};
