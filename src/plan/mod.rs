//! The cascade plan: which jobs run, and in what order.
pub mod cascade;
pub mod error;
pub mod stage;

pub use cascade::{CascadePlan, LocationWork};
pub use error::PlanError;
pub use stage::{JobId, Stage};
