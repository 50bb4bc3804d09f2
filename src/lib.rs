//! Cascade estimation of disease-rate models over a location hierarchy.
//!
//! A [`plan::CascadePlan`] orders the jobs of every location, the
//! [`compiler`] turns each location's [`model::Model`] into the relational
//! image the external solver reads, and the [`executor`] runs the jobs with
//! results shared through a bounded [`cache::LocalCache`].

pub mod cache;
pub mod compiler;
pub mod data;
pub mod error;
pub mod executor;
pub mod hierarchy;
pub mod model;
pub mod plan;
pub mod settings;
pub mod solver;

pub use error::{CascadeError, ErrorClass, IoSide};
