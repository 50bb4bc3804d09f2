//! The settings document and the assembly of models from it.
pub mod builder;
pub mod error;
pub mod form;
pub mod options;

pub use builder::{make_smooth, CovariateOrigin, CovariateSpec, ModelBuilder};
pub use error::{ConfigurationError, UnsupportedMultiplierTargetError};
pub use form::{DrillMode, DrillStartSetting, MulcovType, Policies, Settings};
