//! The in-memory statistical model: random fields over age-time grids.
pub mod covariate;
pub mod error;
pub mod grid;
#[allow(clippy::module_inception)]
pub mod model;
pub mod parts;
pub mod prior;
pub mod rates;
pub mod values;

pub use covariate::{Covariate, Transform};
pub use error::{GridError, ModelError};
pub use grid::{AgeTimeGrid, MulstdPriors, SmoothGrid};
pub use model::{FittedModel, Model};
pub use parts::{AlphaKey, DismodGroups, FieldKey, FieldKind, MulcovKey, RandomEffectKey};
pub use prior::{Density, Prior, PriorKind};
pub use rates::{Integrand, RateName};
pub use values::FieldValues;
