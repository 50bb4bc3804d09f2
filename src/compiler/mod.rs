//! The model compiler: encodes a [`Model`](crate::model::Model) as a relational
//! image for the solver and decodes the solver's results.
pub mod canonical;
pub mod decode;
pub mod encode;
pub mod error;
pub mod tables;

pub use canonical::CanonicalAxis;
pub use decode::{decode, decode_samples, decode_weights, predictions, set_fit_values, set_start_values, Prediction};
pub use encode::{encode, ImageBuilder, PARENT_NODE_OPTION};
pub use error::CompileError;
pub use tables::RelationalImage;
