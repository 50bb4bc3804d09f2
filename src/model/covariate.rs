//! Covariates and the transforms applied to raw covariate columns.
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a raw covariate column is transformed before use.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    Log,
    Logit,
    Square,
    SquareRoot,
    /// Multiplies by a fixed factor, e.g. per-1000 rescaling.
    Scale(f64),
}

impl Transform {
    /// GBD transformation ids as used by the settings form.
    pub fn from_gbd_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Transform::Identity),
            1 => Some(Transform::Log),
            2 => Some(Transform::Logit),
            3 => Some(Transform::Square),
            4 => Some(Transform::SquareRoot),
            5 => Some(Transform::Scale(1000.0)),
            _ => None,
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::Log => x.ln(),
            Transform::Logit => (x / (1.0 - x)).ln(),
            Transform::Square => x * x,
            Transform::SquareRoot => x.sqrt(),
            Transform::Scale(factor) => x * factor,
        }
    }

    /// Suffix appended to the raw name so each transform is a distinct covariate.
    pub fn suffix(&self) -> String {
        match self {
            Transform::Identity => String::new(),
            Transform::Log => "_log".into(),
            Transform::Logit => "_logit".into(),
            Transform::Square => "_squared".into(),
            Transform::SquareRoot => "_sqrt".into(),
            Transform::Scale(factor) => format!("_x{}", factor),
        }
    }

    /// Identity of the transform for dedup, bit-exact on the scale factor.
    pub fn key(&self) -> (u8, u64) {
        match self {
            Transform::Identity => (0, 0),
            Transform::Log => (1, 0),
            Transform::Logit => (2, 0),
            Transform::Square => (3, 0),
            Transform::SquareRoot => (4, 0),
            Transform::Scale(factor) => (5, factor.to_bits()),
        }
    }
}

/// A model covariate: a transformed raw column with the value at which its effect is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub name: String,
    pub reference: f64,
    /// Observations farther than this from the reference are excluded by the solver.
    pub max_difference: Option<f64>,
    pub source: String,
    pub transform: Transform,
}

impl Covariate {
    pub fn new(name: impl Into<String>, reference: f64) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
            reference,
            max_difference: None,
            transform: Transform::Identity,
        }
    }

    pub fn transformed(source: &str, transform: Transform, reference: f64) -> Self {
        Self {
            name: format!("{}{}", source, transform.suffix()),
            reference,
            max_difference: None,
            source: source.to_string(),
            transform,
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reference {})", self.name, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Transform::Identity, 0.25, 0.25)]
    #[case(Transform::Square, 3.0, 9.0)]
    #[case(Transform::SquareRoot, 16.0, 4.0)]
    #[case(Transform::Logit, 0.5, 0.0)]
    #[case(Transform::Log, 1.0, 0.0)]
    #[case(Transform::Scale(1000.0), 0.002, 2.0)]
    fn test_transform_values(#[case] t: Transform, #[case] x: f64, #[case] expected: f64) {
        assert!((t.apply(x) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_transforms_produce_distinct_names() {
        let a = Covariate::transformed("ldi", Transform::Identity, 0.0);
        let b = Covariate::transformed("ldi", Transform::Log, 0.0);
        assert_eq!(a.name, "ldi");
        assert_eq!(b.name, "ldi_log");
        assert_eq!(Transform::from_gbd_id(5), Some(Transform::Scale(1000.0)));
    }
}
