//! Prior distributions assigned to grid cells.
use super::error::GridError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    Uniform,
    Gaussian,
    Laplace,
    Students,
    LogGaussian,
    LogLaplace,
    LogStudents,
}

impl Density {
    pub fn as_str(&self) -> &'static str {
        match self {
            Density::Uniform => "uniform",
            Density::Gaussian => "gaussian",
            Density::Laplace => "laplace",
            Density::Students => "students",
            Density::LogGaussian => "log_gaussian",
            Density::LogLaplace => "log_laplace",
            Density::LogStudents => "log_students",
        }
    }

    /// Position in the solver's density table.
    pub fn density_id(&self) -> usize {
        match self {
            Density::Uniform => 0,
            Density::Gaussian => 1,
            Density::Laplace => 2,
            Density::Students => 3,
            Density::LogGaussian => 4,
            Density::LogLaplace => 5,
            Density::LogStudents => 6,
        }
    }

    pub fn needs_std(&self) -> bool { !matches!(self, Density::Uniform) }
    pub fn needs_nu(&self) -> bool { matches!(self, Density::Students | Density::LogStudents) }
    pub fn is_log(&self) -> bool {
        matches!(self, Density::LogGaussian | Density::LogLaplace | Density::LogStudents)
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent prior assignments of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorKind {
    Value,
    Dage,
    Dtime,
}

impl PriorKind {
    pub const ALL: [PriorKind; 3] = [PriorKind::Value, PriorKind::Dage, PriorKind::Dtime];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorKind::Value => "value",
            PriorKind::Dage => "dage",
            PriorKind::Dtime => "dtime",
        }
    }
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorKind {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(PriorKind::Value),
            "dage" => Ok(PriorKind::Dage),
            "dtime" => Ok(PriorKind::Dtime),
            other => Err(GridError::UnknownPriorKind(other.to_string())),
        }
    }
}

/// A prior distribution descriptor. Bounds may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub density: Density,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    pub std: Option<f64>,
    pub nu: Option<f64>,
    /// Offset for log densities.
    pub eta: Option<f64>,
}

impl Prior {
    pub fn uniform(lower: f64, upper: f64, mean: f64) -> Self {
        Self { density: Density::Uniform, mean, lower, upper, std: None, nu: None, eta: None }
    }

    /// Mean zero, no bounds. The fallback for unset difference priors.
    pub fn unbounded() -> Self {
        Self::uniform(f64::NEG_INFINITY, f64::INFINITY, 0.0)
    }

    pub fn with_density(density: Density, mean: f64, std: f64) -> Self {
        Self {
            density,
            mean,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            std: Some(std),
            nu: None,
            eta: None,
        }
    }

    pub fn gaussian(mean: f64, std: f64) -> Self {
        Self::with_density(Density::Gaussian, mean, std)
    }

    pub fn bounded(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn nu(mut self, nu: f64) -> Self {
        self.nu = Some(nu);
        self
    }

    /// Checks that the density's required parameters are present and the
    /// mean sits within the bounds.
    pub fn validate(&self) -> Result<(), GridError> {
        let missing = |name: &'static str| GridError::PriorFamily { density: self.density, missing: name };

        if self.density.needs_std() {
            match self.std {
                Some(std) if std.is_finite() && std > 0.0 => {}
                _ => return Err(missing("std")),
            }
        }
        if self.density.needs_nu() && !self.nu.is_some_and(|nu| nu.is_finite()) {
            return Err(missing("nu"));
        }
        if self.density.is_log() && !self.eta.is_some_and(|eta| eta.is_finite()) {
            return Err(missing("eta"));
        }
        if !self.mean.is_finite() {
            return Err(GridError::NonFiniteMean(self.mean));
        }
        if !(self.lower <= self.mean && self.mean <= self.upper) {
            return Err(GridError::PriorBounds { mean: self.mean, lower: self.lower, upper: self.upper });
        }
        Ok(())
    }

    /// Exact-bit identity of every parameter, used to share prior rows.
    pub fn bit_key(&self) -> PriorBits {
        let opt = |v: Option<f64>| v.map(f64::to_bits);
        PriorBits {
            density: self.density,
            mean: self.mean.to_bits(),
            lower: self.lower.to_bits(),
            upper: self.upper.to_bits(),
            std: opt(self.std),
            nu: opt(self.nu),
            eta: opt(self.eta),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorBits {
    density: Density,
    mean: u64,
    lower: u64,
    upper: u64,
    std: Option<u64>,
    nu: Option<u64>,
    eta: Option<u64>,
}
