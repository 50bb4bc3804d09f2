//! Closed enumerations for the underlying rates and the observable integrands.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five underlying rates of the disease model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateName {
    Pini,
    Iota,
    Rho,
    Chi,
    Omega,
}

impl RateName {
    pub const ALL: [RateName; 5] = [RateName::Pini, RateName::Iota, RateName::Rho, RateName::Chi, RateName::Omega];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateName::Pini => "pini",
            RateName::Iota => "iota",
            RateName::Rho => "rho",
            RateName::Chi => "chi",
            RateName::Omega => "omega",
        }
    }

    /// Position in the solver's rate table.
    pub fn rate_id(&self) -> usize {
        match self {
            RateName::Pini => 0,
            RateName::Iota => 1,
            RateName::Rho => 2,
            RateName::Chi => 3,
            RateName::Omega => 4,
        }
    }

    /// GBD measure ids used by the settings form to name rates.
    pub fn from_measure_id(measure_id: u32) -> Option<Self> {
        match measure_id {
            5 => Some(RateName::Pini),
            6 => Some(RateName::Iota),
            7 => Some(RateName::Rho),
            9 => Some(RateName::Chi),
            16 => Some(RateName::Omega),
            _ => None,
        }
    }

    /// The integrand that measures this rate directly.
    pub fn primary_integrand(&self) -> Integrand {
        match self {
            RateName::Pini => Integrand::Prevalence,
            RateName::Iota => Integrand::Sincidence,
            RateName::Rho => Integrand::Remission,
            RateName::Chi => Integrand::Mtexcess,
            RateName::Omega => Integrand::Mtother,
        }
    }
}

impl fmt::Display for RateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateName::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown rate '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Integrand {
    Sincidence,
    #[serde(rename = "remission")]
    Remission,
    #[serde(rename = "mtexcess")]
    Mtexcess,
    #[serde(rename = "mtother")]
    Mtother,
    #[serde(rename = "mtwith")]
    Mtwith,
    #[serde(rename = "susceptible")]
    Susceptible,
    #[serde(rename = "withC")]
    WithC,
    #[serde(rename = "prevalence")]
    Prevalence,
    Tincidence,
    #[serde(rename = "mtspecific")]
    Mtspecific,
    #[serde(rename = "mtall")]
    Mtall,
    #[serde(rename = "mtstandard")]
    Mtstandard,
    #[serde(rename = "relrisk")]
    Relrisk,
}

impl Integrand {
    pub const ALL: [Integrand; 13] = [
        Integrand::Sincidence,
        Integrand::Remission,
        Integrand::Mtexcess,
        Integrand::Mtother,
        Integrand::Mtwith,
        Integrand::Susceptible,
        Integrand::WithC,
        Integrand::Prevalence,
        Integrand::Tincidence,
        Integrand::Mtspecific,
        Integrand::Mtall,
        Integrand::Mtstandard,
        Integrand::Relrisk,
    ];

    pub const PRIMARY: [Integrand; 5] = [
        Integrand::Prevalence,
        Integrand::Sincidence,
        Integrand::Remission,
        Integrand::Mtexcess,
        Integrand::Mtother,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Integrand::Sincidence => "Sincidence",
            Integrand::Remission => "remission",
            Integrand::Mtexcess => "mtexcess",
            Integrand::Mtother => "mtother",
            Integrand::Mtwith => "mtwith",
            Integrand::Susceptible => "susceptible",
            Integrand::WithC => "withC",
            Integrand::Prevalence => "prevalence",
            Integrand::Tincidence => "Tincidence",
            Integrand::Mtspecific => "mtspecific",
            Integrand::Mtall => "mtall",
            Integrand::Mtstandard => "mtstandard",
            Integrand::Relrisk => "relrisk",
        }
    }

    /// Position in the solver's integrand table.
    pub fn integrand_id(&self) -> usize {
        Integrand::ALL.iter().position(|i| i == self).unwrap_or_default()
    }

    /// The single rate this integrand observes, if it is primary.
    pub fn primary_rate(&self) -> Option<RateName> {
        RateName::ALL.iter().copied().find(|r| r.primary_integrand() == *self)
    }
}

impl fmt::Display for Integrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Integrand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Integrand::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("Unknown integrand '{}'", s))
    }
}
