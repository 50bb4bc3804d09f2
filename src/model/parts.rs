//! The five groups of random fields and the composite keys that address them.
//!
//! The same container shape holds priors (for a `Model`), fitted values (for a
//! fit result) or anything else organised per field.

use super::rates::{Integrand, RateName};
use crate::hierarchy::LocationId;
use std::collections::BTreeMap;
use std::fmt;

/// A random effect applies to one child location, or to every child not
/// otherwise listed when `location` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RandomEffectKey {
    pub rate: RateName,
    pub location: Option<LocationId>,
}

impl RandomEffectKey {
    pub fn child(rate: RateName, location: LocationId) -> Self {
        Self { rate, location: Some(location) }
    }

    pub fn wildcard(rate: RateName) -> Self {
        Self { rate, location: None }
    }
}

/// Covariate multiplier on an underlying rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlphaKey {
    pub covariate: String,
    pub rate: RateName,
}

/// Covariate multiplier on an integrand's value or standard deviation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MulcovKey {
    pub covariate: String,
    pub integrand: Integrand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    Rate,
    RandomEffect,
    /// covariate-to-rate multiplier
    Alpha,
    /// covariate-to-integrand-value multiplier
    Beta,
    /// covariate-to-integrand-std multiplier
    Gamma,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Rate => "rate",
            FieldKind::RandomEffect => "random_effect",
            FieldKind::Alpha => "alpha",
            FieldKind::Beta => "beta",
            FieldKind::Gamma => "gamma",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Rate(RateName),
    RandomEffect(RandomEffectKey),
    Alpha(AlphaKey),
    Beta(MulcovKey),
    Gamma(MulcovKey),
}

impl FieldKey {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldKey::Rate(_) => FieldKind::Rate,
            FieldKey::RandomEffect(_) => FieldKind::RandomEffect,
            FieldKey::Alpha(_) => FieldKind::Alpha,
            FieldKey::Beta(_) => FieldKind::Beta,
            FieldKey::Gamma(_) => FieldKind::Gamma,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Rate(rate) => write!(f, "rate {}", rate),
            FieldKey::RandomEffect(RandomEffectKey { rate, location: Some(loc) }) => {
                write!(f, "random_effect {} {}", rate, loc)
            }
            FieldKey::RandomEffect(RandomEffectKey { rate, location: None }) => {
                write!(f, "random_effect {} *", rate)
            }
            FieldKey::Alpha(k) => write!(f, "alpha {} {}", k.covariate, k.rate),
            FieldKey::Beta(k) => write!(f, "beta {} {}", k.covariate, k.integrand),
            FieldKey::Gamma(k) => write!(f, "gamma {} {}", k.covariate, k.integrand),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DismodGroups<T> {
    pub rate: BTreeMap<RateName, T>,
    pub random_effect: BTreeMap<RandomEffectKey, T>,
    pub alpha: BTreeMap<AlphaKey, T>,
    pub beta: BTreeMap<MulcovKey, T>,
    pub gamma: BTreeMap<MulcovKey, T>,
}

impl<T> Default for DismodGroups<T> {
    fn default() -> Self {
        Self {
            rate: BTreeMap::new(),
            random_effect: BTreeMap::new(),
            alpha: BTreeMap::new(),
            beta: BTreeMap::new(),
            gamma: BTreeMap::new(),
        }
    }
}

impl<T> DismodGroups<T> {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize {
        self.rate.len() + self.random_effect.len() + self.alpha.len() + self.beta.len() + self.gamma.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every field, group by group, keys in order within a group.
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &T)> {
        let rate = self.rate.iter().map(|(k, v)| (FieldKey::Rate(*k), v));
        let re = self.random_effect.iter().map(|(k, v)| (FieldKey::RandomEffect(*k), v));
        let alpha = self.alpha.iter().map(|(k, v)| (FieldKey::Alpha(k.clone()), v));
        let beta = self.beta.iter().map(|(k, v)| (FieldKey::Beta(k.clone()), v));
        let gamma = self.gamma.iter().map(|(k, v)| (FieldKey::Gamma(k.clone()), v));
        rate.chain(re).chain(alpha).chain(beta).chain(gamma)
    }

    pub fn get(&self, key: &FieldKey) -> Option<&T> {
        match key {
            FieldKey::Rate(k) => self.rate.get(k),
            FieldKey::RandomEffect(k) => self.random_effect.get(k),
            FieldKey::Alpha(k) => self.alpha.get(k),
            FieldKey::Beta(k) => self.beta.get(k),
            FieldKey::Gamma(k) => self.gamma.get(k),
        }
    }

    pub fn insert(&mut self, key: FieldKey, value: T) -> Option<T> {
        match key {
            FieldKey::Rate(k) => self.rate.insert(k, value),
            FieldKey::RandomEffect(k) => self.random_effect.insert(k, value),
            FieldKey::Alpha(k) => self.alpha.insert(k, value),
            FieldKey::Beta(k) => self.beta.insert(k, value),
            FieldKey::Gamma(k) => self.gamma.insert(k, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_keys_are_unambiguous() {
        let mut groups: DismodGroups<u8> = DismodGroups::new();
        groups.insert(FieldKey::Rate(RateName::Iota), 1);
        groups.insert(FieldKey::RandomEffect(RandomEffectKey::wildcard(RateName::Iota)), 2);
        groups.insert(FieldKey::RandomEffect(RandomEffectKey::child(RateName::Iota, LocationId(2))), 3);
        groups.insert(
            FieldKey::Gamma(MulcovKey { covariate: "one".into(), integrand: Integrand::Sincidence }),
            4,
        );

        let names: Vec<String> = groups.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["rate iota", "random_effect iota *", "random_effect iota 2", "gamma one Sincidence"]
        );
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.get(&FieldKey::Rate(RateName::Iota)), Some(&1));
    }
}
