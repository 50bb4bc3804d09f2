//! The statistical model for one estimation: every random field plus the
//! covariates and locations they refer to.
use super::covariate::Covariate;
use super::error::ModelError;
use super::grid::SmoothGrid;
use super::parts::{AlphaKey, DismodGroups, FieldKey, MulcovKey, RandomEffectKey};
use super::rates::{Integrand, RateName};
use super::values::FieldValues;
use crate::hierarchy::LocationId;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub nonzero_rates: BTreeSet<RateName>,
    pub parent_location: LocationId,
    pub child_locations: Vec<LocationId>,
    covariates: Vec<Covariate>,
    pub fields: DismodGroups<SmoothGrid>,
    /// Named weightings for averaging integrands over an age-time rectangle.
    weights: BTreeMap<String, FieldValues>,
    weight_of: BTreeMap<Integrand, String>,
}

/// Fitted values shaped like the model they came from.
pub type FittedModel = DismodGroups<FieldValues>;

impl Model {
    pub fn new(
        nonzero_rates: impl IntoIterator<Item = RateName>,
        parent_location: LocationId,
        child_locations: Vec<LocationId>,
    ) -> Self {
        Self {
            nonzero_rates: nonzero_rates.into_iter().collect(),
            parent_location,
            child_locations,
            covariates: Vec::new(),
            fields: DismodGroups::new(),
            weights: BTreeMap::new(),
            weight_of: BTreeMap::new(),
        }
    }

    pub fn covariates(&self) -> &[Covariate] { &self.covariates }

    pub fn covariate(&self, name: &str) -> Option<&Covariate> {
        self.covariates.iter().find(|c| c.name == name)
    }

    pub fn add_covariate(&mut self, covariate: Covariate) -> Result<(), ModelError> {
        if self.covariate(&covariate.name).is_some() {
            return Err(ModelError::DuplicateCovariate(covariate.name));
        }
        self.covariates.push(covariate);
        Ok(())
    }

    /// Attaches the parent-level field of a rate, marking the rate nonzero.
    pub fn set_rate(&mut self, rate: RateName, grid: SmoothGrid) {
        self.nonzero_rates.insert(rate);
        self.fields.rate.insert(rate, grid);
    }

    pub fn set_random_effect(
        &mut self,
        rate: RateName,
        location: Option<LocationId>,
        grid: SmoothGrid,
    ) -> Result<(), ModelError> {
        if !self.nonzero_rates.contains(&rate) {
            return Err(ModelError::RateNotNonzero(rate.to_string()));
        }
        if let Some(loc) = location {
            if !self.child_locations.contains(&loc) {
                return Err(ModelError::NotAChild { rate: rate.to_string(), location: loc.0 });
            }
        }
        self.fields.random_effect.insert(RandomEffectKey { rate, location }, grid);
        Ok(())
    }

    pub fn set_alpha(&mut self, covariate: &str, rate: RateName, grid: SmoothGrid) -> Result<(), ModelError> {
        self.require_covariate(covariate)?;
        self.fields.alpha.insert(AlphaKey { covariate: covariate.to_string(), rate }, grid);
        Ok(())
    }

    pub fn set_beta(&mut self, covariate: &str, integrand: Integrand, grid: SmoothGrid) -> Result<(), ModelError> {
        self.require_covariate(covariate)?;
        self.fields.beta.insert(MulcovKey { covariate: covariate.to_string(), integrand }, grid);
        Ok(())
    }

    pub fn set_gamma(&mut self, covariate: &str, integrand: Integrand, grid: SmoothGrid) -> Result<(), ModelError> {
        self.require_covariate(covariate)?;
        self.fields.gamma.insert(MulcovKey { covariate: covariate.to_string(), integrand }, grid);
        Ok(())
    }

    pub fn weights(&self) -> &BTreeMap<String, FieldValues> { &self.weights }

    /// Adds or replaces a named weighting.
    pub fn set_weight(&mut self, name: &str, weight: FieldValues) -> Result<(), ModelError> {
        if weight.values().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModelError::InvalidWeight(name.to_string()));
        }
        self.weights.insert(name.to_string(), weight);
        Ok(())
    }

    /// Averages `integrand` with the named weighting instead of a constant.
    pub fn use_weight(&mut self, integrand: Integrand, name: &str) -> Result<(), ModelError> {
        if !self.weights.contains_key(name) {
            return Err(ModelError::UnknownWeight { integrand: integrand.to_string(), weight: name.to_string() });
        }
        self.weight_of.insert(integrand, name.to_string());
        Ok(())
    }

    pub fn weight_for(&self, integrand: Integrand) -> Option<&str> {
        self.weight_of.get(&integrand).map(String::as_str)
    }

    fn require_covariate(&self, name: &str) -> Result<(), ModelError> {
        match self.covariate(name) {
            Some(_) => Ok(()),
            None => Err(ModelError::UnknownCovariate(name.to_string())),
        }
    }

    /// The random-effect field governing `child`: its own entry, else the wildcard.
    pub fn random_effect_for(&self, rate: RateName, child: LocationId) -> Option<&SmoothGrid> {
        self.fields
            .random_effect
            .get(&RandomEffectKey::child(rate, child))
            .or_else(|| self.fields.random_effect.get(&RandomEffectKey::wildcard(rate)))
    }

    /// Children the wildcard entry for `rate` stands in for.
    pub fn wildcard_children(&self, rate: RateName) -> Vec<LocationId> {
        self.child_locations
            .iter()
            .copied()
            .filter(|c| !self.fields.random_effect.contains_key(&RandomEffectKey::child(rate, *c)))
            .collect()
    }

    /// Children left without any random-effect field for a rate that has some.
    pub fn children_missing_random_effect(&self, rate: RateName) -> Vec<LocationId> {
        let has_any = self.fields.random_effect.keys().any(|k| k.rate == rate);
        if !has_any {
            return Vec::new();
        }
        self.child_locations
            .iter()
            .copied()
            .filter(|c| self.random_effect_for(rate, *c).is_none())
            .collect()
    }

    /// Number of model variables, counting a wildcard random effect once per
    /// child it covers, plus standard-deviation multipliers.
    pub fn variable_count(&self) -> usize {
        let mut count = 0;
        for (key, grid) in self.fields.iter() {
            let copies = match key {
                FieldKey::RandomEffect(RandomEffectKey { rate, location: None }) => {
                    self.wildcard_children(rate).len()
                }
                _ => 1,
            };
            count += copies * grid.len() + grid.mulstd.count();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::grid::AgeTimeGrid;
    use crate::model::prior::{Prior, PriorKind};

    fn grid(ages: &[f64], times: &[f64]) -> SmoothGrid {
        let mut g = SmoothGrid::new(ages.to_vec(), times.to_vec()).unwrap();
        g.assign_all(PriorKind::Value, Prior::uniform(0.0, 1.0, 0.1)).unwrap();
        g
    }

    fn two_children() -> Model {
        Model::new([RateName::Iota], LocationId(1), vec![LocationId(2), LocationId(3)])
    }

    #[test]
    fn test_multiplier_requires_known_covariate() {
        let mut model = two_children();
        let err = model.set_alpha("traffic", RateName::Iota, grid(&[40.0], &[2000.0])).unwrap_err();
        assert_eq!(err, ModelError::UnknownCovariate("traffic".into()));

        model.add_covariate(Covariate::new("traffic", 0.0)).unwrap();
        assert!(model.set_alpha("traffic", RateName::Iota, grid(&[40.0], &[2000.0])).is_ok());
    }

    #[test]
    fn test_random_effect_must_name_a_child() {
        let mut model = two_children();
        let err = model.set_random_effect(RateName::Iota, Some(LocationId(7)), grid(&[50.0], &[2000.0]));
        assert!(matches!(err, Err(ModelError::NotAChild { .. })));
    }

    #[test]
    fn test_wildcard_covers_unlisted_children() {
        let mut model = two_children();
        model.set_rate(RateName::Iota, grid(&[50.0], &[1995.0, 2015.0]));
        model.set_random_effect(RateName::Iota, Some(LocationId(2)), grid(&[50.0], &[2000.0])).unwrap();
        assert_eq!(model.children_missing_random_effect(RateName::Iota), vec![LocationId(3)]);

        model.set_random_effect(RateName::Iota, None, grid(&[50.0], &[1995.0, 2015.0])).unwrap();
        assert!(model.children_missing_random_effect(RateName::Iota).is_empty());
        assert_eq!(model.wildcard_children(RateName::Iota), vec![LocationId(3)]);
        // rate 2 cells, child 2 one cell, wildcard 2 cells for child 3
        assert_eq!(model.variable_count(), 2 + 1 + 2);
    }

    #[test]
    fn test_integrand_weight_must_be_defined() {
        let mut model = two_children();
        let err = model.use_weight(Integrand::Prevalence, "population").unwrap_err();
        assert!(matches!(err, ModelError::UnknownWeight { .. }));

        let grid = AgeTimeGrid::new(vec![0.0, 100.0], vec![2000.0]).unwrap();
        let negative = FieldValues::from_fn(grid.clone(), |a, _| 50.0 - a);
        assert_eq!(
            model.set_weight("population", negative).unwrap_err(),
            ModelError::InvalidWeight("population".into())
        );
        model.set_weight("population", FieldValues::filled(grid, 2.0)).unwrap();
        model.use_weight(Integrand::Prevalence, "population").unwrap();
        assert_eq!(model.weight_for(Integrand::Prevalence), Some("population"));
        assert_eq!(model.weight_for(Integrand::Remission), None);
    }
}
