//! Assembles a [`Model`] for one parent location from the settings document.
//!
//! Every error names the settings field it came from, e.g.
//! `rate[1].detail[0].prior_type`, so a failing run can be traced back to the
//! form without re-running the cascade.

use super::error::{ConfigurationError, UnsupportedMultiplierTargetError};
use super::form::{GridSettings, ModelSettings, MulcovSettings, MulcovType, PriorSettings, RateRef, Settings, TransformSetting};
use super::options;
use crate::error::CascadeError;
use crate::hierarchy::{LocationHierarchy, LocationId};
use crate::model::{Covariate, GridError, Integrand, Model, MulstdPriors, PriorKind, RateName, SmoothGrid, Transform};
use log::debug;

/// Where a covariate's raw values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CovariateOrigin {
    /// A column on each observation; zero where absent.
    Study,
    /// A per-location time series.
    Country,
}

/// One (raw covariate, transform) pair referenced by a multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateSpec {
    pub source: String,
    pub transform: Transform,
    pub origin: CovariateOrigin,
}

impl CovariateSpec {
    /// Name of the model covariate this pair becomes.
    pub fn name(&self) -> String {
        format!("{}{}", self.source, self.transform.suffix())
    }

    pub fn with_reference(&self, reference: f64) -> Covariate {
        Covariate::transformed(&self.source, self.transform, reference)
    }
}

fn grid_paint_error(path: String) -> impl FnOnce(GridError) -> CascadeError {
    move |source| CascadeError::grid(path, source)
}

/// Builds the smoothing for one settings entry: defaults over the whole grid,
/// then detail rectangles in listed order, then the std multipliers.
pub fn make_smooth(model: &ModelSettings, grid: &GridSettings, path: &str) -> Result<SmoothGrid, CascadeError> {
    let ages = grid.age_grid.clone().unwrap_or_else(|| model.default_age_grid.clone());
    let times = grid.time_grid.clone().unwrap_or_else(|| model.default_time_grid.clone());
    let mut smooth = SmoothGrid::new(ages, times).map_err(grid_paint_error(path.to_string()))?;

    let defaults: [(PriorKind, Option<&PriorSettings>); 3] = [
        (PriorKind::Value, Some(&grid.default.value)),
        (PriorKind::Dage, grid.default.dage.as_ref()),
        (PriorKind::Dtime, grid.default.dtime.as_ref()),
    ];
    for (kind, prior) in defaults {
        if let Some(prior) = prior {
            smooth
                .assign_all(kind, prior.to_prior())
                .map_err(grid_paint_error(format!("{}.default.{}", path, kind)))?;
        }
    }

    for (i, row) in grid.detail.iter().enumerate() {
        let row_path = format!("{}.detail[{}]", path, i);
        let kind: PriorKind = row
            .prior_type
            .parse()
            .map_err(grid_paint_error(format!("{}.prior_type", row_path)))?;
        smooth
            .assign(kind, (row.age_lower, row.age_upper), (row.time_lower, row.time_upper), row.prior.to_prior())
            .map_err(grid_paint_error(row_path))?;
    }

    if let Some(mulstd) = &grid.mulstd {
        let mut priors = MulstdPriors::default();
        for (kind, setting, slot) in [
            (PriorKind::Value, &mulstd.value, &mut priors.value),
            (PriorKind::Dage, &mulstd.dage, &mut priors.dage),
            (PriorKind::Dtime, &mulstd.dtime, &mut priors.dtime),
        ] {
            if let Some(setting) = setting {
                let prior = setting.to_prior();
                prior.validate().map_err(grid_paint_error(format!("{}.mulstd.{}", path, kind)))?;
                *slot = Some(prior);
            }
        }
        smooth.mulstd = priors;
    }
    Ok(smooth)
}

pub fn resolve_rate(rate: &RateRef, path: &str) -> Result<RateName, ConfigurationError> {
    let unknown = |name: String| ConfigurationError::UnknownRate { path: path.to_string(), name };
    match rate {
        RateRef::MeasureId(id) => RateName::from_measure_id(*id).ok_or_else(|| unknown(id.to_string())),
        RateRef::Name(name) => name.parse().map_err(|_| unknown(name.clone())),
    }
}

fn resolve_integrand(measure: &str, path: &str) -> Result<Integrand, ConfigurationError> {
    measure.parse().map_err(|_| ConfigurationError::UnknownIntegrand {
        path: path.to_string(),
        name: measure.to_string(),
    })
}

/// A rate-value multiplier targets a rate directly or through its primary integrand.
fn rate_value_target(measure: &str, path: &str) -> Result<RateName, ConfigurationError> {
    if let Ok(rate) = measure.parse::<RateName>() {
        return Ok(rate);
    }
    let integrand = resolve_integrand(measure, path)?;
    integrand.primary_rate().ok_or_else(|| ConfigurationError::UnsupportedMultiplierTarget {
        path: path.to_string(),
        source: UnsupportedMultiplierTargetError { integrand, valid: Integrand::PRIMARY.to_vec() },
    })
}

fn resolve_transform(setting: &TransformSetting, path: &str) -> Result<Transform, ConfigurationError> {
    match setting {
        TransformSetting::GbdId(id) => Transform::from_gbd_id(*id)
            .ok_or_else(|| ConfigurationError::UnknownTransform { path: path.to_string(), id: *id }),
        TransformSetting::Named(t) => Ok(*t),
    }
}

/// Reads settings against one hierarchy. Cheap to construct; holds no state.
pub struct ModelBuilder<'a> {
    settings: &'a Settings,
    hierarchy: &'a LocationHierarchy,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(settings: &'a Settings, hierarchy: &'a LocationHierarchy) -> Self {
        Self { settings, hierarchy }
    }

    fn multipliers(&self) -> impl Iterator<Item = (String, CovariateOrigin, &'a MulcovSettings)> + 'a {
        let study = self.settings.study_covariate.iter().enumerate().map(|(i, m)| {
            (format!("study_covariate[{}]", i), CovariateOrigin::Study, m)
        });
        let country = self.settings.country_covariate.iter().enumerate().map(|(i, m)| {
            (format!("country_covariate[{}]", i), CovariateOrigin::Country, m)
        });
        study.chain(country)
    }

    /// Unique (raw covariate, transform) pairs, in first-mention order.
    ///
    /// The same pair claimed by both a study and a country entry is an error.
    pub fn covariate_specs(&self) -> Result<Vec<CovariateSpec>, ConfigurationError> {
        let mut specs: Vec<CovariateSpec> = Vec::new();
        for (path, origin, entry) in self.multipliers() {
            let transform = resolve_transform(&entry.transformation, &format!("{}.transformation", path))?;
            let existing = specs
                .iter()
                .find(|s| s.source == entry.covariate && s.transform.key() == transform.key());
            match existing {
                Some(spec) if spec.origin != origin => {
                    return Err(ConfigurationError::CovariateCollision {
                        covariate: entry.covariate.clone(),
                        transform: spec.name(),
                    })
                }
                Some(_) => {}
                None => specs.push(CovariateSpec { source: entry.covariate.clone(), transform, origin }),
            }
        }
        Ok(specs)
    }

    /// Checks everything that does not depend on a particular location, so a
    /// bad document stops the run before any job starts.
    pub fn validate(&self) -> Result<(), CascadeError> {
        self.covariate_specs()?;
        options::solver_options(&self.settings.option)?;
        for (i, entry) in self.settings.rate.iter().enumerate() {
            resolve_rate(&entry.rate, &format!("rate[{}].rate", i))?;
        }
        for (i, entry) in self.settings.random_effect.iter().enumerate() {
            let path = format!("random_effect[{}]", i);
            resolve_rate(&entry.rate, &format!("{}.rate", path))?;
            if let Some(id) = entry.location {
                if !self.hierarchy.contains(LocationId(id)) {
                    return Err(ConfigurationError::UnknownLocation { path: format!("{}.location", path), location: id }.into());
                }
            }
        }
        for (path, _, entry) in self.multipliers() {
            let measure_path = format!("{}.measure", path);
            match entry.mulcov_type {
                MulcovType::RateValue => rate_value_target(&entry.measure, &measure_path).map(|_| ())?,
                MulcovType::MeasValue | MulcovType::MeasStd => {
                    resolve_integrand(&entry.measure, &measure_path).map(|_| ())?
                }
            }
        }
        if let Some(sex) = self.settings.model.drill_sex {
            if sex != 1 && sex != 2 {
                return Err(ConfigurationError::Invalid {
                    path: "model.drill_sex".into(),
                    reason: format!("expected 1 (male) or 2 (female), found {}", sex),
                }
                .into());
            }
        }
        if self.settings.rate.is_empty() {
            return Err(ConfigurationError::Invalid { path: "rate".into(), reason: "no rates are configured".into() }.into());
        }
        Ok(())
    }

    /// The model for estimating `parent`, with its children as random-effect
    /// locations and `covariates` already carrying their reference values.
    pub fn build(&self, parent: LocationId, covariates: &[Covariate]) -> Result<Model, CascadeError> {
        let children = self.hierarchy.children_of(parent)?;
        let mut model = Model::new(Vec::<RateName>::new(), parent, children.clone());
        for covariate in covariates {
            model
                .add_covariate(covariate.clone())
                .map_err(|source| ConfigurationError::Model { path: "covariates".into(), source })?;
        }

        for (i, entry) in self.settings.rate.iter().enumerate() {
            let path = format!("rate[{}]", i);
            let rate = resolve_rate(&entry.rate, &format!("{}.rate", path))?;
            let grid = make_smooth(&self.settings.model, &entry.grid, &path)?;
            model.set_rate(rate, grid);
        }

        if !children.is_empty() {
            self.attach_random_effects(&mut model, &children)?;
        }

        for (path, _, entry) in self.multipliers() {
            let transform = resolve_transform(&entry.transformation, &format!("{}.transformation", path))?;
            let name = format!("{}{}", entry.covariate, transform.suffix());
            if model.covariate(&name).is_none() {
                return Err(ConfigurationError::UnknownCovariate { path: format!("{}.covariate", path), name }.into());
            }
            let measure_path = format!("{}.measure", path);
            let grid = make_smooth(&self.settings.model, &entry.grid, &path)?;
            let attached = match entry.mulcov_type {
                MulcovType::RateValue => {
                    let rate = rate_value_target(&entry.measure, &measure_path)?;
                    if !model.nonzero_rates.contains(&rate) {
                        return Err(ConfigurationError::RateNotInModel { path: measure_path, rate: rate.to_string() }.into());
                    }
                    model.set_alpha(&name, rate, grid)
                }
                MulcovType::MeasValue => model.set_beta(&name, resolve_integrand(&entry.measure, &measure_path)?, grid),
                MulcovType::MeasStd => model.set_gamma(&name, resolve_integrand(&entry.measure, &measure_path)?, grid),
            };
            attached.map_err(|source| ConfigurationError::Model { path: path.clone(), source })?;
        }
        debug!(
            "Model for location {} has {} fields and {} variables",
            parent,
            model.fields.len(),
            model.variable_count()
        );
        Ok(model)
    }

    fn attach_random_effects(&self, model: &mut Model, children: &[LocationId]) -> Result<(), CascadeError> {
        for (i, entry) in self.settings.random_effect.iter().enumerate() {
            let path = format!("random_effect[{}]", i);
            let rate = resolve_rate(&entry.rate, &format!("{}.rate", path))?;
            if !model.nonzero_rates.contains(&rate) {
                return Err(ConfigurationError::RateNotInModel { path: format!("{}.rate", path), rate: rate.to_string() }.into());
            }
            let location = match entry.location {
                None => None,
                Some(id) => {
                    let location = LocationId(id);
                    if !self.hierarchy.contains(location) {
                        return Err(ConfigurationError::UnknownLocation { path: format!("{}.location", path), location: id }.into());
                    }
                    if !children.contains(&location) {
                        debug!("Skipping {} for location {}, not a child of {}", path, id, model.parent_location);
                        continue;
                    }
                    Some(location)
                }
            };
            let grid = make_smooth(&self.settings.model, &entry.grid, &path)?;
            model
                .set_random_effect(rate, location, grid)
                .map_err(|source| ConfigurationError::Model { path: path.clone(), source })?;
        }

        for rate in model.nonzero_rates.clone() {
            let missing = model.children_missing_random_effect(rate);
            if !missing.is_empty() {
                return Err(ConfigurationError::MissingRandomEffect {
                    path: "random_effect".into(),
                    rate: rate.to_string(),
                    children: missing.iter().map(|c| c.0).collect(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::hierarchy::LocationRow;
    use crate::model::{FieldKey, RandomEffectKey};
    use serde_json::json;

    fn hierarchy() -> LocationHierarchy {
        LocationHierarchy::build(&[
            LocationRow::new(1, None, "Global"),
            LocationRow::new(2, Some(1), "North"),
            LocationRow::new(3, Some(1), "South"),
        ])
        .unwrap()
    }

    fn settings(extra: serde_json::Value) -> Settings {
        let mut doc = json!({
            "model": {"drill": "cascade", "default_age_grid": [0, 100], "default_time_grid": [1990, 2020]},
            "rate": [{
                "rate": "iota",
                "default": {"value": {"density": "uniform", "min": 0, "max": 1, "mean": 0.01}},
                "age_grid": [0, 25, 50, 75, 100],
                "time_grid": [1990, 1995, 2000, 2005, 2010, 2015, 2020],
                "detail": [{"prior_type": "value", "age_lower": 0, "age_upper": 100,
                            "time_lower": 2000, "time_upper": 2020,
                            "density": "uniform", "min": 0, "max": 1, "mean": 0.05}]
            }]
        });
        if let (Some(base), Some(more)) = (doc.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn test_detail_row_overrides_default_window() {
        let h = hierarchy();
        let s = settings(json!({"random_effect": [{"rate": "iota", "default": {"value": {"density": "gaussian", "mean": 0, "std": 1}}}]}));
        let model = ModelBuilder::new(&s, &h).build(LocationId(1), &[]).unwrap();
        let iota = &model.fields.rate[&RateName::Iota];
        assert_eq!(iota.prior_at(PriorKind::Value, 50.0, 1995.0).unwrap().mean, 0.01);
        assert_eq!(iota.prior_at(PriorKind::Value, 50.0, 2010.0).unwrap().mean, 0.05);
        assert!(model.fields.random_effect.contains_key(&RandomEffectKey::wildcard(RateName::Iota)));
    }

    #[test]
    fn test_rate_value_on_secondary_integrand_is_rejected() {
        let h = hierarchy();
        let s = settings(json!({"country_covariate": [{
            "covariate": "ldi", "mulcov_type": "rate_value", "measure": "Tincidence",
            "default": {"value": {"density": "gaussian", "mean": 0, "std": 1}}
        }]}));
        let err = ModelBuilder::new(&s, &h).validate().unwrap_err();
        match err {
            CascadeError::Configuration(ConfigurationError::UnsupportedMultiplierTarget { path, source }) => {
                assert_eq!(path, "country_covariate[0].measure");
                assert_eq!(source.integrand, Integrand::Tincidence);
                assert_eq!(source.valid, Integrand::PRIMARY.to_vec());
                let text = source.to_string();
                assert!(text.contains("Tincidence") && text.contains("mtexcess"), "{}", text);
            }
            other => panic!("Expected an unsupported target, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_prior_kind_names_its_field() {
        let h = hierarchy();
        let mut s = settings(json!({}));
        s.rate[0].grid.detail[0].prior_type = "slope".into();
        let err = ModelBuilder::new(&s, &h).build(LocationId(2), &[]).unwrap_err();
        match &err {
            CascadeError::Grid { field, source } => {
                assert_eq!(field, "rate[0].detail[0].prior_type");
                assert_eq!(source, &GridError::UnknownPriorKind("slope".into()));
            }
            other => panic!("Expected a grid error, got {:?}", other),
        }
        assert_eq!(err.class(), ErrorClass::Grid);
    }

    #[test]
    fn test_unknown_rate_is_configuration_error() {
        let h = hierarchy();
        let s = settings(json!({"random_effect": [{"rate": 99, "default": {"value": {"density": "uniform"}}}]}));
        let err = ModelBuilder::new(&s, &h).validate().unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Configuration(ConfigurationError::UnknownRate { ref path, .. }) if path == "random_effect[0].rate"
        ));
    }

    #[test]
    fn test_drill_sex_must_be_one_sex() {
        let h = hierarchy();
        let mut s = settings(json!({}));
        s.model.drill_sex = Some(3);
        let err = ModelBuilder::new(&s, &h).validate().unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Configuration(ConfigurationError::Invalid { ref path, .. }) if path == "model.drill_sex"
        ));
        s.model.drill_sex = Some(2);
        assert!(ModelBuilder::new(&s, &h).validate().is_ok());
    }

    #[test]
    fn test_study_and_country_collision() {
        let h = hierarchy();
        let entry = json!({"covariate": "sex", "mulcov_type": "meas_value", "measure": "prevalence",
                           "default": {"value": {"density": "uniform", "min": -1, "max": 1}}});
        let s = settings(json!({"study_covariate": [entry.clone()], "country_covariate": [entry]}));
        let err = ModelBuilder::new(&s, &h).covariate_specs().unwrap_err();
        assert!(matches!(err, ConfigurationError::CovariateCollision { .. }));
    }

    #[test]
    fn test_multiplier_attaches_to_transformed_covariate() {
        let h = hierarchy();
        let s = settings(json!({
            "random_effect": [{"rate": "iota", "default": {"value": {"density": "gaussian", "mean": 0, "std": 1}}}],
            "country_covariate": [{"covariate": "ldi", "transformation": 1, "mulcov_type": "rate_value",
                                   "measure": "Sincidence",
                                   "default": {"value": {"density": "uniform", "min": -1, "max": 1}}}]
        }));
        let builder = ModelBuilder::new(&s, &h);
        let specs = builder.covariate_specs().unwrap();
        assert_eq!(specs[0].name(), "ldi_log");
        let covariates: Vec<Covariate> = specs.iter().map(|s| s.with_reference(1.5)).collect();
        let model = builder.build(LocationId(1), &covariates).unwrap();
        let keys: Vec<String> = model.fields.iter().map(|(k, _)| k.to_string()).collect();
        assert!(keys.contains(&"alpha ldi_log iota".to_string()), "{:?}", keys);
        assert!(model.fields.get(&FieldKey::Rate(RateName::Iota)).is_some());
    }

    #[test]
    fn test_random_effects_must_cover_every_child() {
        let h = hierarchy();
        let s = settings(json!({"random_effect": [{"rate": "iota", "location": 2,
                                "default": {"value": {"density": "gaussian", "mean": 0, "std": 1}}}]}));
        let err = ModelBuilder::new(&s, &h).build(LocationId(1), &[]).unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Configuration(ConfigurationError::MissingRandomEffect { ref children, .. }) if children == &vec![3]
        ));
        // A leaf has no children, so the same entries are simply unused there.
        assert!(ModelBuilder::new(&s, &h).build(LocationId(3), &[]).is_ok());
    }
}
