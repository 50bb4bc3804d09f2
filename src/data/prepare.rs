//! Turns raw inputs for one location into rows with covariate columns.
use super::inputs::{AvgintRow, CountryCovariateRow, InMemoryInputs, InputSource, Observation};
use crate::error::CascadeError;
use crate::hierarchy::{LocationHierarchy, LocationId};
use crate::model::Covariate;
use crate::settings::{ConfigurationError, CovariateOrigin, CovariateSpec, Settings};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};

/// A row plus its covariate values, aligned with [`PreparedData::covariates`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared<R> {
    pub row: R,
    pub x: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub location: LocationId,
    pub covariates: Vec<Covariate>,
    pub data: Vec<Prepared<Observation>>,
    pub avgint: Vec<Prepared<AvgintRow>>,
}

/// Raw inputs for estimating `location`: observations in its subtree, country
/// covariates along its subtree and ancestors, and its own prediction points.
pub fn fetch_inputs(
    source: &dyn InputSource,
    hierarchy: &LocationHierarchy,
    specs: &[CovariateSpec],
    location: LocationId,
) -> Result<InMemoryInputs, CascadeError> {
    let subtree = hierarchy.descendants_of(location, true)?;
    let observations = source.observations(&subtree)?;

    let mut reach: BTreeSet<LocationId> = subtree;
    reach.extend(hierarchy.ancestors_path(location, 0)?);
    let names: BTreeSet<String> = specs
        .iter()
        .filter(|s| s.origin == CovariateOrigin::Country)
        .map(|s| s.source.clone())
        .collect();
    let country_covariates =
        if names.is_empty() { Vec::new() } else { source.country_covariates(&names, &reach)? };

    let avgint = source.prediction_points(location)?;
    info!(
        "Fetched {} observations, {} covariate values and {} prediction points for location {}",
        observations.len(),
        country_covariates.len(),
        avgint.len(),
        location
    );
    Ok(InMemoryInputs { observations, country_covariates, avgint })
}

/// Country covariate series per (covariate, location), sorted by time.
struct CovariateSeries<'a> {
    series: HashMap<(&'a str, LocationId), Vec<(f64, f64)>>,
}

impl<'a> CovariateSeries<'a> {
    fn new(rows: &'a [CountryCovariateRow]) -> Self {
        let mut series: HashMap<(&'a str, LocationId), Vec<(f64, f64)>> = HashMap::new();
        for row in rows {
            series.entry((row.covariate.as_str(), row.location_id)).or_default().push((row.time, row.value));
        }
        for values in series.values_mut() {
            values.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        Self { series }
    }

    /// Value nearest in time at `location`, or at the closest ancestor with any values.
    fn value_at(
        &self,
        hierarchy: &LocationHierarchy,
        name: &str,
        location: LocationId,
        time: f64,
    ) -> Result<f64, CascadeError> {
        let mut cursor = Some(location);
        while let Some(current) = cursor {
            if let Some(values) = self.series.get(&(name, current)) {
                let nearest = values
                    .iter()
                    .min_by(|a, b| (a.0 - time).abs().total_cmp(&(b.0 - time).abs()));
                if let Some((_, value)) = nearest {
                    return Ok(*value);
                }
            }
            cursor = hierarchy.parent_of(current)?;
        }
        Err(ConfigurationError::MissingCovariateValue { covariate: name.to_string(), location: location.0 }.into())
    }
}

/// A transformed value the solver can use. Log and logit of out-of-range raw
/// values are not finite and are rejected.
fn transformed(spec: &CovariateSpec, raw: f64, location: LocationId, row: &dyn Fn() -> String) -> Result<f64, CascadeError> {
    let value = spec.transform.apply(raw);
    if value.is_finite() {
        return Ok(value);
    }
    Err(ConfigurationError::NonFiniteCovariate { covariate: spec.name(), location: location.0, row: row(), value }.into())
}

fn covariate_column(
    spec: &CovariateSpec,
    series: &CovariateSeries<'_>,
    hierarchy: &LocationHierarchy,
    location: LocationId,
    time: f64,
    study: Option<&Observation>,
    row: &dyn Fn() -> String,
) -> Result<f64, CascadeError> {
    let raw = match spec.origin {
        CovariateOrigin::Study => match study.and_then(|o| o.study_covariates.get(&spec.source)) {
            Some(value) => *value,
            None => return Ok(0.0),
        },
        CovariateOrigin::Country => series.value_at(hierarchy, &spec.source, location, time)?,
    };
    transformed(spec, raw, location, row)
}

/// Attaches covariate columns and enforces the minimum coefficient of variation.
/// With `drill_sex` set, observations of the other sex are dropped.
///
/// Study covariates are zero at the reference and wherever a row does not
/// report them. Country covariates are referenced to their value at the
/// estimated location, at the middle of the default time grid.
pub fn prepare_data(
    inputs: &InMemoryInputs,
    hierarchy: &LocationHierarchy,
    settings: &Settings,
    specs: &[CovariateSpec],
    location: LocationId,
) -> Result<PreparedData, CascadeError> {
    let series = CovariateSeries::new(&inputs.country_covariates);
    let times = &settings.model.default_time_grid;
    let reference_time = match (times.iter().copied().reduce(f64::min), times.iter().copied().reduce(f64::max)) {
        (Some(lo), Some(hi)) => 0.5 * (lo + hi),
        _ => 0.0,
    };

    let mut covariates = Vec::with_capacity(specs.len());
    for spec in specs {
        let reference = match spec.origin {
            CovariateOrigin::Study => 0.0,
            CovariateOrigin::Country => {
                let raw = series.value_at(hierarchy, &spec.source, location, reference_time)?;
                transformed(spec, raw, location, &|| "the reference value".to_string())?
            }
        };
        covariates.push(spec.with_reference(reference));
    }

    let cv = settings.policies.minimum_meas_cv;
    let mut data = Vec::with_capacity(inputs.observations.len());
    for (index, observation) in inputs.observations.iter().enumerate() {
        if let Some(sex) = settings.model.drill_sex {
            if !observation.matches_sex(sex) {
                continue;
            }
        }
        let mut row = observation.clone();
        if cv > 0.0 {
            row.std = row.std.max(cv * row.mean.abs());
        }
        let x = specs
            .iter()
            .map(|s| {
                let describe = || format!("observation {}", index);
                covariate_column(s, &series, hierarchy, row.location_id, row.time_midpoint(), Some(observation), &describe)
            })
            .collect::<Result<Vec<_>, _>>()?;
        data.push(Prepared { row, x });
    }

    let mut avgint = Vec::with_capacity(inputs.avgint.len());
    for (index, point) in inputs.avgint.iter().enumerate() {
        let x = specs
            .iter()
            .map(|s| {
                let describe = || format!("prediction point {}", index);
                covariate_column(s, &series, hierarchy, point.location_id, point.time_midpoint(), None, &describe)
            })
            .collect::<Result<Vec<_>, _>>()?;
        avgint.push(Prepared { row: point.clone(), x });
    }

    debug!("Prepared {} data rows with {} covariates for location {}", data.len(), covariates.len(), location);
    Ok(PreparedData { location, covariates, data, avgint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::LocationRow;
    use crate::model::{Integrand, Transform};
    use serde_json::json;

    fn hierarchy() -> LocationHierarchy {
        LocationHierarchy::build(&[
            LocationRow::new(1, None, "Global"),
            LocationRow::new(2, Some(1), "North"),
            LocationRow::new(3, Some(1), "South"),
            LocationRow::new(4, Some(2), "North East"),
        ])
        .unwrap()
    }

    fn settings(cv: f64) -> Settings {
        serde_json::from_value(json!({
            "model": {"drill": "cascade", "default_age_grid": [0, 100], "default_time_grid": [1990, 2010]},
            "rate": [],
            "policies": {"minimum_meas_cv": cv}
        }))
        .unwrap()
    }

    fn observation(location: i64, mean: f64, std: f64) -> Observation {
        Observation {
            integrand: Integrand::Prevalence,
            location_id: LocationId(location),
            age_lower: 20.0,
            age_upper: 30.0,
            time_lower: 2000.0,
            time_upper: 2000.0,
            mean,
            std,
            density: crate::model::Density::Gaussian,
            hold_out: false,
            sex_id: None,
            eta: None,
            nu: None,
            study_covariates: [("sex".to_string(), 0.5)].into_iter().collect(),
        }
    }

    fn inputs() -> InMemoryInputs {
        let cov = |loc: i64, time: f64, value: f64| CountryCovariateRow {
            covariate: "ldi".into(),
            location_id: LocationId(loc),
            time,
            value,
        };
        InMemoryInputs {
            observations: vec![observation(2, 0.1, 0.001), observation(4, 0.2, 0.05), observation(3, 0.3, 0.01)],
            country_covariates: vec![cov(2, 1995.0, 10.0), cov(2, 2005.0, 20.0), cov(1, 2000.0, 5.0)],
            avgint: vec![],
        }
    }

    fn specs() -> Vec<CovariateSpec> {
        vec![
            CovariateSpec { source: "sex".into(), transform: Transform::Identity, origin: CovariateOrigin::Study },
            CovariateSpec { source: "ldi".into(), transform: Transform::Scale(2.0), origin: CovariateOrigin::Country },
        ]
    }

    #[test]
    fn test_fetch_keeps_subtree_observations() {
        let fetched = fetch_inputs(&inputs(), &hierarchy(), &specs(), LocationId(2)).unwrap();
        let locations: Vec<i64> = fetched.observations.iter().map(|o| o.location_id.0).collect();
        assert_eq!(locations, vec![2, 4]);
        // covariates reach up to the root for fallback
        assert_eq!(fetched.country_covariates.len(), 3);
    }

    #[test]
    fn test_covariate_columns_fall_back_to_ancestors() {
        let h = hierarchy();
        let fetched = fetch_inputs(&inputs(), &h, &specs(), LocationId(2)).unwrap();
        let prepared = prepare_data(&fetched, &h, &settings(0.0), &specs(), LocationId(2)).unwrap();

        assert_eq!(prepared.covariates[0].name, "sex");
        assert_eq!(prepared.covariates[0].reference, 0.0);
        // Reference at location 2, time 2000: both 1995 and 2005 are 5 away, the earlier wins.
        assert_eq!(prepared.covariates[1].reference, 20.0);
        // Location 4 has no series of its own and takes its parent's.
        assert_eq!(prepared.data[1].x, vec![0.5, 20.0]);
    }

    #[test]
    fn test_minimum_cv_raises_small_std() {
        let h = hierarchy();
        let fetched = fetch_inputs(&inputs(), &h, &specs(), LocationId(2)).unwrap();
        let prepared = prepare_data(&fetched, &h, &settings(0.1), &specs(), LocationId(2)).unwrap();
        assert!((prepared.data[0].row.std - 0.01).abs() < 1e-15);
        assert_eq!(prepared.data[1].row.std, 0.05);
    }

    #[test]
    fn test_missing_country_covariate_is_reported() {
        let h = hierarchy();
        let mut raw = inputs();
        raw.country_covariates.clear();
        let err = prepare_data(&raw, &h, &settings(0.0), &specs(), LocationId(3)).unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Configuration(ConfigurationError::MissingCovariateValue { location: 3, .. })
        ));
    }

    #[test]
    fn test_log_of_zero_covariate_is_rejected() {
        let h = hierarchy();
        let mut raw = inputs();
        raw.country_covariates.push(CountryCovariateRow {
            covariate: "ldi".into(),
            location_id: LocationId(4),
            time: 2000.0,
            value: 0.0,
        });
        let specs = vec![CovariateSpec { source: "ldi".into(), transform: Transform::Log, origin: CovariateOrigin::Country }];
        let err = prepare_data(&raw, &h, &settings(0.0), &specs, LocationId(2)).unwrap_err();
        match err {
            CascadeError::Configuration(ConfigurationError::NonFiniteCovariate { covariate, location, row, value }) => {
                assert_eq!(covariate, "ldi_log");
                assert_eq!(location, 4);
                assert_eq!(row, "observation 1");
                assert_eq!(value, f64::NEG_INFINITY);
            }
            other => panic!("Expected a non-finite covariate, got {:?}", other),
        }
        assert_eq!(
            CascadeError::from(ConfigurationError::NonFiniteCovariate {
                covariate: "ldi_log".into(),
                location: 4,
                row: "observation 1".into(),
                value: f64::NAN,
            })
            .class(),
            crate::error::ErrorClass::Configuration
        );
    }

    #[test]
    fn test_study_covariate_outside_logit_range_is_rejected() {
        let h = hierarchy();
        let specs = vec![CovariateSpec { source: "sex".into(), transform: Transform::Logit, origin: CovariateOrigin::Study }];
        let mut raw = inputs();
        raw.observations[2].study_covariates.insert("sex".into(), 1.5);
        let err = prepare_data(&raw, &h, &settings(0.0), &specs, LocationId(1)).unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Configuration(ConfigurationError::NonFiniteCovariate { location: 3, .. })
        ));
    }

    #[test]
    fn test_drill_sex_keeps_matching_and_pooled_rows() {
        let h = hierarchy();
        let mut raw = inputs();
        raw.observations[0].sex_id = Some(1);
        raw.observations[1].sex_id = Some(2);
        raw.observations[2].sex_id = Some(crate::data::BOTH_SEXES);
        let mut settings = settings(0.0);
        settings.model.drill_sex = Some(2);
        let prepared = prepare_data(&raw, &h, &settings, &specs(), LocationId(1)).unwrap();
        let kept: Vec<i64> = prepared.data.iter().map(|d| d.row.location_id.0).collect();
        assert_eq!(kept, vec![4, 3]);

        settings.model.drill_sex = None;
        let prepared = prepare_data(&raw, &h, &settings, &specs(), LocationId(1)).unwrap();
        assert_eq!(prepared.data.len(), 3);
    }
}
