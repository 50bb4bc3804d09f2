//! decode.rs
//! Reads solver output back into model-shaped values, and writes model-shaped
//! values into an image as start or fit values.

use super::encode::PARENT_NODE_OPTION;
use super::error::CompileError;
use super::tables::{FitVarRow, RelationalImage, StartVarRow, VarRow};
use crate::hierarchy::LocationId;
use crate::model::{AgeTimeGrid, AlphaKey, FieldKey, FieldValues, FittedModel, Integrand, MulcovKey, RandomEffectKey, RateName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One predicted integrand average, with the prediction point it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub location_id: LocationId,
    pub integrand: Integrand,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    pub sample_index: Option<usize>,
    pub value: f64,
}

/// Resolves var rows to the fields they belong to. Std multipliers have no field.
struct VarIndex<'a> {
    image: &'a RelationalImage,
    parent_node: usize,
}

impl<'a> VarIndex<'a> {
    fn new(image: &'a RelationalImage) -> Result<Self, CompileError> {
        let parent_node = image
            .option(PARENT_NODE_OPTION)
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or(CompileError::MissingOption(PARENT_NODE_OPTION))?;
        Ok(Self { image, parent_node })
    }

    fn rate(&self, id: Option<usize>) -> Result<RateName, CompileError> {
        let id = id.ok_or(CompileError::BrokenReference { table: "rate", id: usize::MAX })?;
        RateName::ALL
            .into_iter()
            .find(|r| r.rate_id() == id)
            .ok_or(CompileError::BrokenReference { table: "rate", id })
    }

    fn integrand(&self, id: Option<usize>) -> Result<Integrand, CompileError> {
        let id = id.ok_or(CompileError::BrokenReference { table: "integrand", id: usize::MAX })?;
        Integrand::ALL
            .into_iter()
            .find(|i| i.integrand_id() == id)
            .ok_or(CompileError::BrokenReference { table: "integrand", id })
    }

    fn covariate(&self, id: Option<usize>) -> Result<String, CompileError> {
        let id = id.ok_or(CompileError::BrokenReference { table: "covariate", id: usize::MAX })?;
        self.image
            .covariate
            .iter()
            .find(|c| c.covariate_id == id)
            .map(|c| c.covariate_name.clone())
            .ok_or(CompileError::BrokenReference { table: "covariate", id })
    }

    fn key(&self, var: &VarRow) -> Result<Option<FieldKey>, CompileError> {
        let key = match var.var_type.as_str() {
            "rate" => {
                let rate = self.rate(var.rate_id)?;
                match var.node_id {
                    Some(node) if node == self.parent_node => FieldKey::Rate(rate),
                    Some(node) => {
                        let row = self
                            .image
                            .node
                            .iter()
                            .find(|n| n.node_id == node)
                            .ok_or(CompileError::BrokenReference { table: "node", id: node })?;
                        FieldKey::RandomEffect(RandomEffectKey::child(rate, LocationId(row.c_location_id)))
                    }
                    None => return Err(CompileError::BrokenReference { table: "node", id: usize::MAX }),
                }
            }
            "mulcov_rate_value" => FieldKey::Alpha(AlphaKey {
                covariate: self.covariate(var.covariate_id)?,
                rate: self.rate(var.rate_id)?,
            }),
            "mulcov_meas_value" => FieldKey::Beta(MulcovKey {
                covariate: self.covariate(var.covariate_id)?,
                integrand: self.integrand(var.integrand_id)?,
            }),
            "mulcov_meas_noise" => FieldKey::Gamma(MulcovKey {
                covariate: self.covariate(var.covariate_id)?,
                integrand: self.integrand(var.integrand_id)?,
            }),
            _ => return Ok(None),
        };
        Ok(Some(key))
    }

    fn age(&self, id: Option<usize>) -> Result<f64, CompileError> {
        let id = id.ok_or(CompileError::BrokenReference { table: "age", id: usize::MAX })?;
        self.image.age.get(id).map(|r| r.age).ok_or(CompileError::BrokenReference { table: "age", id })
    }

    fn time(&self, id: Option<usize>) -> Result<f64, CompileError> {
        let id = id.ok_or(CompileError::BrokenReference { table: "time", id: usize::MAX })?;
        self.image.time.get(id).map(|r| r.time).ok_or(CompileError::BrokenReference { table: "time", id })
    }

    /// The grid of one smoothing, rebuilt from its smooth_grid rows.
    fn grid(&self, smooth_id: usize, field: &FieldKey) -> Result<AgeTimeGrid, CompileError> {
        let mut ages = Vec::new();
        let mut times = Vec::new();
        for row in self.image.smooth_grid.iter().filter(|r| r.smooth_id == smooth_id) {
            let age = self.age(Some(row.age_id))?;
            let time = self.time(Some(row.time_id))?;
            if !ages.contains(&age) {
                ages.push(age);
            }
            if !times.contains(&time) {
                times.push(time);
            }
        }
        AgeTimeGrid::new(ages, times).map_err(|source| CompileError::Grid { field: field.to_string(), source })
    }
}

/// Builds the fitted model from one value per var.
pub fn decode(image: &RelationalImage, values: &[FitVarRow]) -> Result<FittedModel, CompileError> {
    let index = VarIndex::new(image)?;
    let by_var: HashMap<usize, f64> = values.iter().map(|r| (r.fit_var_id, r.fit_var_value)).collect();

    let mut fitted = FittedModel::new();
    let mut seen: HashMap<FieldKey, Vec<bool>> = HashMap::new();
    for var in &image.var {
        let Some(key) = index.key(var)? else {
            // std multipliers sit on no grid cell but still need a result
            if !by_var.contains_key(&var.var_id) {
                return Err(CompileError::MissingResult {
                    var_id: var.var_id,
                    field: format!("{} of smooth {}", var.var_type, var.smooth_id),
                    age: f64::NAN,
                    time: f64::NAN,
                });
            }
            continue;
        };
        let age = index.age(var.age_id)?;
        let time = index.time(var.time_id)?;
        let value = by_var.get(&var.var_id).copied().ok_or_else(|| CompileError::MissingResult {
            var_id: var.var_id,
            field: key.to_string(),
            age,
            time,
        })?;

        if fitted.get(&key).is_none() {
            let grid = index.grid(var.smooth_id, &key)?;
            seen.insert(key.clone(), vec![false; grid.len()]);
            fitted.insert(key.clone(), FieldValues::filled(grid, f64::NAN));
        }
        let field = field_mut(&mut fitted, &key);
        let grid = field.grid();
        let cell = match (grid.age_index(age), grid.time_index(time)) {
            (Some(ai), Some(ti)) => grid.cell(ai, ti),
            _ => return Err(CompileError::BrokenReference { table: "smooth_grid", id: var.smooth_id }),
        };
        field.set_cell(cell, value);
        if let Some(flags) = seen.get_mut(&key) {
            flags[cell] = true;
        }
    }

    for (key, flags) in &seen {
        if let Some(cell) = flags.iter().position(|f| !f) {
            let (age, time) = fitted
                .get(key)
                .and_then(|f| f.grid().age_time().nth(cell))
                .unwrap_or((f64::NAN, f64::NAN));
            return Err(CompileError::MissingResult { var_id: usize::MAX, field: key.to_string(), age, time });
        }
    }
    Ok(fitted)
}

fn field_mut<'a>(fitted: &'a mut FittedModel, key: &FieldKey) -> &'a mut FieldValues {
    let slot = match key {
        FieldKey::Rate(k) => fitted.rate.get_mut(k),
        FieldKey::RandomEffect(k) => fitted.random_effect.get_mut(k),
        FieldKey::Alpha(k) => fitted.alpha.get_mut(k),
        FieldKey::Beta(k) => fitted.beta.get_mut(k),
        FieldKey::Gamma(k) => fitted.gamma.get_mut(k),
    };
    slot.expect("BUG: field inserted before it is written")
}

/// One fitted model per sample index, in index order.
pub fn decode_samples(image: &RelationalImage) -> Result<Vec<FittedModel>, CompileError> {
    let mut by_index: BTreeMap<usize, Vec<FitVarRow>> = BTreeMap::new();
    for row in &image.sample {
        by_index
            .entry(row.sample_index)
            .or_default()
            .push(FitVarRow { fit_var_id: row.var_id, fit_var_value: row.var_value });
    }
    by_index.values().map(|rows| decode(image, rows)).collect()
}

/// Named weightings read back from the weight tables.
pub fn decode_weights(image: &RelationalImage) -> Result<BTreeMap<String, FieldValues>, CompileError> {
    let index = VarIndex::new(image)?;
    let mut weights = BTreeMap::new();
    for row in &image.weight {
        let points: Vec<_> = image.weight_grid.iter().filter(|g| g.weight_id == row.weight_id).collect();
        let mut ages = Vec::with_capacity(row.n_age);
        let mut times = Vec::with_capacity(row.n_time);
        for point in &points {
            let age = index.age(Some(point.age_id))?;
            let time = index.time(Some(point.time_id))?;
            if !ages.contains(&age) {
                ages.push(age);
            }
            if !times.contains(&time) {
                times.push(time);
            }
        }
        let grid = AgeTimeGrid::new(ages, times)
            .map_err(|source| CompileError::Grid { field: format!("weight {}", row.weight_name), source })?;
        let mut values = FieldValues::filled(grid, f64::NAN);
        for point in &points {
            let (age, time) = (index.age(Some(point.age_id))?, index.time(Some(point.time_id))?);
            let grid = values.grid();
            let cell = match (grid.age_index(age), grid.time_index(time)) {
                (Some(ai), Some(ti)) => grid.cell(ai, ti),
                _ => return Err(CompileError::BrokenReference { table: "weight_grid", id: point.weight_grid_id }),
            };
            values.set_cell(cell, point.weight);
        }
        if values.values().iter().any(|v| v.is_nan()) || points.len() != row.n_age * row.n_time {
            return Err(CompileError::BrokenReference { table: "weight_grid", id: row.weight_id });
        }
        weights.insert(row.weight_name.clone(), values);
    }
    Ok(weights)
}

/// Values for every var taken from `fit` where it has the field, otherwise
/// the current start value.
fn values_from(image: &RelationalImage, fit: &FittedModel) -> Result<Vec<f64>, CompileError> {
    let index = VarIndex::new(image)?;
    let current: HashMap<usize, f64> =
        image.start_var.iter().map(|r| (r.start_var_id, r.start_var_value)).collect();
    let mut values = Vec::with_capacity(image.var.len());
    for var in &image.var {
        let fallback = current.get(&var.var_id).copied().unwrap_or(0.0);
        let value = match index.key(var)? {
            Some(key) => match fit.get(&key) {
                Some(field) => field.at(index.age(var.age_id)?, index.time(var.time_id)?),
                None => fallback,
            },
            None => fallback,
        };
        values.push(value);
    }
    Ok(values)
}

/// Starts the next optimization from `fit`, interpolated onto this image's grids.
pub fn set_start_values(image: &mut RelationalImage, fit: &FittedModel) -> Result<(), CompileError> {
    let values = values_from(image, fit)?;
    image.start_var = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| StartVarRow { start_var_id: image.var[i].var_id, start_var_value: v })
        .collect();
    Ok(())
}

/// Fills the fit table so predictions can run without optimizing.
pub fn set_fit_values(image: &mut RelationalImage, fit: &FittedModel) -> Result<(), CompileError> {
    let values = values_from(image, fit)?;
    image.fit_var = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| FitVarRow { fit_var_id: image.var[i].var_id, fit_var_value: v })
        .collect();
    Ok(())
}

/// Joins predicted averages with their prediction points.
pub fn predictions(image: &RelationalImage) -> Result<Vec<Prediction>, CompileError> {
    let index = VarIndex::new(image)?;
    image
        .predict
        .iter()
        .map(|p| {
            let point = image
                .avgint
                .iter()
                .find(|a| a.avgint_id == p.avgint_id)
                .ok_or(CompileError::BrokenReference { table: "avgint", id: p.avgint_id })?;
            let node = image
                .node
                .iter()
                .find(|n| n.node_id == point.node_id)
                .ok_or(CompileError::BrokenReference { table: "node", id: point.node_id })?;
            Ok(Prediction {
                location_id: LocationId(node.c_location_id),
                integrand: index.integrand(Some(point.integrand_id))?,
                age_lower: point.age_lower,
                age_upper: point.age_upper,
                time_lower: point.time_lower,
                time_upper: point.time_upper,
                sample_index: p.sample_index,
                value: p.avg_integrand,
            })
        })
        .collect()
}
