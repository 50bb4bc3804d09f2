//! encode.rs
//! Writes a [`Model`] into relational tables on one canonical coordinate system.

use super::canonical::CanonicalAxis;
use super::error::CompileError;
use super::tables::*;
use crate::data::PreparedData;
use crate::hierarchy::{LocationHierarchy, LocationId};
use crate::model::prior::PriorBits;
use crate::model::{FieldKey, Integrand, Model, Prior, PriorKind, RandomEffectKey, RateName, SmoothGrid};
use crate::model::grid::ResolvedPriors;
use log::debug;
use std::collections::HashMap;

/// Options the image always carries. Settings cannot override these.
pub const PARENT_NODE_OPTION: &str = "parent_node_id";

pub fn var_type_of(key: &FieldKey) -> &'static str {
    match key {
        FieldKey::Rate(_) | FieldKey::RandomEffect(_) => "rate",
        FieldKey::Alpha(_) => "mulcov_rate_value",
        FieldKey::Beta(_) => "mulcov_meas_value",
        FieldKey::Gamma(_) => "mulcov_meas_noise",
    }
}

fn mulstd_var_type(kind: PriorKind) -> &'static str {
    match kind {
        PriorKind::Value => "mulstd_value",
        PriorKind::Dage => "mulstd_dage",
        PriorKind::Dtime => "mulstd_dtime",
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Prior rows shared by every identical prior in the model.
#[derive(Default)]
struct PriorTable {
    ids: HashMap<PriorBits, usize>,
    rows: Vec<PriorRow>,
}

impl PriorTable {
    fn id(&mut self, prior: &Prior) -> usize {
        let next = self.rows.len();
        let id = *self.ids.entry(prior.bit_key()).or_insert(next);
        if id == next {
            self.rows.push(PriorRow {
                prior_id: id,
                prior_name: format!("prior_{}", id),
                density_id: prior.density.density_id(),
                density_name: prior.density.as_str().to_string(),
                lower: finite(prior.lower),
                upper: finite(prior.upper),
                mean: prior.mean,
                std: prior.std,
                eta: prior.eta,
                nu: prior.nu,
            });
        }
        id
    }
}

/// Builds the image for one model, optionally with data, prediction points and options.
pub struct ImageBuilder<'a> {
    model: &'a Model,
    hierarchy: &'a LocationHierarchy,
    data: Option<&'a PreparedData>,
    options: Vec<(String, String)>,
    minimum_meas_cv: f64,
}

/// The image for `model` with no data rows.
pub fn encode(model: &Model, hierarchy: &LocationHierarchy) -> Result<RelationalImage, CompileError> {
    ImageBuilder::new(model, hierarchy).build()
}

impl<'a> ImageBuilder<'a> {
    pub fn new(model: &'a Model, hierarchy: &'a LocationHierarchy) -> Self {
        Self { model, hierarchy, data: None, options: Vec::new(), minimum_meas_cv: 0.0 }
    }

    pub fn with_data(mut self, data: &'a PreparedData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_options(mut self, options: Vec<(String, String)>) -> Self {
        self.options = options;
        self
    }

    pub fn with_minimum_meas_cv(mut self, cv: f64) -> Self {
        self.minimum_meas_cv = cv;
        self
    }

    pub fn build(self) -> Result<RelationalImage, CompileError> {
        let model = self.model;
        if model.fields.rate.is_empty() {
            return Err(CompileError::EmptyModel);
        }

        let mut fields: Vec<(FieldKey, &SmoothGrid, ResolvedPriors)> = Vec::with_capacity(model.fields.len());
        for (key, grid) in model.fields.iter() {
            let resolved = grid
                .resolve()
                .map_err(|source| CompileError::Grid { field: key.to_string(), source })?;
            fields.push((key, grid, resolved));
        }

        let (ages, times) = self.canonical_axes();
        let mut image = RelationalImage {
            age: ages.values().iter().enumerate().map(|(age_id, &age)| AgeRow { age_id, age }).collect(),
            time: times.values().iter().enumerate().map(|(time_id, &time)| TimeRow { time_id, time }).collect(),
            ..RelationalImage::default()
        };

        let node_of = self.write_nodes(&mut image)?;
        let parent_node = *node_of
            .get(&model.parent_location)
            .ok_or(CompileError::UnknownLocation(model.parent_location))?;

        image.integrand = Integrand::ALL
            .iter()
            .map(|i| IntegrandRow {
                integrand_id: i.integrand_id(),
                integrand_name: i.as_str().to_string(),
                minimum_meas_cv: self.minimum_meas_cv,
            })
            .collect();
        image.covariate = model
            .covariates()
            .iter()
            .enumerate()
            .map(|(covariate_id, c)| CovariateRow {
                covariate_id,
                covariate_name: c.name.clone(),
                reference: c.reference,
                max_difference: c.max_difference,
            })
            .collect();
        let covariate_id = |name: &str| model.covariates().iter().position(|c| c.name == name);

        let mut priors = PriorTable::default();
        let mut smooth_of: HashMap<FieldKey, usize> = HashMap::with_capacity(fields.len());
        for (key, grid, resolved) in &fields {
            let smooth_id = image.smooth.len();
            let mulstd_id = |priors: &mut PriorTable, kind| grid.mulstd.get(kind).map(|p| priors.id(p));
            image.smooth.push(SmoothRow {
                smooth_id,
                smooth_name: key.to_string(),
                n_age: grid.ages().len(),
                n_time: grid.times().len(),
                mulstd_value_prior_id: mulstd_id(&mut priors, PriorKind::Value),
                mulstd_dage_prior_id: mulstd_id(&mut priors, PriorKind::Dage),
                mulstd_dtime_prior_id: mulstd_id(&mut priors, PriorKind::Dtime),
            });

            let (n_age, n_time) = (grid.ages().len(), grid.times().len());
            for (ai, &age) in grid.ages().iter().enumerate() {
                for (ti, &time) in grid.times().iter().enumerate() {
                    let cell = grid.grid().cell(ai, ti);
                    let value = &resolved.value[cell];
                    // a value prior pinned to one point becomes a constant
                    let const_value = (value.lower == value.upper).then_some(value.lower);
                    let row = SmoothGridRow {
                        smooth_grid_id: image.smooth_grid.len(),
                        smooth_id,
                        age_id: ages.id_of(age).expect("BUG: grid age missing from canonical ages"),
                        time_id: times.id_of(time).expect("BUG: grid time missing from canonical times"),
                        value_prior_id: const_value.is_none().then(|| priors.id(value)),
                        dage_prior_id: (ai + 1 < n_age).then(|| priors.id(&resolved.dage[cell])),
                        dtime_prior_id: (ti + 1 < n_time).then(|| priors.id(&resolved.dtime[cell])),
                        const_value,
                    };
                    image.smooth_grid.push(row);
                }
            }
            smooth_of.insert(key.clone(), smooth_id);
        }
        image.prior = priors.rows;

        for (weight_id, (name, weight)) in model.weights().iter().enumerate() {
            image.weight.push(WeightRow {
                weight_id,
                weight_name: name.clone(),
                n_age: weight.ages().len(),
                n_time: weight.times().len(),
            });
            for ((age, time), &value) in weight.grid().age_time().zip(weight.values()) {
                image.weight_grid.push(WeightGridRow {
                    weight_grid_id: image.weight_grid.len(),
                    weight_id,
                    age_id: ages.id_of(age).expect("BUG: weight age missing from canonical ages"),
                    time_id: times.id_of(time).expect("BUG: weight time missing from canonical times"),
                    weight: value,
                });
            }
        }

        self.write_rates(&mut image, &smooth_of, &node_of);

        for (key, _, _) in &fields {
            let (covariate, rate_id, integrand_id) = match key {
                FieldKey::Alpha(k) => (&k.covariate, Some(k.rate.rate_id()), None),
                FieldKey::Beta(k) | FieldKey::Gamma(k) => (&k.covariate, None, Some(k.integrand.integrand_id())),
                _ => continue,
            };
            let covariate_id = covariate_id(covariate).expect("BUG: multiplier attached without its covariate");
            image.mulcov.push(MulcovRow {
                mulcov_id: image.mulcov.len(),
                mulcov_type: var_type_of(key).trim_start_matches("mulcov_").to_string(),
                rate_id,
                integrand_id,
                covariate_id,
                smooth_id: smooth_of[key],
            });
        }

        self.write_vars(&mut image, &fields, &smooth_of, &node_of, parent_node);

        if let Some(data) = self.data {
            self.write_data(&mut image, data, &node_of)?;
        }

        image.option.push(OptionRow {
            option_id: 0,
            option_name: PARENT_NODE_OPTION.to_string(),
            option_value: parent_node.to_string(),
        });
        for (name, value) in &self.options {
            image.option.push(OptionRow {
                option_id: image.option.len(),
                option_name: name.clone(),
                option_value: value.clone(),
            });
        }

        debug!(
            "Encoded {} vars over {} ages, {} times and {} priors",
            image.var.len(),
            image.age.len(),
            image.time.len(),
            image.prior.len()
        );
        Ok(image)
    }

    /// Grid coordinates of every field, widened to the extents of data and prediction rows.
    fn canonical_axes(&self) -> (CanonicalAxis, CanonicalAxis) {
        let mut ages = Vec::new();
        let mut times = Vec::new();
        for (_, grid) in self.model.fields.iter() {
            ages.extend_from_slice(grid.ages());
            times.extend_from_slice(grid.times());
        }
        for weight in self.model.weights().values() {
            ages.extend_from_slice(weight.ages());
            times.extend_from_slice(weight.times());
        }
        if let Some(data) = self.data {
            let extents = data
                .data
                .iter()
                .map(|d| (d.row.age_lower, d.row.age_upper, d.row.time_lower, d.row.time_upper))
                .chain(data.avgint.iter().map(|a| (a.row.age_lower, a.row.age_upper, a.row.time_lower, a.row.time_upper)));
            let mut span: Option<[f64; 4]> = None;
            for (al, au, tl, tu) in extents {
                let s = span.get_or_insert([al, au, tl, tu]);
                *s = [s[0].min(al), s[1].max(au), s[2].min(tl), s[3].max(tu)];
            }
            if let Some([al, au, tl, tu]) = span {
                ages.extend([al, au]);
                times.extend([tl, tu]);
            }
        }
        (CanonicalAxis::from_values(ages), CanonicalAxis::from_values(times))
    }

    /// Numbers locations breadth first from the root, which becomes node 0.
    fn write_nodes(&self, image: &mut RelationalImage) -> Result<HashMap<LocationId, usize>, CompileError> {
        let order = self.hierarchy.node_order();
        let node_of: HashMap<LocationId, usize> = order.iter().enumerate().map(|(i, l)| (*l, i)).collect();
        for (node_id, &location) in order.iter().enumerate() {
            let node_name = match self.hierarchy.name_of(location)? {
                Some(name) => name.to_string(),
                None => location.to_string(),
            };
            let parent = self.hierarchy.parent_of(location)?.and_then(|p| node_of.get(&p).copied());
            image.node.push(NodeRow { node_id, node_name, parent, c_location_id: location.0 });
        }
        Ok(node_of)
    }

    /// A rate whose children all share the wildcard smoothing names it directly;
    /// otherwise each child is listed with its own smoothing.
    fn write_rates(
        &self,
        image: &mut RelationalImage,
        smooth_of: &HashMap<FieldKey, usize>,
        node_of: &HashMap<LocationId, usize>,
    ) {
        let model = self.model;
        for rate in RateName::ALL {
            let parent_smooth_id = smooth_of.get(&FieldKey::Rate(rate)).copied();
            let wildcard = smooth_of.get(&FieldKey::RandomEffect(RandomEffectKey::wildcard(rate))).copied();
            let has_explicit = model.fields.random_effect.keys().any(|k| k.rate == rate && k.location.is_some());

            let (child_smooth_id, child_nslist_id) = if !has_explicit {
                (wildcard, None)
            } else {
                let nslist_id = image.nslist.len();
                image.nslist.push(NslistRow { nslist_id, nslist_name: format!("{}_children", rate) });
                for child in &model.child_locations {
                    let key = FieldKey::RandomEffect(RandomEffectKey::child(rate, *child));
                    let Some(smooth_id) = smooth_of.get(&key).copied().or(wildcard) else { continue };
                    let Some(node_id) = node_of.get(child).copied() else { continue };
                    image.nslist_pair.push(NslistPairRow {
                        nslist_pair_id: image.nslist_pair.len(),
                        nslist_id,
                        node_id,
                        smooth_id,
                    });
                }
                (None, Some(nslist_id))
            };

            image.rate.push(RateRow {
                rate_id: rate.rate_id(),
                rate_name: rate.as_str().to_string(),
                parent_smooth_id,
                child_smooth_id,
                child_nslist_id,
            });
        }
    }

    /// One var per grid point, with random effects repeated per child they cover,
    /// then one var per std multiplier. Start values are the value-prior means.
    fn write_vars(
        &self,
        image: &mut RelationalImage,
        fields: &[(FieldKey, &SmoothGrid, ResolvedPriors)],
        smooth_of: &HashMap<FieldKey, usize>,
        node_of: &HashMap<LocationId, usize>,
        parent_node: usize,
    ) {
        let model = self.model;
        let grid_rows: Vec<&SmoothGridRow> = image.smooth_grid.iter().collect();
        let mut vars: Vec<(VarRow, f64)> = Vec::with_capacity(model.variable_count());

        for (key, grid, resolved) in fields {
            let smooth_id = smooth_of[key];
            let nodes: Vec<Option<usize>> = match key {
                FieldKey::Rate(_) => vec![Some(parent_node)],
                FieldKey::RandomEffect(RandomEffectKey { location: Some(child), .. }) => {
                    vec![node_of.get(child).copied()]
                }
                FieldKey::RandomEffect(RandomEffectKey { rate, location: None }) => {
                    model.wildcard_children(*rate).iter().map(|c| node_of.get(c).copied()).collect()
                }
                _ => vec![None],
            };
            let (rate_id, integrand_id, covariate_id, mulcov_id) = match key {
                FieldKey::Rate(rate) => (Some(rate.rate_id()), None, None, None),
                FieldKey::RandomEffect(k) => (Some(k.rate.rate_id()), None, None, None),
                FieldKey::Alpha(_) | FieldKey::Beta(_) | FieldKey::Gamma(_) => {
                    let mulcov = image.mulcov.iter().find(|m| m.smooth_id == smooth_id);
                    (
                        mulcov.and_then(|m| m.rate_id),
                        mulcov.and_then(|m| m.integrand_id),
                        mulcov.map(|m| m.covariate_id),
                        mulcov.map(|m| m.mulcov_id),
                    )
                }
            };

            // smooth_grid rows of one smoothing are stored in cell order
            for node_id in nodes {
                for (cell, row) in grid_rows.iter().filter(|r| r.smooth_id == smooth_id).enumerate() {
                    vars.push((
                        VarRow {
                            var_id: 0,
                            var_type: var_type_of(key).to_string(),
                            smooth_id,
                            age_id: Some(row.age_id),
                            time_id: Some(row.time_id),
                            node_id,
                            rate_id,
                            integrand_id,
                            covariate_id,
                            mulcov_id,
                        },
                        resolved.value[cell].mean,
                    ));
                }
            }

            for kind in PriorKind::ALL {
                if let Some(prior) = grid.mulstd.get(kind) {
                    vars.push((
                        VarRow {
                            var_id: 0,
                            var_type: mulstd_var_type(kind).to_string(),
                            smooth_id,
                            age_id: None,
                            time_id: None,
                            node_id: None,
                            rate_id: None,
                            integrand_id: None,
                            covariate_id: None,
                            mulcov_id: None,
                        },
                        prior.mean,
                    ));
                }
            }
        }

        for (var_id, (mut row, start)) in vars.into_iter().enumerate() {
            row.var_id = var_id;
            image.var.push(row);
            image.start_var.push(StartVarRow { start_var_id: var_id, start_var_value: start });
        }
    }

    fn write_data(
        &self,
        image: &mut RelationalImage,
        data: &PreparedData,
        node_of: &HashMap<LocationId, usize>,
    ) -> Result<(), CompileError> {
        let columns: Vec<usize> = self
            .model
            .covariates()
            .iter()
            .map(|c| {
                data.covariates
                    .iter()
                    .position(|d| d.name == c.name)
                    .ok_or_else(|| CompileError::MissingCovariate(c.name.clone()))
            })
            .collect::<Result<_, _>>()?;
        let reorder = |x: &[f64]| columns.iter().map(|&i| x[i]).collect::<Vec<f64>>();
        let node = |location: LocationId| node_of.get(&location).copied().ok_or(CompileError::UnknownLocation(location));
        let weight_id = |integrand: Integrand| {
            let name = self.model.weight_for(integrand)?;
            self.model.weights().keys().position(|w| w == name)
        };

        for prepared in &data.data {
            let o = &prepared.row;
            image.data.push(DataRow {
                data_id: image.data.len(),
                integrand_id: o.integrand.integrand_id(),
                node_id: node(o.location_id)?,
                density_id: o.density.density_id(),
                hold_out: o.hold_out,
                weight_id: weight_id(o.integrand),
                meas_value: o.mean,
                meas_std: o.std,
                eta: o.eta,
                nu: o.nu,
                age_lower: o.age_lower,
                age_upper: o.age_upper,
                time_lower: o.time_lower,
                time_upper: o.time_upper,
                x: reorder(&prepared.x),
            });
        }
        for prepared in &data.avgint {
            let a = &prepared.row;
            image.avgint.push(AvgintRow {
                avgint_id: image.avgint.len(),
                integrand_id: a.integrand.integrand_id(),
                node_id: node(a.location_id)?,
                weight_id: weight_id(a.integrand),
                age_lower: a.age_lower,
                age_upper: a.age_upper,
                time_lower: a.time_lower,
                time_upper: a.time_upper,
                x: reorder(&prepared.x),
            });
        }
        Ok(())
    }
}
