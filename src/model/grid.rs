//! Age-time grids and the prior painter that fills them.
//!
//! A `SmoothGrid` is painted in two passes: defaults over the whole rectangle,
//! then detail rectangles in listed order. A rectangle is resolved against the
//! grid's own coordinates when it is assigned, so a bound does not need to be
//! one of the grid values.

use super::error::GridError;
use super::prior::{Prior, PriorKind};

/// Cross product of strictly increasing ages and times. Cells are stored age-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeTimeGrid {
    ages: Vec<f64>,
    times: Vec<f64>,
}

impl AgeTimeGrid {
    /// Sorts the axes and rejects empty axes, NaN/infinite values and repeats.
    pub fn new(mut ages: Vec<f64>, mut times: Vec<f64>) -> Result<Self, GridError> {
        Self::check_axis("age", &mut ages)?;
        Self::check_axis("time", &mut times)?;
        Ok(Self { ages, times })
    }

    fn check_axis(axis: &'static str, values: &mut [f64]) -> Result<(), GridError> {
        if values.is_empty() {
            return Err(GridError::EmptyAxis { axis });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GridError::NotIncreasing { axis, values: values.to_vec() });
        }
        values.sort_by(f64::total_cmp);
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GridError::NotIncreasing { axis, values: values.to_vec() });
        }
        Ok(())
    }

    pub fn ages(&self) -> &[f64] { &self.ages }
    pub fn times(&self) -> &[f64] { &self.times }
    pub fn len(&self) -> usize { self.ages.len() * self.times.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    #[inline(always)]
    pub fn cell(&self, age_idx: usize, time_idx: usize) -> usize {
        age_idx * self.times.len() + time_idx
    }

    pub fn age_index(&self, age: f64) -> Option<usize> {
        self.ages.iter().position(|a| *a == age)
    }

    pub fn time_index(&self, time: f64) -> Option<usize> {
        self.times.iter().position(|t| *t == time)
    }

    /// Every `(age, time)` pair in storage order.
    pub fn age_time(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.ages.iter().flat_map(move |&a| self.times.iter().map(move |&t| (a, t)))
    }

    /// Cell indices whose coordinates fall in the closed rectangle.
    pub fn cells_within(&self, ages: (f64, f64), times: (f64, f64)) -> Vec<usize> {
        let inside = |v: f64, (lo, hi): (f64, f64)| lo <= v && v <= hi;
        let mut cells = Vec::new();
        for (ai, &age) in self.ages.iter().enumerate() {
            if !inside(age, ages) {
                continue;
            }
            for (ti, &time) in self.times.iter().enumerate() {
                if inside(time, times) {
                    cells.push(self.cell(ai, ti));
                }
            }
        }
        cells
    }
}

/// Standard-deviation multiplier priors for one smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MulstdPriors {
    pub value: Option<Prior>,
    pub dage: Option<Prior>,
    pub dtime: Option<Prior>,
}

impl MulstdPriors {
    pub fn get(&self, kind: PriorKind) -> Option<&Prior> {
        match kind {
            PriorKind::Value => self.value.as_ref(),
            PriorKind::Dage => self.dage.as_ref(),
            PriorKind::Dtime => self.dtime.as_ref(),
        }
    }

    pub fn count(&self) -> usize {
        PriorKind::ALL.iter().filter(|k| self.get(**k).is_some()).count()
    }
}

/// An age-time grid plus its value, dage and dtime prior assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothGrid {
    grid: AgeTimeGrid,
    value: Vec<Option<Prior>>,
    dage: Vec<Option<Prior>>,
    dtime: Vec<Option<Prior>>,
    pub mulstd: MulstdPriors,
}

impl SmoothGrid {
    pub fn new(ages: Vec<f64>, times: Vec<f64>) -> Result<Self, GridError> {
        Ok(Self::from_grid(AgeTimeGrid::new(ages, times)?))
    }

    /// Value priors start unassigned; difference priors start unbounded.
    pub fn from_grid(grid: AgeTimeGrid) -> Self {
        let n = grid.len();
        Self {
            grid,
            value: vec![None; n],
            dage: vec![Some(Prior::unbounded()); n],
            dtime: vec![Some(Prior::unbounded()); n],
            mulstd: MulstdPriors::default(),
        }
    }

    pub fn grid(&self) -> &AgeTimeGrid { &self.grid }
    pub fn ages(&self) -> &[f64] { self.grid.ages() }
    pub fn times(&self) -> &[f64] { self.grid.times() }
    pub fn len(&self) -> usize { self.grid.len() }
    pub fn is_empty(&self) -> bool { self.grid.is_empty() }

    fn layer(&self, kind: PriorKind) -> &[Option<Prior>] {
        match kind {
            PriorKind::Value => &self.value,
            PriorKind::Dage => &self.dage,
            PriorKind::Dtime => &self.dtime,
        }
    }

    fn layer_mut(&mut self, kind: PriorKind) -> &mut [Option<Prior>] {
        match kind {
            PriorKind::Value => &mut self.value,
            PriorKind::Dage => &mut self.dage,
            PriorKind::Dtime => &mut self.dtime,
        }
    }

    /// Overwrites one prior kind on every cell inside the closed rectangle.
    /// Returns how many cells were painted.
    pub fn assign(
        &mut self,
        kind: PriorKind,
        ages: (f64, f64),
        times: (f64, f64),
        prior: Prior,
    ) -> Result<usize, GridError> {
        prior.validate()?;
        let cells = self.grid.cells_within(ages, times);
        if cells.is_empty() {
            return Err(GridError::EmptyRange {
                kind,
                age_lower: ages.0,
                age_upper: ages.1,
                time_lower: times.0,
                time_upper: times.1,
            });
        }
        let layer = self.layer_mut(kind);
        for &cell in &cells {
            layer[cell] = Some(prior);
        }
        Ok(cells.len())
    }

    /// Same as [`SmoothGrid::assign`] with the kind given by name.
    pub fn assign_named(
        &mut self,
        kind: &str,
        ages: (f64, f64),
        times: (f64, f64),
        prior: Prior,
    ) -> Result<usize, GridError> {
        self.assign(kind.parse()?, ages, times, prior)
    }

    /// Paints the full rectangle.
    pub fn assign_all(&mut self, kind: PriorKind, prior: Prior) -> Result<usize, GridError> {
        let all = (f64::NEG_INFINITY, f64::INFINITY);
        self.assign(kind, all, all, prior)
    }

    pub fn prior_at(&self, kind: PriorKind, age: f64, time: f64) -> Option<&Prior> {
        let cell = self.grid.cell(self.grid.age_index(age)?, self.grid.time_index(time)?);
        self.layer(kind)[cell].as_ref()
    }

    #[inline]
    pub fn prior_at_cell(&self, kind: PriorKind, cell: usize) -> Option<&Prior> {
        self.layer(kind)[cell].as_ref()
    }

    /// Every cell of every kind resolved to its prior, or the first gap.
    pub fn resolve(&self) -> Result<ResolvedPriors, GridError> {
        let mut resolved = ResolvedPriors::default();
        for kind in PriorKind::ALL {
            let mut layer = Vec::with_capacity(self.len());
            for (cell, (age, time)) in self.grid.age_time().enumerate() {
                match self.layer(kind)[cell] {
                    Some(prior) => layer.push(prior),
                    None => return Err(GridError::UnassignedCell { kind, age, time }),
                }
            }
            match kind {
                PriorKind::Value => resolved.value = layer,
                PriorKind::Dage => resolved.dage = layer,
                PriorKind::Dtime => resolved.dtime = layer,
            }
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedPriors {
    pub value: Vec<Prior>,
    pub dage: Vec<Prior>,
    pub dtime: Vec<Prior>,
}

impl ResolvedPriors {
    pub fn layer(&self, kind: PriorKind) -> &[Prior] {
        match kind {
            PriorKind::Value => &self.value,
            PriorKind::Dage => &self.dage,
            PriorKind::Dtime => &self.dtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::prior::Density;

    fn iota_grid() -> SmoothGrid {
        let ages = vec![0.0, 25.0, 50.0, 75.0, 100.0];
        let times = vec![1990.0, 1995.0, 2000.0, 2005.0, 2010.0, 2015.0, 2020.0];
        let mut grid = SmoothGrid::new(ages, times).unwrap();
        grid.assign_all(PriorKind::Value, Prior::uniform(0.0, 1.0, 0.01)).unwrap();
        grid.assign(PriorKind::Value, (0.0, 100.0), (2000.0, 2020.0), Prior::uniform(0.0, 1.0, 0.05))
            .unwrap();
        grid
    }

    #[test]
    fn test_detail_overrides_default_inside_window() {
        let grid = iota_grid();
        assert_eq!(grid.prior_at(PriorKind::Value, 50.0, 1995.0).unwrap().mean, 0.01);
        assert_eq!(grid.prior_at(PriorKind::Value, 50.0, 2010.0).unwrap().mean, 0.05);
    }

    #[test]
    fn test_rectangle_edges_are_inclusive() {
        let grid = iota_grid();
        // 2000 is exactly the lower time edge of the detail rectangle.
        assert_eq!(grid.prior_at(PriorKind::Value, 0.0, 2000.0).unwrap().mean, 0.05);
        assert_eq!(grid.prior_at(PriorKind::Value, 100.0, 2020.0).unwrap().mean, 0.05);
    }

    #[test]
    fn test_bounds_need_not_be_grid_values() {
        let mut grid = iota_grid();
        let painted = grid
            .assign(PriorKind::Dage, (10.0, 60.0), (1991.0, 1999.0), Prior::gaussian(0.0, 0.1))
            .unwrap();
        // ages 25, 50 and time 1995
        assert_eq!(painted, 2);
        assert_eq!(grid.prior_at(PriorKind::Dage, 25.0, 1995.0).unwrap().density, Density::Gaussian);
        assert_eq!(grid.prior_at(PriorKind::Dage, 0.0, 1995.0).unwrap().density, Density::Uniform);
    }

    #[test]
    fn test_empty_rectangle_is_an_error() {
        let mut grid = iota_grid();
        let err = grid
            .assign(PriorKind::Value, (101.0, 120.0), (1990.0, 2020.0), Prior::uniform(0.0, 1.0, 0.5))
            .unwrap_err();
        assert!(matches!(err, GridError::EmptyRange { .. }));
        let err = grid
            .assign(PriorKind::Value, (10.0, 20.0), (1990.0, 2020.0), Prior::uniform(0.0, 1.0, 0.5))
            .unwrap_err();
        assert!(matches!(err, GridError::EmptyRange { .. }));
    }

    #[test]
    fn test_difference_priors_default_to_unbounded() {
        let grid = iota_grid();
        let resolved = grid.resolve().unwrap();
        assert!(resolved.dtime.iter().all(|p| *p == Prior::unbounded()));
    }

    #[test]
    fn test_unassigned_value_fails_resolution() {
        let grid = SmoothGrid::new(vec![0.0], vec![2000.0]).unwrap();
        assert!(matches!(grid.resolve(), Err(GridError::UnassignedCell { .. })));
    }

    #[test]
    fn test_repainting_is_idempotent() {
        let first = iota_grid();
        let mut second = iota_grid();
        second.assign_all(PriorKind::Value, Prior::uniform(0.0, 1.0, 0.01)).unwrap();
        second
            .assign(PriorKind::Value, (0.0, 100.0), (2000.0, 2020.0), Prior::uniform(0.0, 1.0, 0.05))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_axes_are_sorted_and_checked() {
        let grid = AgeTimeGrid::new(vec![50.0, 0.0], vec![2000.0]).unwrap();
        assert_eq!(grid.ages(), &[0.0, 50.0]);
        assert!(AgeTimeGrid::new(vec![1.0, 1.0], vec![2000.0]).is_err());
        assert!(AgeTimeGrid::new(vec![], vec![2000.0]).is_err());
        assert!(AgeTimeGrid::new(vec![f64::NAN], vec![2000.0]).is_err());
    }

    #[test]
    fn test_invalid_prior_is_rejected_before_painting() {
        let mut grid = iota_grid();
        let bad = Prior::with_density(Density::LogGaussian, 0.0, 0.1);
        assert!(matches!(grid.assign_all(PriorKind::Dtime, bad), Err(GridError::PriorFamily { .. })));
        assert_eq!(grid, iota_grid());
    }
}
