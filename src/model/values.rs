//! Fitted values of a random field on its own age-time grid.
use super::grid::AgeTimeGrid;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldValues {
    grid: AgeTimeGrid,
    values: Vec<f64>,
}

impl FieldValues {
    pub fn filled(grid: AgeTimeGrid, value: f64) -> Self {
        let n = grid.len();
        Self { grid, values: vec![value; n] }
    }

    pub fn from_fn(grid: AgeTimeGrid, mut f: impl FnMut(f64, f64) -> f64) -> Self {
        let values = grid.age_time().map(|(a, t)| f(a, t)).collect();
        Self { grid, values }
    }

    pub fn grid(&self) -> &AgeTimeGrid { &self.grid }
    pub fn ages(&self) -> &[f64] { self.grid.ages() }
    pub fn times(&self) -> &[f64] { self.grid.times() }
    pub fn values(&self) -> &[f64] { &self.values }

    pub fn get(&self, age: f64, time: f64) -> Option<f64> {
        let cell = self.grid.cell(self.grid.age_index(age)?, self.grid.time_index(time)?);
        Some(self.values[cell])
    }

    #[inline]
    pub fn set_cell(&mut self, cell: usize, value: f64) {
        self.values[cell] = value;
    }

    /// Bilinear interpolation between grid points, constant beyond the edges.
    pub fn at(&self, age: f64, time: f64) -> f64 {
        let (a0, a1, wa) = bracket(self.grid.ages(), age);
        let (t0, t1, wt) = bracket(self.grid.times(), time);
        let v = |ai: usize, ti: usize| self.values[self.grid.cell(ai, ti)];
        let low = v(a0, t0) * (1.0 - wt) + v(a0, t1) * wt;
        let high = v(a1, t0) * (1.0 - wt) + v(a1, t1) * wt;
        low * (1.0 - wa) + high * wa
    }
}

/// Neighbouring indices and the weight of the upper one.
fn bracket(axis: &[f64], x: f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if x <= axis[0] {
        return (0, 0, 0.0);
    }
    if x >= axis[last] {
        return (last, last, 0.0);
    }
    let upper = axis.partition_point(|v| *v <= x);
    let lower = upper - 1;
    let w = (x - axis[lower]) / (axis[upper] - axis[lower]);
    (lower, upper, w)
}
