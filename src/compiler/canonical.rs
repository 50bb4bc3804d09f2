//! One sorted, duplicate-free coordinate list per axis for the whole image.
//!
//! Values merge only when they compare equal, so `-0.0` and `0.0` share an id
//! and any two distinguishable floats keep separate ids.

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAxis {
    values: Vec<f64>,
}

impl CanonicalAxis {
    /// Non-finite values are dropped.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| a == b);
        Self { values }
    }

    pub fn values(&self) -> &[f64] { &self.values }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn id_of(&self, value: f64) -> Option<usize> {
        let idx = self.values.partition_point(|v| *v < value);
        (idx < self.values.len() && self.values[idx] == value).then_some(idx)
    }
}
