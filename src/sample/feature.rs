use std::ops::Index;

use crate::constants::BUFFER_SIZE;

/// A named column of `f64` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    name: String,
    vals: Vec<f64>,
}

impl Feature {
    /// Construct an empty feature named `name`.
    pub fn new<T: ToString>(name: T) -> Self {
        Self {
            name: name.to_string(),
            vals: Vec::with_capacity(BUFFER_SIZE),
        }
    }

    /// Construct a feature from its values.
    pub fn from_vals<T: ToString>(name: T, vals: Vec<f64>) -> Self {
        Self { name: name.to_string(), vals, }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals[..]
    }

    pub fn into_vals(self) -> Vec<f64> {
        self.vals
    }

    pub fn append(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Returns the sorted distinct values of this feature
    /// together with their number of occurrences.
    /// `NaN`s are dropped.
    pub fn value_counts(&self) -> Vec<(f64, usize)> {
        let mut values = self.vals.iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);

        let mut counts: Vec<(f64, usize)> = Vec::new();
        for v in values {
            match counts.last_mut() {
                Some((value, count)) if *value == v => { *count += 1; },
                _ => { counts.push((v, 1)); },
            }
        }
        counts
    }

    pub fn distinct_value_count(&self) -> usize {
        self.value_counts().len()
    }

    /// Returns a new feature made of the rows in `rows`.
    pub(crate) fn take(&self, rows: &[usize]) -> Self {
        let vals = rows.iter()
            .map(|&i| self.vals[i])
            .collect();
        Self { name: self.name.clone(), vals, }
    }
}

impl Index<usize> for Feature {
    type Output = f64;
    fn index(&self, idx: usize) -> &Self::Output {
        &self.vals[idx]
    }
}
