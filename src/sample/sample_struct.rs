use std::path::Path;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::collections::HashMap;
use std::ops::Index;

use polars::prelude::*;
use rayon::prelude::*;

use super::feature::*;
use crate::error::{ConfigError, Result, RumBoostError};

/// Struct `Sample` holds a batch of observations in dense format.
/// Each column is addressed by its name,
/// the chosen alternative lives in `target`.
#[derive(Debug, Clone)]
pub struct Sample {
    pub(super) name_to_index: HashMap<String, usize>,
    pub(super) features: Vec<Feature>,
    pub(super) target: Vec<f64>,
    pub(super) n_sample: usize,
    pub(super) n_feature: usize,
}

impl Sample {
    /// Convert `polars::DataFrame` and `polars::Series` into `Sample`.
    /// Every column is cast to `f64`. Null values are rejected.
    pub fn from_dataframe(data: DataFrame, target: Series) -> Result<Self> {
        let (n_sample, n_feature) = data.shape();
        let target = series_to_vec(&target)?;
        if target.len() != n_sample {
            return Err(ConfigError::DimensionMismatch {
                what: "target",
                expected: n_sample,
                got: target.len(),
            }.into());
        }

        let features = data.get_columns()
            .par_iter()
            .map(|series| {
                let vals = series_to_vec(series)?;
                Ok(Feature::from_vals(series.name(), vals))
            })
            .collect::<Result<Vec<_>>>()?;

        let name_to_index = index_by_name(&features);

        let sample = Self {
            name_to_index, features, target, n_sample, n_feature,
        };
        Ok(sample)
    }

    /// Build a `Sample` from named columns.
    /// The target is empty until [`Sample::with_target`] or
    /// [`Sample::set_target`] is called.
    pub fn from_columns<S, T>(columns: T) -> Result<Self>
        where S: ToString,
              T: IntoIterator<Item = (S, Vec<f64>)>,
    {
        let features = columns.into_iter()
            .map(|(name, vals)| Feature::from_vals(name, vals))
            .collect::<Vec<_>>();

        let n_sample = features.first().map(Feature::len).unwrap_or(0);
        if let Some(feat) = features.iter().find(|f| f.len() != n_sample) {
            return Err(ConfigError::DimensionMismatch {
                what: "column length",
                expected: n_sample,
                got: feat.len(),
            }.into());
        }

        let n_feature = features.len();
        let name_to_index = index_by_name(&features);
        let target = Vec::with_capacity(0);

        Ok(Self { name_to_index, features, target, n_sample, n_feature, })
    }

    /// Read a CSV format file to [`Sample`] type.
    ///
    /// If the CSV file has no header row,
    /// this method assigns a default name for each column:
    /// `Feat. [1]`, `Feat. [2]`, ..., `Feat. [n]`.
    ///
    /// **Do not forget** to call [`Sample::set_target`] to
    /// assign the chosen alternative.
    pub fn from_csv<P>(file: P, has_header: bool) -> Result<Self>
        where P: AsRef<Path>,
    {
        let file = File::open(file)?;
        let reader = BufReader::new(file);
        Self::from_reader(reader, has_header)
    }

    /// Read a CSV from a [`BufReader`].
    pub fn from_reader<R>(reader: BufReader<R>, has_header: bool)
        -> Result<Self>
        where R: Read,
    {
        let mut lines = reader.lines();

        let mut features = Vec::new();
        if has_header {
            let line = lines.next()
                .ok_or_else(|| RumBoostError::Data("empty csv".into()))??;
            features = line.split(',')
                .map(|name| Feature::new(name.trim()))
                .collect::<Vec<_>>();
        }

        let mut n_sample = 0_usize;
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }

            let xs = line.split(',')
                .map(|x| {
                    x.trim().parse::<f64>()
                        .map_err(|_| RumBoostError::Data(format!(
                            "non-numerical value `{x}` in line {i}"
                        )))
                })
                .collect::<Result<Vec<_>>>()?;

            // Without a header, the first row decides the column count.
            if features.is_empty() {
                features = (1..=xs.len())
                    .map(|k| Feature::new(format!("Feat. [{k}]")))
                    .collect();
            }

            if xs.len() != features.len() {
                return Err(ConfigError::DimensionMismatch {
                    what: "csv row",
                    expected: features.len(),
                    got: xs.len(),
                }.into());
            }

            features.iter_mut()
                .zip(xs)
                .for_each(|(feat, x)| feat.append(x));
            n_sample += 1;
        }

        let n_feature = features.len();
        let name_to_index = index_by_name(&features);
        let target = Vec::with_capacity(0);

        Ok(Self { name_to_index, features, target, n_sample, n_feature, })
    }

    /// Set the target values directly.
    pub fn with_target(mut self, target: Vec<f64>) -> Result<Self> {
        if target.len() != self.n_sample {
            return Err(ConfigError::DimensionMismatch {
                what: "target",
                expected: self.n_sample,
                got: target.len(),
            }.into());
        }
        self.target = target;
        Ok(self)
    }

    /// Move the feature named `target` to `self.target`.
    /// The old target is dropped.
    pub fn set_target<S: AsRef<str>>(mut self, target: S) -> Result<Self> {
        let target = target.as_ref();
        let pos = self.features.iter()
            .position(|feat| feat.name() == target)
            .ok_or_else(|| ConfigError::MissingFeature(target.to_string()))?;

        self.target = self.features.remove(pos).into_vals();
        self.n_feature -= 1;
        self.name_to_index = index_by_name(&self.features);

        Ok(self)
    }

    /// Returns the slice of target values.
    pub fn target(&self) -> &[f64] {
        &self.target[..]
    }

    /// Returns a slice of the features.
    pub fn features(&self) -> &[Feature] {
        &self.features[..]
    }

    /// Returns the feature named `name`, if any.
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.name_to_index.get(name)
            .map(|&i| &self.features[i])
    }

    /// Returns the pair of the number of examples and
    /// the number of features.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_sample, self.n_feature)
    }

    /// Projects `self` onto the columns `names`, in the given order.
    /// The target is kept.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let features = names.iter()
            .map(|name| {
                let name = name.as_ref();
                self.feature(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingFeature(name.into()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let n_feature = features.len();
        let name_to_index = index_by_name(&features);

        Ok(Self {
            name_to_index,
            features,
            target: self.target.clone(),
            n_sample: self.n_sample,
            n_feature,
        })
    }

    /// Returns a new sample made of the rows `rows`.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let features = self.features.iter()
            .map(|feat| feat.take(rows))
            .collect::<Vec<_>>();
        let target = if self.target.is_empty() {
            Vec::with_capacity(0)
        } else {
            rows.iter().map(|&i| self.target[i]).collect()
        };

        Self {
            name_to_index: self.name_to_index.clone(),
            features,
            target,
            n_sample: rows.len(),
            n_feature: self.n_feature,
        }
    }

    /// Converts the target into alternative indices in
    /// `[0, num_classes)`.
    pub fn labels(&self, num_classes: usize)
        -> std::result::Result<Vec<usize>, ConfigError>
    {
        if self.target.len() != self.n_sample {
            return Err(ConfigError::DimensionMismatch {
                what: "target",
                expected: self.n_sample,
                got: self.target.len(),
            });
        }

        self.target.iter()
            .enumerate()
            .map(|(row, &value)| {
                if value < 0.0 || value.trunc() != value {
                    return Err(ConfigError::NonIntegerLabel { row, value });
                }
                let label = value as usize;
                if label >= num_classes {
                    return Err(ConfigError::LabelOutOfRange {
                        row, label, num_classes,
                    });
                }
                Ok(label)
            })
            .collect()
    }
}

impl Index<&str> for Sample {
    type Output = Feature;
    fn index(&self, name: &str) -> &Self::Output {
        let idx = self.name_to_index.get(name)
            .unwrap_or_else(|| panic!("the feature named `{name}` does not exist"));
        &self.features[*idx]
    }
}

impl Index<&String> for Sample {
    type Output = Feature;
    fn index(&self, name: &String) -> &Self::Output {
        &self[name.as_str()]
    }
}

fn index_by_name(features: &[Feature]) -> HashMap<String, usize> {
    features.iter()
        .enumerate()
        .map(|(i, f)| (f.name().to_string(), i))
        .collect()
}

fn series_to_vec(series: &Series) -> Result<Vec<f64>> {
    let name = series.name().to_string();
    let series = series.cast(&DataType::Float64)?;
    series.f64()?
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RumBoostError::Data(
            format!("column `{name}` contains null values")
        ))
}
