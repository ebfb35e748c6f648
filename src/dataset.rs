//! Splits the wide observation sets into the inputs of each ensemble.
use crate::choice_model::NestStructure;
use crate::config::ModelSpecification;
use crate::error::Result;
use crate::Sample;

/// Training data prepared for the boosting rounds.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Projection of the training set on the variables of each ensemble.
    subsets: Vec<Sample>,
    labels: Vec<usize>,
    labels_j: Vec<Vec<f64>>,
    valid_labels: Vec<Vec<usize>>,
    /// `[n_train, n_valid_0, n_valid_1, ...]`.
    num_obs: Vec<usize>,
}

/// Validates `spec` against the data and projects the training set
/// onto the variables of every ensemble.
/// Fails on a missing variable or on a label outside `[0, num_classes)`.
pub fn preprocess(
    train: &Sample,
    valid_sets: &[&Sample],
    spec: &ModelSpecification,
) -> Result<Dataset>
{
    spec.validate()?;
    let num_classes = spec.num_classes();

    let subsets = spec.rum_structure.iter()
        .map(|utility| train.subset(&utility.variables))
        .collect::<Result<Vec<_>>>()?;

    for valid in valid_sets {
        for utility in &spec.rum_structure {
            valid.subset(&utility.variables)?;
        }
    }

    let labels = train.labels(num_classes)?;
    let labels_j = one_hot(&labels, num_classes);
    let valid_labels = valid_sets.iter()
        .map(|valid| valid.labels(num_classes))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let num_obs = std::iter::once(train.shape().0)
        .chain(valid_sets.iter().map(|valid| valid.shape().0))
        .collect();

    Ok(Dataset { subsets, labels, labels_j, valid_labels, num_obs })
}

/// `labels_j[i][j] = 1` iff observation `i` chose alternative `j`.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Vec<Vec<f64>> {
    labels.iter()
        .map(|&y| {
            let mut row = vec![0f64; num_classes];
            row[y] = 1f64;
            row
        })
        .collect()
}

impl Dataset {
    pub fn subsets(&self) -> &[Sample] {
        &self.subsets
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn labels_j(&self) -> &[Vec<f64>] {
        &self.labels_j
    }

    pub fn valid_labels(&self) -> &[Vec<usize>] {
        &self.valid_labels
    }

    pub fn num_obs(&self) -> &[usize] {
        &self.num_obs
    }

    /// The nest of each chosen alternative.
    pub fn labels_nest(&self, nest: &NestStructure) -> Vec<usize> {
        self.labels.iter()
            .map(|&y| nest.nest_alt()[y])
            .collect()
    }
}
