//! The trained model: utility ensembles plus the choice model.

pub mod ensemble;

use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub use ensemble::Ensemble;

use crate::choice_model::ChoiceModel;
use crate::error::{ConfigError, Result};
use crate::metrics;
use crate::{Regressor, Sample};

/// Scores recorded after one boosting round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub iteration: usize,
    pub train: f64,
    /// One entry per validation set.
    pub valid: Vec<f64>,
}

/// Options of [`RUMBoostModel::predict`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictOptions {
    /// Return the raw utilities instead of the probabilities.
    pub utilities: bool,
    /// Replaces the model's own nests, mu and alphas for this call.
    pub choice_model: Option<ChoiceModel>,
    /// Only use the trees grown up to this round.
    pub num_iteration: Option<usize>,
}

impl PredictOptions {
    pub fn utilities() -> Self {
        Self { utilities: true, ..Self::default() }
    }

    pub fn with_choice_model(mut self, choice_model: ChoiceModel) -> Self {
        self.choice_model = Some(choice_model);
        self
    }

    pub fn num_iteration(mut self, num_iteration: usize) -> Self {
        self.num_iteration = Some(num_iteration);
        self
    }
}

/// A trained RUMBoost model.
///
/// Each ensemble addresses the features by name,
/// so the model predicts on any [`Sample`] holding its variables.
/// ```no_run
/// use rumboost::prelude::*;
/// # fn run(test: &Sample) -> rumboost::Result<()> {
/// let model = RUMBoostModel::<RegressionTreeRegressor>::load_model("model.json")?;
/// let probabilities = model.predict(test, &PredictOptions::default())?;
/// let utilities = model.predict(test, &PredictOptions::utilities())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RUMBoostModel<H> {
    num_classes: usize,
    ensembles: Vec<Ensemble<H>>,
    shared_start_idx: usize,
    choice_model: ChoiceModel,
    best_iteration: usize,
    best_score: f64,
    best_score_train: f64,
    #[serde(default)]
    history: Vec<RoundRecord>,
}

impl<H> RUMBoostModel<H> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_components(
        num_classes: usize,
        ensembles: Vec<Ensemble<H>>,
        shared_start_idx: usize,
        choice_model: ChoiceModel,
        best_iteration: usize,
        best_score: f64,
        best_score_train: f64,
        history: Vec<RoundRecord>,
    ) -> Self
    {
        Self {
            num_classes,
            ensembles,
            shared_start_idx,
            choice_model,
            best_iteration,
            best_score,
            best_score_train,
            history,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Ensemble<H>>, ChoiceModel, Vec<RoundRecord>) {
        (self.ensembles, self.choice_model, self.history)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn ensembles(&self) -> &[Ensemble<H>] {
        &self.ensembles
    }

    pub fn shared_start_idx(&self) -> usize {
        self.shared_start_idx
    }

    /// Shared ensemble index to the alternatives it feeds.
    pub fn shared_ensembles(&self) -> BTreeMap<usize, Vec<usize>> {
        self.ensembles.iter()
            .enumerate()
            .skip(self.shared_start_idx)
            .map(|(k, ensemble)| (k, ensemble.alternatives().to_vec()))
            .collect()
    }

    pub fn choice_model(&self) -> &ChoiceModel {
        &self.choice_model
    }

    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    /// Cross-entropy on the first validation set at `best_iteration`,
    /// or on the training set without validation data.
    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// Training cross-entropy at `best_iteration`.
    pub fn best_score_train(&self) -> f64 {
        self.best_score_train
    }

    /// Per-round training and validation scores.
    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Total number of trees.
    pub fn n_trees(&self) -> usize {
        self.ensembles.iter().map(Ensemble::len).sum()
    }
}

impl<H> RUMBoostModel<H>
    where H: Regressor + Sync,
{
    /// Choice probabilities (or raw utilities) for every row of `sample`,
    /// `n_obs x num_classes`.
    pub fn predict(&self, sample: &Sample, options: &PredictOptions)
        -> Result<Vec<Vec<f64>>>
    {
        self.check_features(sample)?;
        let utilities = self.utilities(sample, options.num_iteration);
        if options.utilities {
            return Ok(utilities);
        }

        let choice_model = match &options.choice_model {
            Some(choice_model) => {
                check_alternatives(choice_model, self.num_classes)?;
                choice_model
            },
            None => &self.choice_model,
        };
        Ok(choice_model.predict_proba(&utilities))
    }

    /// Cross-entropy of the target of `sample` under the model.
    pub fn score(&self, sample: &Sample) -> Result<f64> {
        let labels = sample.labels(self.num_classes)?;
        let probabilities = self.predict(sample, &PredictOptions::default())?;
        Ok(metrics::cross_entropy(&probabilities, &labels))
    }

    /// Raw utilities, summing every ensemble into the alternatives it feeds.
    pub(crate) fn utilities(&self, sample: &Sample, num_iteration: Option<usize>)
        -> Vec<Vec<f64>>
    {
        ensemble_utilities(&self.ensembles, sample, self.num_classes, num_iteration)
    }

    fn check_features(&self, sample: &Sample) -> std::result::Result<(), ConfigError> {
        let missing = self.ensembles.iter()
            .flat_map(|ensemble| ensemble.variables())
            .find(|name| sample.feature(name).is_none());
        match missing {
            Some(name) => Err(ConfigError::MissingFeature(name.clone())),
            None => Ok(()),
        }
    }
}

impl<H> RUMBoostModel<H>
    where H: Serialize,
{
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Writes the model to `path` as JSON.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

impl<H> RUMBoostModel<H>
    where H: DeserializeOwned,
{
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a model written by [`RUMBoostModel::save_model`].
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// `n_obs x num_classes` utilities of `sample` under `ensembles`.
pub(crate) fn ensemble_utilities<H>(
    ensembles: &[Ensemble<H>],
    sample: &Sample,
    num_classes: usize,
    num_iteration: Option<usize>,
) -> Vec<Vec<f64>>
    where H: Regressor + Sync,
{
    let outputs = ensembles.par_iter()
        .map(|ensemble| ensemble.predict_all(sample, num_iteration))
        .collect::<Vec<_>>();

    let n_sample = sample.shape().0;
    let mut utilities = vec![vec![0f64; num_classes]; n_sample];
    for (ensemble, output) in ensembles.iter().zip(outputs) {
        for (row, value) in utilities.iter_mut().zip(output) {
            for &j in ensemble.alternatives() {
                row[j] += value;
            }
        }
    }
    utilities
}

/// Checks that a choice model describes `num_classes` alternatives.
pub(crate) fn check_alternatives(choice_model: &ChoiceModel, num_classes: usize)
    -> std::result::Result<(), ConfigError>
{
    let got = match choice_model {
        ChoiceModel::Multinomial(_) => return Ok(()),
        ChoiceModel::Nested(nest) => nest.nest_alt().len(),
        ChoiceModel::CrossNested(cross) => cross.alphas().len(),
    };
    if got == num_classes {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            what: "alternatives of the choice model",
            expected: num_classes,
            got,
        })
    }
}
