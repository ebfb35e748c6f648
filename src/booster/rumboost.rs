//! The RUMBoost coordinator.
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::time::Instant;

use super::core::Booster;
use super::sampler::{self, RowSampler};
use crate::choice_model::ChoiceModel;
use crate::config::{BoosterSelection, ModelSpecification, OptimSettings};
use crate::constants::PROBABILITY_CLIP;
use crate::dataset::{self, Dataset};
use crate::error::{ConfigError, Result, RumBoostError};
use crate::logging::TrainingLogger;
use crate::metrics;
use crate::model::{self, Ensemble, RUMBoostModel, RoundRecord};
use crate::objective::ChoiceObjective;
use crate::weak_learner::{RegressionTree, RegressionTreeBuilder, RegressionTreeRegressor};
use crate::{Regressor, Sample, WeakLearner};

/// Lifecycle of one ensemble during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleState {
    NotStarted,
    Growing,
    Stopped,
}

/// Best round seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BestRound {
    iteration: usize,
    score: f64,
    score_train: f64,
}

/// Gradient boosting of random utility models.
///
/// Each round,
/// 1. the choice probabilities are computed once from the current utilities,
/// 2. at most `max_booster_to_update` ensembles are selected,
/// 3. each selected ensemble fits one tree on the gradient and hessian
///    summed over the alternatives it feeds,
///    and the scaled tree output is added to those alternatives,
/// 4. every `optim_interval` rounds, the free `mu`/`alphas` are refitted,
/// 5. the cross-entropy is evaluated for early stopping.
///
/// # Example
/// ```no_run
/// use rumboost::prelude::*;
/// # fn run(train: &Sample, valid: &Sample) -> rumboost::Result<()> {
/// let spec = ModelSpecification::from_json_file("spec.json")?;
/// let mut booster = RUMBoost::<RegressionTreeRegressor>::init(train, &[valid], &spec)?;
///
/// let learners = booster.default_learners()?;
/// let model = booster.run(&learners)?;
/// println!("best iteration: {}", model.best_iteration());
/// # Ok(())
/// # }
/// ```
pub struct RUMBoost<'a, H> {
    train: &'a Sample,
    valid_sets: Vec<&'a Sample>,
    spec: ModelSpecification,
    dataset: Dataset,

    choice_model: ChoiceModel,
    optim: Option<OptimSettings>,

    ensembles: Vec<Ensemble<H>>,
    states: Vec<EnsembleState>,
    // Number of trees reflected in the running utilities.
    tree_counts: Vec<usize>,

    utilities: Vec<Vec<f64>>,
    valid_utilities: Vec<Vec<Vec<f64>>>,

    sampler: RowSampler,
    valid_rows: Vec<Vec<usize>>,
    cursor: usize,
    // Rounds already trained by an initial model.
    round_offset: usize,

    baseline: BestRound,
    best: Option<BestRound>,
    // Structural parameters in force at the best round.
    best_choice_model: ChoiceModel,
    stale_rounds: usize,
    history: Vec<RoundRecord>,

    logger: TrainingLogger,
    time_acc: u128,
}

impl<'a, H> RUMBoost<'a, H> {
    /// Validates `spec` against the data and sets up the training state.
    /// Every configuration error is reported here,
    /// before the first round.
    pub fn init(
        train: &'a Sample,
        valid_sets: &[&'a Sample],
        spec: &ModelSpecification,
    ) -> Result<Self>
    {
        let dataset = dataset::preprocess(train, valid_sets, spec)?;
        let choice_model = spec.choice_model()?;
        let optim = spec.optim_settings();
        let general = &spec.general_params;
        let num_classes = spec.num_classes();

        let ensembles = spec.rum_structure.iter()
            .map(|utility| {
                Ensemble::new(utility.variables.clone(), utility.utility.clone())
            })
            .collect::<Vec<_>>();
        let n_ensembles = ensembles.len();

        let mut rng = StdRng::seed_from_u64(general.seed);
        let valid_rows = valid_sets.iter()
            .map(|valid| {
                let n_sample = valid.shape().0;
                if general.subsample_valid < 1.0 {
                    let amount = sampler::subsample_size(n_sample, general.subsample_valid);
                    sampler::draw(&mut rng, n_sample, amount)
                } else {
                    (0..n_sample).collect()
                }
            })
            .collect();

        let n_train = train.shape().0;
        let sampler = RowSampler::new(
            n_train,
            general.subsampling,
            general.subsampling_freq,
            general.batch_size,
            rng.gen(),
        );

        let valid_utilities = valid_sets.iter()
            .map(|valid| vec![vec![0f64; num_classes]; valid.shape().0])
            .collect();
        let logger = TrainingLogger::new(general.verbosity, general.verbosity_interval);

        let mut booster = Self {
            train,
            valid_sets: valid_sets.to_vec(),
            spec: spec.clone(),
            dataset,
            best_choice_model: choice_model.clone(),
            choice_model,
            optim,
            ensembles,
            states: vec![EnsembleState::NotStarted; n_ensembles],
            tree_counts: vec![0; n_ensembles],
            utilities: vec![vec![0f64; num_classes]; n_train],
            valid_utilities,
            sampler,
            valid_rows,
            cursor: 0,
            round_offset: 0,
            baseline: BestRound { iteration: 0, score: 0.0, score_train: 0.0 },
            best: None,
            stale_rounds: 0,
            history: Vec::new(),
            logger,
            time_acc: 0,
        };
        booster.update_states();
        Ok(booster)
    }

    /// Replaces the console logger.
    pub fn logger(mut self, logger: TrainingLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn choice_model(&self) -> &ChoiceModel {
        &self.choice_model
    }

    pub fn ensembles(&self) -> &[Ensemble<H>] {
        &self.ensembles
    }

    pub fn states(&self) -> &[EnsembleState] {
        &self.states
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Current training utilities, `n_train x num_classes`.
    pub fn utilities(&self) -> &[Vec<f64>] {
        &self.utilities
    }

    pub fn shared_ensembles(&self) -> BTreeMap<usize, Vec<usize>> {
        self.spec.shared_ensembles()
    }

    pub fn shared_start_idx(&self) -> usize {
        self.spec.shared_start_idx()
    }

    /// `[n_train, n_valid_0, n_valid_1, ...]`.
    pub fn num_obs(&self) -> &[usize] {
        self.dataset.num_obs()
    }

    pub fn labels(&self) -> &[usize] {
        self.dataset.labels()
    }

    pub fn labels_j(&self) -> &[Vec<f64>] {
        self.dataset.labels_j()
    }

    /// The nest of each chosen alternative, for nested logit models.
    pub fn labels_nest(&self) -> Option<Vec<usize>> {
        self.choice_model.nests()
            .map(|nest| self.dataset.labels_nest(nest))
    }

    fn num_classes(&self) -> usize {
        self.spec.num_classes()
    }

    fn update_states(&mut self) {
        for (k, ensemble) in self.ensembles.iter().enumerate() {
            let max_trees = self.spec.rum_structure[k].boosting_params.max_trees;
            self.states[k] = if max_trees.is_some_and(|m| ensemble.len() >= m) {
                EnsembleState::Stopped
            } else if ensemble.is_empty() {
                EnsembleState::NotStarted
            } else {
                EnsembleState::Growing
            };
        }
    }

    fn max_booster_to_update(&self) -> usize {
        self.spec.general_params.max_booster_to_update
            .unwrap_or(self.ensembles.len())
    }

    /// A rotating window over the ensembles still growing.
    fn round_robin(&mut self) -> Vec<usize> {
        let n_ensembles = self.ensembles.len();
        let mut picks = (0..n_ensembles)
            .map(|i| (self.cursor + i) % n_ensembles)
            .filter(|&k| self.states[k] != EnsembleState::Stopped)
            .take(self.max_booster_to_update())
            .collect::<Vec<_>>();
        if let Some(&last) = picks.last() {
            self.cursor = (last + 1) % n_ensembles;
        }
        picks.sort_unstable();
        picks
    }
}

impl<'a, H> RUMBoost<'a, H>
    where H: Regressor + Sync,
{
    /// Continue training from `model`.
    /// The ensembles of `model` must match `rum_structure`;
    /// its `mu`/`alphas` replace the configured ones
    /// and the utilities are rebuilt from its ensembles.
    pub fn init_model(mut self, model: RUMBoostModel<H>) -> Result<Self> {
        if model.num_classes() != self.num_classes() {
            return Err(ConfigError::DimensionMismatch {
                what: "num_classes of the initial model",
                expected: self.num_classes(),
                got: model.num_classes(),
            }.into());
        }
        if model.ensembles().len() != self.ensembles.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "ensembles of the initial model",
                expected: self.ensembles.len(),
                got: model.ensembles().len(),
            }.into());
        }
        let mismatch = self.ensembles.iter()
            .zip(model.ensembles())
            .position(|(ours, theirs)| {
                ours.alternatives() != theirs.alternatives()
                    || ours.variables() != theirs.variables()
            });
        if let Some(ensemble) = mismatch {
            return Err(ConfigError::InvalidParameter {
                name: "init_model",
                reason: format!("ensemble {ensemble} differs from rum_structure"),
            }.into());
        }
        model::check_alternatives(model.choice_model(), self.num_classes())?;

        let (ensembles, choice_model, history) = model.into_parts();
        self.round_offset = ensembles.iter()
            .map(Ensemble::last_round)
            .max()
            .unwrap_or(0);
        self.ensembles = ensembles;
        self.choice_model = choice_model;
        self.history = history;
        self.update_states();
        self.rebuild_utilities();
        Ok(self)
    }

    /// Recomputes the train and validation utilities from the ensembles.
    fn rebuild_utilities(&mut self) {
        let num_classes = self.num_classes();
        self.utilities = model::ensemble_utilities(
            &self.ensembles, self.train, num_classes, None,
        );
        self.valid_utilities = self.valid_sets.iter()
            .map(|valid| {
                model::ensemble_utilities(&self.ensembles, valid, num_classes, None)
            })
            .collect();
        self.tree_counts = self.ensembles.iter().map(Ensemble::len).collect();
    }

    fn utilities_are_stale(&self) -> bool {
        self.ensembles.iter()
            .zip(&self.tree_counts)
            .any(|(ensemble, &count)| ensemble.len() != count)
    }

    /// Fits one tree for ensemble `k` on the round's rows.
    fn fit<W>(
        &self,
        weak_learners: &[W],
        state: &<ChoiceModel as ChoiceObjective>::State,
        k: usize,
        rows: &[usize],
    ) -> Result<H>
        where W: WeakLearner<Hypothesis = H>,
    {
        let alternatives = self.ensembles[k].alternatives();
        let derivatives = self.choice_model
            .gradient_hessian(state, self.dataset.labels(), alternatives);

        weak_learners[k].produce(
            &self.dataset.subsets()[k],
            &derivatives.gradient,
            &derivatives.hessian,
            rows,
        )
        .map_err(|source| RumBoostError::Fit { ensemble: k, source })
    }

    fn learning_rate(&self, k: usize) -> f64 {
        self.spec.rum_structure[k].boosting_params.learning_rate
    }

    /// Fits a candidate for every active ensemble and
    /// keeps those lowering the training cross-entropy the most.
    fn greedy<W>(
        &self,
        weak_learners: &[W],
        state: &<ChoiceModel as ChoiceObjective>::State,
        rows: &[usize],
    ) -> Result<Vec<(usize, H)>>
        where W: WeakLearner<Hypothesis = H>,
    {
        let mut scored = Vec::new();
        for k in 0..self.ensembles.len() {
            if self.states[k] == EnsembleState::Stopped {
                continue;
            }
            let tree = self.fit(weak_learners, state, k, rows)?;
            let output = tree.predict_all(&self.dataset.subsets()[k]);
            let mut utilities = self.utilities.clone();
            add_scaled(
                &mut utilities, &output, self.learning_rate(k), self.ensembles[k].alternatives(),
            );
            let probabilities = self.choice_model.predict_proba(&utilities);
            let loss = metrics::cross_entropy(&probabilities, self.dataset.labels());
            scored.push((loss, k, tree));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(self.max_booster_to_update());
        scored.sort_by_key(|&(_, k, _)| k);
        Ok(scored.into_iter().map(|(_, k, tree)| (k, tree)).collect())
    }

    /// Adds `tree` to ensemble `k` and to the running utilities.
    fn apply(&mut self, k: usize, tree: H, round: usize) {
        let weight = self.learning_rate(k);
        let alternatives = self.ensembles[k].alternatives().to_vec();

        let output = tree.predict_all(&self.dataset.subsets()[k]);
        add_scaled(&mut self.utilities, &output, weight, &alternatives);
        for (utilities, valid) in self.valid_utilities.iter_mut().zip(&self.valid_sets) {
            let output = tree.predict_all(valid);
            add_scaled(utilities, &output, weight, &alternatives);
        }

        self.ensembles[k].push(tree, weight, round);
        self.tree_counts[k] += 1;
    }

    /// Refits the free structural parameters on schedule.
    /// A failed refit keeps the previous values.
    fn refit_structure(&mut self, iteration: usize) {
        let Some(settings) = &self.optim else { return; };
        if !self.choice_model.has_free_parameters()
            || iteration % settings.optim_interval != 0
        {
            return;
        }

        let optimizer = settings.optimizer();
        let labels = self.dataset.labels();
        let refit = match &self.choice_model {
            ChoiceModel::Multinomial(_) => return,
            ChoiceModel::Nested(nest) => {
                optimizer.maximize(nest, &self.utilities, labels)
                    .map(ChoiceModel::from)
            },
            ChoiceModel::CrossNested(cross) => {
                optimizer.maximize(cross, &self.utilities, labels)
                    .map(ChoiceModel::from)
            },
        };

        match refit {
            Ok(choice_model) => {
                debug!(iteration, mu = ?choice_model.mu(), "refitted structural parameters");
                self.choice_model = choice_model;
            },
            Err(error) => {
                warn!(
                    iteration,
                    %error,
                    "structural parameter refit failed, keeping the previous values"
                );
            },
        }
    }

    /// Training loss and the loss of each validation set.
    fn evaluate(&self, iteration: usize) -> (f64, Vec<f64>) {
        let labels = self.dataset.labels();
        let probabilities = self.choice_model.predict_proba(&self.utilities);
        let clipped = probabilities.iter()
            .zip(labels)
            .filter(|(row, &y)| row[y] < PROBABILITY_CLIP)
            .count();
        if clipped > 0 {
            warn!(iteration, rows = clipped, "chosen probabilities were clipped");
        }
        let train = metrics::cross_entropy(&probabilities, labels);

        let valid = self.valid_utilities.iter()
            .zip(&self.valid_rows)
            .zip(self.dataset.valid_labels())
            .map(|((utilities, rows), labels)| {
                let utilities = rows.iter()
                    .map(|&i| utilities[i].clone())
                    .collect::<Vec<_>>();
                let labels = rows.iter().map(|&i| labels[i]).collect::<Vec<_>>();
                let probabilities = self.choice_model.predict_proba(&utilities);
                metrics::cross_entropy(&probabilities, &labels)
            })
            .collect();
        (train, valid)
    }

    /// Records the scores of `iteration`.
    /// Returns `true` when early stopping triggers.
    fn track(&mut self, iteration: usize, train: f64, valid: &[f64]) -> bool {
        let score = valid.first().copied().unwrap_or(train);
        let current = BestRound { iteration, score, score_train: train };

        let patience = self.spec.general_params.early_stopping_round
            .filter(|&p| p > 0);
        let Some(patience) = patience else {
            self.best = Some(current);
            self.best_choice_model = self.choice_model.clone();
            return false;
        };

        match self.best {
            Some(best) if best.score <= score => {
                self.stale_rounds += 1;
            },
            _ => {
                info!(iteration, score, "new best score");
                self.best = Some(current);
                self.best_choice_model = self.choice_model.clone();
                self.stale_rounds = 0;
            },
        }
        self.stale_rounds >= patience
    }

    fn current_model(&self) -> RUMBoostModel<H>
        where H: Clone,
    {
        let best = self.best.unwrap_or(self.baseline);
        RUMBoostModel::from_components(
            self.num_classes(),
            self.ensembles.clone(),
            self.shared_start_idx(),
            self.choice_model.clone(),
            best.iteration,
            best.score,
            best.score_train,
            self.history.clone(),
        )
    }
}

impl<'a> RUMBoost<'a, RegressionTreeRegressor> {
    /// Builds the histogram regression tree of each ensemble
    /// from its variables and `boosting_params`.
    pub fn default_learners(&self) -> Result<Vec<RegressionTree>> {
        let general = &self.spec.general_params;
        self.spec.rum_structure.iter()
            .zip(self.dataset.subsets())
            .map(|(utility, subset)| {
                let tree = RegressionTreeBuilder::new(subset)
                    .max_bin(general.max_bin)
                    .min_data_in_bin(general.min_data_in_bin)
                    .boosting_params(&utility.boosting_params)
                    .build()?;
                Ok(tree)
            })
            .collect()
    }
}

impl<'a, H> Booster<H> for RUMBoost<'a, H>
    where H: Regressor + Sync + Clone + Serialize,
{
    type Output = RUMBoostModel<H>;

    fn name(&self) -> &str {
        "RUMBoost"
    }

    fn info(&self) -> Option<Vec<(&str, String)>> {
        let general = &self.spec.general_params;
        let n_shared = self.ensembles.len() - self.shared_start_idx();
        let early_stopping = general.early_stopping_round
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        let selection = match general.booster_selection {
            BoosterSelection::RoundRobin => "Round robin",
            BoosterSelection::Greedy => "Greedy",
        };
        let mut info = Vec::from([
            ("# of training examples", format!("{}", self.train.shape().0)),
            ("# of validation sets", format!("{}", self.valid_sets.len())),
            ("# of ensembles", format!("{}", self.ensembles.len())),
            ("# of shared ensembles", format!("{n_shared}")),
            ("Max updates per round", format!("{}", self.max_booster_to_update())),
            ("Selection", selection.to_string()),
            ("Max iterations", format!("{}", general.num_iterations)),
            ("Early stopping", early_stopping),
        ]);
        info.extend(self.choice_model.info());
        Some(info)
    }

    fn preprocess<W>(&mut self, weak_learners: &[W]) -> Result<()>
        where W: WeakLearner<Hypothesis = H>
    {
        if weak_learners.len() != self.ensembles.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "weak learners",
                expected: self.ensembles.len(),
                got: weak_learners.len(),
            }.into());
        }
        if self.utilities_are_stale() {
            self.rebuild_utilities();
        }

        let learner = weak_learners.first()
            .map(|w| (w.name(), w.info()))
            .unwrap_or(("-", None));
        self.logger.print_stats((self.name(), self.info()), learner);

        let (train, valid) = self.evaluate(self.round_offset);
        let score = valid.first().copied().unwrap_or(train);
        self.baseline = BestRound { iteration: self.round_offset, score, score_train: train };
        self.best = None;
        self.best_choice_model = self.choice_model.clone();
        self.stale_rounds = 0;
        self.time_acc = 0;

        info!(
            n_train = self.train.shape().0,
            n_ensembles = self.ensembles.len(),
            choice_model = self.choice_model.name(),
            "training started"
        );
        self.logger.print_log_header();
        Ok(())
    }

    fn boost<W>(
        &mut self,
        weak_learners: &[W],
        iteration: usize,
    ) -> Result<ControlFlow<usize>>
        where W: WeakLearner<Hypothesis = H>
    {
        let num_iterations = self.spec.general_params.num_iterations;
        if iteration > num_iterations {
            return Ok(ControlFlow::Break(iteration - 1));
        }
        let now = Instant::now();

        if self.utilities_are_stale() {
            self.rebuild_utilities();
        }
        let round = self.round_offset + iteration;
        let rows = self.sampler.rows(iteration).to_vec();

        let state = self.choice_model.probabilities(&self.utilities);
        let trees = match self.spec.general_params.booster_selection {
            BoosterSelection::RoundRobin => {
                let picks = self.round_robin();
                picks.into_iter()
                    .map(|k| {
                        self.fit(weak_learners, &state, k, &rows)
                            .map(|tree| (k, tree))
                    })
                    .collect::<Result<Vec<_>>>()?
            },
            BoosterSelection::Greedy => self.greedy(weak_learners, &state, &rows)?,
        };
        for (k, tree) in trees {
            self.apply(k, tree, round);
        }
        self.update_states();

        self.refit_structure(iteration);

        let (train, valid) = self.evaluate(round);
        debug!(iteration = round, train, valid = ?valid, "round finished");
        self.history.push(RoundRecord { iteration: round, train, valid: valid.clone() });
        let early_stop = self.track(round, train, &valid);

        let general = &self.spec.general_params;
        if general.save_model_interval > 0 && iteration % general.save_model_interval == 0 {
            if let Some(path) = &general.save_model_path {
                self.current_model().save_model(path)?;
                info!(iteration = round, path = %path.display(), "checkpoint saved");
            }
        }

        self.time_acc += now.elapsed().as_millis();
        let valid_score = valid.first().copied();
        self.logger.log_round(round, train, valid_score, self.time_acc);

        if iteration >= num_iterations {
            self.states.fill(EnsembleState::Stopped);
        }
        let all_stopped = self.states.iter().all(|&s| s == EnsembleState::Stopped);
        if early_stop || all_stopped {
            if early_stop {
                info!(iteration = round, "early stopping");
            }
            self.logger.log_finish(round, train, valid_score, self.time_acc);
            return Ok(ControlFlow::Break(iteration));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn postprocess(&mut self) -> Result<Self::Output> {
        let best = self.best.unwrap_or(self.baseline);
        for ensemble in self.ensembles.iter_mut() {
            ensemble.truncate_to_round(best.iteration);
        }
        self.tree_counts = self.ensembles.iter().map(Ensemble::len).collect();
        self.history.retain(|record| record.iteration <= best.iteration);
        self.choice_model = self.best_choice_model.clone();

        info!(
            best_iteration = best.iteration,
            best_score = best.score,
            best_score_train = best.score_train,
            "training finished"
        );

        Ok(RUMBoostModel::from_components(
            self.num_classes(),
            std::mem::take(&mut self.ensembles),
            self.shared_start_idx(),
            self.choice_model.clone(),
            best.iteration,
            best.score,
            best.score_train,
            std::mem::take(&mut self.history),
        ))
    }
}

/// `utilities[i][j] += weight * output[i]` for every `j` in `alternatives`.
fn add_scaled(
    utilities: &mut [Vec<f64>],
    output: &[f64],
    weight: f64,
    alternatives: &[usize],
) {
    for (row, value) in utilities.iter_mut().zip(output) {
        for &j in alternatives {
            row[j] += weight * value;
        }
    }
}
