use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::{Regressor, Sample};

/// The trees of one utility ensemble.
///
/// Its raw output for a row is `Σ_t weight_t · tree_t(row)`,
/// added to the utility of every alternative in `alternatives`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble<H> {
    variables: Vec<String>,
    alternatives: Vec<usize>,
    trees: Vec<H>,
    weights: Vec<f64>,
    // Boosting round each tree was added in, non-decreasing.
    rounds: Vec<usize>,
    best_iteration: Option<usize>,
}

impl<H> Ensemble<H> {
    pub fn new(variables: Vec<String>, alternatives: Vec<usize>) -> Self {
        Self {
            variables,
            alternatives,
            trees: Vec::new(),
            weights: Vec::new(),
            rounds: Vec::new(),
            best_iteration: None,
        }
    }

    /// Appends `tree`, scaled by `weight`, grown in round `round`.
    pub fn push(&mut self, tree: H, weight: f64, round: usize) {
        self.trees.push(tree);
        self.weights.push(weight);
        self.rounds.push(round);
    }

    /// Drops the trees grown after round `round`
    /// and marks `round` as the best iteration.
    pub fn truncate_to_round(&mut self, round: usize) {
        let keep = self.rounds.partition_point(|&r| r <= round);
        self.trees.truncate(keep);
        self.weights.truncate(keep);
        self.rounds.truncate(keep);
        self.best_iteration = Some(round);
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn alternatives(&self) -> &[usize] {
        &self.alternatives
    }

    pub fn trees(&self) -> &[H] {
        &self.trees
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn rounds(&self) -> &[usize] {
        &self.rounds
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// The last round this ensemble grew a tree in.
    pub fn last_round(&self) -> usize {
        self.rounds.last().copied().unwrap_or(0)
    }
}

impl<H> Ensemble<H>
    where H: Regressor + Sync,
{
    /// Raw output of the trees grown up to round `num_iteration`
    /// (every tree when `None`) on each row of `sample`.
    pub fn predict_all(&self, sample: &Sample, num_iteration: Option<usize>) -> Vec<f64> {
        let n_trees = match num_iteration {
            Some(round) => self.rounds.partition_point(|&r| r <= round),
            None => self.trees.len(),
        };
        let trees = &self.trees[..n_trees];
        let weights = &self.weights[..n_trees];

        (0..sample.shape().0).into_par_iter()
            .map(|row| {
                trees.iter()
                    .zip(weights)
                    .map(|(tree, w)| w * tree.predict(sample, row))
                    .sum::<f64>()
            })
            .collect()
    }
}
