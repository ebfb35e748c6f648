//! Choice probabilities of the multinomial, nested and
//! cross-nested logit models.
//!
//! Every function takes the utility matrix (`n_obs x n_alternatives`)
//! by reference and returns fresh matrices.
//! All log-sum-exps are shifted by their maximum.
use rayon::prelude::*;

use crate::choice_model::{NestStructure, CrossNestStructure};

/// Probabilities of a nested logit model.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedProbabilities {
    /// `P(i)`, `n_obs x n_alternatives`.
    pub joint: Vec<Vec<f64>>,
    /// `P(i | nest(i))`, `n_obs x n_alternatives`.
    pub within: Vec<Vec<f64>>,
    /// `P(m)`, `n_obs x n_nests`.
    pub nest: Vec<Vec<f64>>,
}

/// Probabilities of a cross-nested logit model.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossNestedProbabilities {
    /// `P(i)`, `n_obs x n_alternatives`.
    pub joint: Vec<Vec<f64>>,
    /// `P(i | m)`, `n_obs x n_alternatives x n_nests`.
    pub within: Vec<Vec<Vec<f64>>>,
    /// `P(m)`, `n_obs x n_nests`.
    pub nest: Vec<Vec<f64>>,
}

/// `ln Σ exp(x)`, shifted by the maximum.
/// Returns `-inf` for an empty input.
pub fn logsumexp<I>(values: I) -> f64
    where I: IntoIterator<Item = f64>,
{
    let values = values.into_iter().collect::<Vec<_>>();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Softmax of one row. Entries equal to `-inf` get probability `0`.
pub fn softmax_row(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = row.iter()
        .map(|v| (v - max).exp())
        .collect::<Vec<_>>();
    let total = exps.iter().sum::<f64>();
    exps.into_iter().map(|e| e / total).collect()
}

/// Multinomial logit probabilities.
pub fn softmax(utilities: &[Vec<f64>]) -> Vec<Vec<f64>> {
    utilities.par_iter()
        .map(|row| softmax_row(row))
        .collect()
}

/// Nested logit probabilities.
pub fn nested(utilities: &[Vec<f64>], structure: &NestStructure)
    -> NestedProbabilities
{
    let rows = utilities.par_iter()
        .map(|row| nested_row(row, structure))
        .collect::<Vec<_>>();

    let mut joint = Vec::with_capacity(rows.len());
    let mut within = Vec::with_capacity(rows.len());
    let mut nest = Vec::with_capacity(rows.len());
    for (j, w, n) in rows {
        joint.push(j);
        within.push(w);
        nest.push(n);
    }
    NestedProbabilities { joint, within, nest }
}

fn nested_row(row: &[f64], structure: &NestStructure)
    -> (Vec<f64>, Vec<f64>, Vec<f64>)
{
    let n_alt = row.len();
    let mut within = vec![0f64; n_alt];
    let mut inclusive = vec![f64::NEG_INFINITY; structure.n_nests()];

    for (&m, members) in structure.nests.iter() {
        let mu = structure.mu[m];
        let lse = logsumexp(members.iter().map(|&i| row[i] / mu));
        for &i in members {
            within[i] = (row[i] / mu - lse).exp();
        }
        inclusive[m] = mu * lse;
    }

    let nest = softmax_row(&inclusive);
    let joint = within.iter()
        .zip(&structure.nest_alt)
        .map(|(w, &m)| w * nest[m])
        .collect();

    (joint, within, nest)
}

/// Cross-nested logit probabilities.
/// Entries with `alphas[i][m] == 0` are skipped,
/// so that `P(i | m)` is exactly zero there.
pub fn cross_nested(utilities: &[Vec<f64>], structure: &CrossNestStructure)
    -> CrossNestedProbabilities
{
    let rows = utilities.par_iter()
        .map(|row| cross_nested_row(row, structure))
        .collect::<Vec<_>>();

    let mut joint = Vec::with_capacity(rows.len());
    let mut within = Vec::with_capacity(rows.len());
    let mut nest = Vec::with_capacity(rows.len());
    for (j, w, n) in rows {
        joint.push(j);
        within.push(w);
        nest.push(n);
    }
    CrossNestedProbabilities { joint, within, nest }
}

fn cross_nested_row(row: &[f64], structure: &CrossNestStructure)
    -> (Vec<f64>, Vec<Vec<f64>>, Vec<f64>)
{
    let n_alt = row.len();
    let n_nests = structure.n_nests();
    let alphas = &structure.alphas;

    // log y_im = ln(alpha_im) / mu_m + V_i / mu_m
    let mut log_y = vec![vec![f64::NEG_INFINITY; n_nests]; n_alt];
    let mut inclusive = vec![f64::NEG_INFINITY; n_nests];
    let mut lse = vec![f64::NEG_INFINITY; n_nests];
    for m in 0..n_nests {
        let mu = structure.mu[m];
        for i in 0..n_alt {
            if alphas[i][m] > 0.0 {
                log_y[i][m] = (alphas[i][m].ln() + row[i]) / mu;
            }
        }
        lse[m] = logsumexp(
            (0..n_alt).filter(|&i| alphas[i][m] > 0.0).map(|i| log_y[i][m])
        );
        if lse[m].is_finite() {
            inclusive[m] = mu * lse[m];
        }
    }

    let nest = softmax_row(&inclusive);

    let mut within = vec![vec![0f64; n_nests]; n_alt];
    let mut joint = vec![0f64; n_alt];
    for i in 0..n_alt {
        for m in 0..n_nests {
            if alphas[i][m] > 0.0 && lse[m].is_finite() {
                let p = (log_y[i][m] - lse[m]).exp();
                within[i][m] = p;
                joint[i] += nest[m] * p;
            }
        }
    }

    (joint, within, nest)
}
