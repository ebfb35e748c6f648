//! Evaluation metrics on predicted choice probabilities.
use crate::constants::PROBABILITY_CLIP;

/// Mean negative log-likelihood of the chosen alternatives.
/// Probabilities are clipped to `[1e-15, 1]`.
pub fn cross_entropy(probabilities: &[Vec<f64>], labels: &[usize]) -> f64 {
    let n_sample = labels.len();
    if n_sample == 0 {
        return 0f64;
    }

    let total = probabilities.iter()
        .zip(labels)
        .map(|(row, &y)| -row[y].clamp(PROBABILITY_CLIP, 1.0).ln())
        .sum::<f64>();
    total / n_sample as f64
}

/// Share of observations whose most probable alternative is the chosen one.
/// Ties go to the lowest alternative index.
pub fn accuracy(probabilities: &[Vec<f64>], labels: &[usize]) -> f64 {
    let n_sample = labels.len();
    if n_sample == 0 {
        return 0f64;
    }

    let hits = probabilities.iter()
        .zip(labels)
        .filter(|(row, &y)| argmax(row) == y)
        .count();
    hits as f64 / n_sample as f64
}

fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &p)| {
            if p > max { (i, p) } else { (best, max) }
        })
        .0
}
