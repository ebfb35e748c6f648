//! The traits of hypotheses produced by weak learners.
use crate::Sample;

/// A real-valued hypothesis, evaluated on one row of a [`Sample`].
pub trait Regressor {
    /// Predicts the value of the `row`-th observation.
    fn predict(&self, sample: &Sample, row: usize) -> f64;

    /// Predicts the values of every observation in `sample`.
    fn predict_all(&self, sample: &Sample) -> Vec<f64> {
        let n_sample = sample.shape().0;
        (0..n_sample).map(|row| self.predict(sample, row))
            .collect()
    }
}
