//! Provides the `WeakLearner` trait.
use crate::{Sample, Regressor};
use crate::error::FitError;

/// The tree-fitting capability used by the boosting coordinator.
/// Any type implementing this trait can grow the utility ensembles,
/// which makes it easy to substitute a fake learner in tests.
pub trait WeakLearner {
    /// The hypothesis returned by [`WeakLearner::produce`].
    type Hypothesis: Regressor;

    /// Returns the name of the weak learner.
    fn name(&self) -> &str;

    /// Returns the information of the weak learner as `String`.
    fn info(&self) -> Option<Vec<(&str, String)>> {
        None
    }

    /// Fits one hypothesis on the observations `rows` of `sample`
    /// from the gradient and hessian of the loss.
    /// Both derivative slices are indexed by row of `sample`.
    fn produce(
        &self,
        sample: &Sample,
        gradient: &[f64],
        hessian: &[f64],
        rows: &[usize],
    ) -> Result<Self::Hypothesis, FitError>;
}
