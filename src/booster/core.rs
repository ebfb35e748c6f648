//! Provides `Booster` trait.
use std::ops::ControlFlow;

use crate::error::Result;
use crate::WeakLearner;

/// The trait [`Booster`] defines the boosting loop
/// as a repeated game between the **Booster** and the **Weak Learners**:
///
/// In each round `t = 1, 2, ...`,
/// 1. Booster computes the gradient and hessian of its loss.
/// 2. Weak Learners fit hypotheses on them.
/// 3. Booster adds the hypotheses to its ensembles.
///
/// # Required Methods
/// - [`Booster::name`]
/// - [`Booster::preprocess`]
/// - [`Booster::boost`]
/// - [`Booster::postprocess`]
/// - [`Booster::info`] ... optional.
///
/// # Provided Methods
/// - [`Booster::run`]
pub trait Booster<H> {
    /// The final hypothesis output by a boosting algorithm.
    type Output;

    /// Returns the name of the boosting algorithm.
    fn name(&self) -> &str;

    /// Returns the information of boosting algorithm as `String`.
    fn info(&self) -> Option<Vec<(&str, String)>> {
        None
    }

    /// A main function that runs boosting algorithm.
    /// `weak_learners[k]` grows the trees of the `k`-th ensemble.
    fn run<W>(&mut self, weak_learners: &[W]) -> Result<Self::Output>
        where W: WeakLearner<Hypothesis = H>
    {
        self.preprocess(weak_learners)?;

        let mut iteration = 1;
        while let ControlFlow::Continue(()) = self.boost(weak_learners, iteration)? {
            iteration += 1;
        }

        self.postprocess()
    }

    /// Pre-processing for `self`.
    /// As you can see in [`Booster::run`],
    /// this method is called before the boosting process.
    fn preprocess<W>(&mut self, weak_learners: &[W]) -> Result<()>
        where W: WeakLearner<Hypothesis = H>;

    /// Boosting step per iteration.
    /// Returns `ControlFlow::Break(iteration)` on the last round.
    fn boost<W>(
        &mut self,
        weak_learners: &[W],
        iteration: usize,
    ) -> Result<ControlFlow<usize>>
        where W: WeakLearner<Hypothesis = H>;

    /// Post-processing.
    fn postprocess(&mut self) -> Result<Self::Output>;
}
