//! One-call training entry point.
use crate::booster::{Booster, RUMBoost};
use crate::config::ModelSpecification;
use crate::error::Result;
use crate::model::RUMBoostModel;
use crate::weak_learner::RegressionTreeRegressor;
use crate::Sample;

/// Trains a RUMBoost model with the histogram regression tree.
///
/// `valid_sets[0]` drives early stopping when present.
/// ```no_run
/// use rumboost::prelude::*;
/// # fn run() -> rumboost::Result<()> {
/// let train = Sample::from_csv("train.csv", true)?.set_target("choice")?;
/// let valid = Sample::from_csv("valid.csv", true)?.set_target("choice")?;
/// let spec = ModelSpecification::from_json_file("spec.json")?;
///
/// let model = rum_train(&train, &[&valid], &spec)?;
/// model.save_model("model.json")?;
/// # Ok(())
/// # }
/// ```
pub fn rum_train(
    train: &Sample,
    valid_sets: &[&Sample],
    spec: &ModelSpecification,
) -> Result<RUMBoostModel<RegressionTreeRegressor>>
{
    let mut booster = RUMBoost::<RegressionTreeRegressor>::init(train, valid_sets, spec)?;
    let learners = booster.default_learners()?;
    booster.run(&learners)
}

/// Continues training `model` for `spec.general_params.num_iterations`
/// more rounds.
pub fn rum_train_from(
    model: RUMBoostModel<RegressionTreeRegressor>,
    train: &Sample,
    valid_sets: &[&Sample],
    spec: &ModelSpecification,
) -> Result<RUMBoostModel<RegressionTreeRegressor>>
{
    let mut booster = RUMBoost::<RegressionTreeRegressor>::init(train, valid_sets, spec)?
        .init_model(model)?;
    let learners = booster.default_learners()?;
    booster.run(&learners)
}
