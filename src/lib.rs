//!
//! Gradient boosted random utility models.
//!
//! Each alternative's utility is a sum of additive ensembles of
//! regression trees. An ensemble is either exclusive to one alternative
//! or shared by several of them.
//! The utilities are linked to the choice probabilities by
//!
//! - the Multinomial Logit,
//! - the Nested Logit, with one `mu` per nest, or
//! - the Cross-Nested Logit, with `mu` per nest and
//!     allocation parameters `alphas`.
//!
//! The trees are fitted on the exact gradient and hessian of the
//! negative log-likelihood, and the free `mu`/`alphas` are refitted
//! by a projected gradient ascent every few rounds.
//!
//! ```no_run
//! use rumboost::prelude::*;
//! # fn run() -> rumboost::Result<()> {
//! let train = Sample::from_csv("train.csv", true)?.set_target("choice")?;
//! let spec = ModelSpecification::from_json_file("spec.json")?;
//! let model = rum_train(&train, &[], &spec)?;
//!
//! let probabilities = model.predict(&train, &PredictOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod sample;
pub mod config;
pub mod choice_model;
pub mod probability;
pub mod objective;
pub mod optimizer;
pub mod metrics;
pub mod hypothesis;
pub mod weak_learner;
pub mod model;
pub mod dataset;
pub mod booster;
pub mod logging;
pub mod train;

pub mod prelude;


pub use error::{Result, RumBoostError};
pub use sample::{Sample, Feature};
pub use hypothesis::Regressor;

pub use weak_learner::{
    WeakLearner,
    RegressionTree,
    RegressionTreeBuilder,
    RegressionTreeRegressor,
};

pub use booster::{Booster, RUMBoost};
pub use model::{RUMBoostModel, PredictOptions};
pub use train::rum_train;
