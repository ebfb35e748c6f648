//! Exports the standard types and traits.
//!
pub use crate::booster::{
    Booster,
    RUMBoost,
    EnsembleState,
};


pub use crate::weak_learner::{
    WeakLearner,
    RegressionTree,
    RegressionTreeBuilder,
    RegressionTreeRegressor,
};


pub use crate::hypothesis::Regressor;


pub use crate::sample::{Sample, Feature};


pub use crate::config::{
    ModelSpecification,
    GeneralParams,
    BoosterSelection,
    UtilitySpec,
    BoostingParams,
    Monotonicity,
    NestedLogitParams,
    CrossNestedLogitParams,
    OptimSettings,
};


pub use crate::choice_model::{
    ChoiceModel,
    Multinomial,
    NestStructure,
    CrossNestStructure,
};


pub use crate::model::{
    RUMBoostModel,
    PredictOptions,
    Ensemble,
    RoundRecord,
};


pub use crate::optimizer::ProjectedGradient;
pub use crate::metrics::{cross_entropy, accuracy};
pub use crate::logging::TrainingLogger;
pub use crate::train::{rum_train, rum_train_from};
pub use crate::error::{Result, RumBoostError, ConfigError, FitError, OptimizerError};
