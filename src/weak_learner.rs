//! The files in `weak_learner/` directory define
//! the `WeakLearner` trait and the regression tree fitted
//! on the gradient and hessian of the choice model.

/// Provides WeakLearner trait.
pub mod core;

/// Defines Regression Tree.
pub mod regression_tree;

pub use self::core::WeakLearner;

pub use self::regression_tree::{
    RegressionTree,
    RegressionTreeBuilder,
    RegressionTreeRegressor,
};
