//! Error types shared by every component of the crate.
use std::io;
use thiserror::Error;

/// Convenience alias used by the public, fallible API.
pub type Result<T> = std::result::Result<T, RumBoostError>;

/// Top level error returned by training, prediction and (de)serialization.
#[derive(Debug, Error)]
pub enum RumBoostError {
    /// The model specification or the data violate an invariant.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tree learner failed while fitting an ensemble.
    #[error("failed to fit a tree for ensemble {ensemble}")]
    Fit {
        ensemble: usize,
        #[source]
        source: FitError,
    },

    /// The input data is malformed.
    #[error("invalid data: {0}")]
    Data(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

/// Violations of the structural invariants of a model.
/// All of them are reported before the first boosting round.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("row {row} of alphas sums to {sum}, expected 1")]
    AlphaRowSum { row: usize, sum: f64 },

    #[error("alphas[{row}][{nest}] = {value} is outside [0, 1]")]
    AlphaRange { row: usize, nest: usize, value: f64 },

    #[error("mu[{nest}] = {value} must be strictly positive")]
    NonPositiveMu { nest: usize, value: f64 },

    #[error("alternative {alternative} appears {count} times in the nests")]
    NestCoverage { alternative: usize, count: usize },

    #[error("alternative {alternative} is out of range (num_classes = {num_classes})")]
    UnknownAlternative { alternative: usize, num_classes: usize },

    #[error("label {label} at row {row} is out of range (num_classes = {num_classes})")]
    LabelOutOfRange { row: usize, label: usize, num_classes: usize },

    #[error("label {value} at row {row} is not a non-negative integer")]
    NonIntegerLabel { row: usize, value: f64 },

    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("feature `{0}` does not exist")]
    MissingFeature(String),

    #[error(
        "shared ensemble {ensemble} is placed before the exclusive ensembles \
         (shared ensembles must come last)"
    )]
    SharedOrdering { ensemble: usize },

    #[error(
        "ensemble {ensemble} has {got} monotone constraints for {expected} variables"
    )]
    MonotoneLength {
        ensemble: usize,
        expected: usize,
        got: usize,
    },

    #[error(
        "ensemble {ensemble} has interaction index {index} \
         but only {n_variables} variables"
    )]
    InteractionIndex {
        ensemble: usize,
        index: usize,
        n_variables: usize,
    },

    #[error("exclusive ensemble {ensemble} feeds {got} alternatives, expected 1")]
    ExclusiveArity { ensemble: usize, got: usize },

    #[error("nested_logit and cross_nested_logit cannot be set together")]
    ConflictingChoiceModels,

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Failure of the tree-fitting capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("no rows to fit")]
    EmptyRows,

    #[error("gradient has {gradient} entries but hessian has {hessian}")]
    LengthMismatch { gradient: usize, hessian: usize },

    #[error("non-finite gradient or hessian at row {row}")]
    NonFinite { row: usize },

    #[error("feature `{0}` is not known by the learner")]
    UnknownFeature(String),
}

/// Failures of the structural parameter optimizer.
/// These never abort training.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("no convergence after {iterations} iterations (step norm {step_norm:e})")]
    NonConvergence { iterations: usize, step_norm: f64 },

    #[error("the log-likelihood is not finite")]
    NonFinite,
}
