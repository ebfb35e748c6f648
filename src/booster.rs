//! The boosting coordinator.
//!
//! [`RUMBoost`] implements the [`Booster`] trait:
//! it computes the choice probabilities once per round,
//! lets the weak learners fit the selected ensembles
//! and refits the structural parameters of nested models.

pub mod core;
pub mod rumboost;
pub mod sampler;

pub use self::core::Booster;
pub use self::rumboost::{RUMBoost, EnsembleState};
pub use self::sampler::RowSampler;
