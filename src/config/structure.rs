use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::choice_model::{NestStructure, CrossNestStructure};
use crate::constants::{
    DEFAULT_MAX_OPTIM_ITER,
    DEFAULT_MU_BOUNDS,
    DEFAULT_OPTIM_INTERVAL,
    DEFAULT_OPTIM_TOLERANCE,
};
use crate::error::ConfigError;
use crate::optimizer::ProjectedGradient;

/// Schedule and bounds of the structural parameter optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimSettings {
    /// The optimizer runs when `round % optim_interval == 0`.
    pub optim_interval: usize,
    pub mu_bounds: (f64, f64),
    pub max_optim_iter: usize,
    pub optim_tolerance: f64,
}

impl Default for OptimSettings {
    fn default() -> Self {
        Self {
            optim_interval: DEFAULT_OPTIM_INTERVAL,
            mu_bounds: DEFAULT_MU_BOUNDS,
            max_optim_iter: DEFAULT_MAX_OPTIM_ITER,
            optim_tolerance: DEFAULT_OPTIM_TOLERANCE,
        }
    }
}

impl OptimSettings {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.optim_interval == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "optim_interval",
                reason: "must be at least 1".into(),
            });
        }
        let (lo, hi) = self.mu_bounds;
        if !(lo > 0.0 && lo <= hi) {
            return Err(ConfigError::InvalidParameter {
                name: "mu_bounds",
                reason: format!("expected 0 < lower <= upper, got ({lo}, {hi})"),
            });
        }
        Ok(())
    }

    /// The optimizer configured by these settings.
    pub fn optimizer(&self) -> ProjectedGradient {
        ProjectedGradient::new()
            .mu_bounds(self.mu_bounds)
            .max_iter(self.max_optim_iter)
            .tolerance(self.optim_tolerance)
    }
}

/// The `nested_logit` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedLogitParams {
    pub mu: Vec<f64>,
    pub nests: BTreeMap<usize, Vec<usize>>,
    #[serde(default)]
    pub optimise_mu: Vec<bool>,
    #[serde(default = "default_optim_interval")]
    pub optim_interval: usize,
    #[serde(default = "default_mu_bounds")]
    pub mu_bounds: (f64, f64),
    #[serde(default = "default_max_optim_iter")]
    pub max_optim_iter: usize,
}

impl NestedLogitParams {
    pub fn settings(&self) -> OptimSettings {
        OptimSettings {
            optim_interval: self.optim_interval,
            mu_bounds: self.mu_bounds,
            max_optim_iter: self.max_optim_iter,
            ..OptimSettings::default()
        }
    }

    pub fn structure(&self, num_classes: usize)
        -> Result<NestStructure, ConfigError>
    {
        NestStructure::new(
            self.nests.clone(),
            self.mu.clone(),
            self.optimise_mu.clone(),
            num_classes,
        )
    }
}

/// The `cross_nested_logit` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossNestedLogitParams {
    pub mu: Vec<f64>,
    pub alphas: Vec<Vec<f64>>,
    #[serde(default)]
    pub optimise_mu: Vec<bool>,
    #[serde(default)]
    pub optimise_alphas: Vec<Vec<bool>>,
    #[serde(default = "default_optim_interval")]
    pub optim_interval: usize,
    #[serde(default = "default_mu_bounds")]
    pub mu_bounds: (f64, f64),
    #[serde(default = "default_max_optim_iter")]
    pub max_optim_iter: usize,
}

impl CrossNestedLogitParams {
    pub fn settings(&self) -> OptimSettings {
        OptimSettings {
            optim_interval: self.optim_interval,
            mu_bounds: self.mu_bounds,
            max_optim_iter: self.max_optim_iter,
            ..OptimSettings::default()
        }
    }

    pub fn structure(&self, num_classes: usize)
        -> Result<CrossNestStructure, ConfigError>
    {
        CrossNestStructure::new(
            self.alphas.clone(),
            self.mu.clone(),
            self.optimise_mu.clone(),
            self.optimise_alphas.clone(),
            num_classes,
        )
    }
}

fn default_optim_interval() -> usize { DEFAULT_OPTIM_INTERVAL }

fn default_mu_bounds() -> (f64, f64) { DEFAULT_MU_BOUNDS }

fn default_max_optim_iter() -> usize { DEFAULT_MAX_OPTIM_ITER }
