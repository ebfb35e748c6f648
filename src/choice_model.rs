//! The discrete choice models linking utilities to probabilities.

pub mod nest;
pub mod cross_nest;

use serde::{Serialize, Deserialize};

pub use nest::NestStructure;
pub use cross_nest::CrossNestStructure;

use crate::probability;

/// Plain multinomial logit. It has no structural parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multinomial;

/// The choice model applied on top of the utilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChoiceModel {
    Multinomial(Multinomial),
    Nested(NestStructure),
    CrossNested(CrossNestStructure),
}

impl Default for ChoiceModel {
    fn default() -> Self {
        Self::Multinomial(Multinomial)
    }
}

impl ChoiceModel {
    pub fn name(&self) -> &str {
        match self {
            Self::Multinomial(_) => "Multinomial Logit",
            Self::Nested(_)      => "Nested Logit",
            Self::CrossNested(_) => "Cross-Nested Logit",
        }
    }

    /// Choice probabilities `n_obs x n_alternatives`
    /// for the given utilities.
    pub fn predict_proba(&self, utilities: &[Vec<f64>]) -> Vec<Vec<f64>> {
        match self {
            Self::Multinomial(_) => probability::softmax(utilities),
            Self::Nested(nest) => probability::nested(utilities, nest).joint,
            Self::CrossNested(cross) => {
                probability::cross_nested(utilities, cross).joint
            },
        }
    }

    /// `true` when some structural parameter is flagged for optimisation.
    pub fn has_free_parameters(&self) -> bool {
        match self {
            Self::Multinomial(_) => false,
            Self::Nested(nest) => nest.optimise_mu.iter().any(|&f| f),
            Self::CrossNested(cross) => {
                cross.optimise_mu.iter().any(|&f| f)
                    || cross.optimise_alphas.iter().flatten().any(|&f| f)
            },
        }
    }

    pub fn mu(&self) -> Option<&[f64]> {
        match self {
            Self::Multinomial(_) => None,
            Self::Nested(nest) => Some(nest.mu()),
            Self::CrossNested(cross) => Some(cross.mu()),
        }
    }

    pub fn alphas(&self) -> Option<&[Vec<f64>]> {
        match self {
            Self::CrossNested(cross) => Some(cross.alphas()),
            _ => None,
        }
    }

    pub fn nests(&self) -> Option<&NestStructure> {
        match self {
            Self::Nested(nest) => Some(nest),
            _ => None,
        }
    }

    /// Summary rows for the training log.
    pub(crate) fn info(&self) -> Vec<(&str, String)> {
        let mut info = vec![("Choice model", self.name().to_string())];
        if let Some(mu) = self.mu() {
            info.push(("mu", format!("{mu:.4?}")));
        }
        if let Self::CrossNested(cross) = self {
            info.push(("# of nests", cross.n_nests().to_string()));
        }
        info
    }
}

impl From<NestStructure> for ChoiceModel {
    fn from(nest: NestStructure) -> Self {
        Self::Nested(nest)
    }
}

impl From<CrossNestStructure> for ChoiceModel {
    fn from(cross: CrossNestStructure) -> Self {
        Self::CrossNested(cross)
    }
}
