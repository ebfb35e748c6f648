use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// A hard partition of the alternatives into nests,
/// with one scale parameter `mu` per nest.
/// Deserialization goes through [`NestStructure::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNestStructure")]
pub struct NestStructure {
    pub(crate) nests: BTreeMap<usize, Vec<usize>>,
    pub(crate) nest_alt: Vec<usize>,
    pub(crate) mu: Vec<f64>,
    pub(crate) optimise_mu: Vec<bool>,
}

#[derive(Deserialize)]
struct RawNestStructure {
    nests: BTreeMap<usize, Vec<usize>>,
    #[serde(default)]
    nest_alt: Option<Vec<usize>>,
    mu: Vec<f64>,
    #[serde(default)]
    optimise_mu: Vec<bool>,
}

impl TryFrom<RawNestStructure> for NestStructure {
    type Error = ConfigError;
    fn try_from(raw: RawNestStructure) -> Result<Self, Self::Error> {
        let num_classes = match &raw.nest_alt {
            Some(nest_alt) => nest_alt.len(),
            None => raw.nests.values()
                .flatten()
                .max()
                .map_or(0, |&alternative| alternative + 1),
        };
        let nest = Self::new(raw.nests, raw.mu, raw.optimise_mu, num_classes)?;
        match raw.nest_alt {
            Some(nest_alt) if nest_alt != nest.nest_alt => {
                Err(ConfigError::InvalidParameter {
                    name: "nest_alt",
                    reason: format!(
                        "{nest_alt:?} does not match the nests ({:?})", nest.nest_alt
                    ),
                })
            },
            _ => Ok(nest),
        }
    }
}

impl NestStructure {
    /// Construct a new `NestStructure`.
    /// Nest ids must be `0..mu.len()` and every alternative
    /// in `0..num_classes` must belong to exactly one nest.
    /// An empty `optimise_mu` keeps every `mu` fixed.
    pub fn new(
        nests: BTreeMap<usize, Vec<usize>>,
        mu: Vec<f64>,
        optimise_mu: Vec<bool>,
        num_classes: usize,
    ) -> Result<Self, ConfigError>
    {
        let n_nests = mu.len();
        if nests.len() != n_nests {
            return Err(ConfigError::DimensionMismatch {
                what: "nests",
                expected: n_nests,
                got: nests.len(),
            });
        }
        if let Some(&id) = nests.keys().find(|&&id| id >= n_nests) {
            return Err(ConfigError::InvalidParameter {
                name: "nests",
                reason: format!("nest id {id} is not in 0..{n_nests}"),
            });
        }

        check_mu(&mu)?;
        let optimise_mu = expand_flags(optimise_mu, n_nests, "optimise_mu")?;

        let mut counts = vec![0_usize; num_classes];
        let mut nest_alt = vec![0_usize; num_classes];
        for (&nest, members) in nests.iter() {
            for &alternative in members {
                if alternative >= num_classes {
                    return Err(ConfigError::UnknownAlternative {
                        alternative, num_classes,
                    });
                }
                counts[alternative] += 1;
                nest_alt[alternative] = nest;
            }
        }
        if let Some((alternative, &count)) = counts.iter()
            .enumerate()
            .find(|(_, &c)| c != 1)
        {
            return Err(ConfigError::NestCoverage { alternative, count });
        }

        Ok(Self { nests, nest_alt, mu, optimise_mu, })
    }

    /// Nest id to its ordered member alternatives.
    pub fn nests(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.nests
    }

    /// Alternative to the nest it belongs to.
    pub fn nest_alt(&self) -> &[usize] {
        &self.nest_alt[..]
    }

    pub fn mu(&self) -> &[f64] {
        &self.mu[..]
    }

    pub fn optimise_mu(&self) -> &[bool] {
        &self.optimise_mu[..]
    }

    pub fn n_nests(&self) -> usize {
        self.mu.len()
    }

    pub fn num_classes(&self) -> usize {
        self.nest_alt.len()
    }

    /// Returns a copy of `self` with new scale parameters.
    pub fn with_mu(&self, mu: Vec<f64>) -> Result<Self, ConfigError> {
        if mu.len() != self.mu.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "mu",
                expected: self.mu.len(),
                got: mu.len(),
            });
        }
        check_mu(&mu)?;
        Ok(Self { mu, ..self.clone() })
    }

    /// The nest of `alternative` as a `0/1` row of alphas.
    /// Used to view a nested logit as a degenerate cross-nested one.
    pub fn indicator_alphas(&self) -> Vec<Vec<f64>> {
        let n_nests = self.n_nests();
        self.nest_alt.iter()
            .map(|&m| {
                let mut row = vec![0f64; n_nests];
                row[m] = 1f64;
                row
            })
            .collect()
    }
}

pub(crate) fn check_mu(mu: &[f64]) -> Result<(), ConfigError> {
    match mu.iter().enumerate().find(|(_, &m)| !(m > 0.0 && m.is_finite())) {
        Some((nest, &value)) => Err(ConfigError::NonPositiveMu { nest, value }),
        None => Ok(()),
    }
}

pub(crate) fn expand_flags(
    flags: Vec<bool>,
    len: usize,
    what: &'static str,
) -> Result<Vec<bool>, ConfigError>
{
    if flags.is_empty() {
        return Ok(vec![false; len]);
    }
    if flags.len() != len {
        return Err(ConfigError::DimensionMismatch {
            what,
            expected: len,
            got: flags.len(),
        });
    }
    Ok(flags)
}
