use serde::{Serialize, Deserialize};

use crate::constants::ALPHA_SUM_TOLERANCE;
use crate::error::ConfigError;
use super::nest::{check_mu, expand_flags};

/// Overlapping nests: alternative `i` belongs to nest `m`
/// with allocation weight `alphas[i][m]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCrossNestStructure")]
pub struct CrossNestStructure {
    pub(crate) alphas: Vec<Vec<f64>>,
    pub(crate) mu: Vec<f64>,
    pub(crate) optimise_mu: Vec<bool>,
    pub(crate) optimise_alphas: Vec<Vec<bool>>,
}

#[derive(Deserialize)]
struct RawCrossNestStructure {
    alphas: Vec<Vec<f64>>,
    mu: Vec<f64>,
    #[serde(default)]
    optimise_mu: Vec<bool>,
    #[serde(default)]
    optimise_alphas: Vec<Vec<bool>>,
}

impl TryFrom<RawCrossNestStructure> for CrossNestStructure {
    type Error = ConfigError;
    fn try_from(raw: RawCrossNestStructure) -> Result<Self, Self::Error> {
        let num_classes = raw.alphas.len();
        Self::new(raw.alphas, raw.mu, raw.optimise_mu, raw.optimise_alphas, num_classes)
    }
}

impl CrossNestStructure {
    /// Construct a new `CrossNestStructure`.
    /// `alphas` is `num_classes x mu.len()`, each row sums to one.
    /// Empty flag vectors keep the corresponding parameters fixed.
    pub fn new(
        alphas: Vec<Vec<f64>>,
        mu: Vec<f64>,
        optimise_mu: Vec<bool>,
        optimise_alphas: Vec<Vec<bool>>,
        num_classes: usize,
    ) -> Result<Self, ConfigError>
    {
        let n_nests = mu.len();
        if alphas.len() != num_classes {
            return Err(ConfigError::DimensionMismatch {
                what: "alphas rows",
                expected: num_classes,
                got: alphas.len(),
            });
        }
        check_alphas(&alphas, n_nests)?;
        check_mu(&mu)?;

        let optimise_mu = expand_flags(optimise_mu, n_nests, "optimise_mu")?;
        let optimise_alphas = if optimise_alphas.is_empty() {
            vec![vec![false; n_nests]; num_classes]
        } else {
            if optimise_alphas.len() != num_classes {
                return Err(ConfigError::DimensionMismatch {
                    what: "optimise_alphas rows",
                    expected: num_classes,
                    got: optimise_alphas.len(),
                });
            }
            optimise_alphas.into_iter()
                .map(|row| expand_flags(row, n_nests, "optimise_alphas columns"))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self { alphas, mu, optimise_mu, optimise_alphas, })
    }

    pub fn alphas(&self) -> &[Vec<f64>] {
        &self.alphas[..]
    }

    pub fn mu(&self) -> &[f64] {
        &self.mu[..]
    }

    pub fn optimise_mu(&self) -> &[bool] {
        &self.optimise_mu[..]
    }

    pub fn optimise_alphas(&self) -> &[Vec<bool>] {
        &self.optimise_alphas[..]
    }

    pub fn n_nests(&self) -> usize {
        self.mu.len()
    }

    pub fn num_classes(&self) -> usize {
        self.alphas.len()
    }

    /// Returns a copy of `self` with new structural parameters.
    pub fn with_parameters(&self, alphas: Vec<Vec<f64>>, mu: Vec<f64>)
        -> Result<Self, ConfigError>
    {
        if mu.len() != self.mu.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "mu",
                expected: self.mu.len(),
                got: mu.len(),
            });
        }
        if alphas.len() != self.alphas.len() {
            return Err(ConfigError::DimensionMismatch {
                what: "alphas rows",
                expected: self.alphas.len(),
                got: alphas.len(),
            });
        }
        check_alphas(&alphas, mu.len())?;
        check_mu(&mu)?;
        Ok(Self { alphas, mu, ..self.clone() })
    }
}

fn check_alphas(alphas: &[Vec<f64>], n_nests: usize) -> Result<(), ConfigError> {
    for (row, values) in alphas.iter().enumerate() {
        if values.len() != n_nests {
            return Err(ConfigError::DimensionMismatch {
                what: "alphas columns",
                expected: n_nests,
                got: values.len(),
            });
        }
        if let Some((nest, &value)) = values.iter()
            .enumerate()
            .find(|(_, &a)| !(0.0..=1.0).contains(&a))
        {
            return Err(ConfigError::AlphaRange { row, nest, value });
        }
        let sum = values.iter().sum::<f64>();
        if (sum - 1.0).abs() > ALPHA_SUM_TOLERANCE {
            return Err(ConfigError::AlphaRowSum { row, sum });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphas() -> Vec<Vec<f64>> {
        vec![vec![0.5, 0.5], vec![1.0, 0.0], vec![0.0, 1.0]]
    }

    #[test]
    fn stores_supplied_parameters() {
        let cnl = CrossNestStructure::new(
            alphas(),
            vec![1.0, 1.0],
            vec![true, false],
            vec![vec![true, true], vec![false, false], vec![false, false]],
            3,
        ).unwrap();
        assert_eq!(cnl.alphas(), &alphas()[..]);
        assert_eq!(cnl.optimise_alphas()[0], vec![true, true]);
        assert_eq!(cnl.n_nests(), 2);
    }

    #[test]
    fn default_flags_are_false() {
        let cnl = CrossNestStructure::new(alphas(), vec![1.0, 1.0], vec![], vec![], 3)
            .unwrap();
        assert_eq!(cnl.optimise_mu(), &[false, false]);
        assert!(cnl.optimise_alphas().iter().flatten().all(|f| !f));
    }

    #[test]
    fn rejects_bad_rows() {
        let mut bad = alphas();
        bad[1] = vec![0.7, 0.7];
        let err = CrossNestStructure::new(bad, vec![1.0, 1.0], vec![], vec![], 3)
            .unwrap_err();
        assert!(matches!(err, ConfigError::AlphaRowSum { row: 1, .. }));

        let mut bad = alphas();
        bad[2] = vec![-0.5, 1.5];
        let err = CrossNestStructure::new(bad, vec![1.0, 1.0], vec![], vec![], 3)
            .unwrap_err();
        assert!(matches!(err, ConfigError::AlphaRange { row: 2, nest: 0, .. }));
    }

    #[test]
    fn deserialization_is_validated() {
        let cnl = CrossNestStructure::new(
            alphas(), vec![0.5, 1.0], vec![true, false], vec![], 3,
        ).unwrap();
        let json = serde_json::to_string(&cnl).unwrap();
        let loaded: CrossNestStructure = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, cnl);

        let json = r#"{ "alphas": [[0.6, 0.6], [1.0, 0.0], [0.0, 1.0]], "mu": [1.0, 1.0] }"#;
        let err = serde_json::from_str::<CrossNestStructure>(json).unwrap_err();
        assert!(err.to_string().contains("row 0"), "{err}");
    }
}
