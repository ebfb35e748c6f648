use serde::{Serialize, Deserialize, Deserializer};

/// Monotone constraint of a utility with respect to one variable.
/// Written as `-1`, `0` or `1` in the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Monotonicity {
    Decreasing,
    #[default]
    Free,
    Increasing,
}

impl TryFrom<i8> for Monotonicity {
    type Error = String;
    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Decreasing),
            0 => Ok(Self::Free),
            1 => Ok(Self::Increasing),
            _ => Err(format!("monotone constraint must be -1, 0 or 1, got {value}")),
        }
    }
}

impl From<Monotonicity> for i8 {
    fn from(value: Monotonicity) -> Self {
        match value {
            Monotonicity::Decreasing => -1,
            Monotonicity::Free => 0,
            Monotonicity::Increasing => 1,
        }
    }
}

/// Tree-learning hyperparameters of one ensemble.
/// Missing keys take the defaults of a depth-unbounded histogram learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub monotone_constraints: Vec<Monotonicity>,
    pub interaction_constraints: Vec<Vec<usize>>,
    pub learning_rate: f64,
    /// `None` (or a negative value in the configuration) means unbounded.
    #[serde(deserialize_with = "negative_as_none")]
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub min_sum_hessian_in_leaf: f64,
    pub min_gain_to_split: f64,
    pub lambda_l2: f64,
    pub max_bin: Option<usize>,
    pub min_data_in_bin: Option<usize>,
    /// Maximal number of trees grown for this ensemble.
    pub max_trees: Option<usize>,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            monotone_constraints: Vec::new(),
            interaction_constraints: Vec::new(),
            learning_rate: 0.1,
            max_depth: None,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            min_gain_to_split: 0.0,
            lambda_l2: 0.0,
            max_bin: None,
            min_data_in_bin: None,
            max_trees: None,
        }
    }
}

impl BoostingParams {
    /// The constraint of the `k`-th variable.
    pub fn monotonicity(&self, k: usize) -> Monotonicity {
        self.monotone_constraints.get(k)
            .copied()
            .unwrap_or_default()
    }
}

/// One entry of `rum_structure`: an ensemble and the alternatives it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilitySpec {
    /// Alternatives whose utility receives this ensemble's output.
    pub utility: Vec<usize>,
    /// Feature names used by the trees, in order.
    pub variables: Vec<String>,
    #[serde(default)]
    pub boosting_params: BoostingParams,
    #[serde(default)]
    pub shared: bool,
}

fn negative_as_none<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where D: Deserializer<'de>,
{
    let depth = Option::<i64>::deserialize(deserializer)?;
    Ok(depth.and_then(|d| usize::try_from(d).ok()).filter(|&d| d > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monotone_and_depth() {
        let json = r#"{
            "monotone_constraints_method": "advanced",
            "monotone_constraints": [1, -1, 0],
            "learning_rate": 0.05,
            "max_depth": -1,
            "min_gain_to_split": 0
        }"#;
        let params: BoostingParams = serde_json::from_str(json).unwrap();
        assert_eq!(
            params.monotone_constraints,
            vec![
                Monotonicity::Increasing,
                Monotonicity::Decreasing,
                Monotonicity::Free,
            ],
        );
        assert_eq!(params.max_depth, None);
        assert_eq!(params.min_data_in_leaf, 20);
        assert_eq!(params.monotonicity(5), Monotonicity::Free);
    }

    #[test]
    fn rejects_unknown_monotonicity() {
        let json = r#"{ "monotone_constraints": [2] }"#;
        assert!(serde_json::from_str::<BoostingParams>(json).is_err());
    }
}
