use fixedbitset::FixedBitSet;

use super::bins::Bins;
use super::rtree::RegressionTree;
use crate::config::{BoostingParams, Monotonicity};
use crate::error::ConfigError;
use crate::Sample;

/// The number of bins set as default.
pub const DEFAULT_MAX_BIN: usize = 255;
/// The minimal number of rows per bin set as default.
pub const DEFAULT_MIN_DATA_IN_BIN: usize = 3;

/// A struct that builds [`RegressionTree`].
/// The bins are computed once, from the features of `sample`,
/// and every tree produced afterwards splits on those features.
///
/// # Example
///
/// ```no_run
/// use rumboost::prelude::*;
/// # fn run(sample: &Sample) -> rumboost::Result<()> {
/// let tree = RegressionTreeBuilder::new(sample)
///     .max_depth(Some(1))
///     .min_data_in_leaf(1)
///     .monotone_constraints(vec![Monotonicity::Increasing, Monotonicity::Free])
///     .interaction_constraints(vec![vec![0], vec![1]])
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RegressionTreeBuilder<'a> {
    sample: &'a Sample,
    max_bin: usize,
    min_data_in_bin: usize,
    max_depth: Option<usize>,
    min_data_in_leaf: usize,
    min_sum_hessian_in_leaf: f64,
    min_gain_to_split: f64,
    lambda_l2: f64,
    monotone_constraints: Vec<Monotonicity>,
    interaction_constraints: Vec<Vec<usize>>,
}

impl<'a> RegressionTreeBuilder<'a> {
    /// Construct a new instance of `RegressionTreeBuilder`
    /// with the defaults of [`BoostingParams`],
    /// at most `DEFAULT_MAX_BIN` bins
    /// and `DEFAULT_MIN_DATA_IN_BIN` rows per bin.
    pub fn new(sample: &'a Sample) -> Self {
        let params = BoostingParams::default();
        Self {
            sample,
            max_bin: DEFAULT_MAX_BIN,
            min_data_in_bin: DEFAULT_MIN_DATA_IN_BIN,
            max_depth: params.max_depth,
            min_data_in_leaf: params.min_data_in_leaf,
            min_sum_hessian_in_leaf: params.min_sum_hessian_in_leaf,
            min_gain_to_split: params.min_gain_to_split,
            lambda_l2: params.lambda_l2,
            monotone_constraints: params.monotone_constraints,
            interaction_constraints: params.interaction_constraints,
        }
    }

    /// Copy the tree parameters of one ensemble.
    /// The per-ensemble bin settings override the current ones when set.
    pub fn boosting_params(mut self, params: &BoostingParams) -> Self {
        self.max_depth = params.max_depth;
        self.min_data_in_leaf = params.min_data_in_leaf;
        self.min_sum_hessian_in_leaf = params.min_sum_hessian_in_leaf;
        self.min_gain_to_split = params.min_gain_to_split;
        self.lambda_l2 = params.lambda_l2;
        self.monotone_constraints = params.monotone_constraints.clone();
        self.interaction_constraints = params.interaction_constraints.clone();
        if let Some(max_bin) = params.max_bin {
            self.max_bin = max_bin;
        }
        if let Some(min_data_in_bin) = params.min_data_in_bin {
            self.min_data_in_bin = min_data_in_bin;
        }
        self
    }

    pub fn max_bin(mut self, max_bin: usize) -> Self {
        self.max_bin = max_bin;
        self
    }

    pub fn min_data_in_bin(mut self, min_data_in_bin: usize) -> Self {
        self.min_data_in_bin = min_data_in_bin;
        self
    }

    /// Specify the maximal depth of the tree. `None` means unbounded.
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn min_data_in_leaf(mut self, min_data_in_leaf: usize) -> Self {
        self.min_data_in_leaf = min_data_in_leaf;
        self
    }

    pub fn min_sum_hessian_in_leaf(mut self, min_sum_hessian: f64) -> Self {
        self.min_sum_hessian_in_leaf = min_sum_hessian;
        self
    }

    pub fn min_gain_to_split(mut self, min_gain: f64) -> Self {
        self.min_gain_to_split = min_gain;
        self
    }

    /// Set the L2-regularization parameter.
    pub fn lambda_l2(mut self, lambda_l2: f64) -> Self {
        self.lambda_l2 = lambda_l2;
        self
    }

    /// One constraint per feature of `sample`, in order.
    /// An empty vector leaves every feature free.
    pub fn monotone_constraints(mut self, constraints: Vec<Monotonicity>) -> Self {
        self.monotone_constraints = constraints;
        self
    }

    /// Groups of feature indices allowed to interact.
    /// An empty vector allows every interaction.
    pub fn interaction_constraints(mut self, groups: Vec<Vec<usize>>) -> Self {
        self.interaction_constraints = groups;
        self
    }

    /// Build a `RegressionTree`.
    /// This method consumes `self`.
    pub fn build(self) -> Result<RegressionTree, ConfigError> {
        let n_feature = self.sample.shape().1;
        // Missing trailing constraints are free.
        if self.monotone_constraints.len() > n_feature {
            return Err(ConfigError::DimensionMismatch {
                what: "monotone_constraints",
                expected: n_feature,
                got: self.monotone_constraints.len(),
            });
        }
        let mut monotone = self.monotone_constraints;
        monotone.resize(n_feature, Monotonicity::Free);

        let groups = self.interaction_constraints.iter()
            .map(|group| {
                let mut set = FixedBitSet::with_capacity(n_feature);
                for &k in group {
                    if k >= n_feature {
                        return Err(ConfigError::InvalidParameter {
                            name: "interaction_constraints",
                            reason: format!(
                                "feature index {k} is out of range ({n_feature} features)"
                            ),
                        });
                    }
                    set.insert(k);
                }
                Ok(set)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (names, bins) = self.sample.features()
            .iter()
            .map(|feature| {
                let bins = Bins::cut(feature, self.max_bin, self.min_data_in_bin);
                (feature.name().to_string(), bins)
            })
            .unzip();

        Ok(RegressionTree::from_components(
            names,
            bins,
            monotone,
            groups,
            self.max_depth,
            self.min_data_in_leaf,
            self.min_sum_hessian_in_leaf,
            self.min_gain_to_split,
            self.lambda_l2,
        ))
    }
}
