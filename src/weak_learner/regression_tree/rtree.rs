use fixedbitset::FixedBitSet;
use rayon::prelude::*;

use std::fmt;

use super::bins::{Bins, BinStat};
use super::node::{Node, Splitter, LeftRight};
use super::regressor::RegressionTreeRegressor;
use crate::config::Monotonicity;
use crate::error::FitError;
use crate::{Feature, Sample, WeakLearner};

/// Output bounds of a node, tightened along monotone splits.
type Bounds = (f64, f64);

const UNBOUNDED: Bounds = (f64::NEG_INFINITY, f64::INFINITY);

/// A second-order histogram regression tree.
///
/// Given the gradient `g` and hessian `h` of the loss,
/// each node predicts the Newton step `-G / (H + λ)`
/// and a split is scored by the XGBoost gain
/// ```text
/// G_L² / (H_L + λ) + G_R² / (H_R + λ) - G² / (H + λ).
/// ```
/// Monotone constraints restrict the admissible splits
/// and bound the outputs of the subtrees
/// by the midpoint of the two children.
/// Interaction constraints restrict the features of a branch
/// to a single constraint group.
///
/// Build it with
/// [`RegressionTreeBuilder`](super::builder::RegressionTreeBuilder).
/// ```no_run
/// use rumboost::prelude::*;
/// # fn run(sample: &Sample, gradient: &[f64], hessian: &[f64]) -> rumboost::Result<()> {
/// let tree = RegressionTreeBuilder::new(sample)
///     .max_depth(Some(3))
///     .min_data_in_leaf(5)
///     .build()?;
///
/// let rows = (0..sample.shape().0).collect::<Vec<_>>();
/// let f = tree.produce(sample, gradient, hessian, &rows)
///     .expect("tree fitting failed");
/// let predictions = f.predict_all(sample);
/// # Ok(())
/// # }
/// ```
pub struct RegressionTree {
    names: Vec<String>,
    bins: Vec<Bins>,
    monotone: Vec<Monotonicity>,
    // Empty when there is no interaction constraint.
    groups: Vec<FixedBitSet>,
    max_depth: Option<usize>,
    min_data_in_leaf: usize,
    min_sum_hessian_in_leaf: f64,
    min_gain_to_split: f64,
    lambda_l2: f64,
}

/// The best split found for one feature.
#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    bin: usize,
    gain: f64,
    left: f64,
    right: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeStat {
    grad: f64,
    hess: f64,
    count: usize,
}

impl NodeStat {
    fn of(rows: &[usize], gradient: &[f64], hessian: &[f64]) -> Self {
        let grad = rows.iter().map(|&i| gradient[i]).sum::<f64>();
        let hess = rows.iter().map(|&i| hessian[i]).sum::<f64>();
        Self { grad, hess, count: rows.len() }
    }

    fn add(&mut self, stat: &BinStat) {
        self.grad += stat.grad;
        self.hess += stat.hess;
        self.count += stat.count;
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

impl RegressionTree {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_components(
        names: Vec<String>,
        bins: Vec<Bins>,
        monotone: Vec<Monotonicity>,
        groups: Vec<FixedBitSet>,
        max_depth: Option<usize>,
        min_data_in_leaf: usize,
        min_sum_hessian_in_leaf: f64,
        min_gain_to_split: f64,
        lambda_l2: f64,
    ) -> Self
    {
        Self {
            names,
            bins,
            monotone,
            groups,
            max_depth,
            min_data_in_leaf,
            min_sum_hessian_in_leaf,
            min_gain_to_split,
            lambda_l2,
        }
    }

    /// Names of the features the tree splits on.
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    /// Bins of the `k`-th feature.
    pub fn bins(&self, k: usize) -> &Bins {
        &self.bins[k]
    }

    fn leaf_value(&self, stat: &NodeStat, (lo, hi): Bounds) -> f64 {
        let denom = stat.hess + self.lambda_l2;
        let value = if denom > 0.0 { -stat.grad / denom } else { 0.0 };
        value.clamp(lo, hi)
    }

    /// Second-order approximation of the loss when predicting `value`.
    fn objective(&self, stat: &NodeStat, value: f64) -> f64 {
        stat.grad * value + 0.5 * (stat.hess + self.lambda_l2) * value * value
    }

    /// Features a node may split on,
    /// given the features already used by its ancestors.
    fn allowed_features(&self, used: &FixedBitSet) -> FixedBitSet {
        let n_feature = self.names.len();
        if self.groups.is_empty() {
            let mut all = FixedBitSet::with_capacity(n_feature);
            all.insert_range(..);
            return all;
        }
        let mut allowed = FixedBitSet::with_capacity(n_feature);
        self.groups.iter()
            .filter(|group| used.is_subset(group))
            .for_each(|group| allowed.union_with(group));
        allowed
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        sample: &Sample,
        features: &[&Feature],
        gradient: &[f64],
        hessian: &[f64],
        rows: Vec<usize>,
        depth: usize,
        bounds: Bounds,
        used: FixedBitSet,
    ) -> Box<Node>
    {
        let stat = NodeStat::of(&rows, gradient, hessian);
        let value = self.leaf_value(&stat, bounds);

        let depth_reached = self.max_depth.is_some_and(|max| depth >= max);
        if depth_reached || rows.len() < 2 * self.min_data_in_leaf {
            return Box::new(Node::leaf(value));
        }

        let allowed = self.allowed_features(&used);
        let Some(split) = self.best_split(
            features, gradient, hessian, &rows, &stat, value, bounds, &allowed,
        ) else {
            return Box::new(Node::leaf(value));
        };

        let threshold = self.bins[split.feature].bins()[split.bin].end();
        let rule = Splitter::new(&self.names[split.feature], threshold);

        let mut lrows = Vec::new();
        let mut rrows = Vec::new();
        for i in rows {
            match rule.split(sample, i) {
                LeftRight::Left  => { lrows.push(i); },
                LeftRight::Right => { rrows.push(i); },
            }
        }
        if lrows.is_empty() || rrows.is_empty() {
            return Box::new(Node::leaf(value));
        }

        let (lbounds, rbounds) = child_bounds(
            self.monotone[split.feature], bounds, split.left, split.right,
        );
        let mut used = used;
        used.insert(split.feature);

        let ltree = self.grow(
            sample, features, gradient, hessian, lrows, depth + 1, lbounds, used.clone(),
        );
        let rtree = self.grow(
            sample, features, gradient, hessian, rrows, depth + 1, rbounds, used,
        );

        Box::new(Node::branch(rule, ltree, rtree, value))
    }

    /// Returns the split of maximal gain over the allowed features.
    /// Ties go to the lowest feature index, then to the lowest bin.
    #[allow(clippy::too_many_arguments)]
    fn best_split(
        &self,
        features: &[&Feature],
        gradient: &[f64],
        hessian: &[f64],
        rows: &[usize],
        parent: &NodeStat,
        parent_value: f64,
        bounds: Bounds,
        allowed: &FixedBitSet,
    ) -> Option<Split>
    {
        let candidates = allowed.ones().collect::<Vec<_>>();
        let parent_objective = self.objective(parent, parent_value);
        candidates.into_par_iter()
            .filter_map(|k| {
                let pack = self.bins[k].pack(rows, features[k], gradient, hessian);
                self.best_split_at(k, &pack, parent, parent_objective, bounds)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .fold(None, |best: Option<Split>, split| {
                match best {
                    Some(b) if b.gain >= split.gain => Some(b),
                    _ => Some(split),
                }
            })
    }

    /// Scan the bins of feature `k` from left to right.
    fn best_split_at(
        &self,
        k: usize,
        pack: &[BinStat],
        parent: &NodeStat,
        parent_objective: f64,
        bounds: Bounds,
    ) -> Option<Split>
    {
        let monotone = self.monotone[k];
        let mut left = NodeStat::default();
        let mut best: Option<Split> = None;

        // The right-most bin cannot be a left child alone.
        for (bin, stat) in pack.iter().enumerate().take(pack.len().saturating_sub(1)) {
            left.add(stat);
            let right = parent.minus(&left);

            if left.count < self.min_data_in_leaf || right.count < self.min_data_in_leaf {
                continue;
            }
            if left.hess < self.min_sum_hessian_in_leaf
                || right.hess < self.min_sum_hessian_in_leaf
            {
                continue;
            }

            let lvalue = self.leaf_value(&left, bounds);
            let rvalue = self.leaf_value(&right, bounds);
            let violates = match monotone {
                Monotonicity::Increasing => lvalue > rvalue,
                Monotonicity::Decreasing => lvalue < rvalue,
                Monotonicity::Free => false,
            };
            if violates {
                continue;
            }

            let gain = 2.0 * (
                parent_objective
                - self.objective(&left, lvalue)
                - self.objective(&right, rvalue)
            );
            if !(gain > self.min_gain_to_split) {
                continue;
            }
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Split { feature: k, bin, gain, left: lvalue, right: rvalue });
            }
        }
        best
    }
}

/// Bounds of the children of a split on a feature with constraint `monotone`.
fn child_bounds(
    monotone: Monotonicity,
    (lo, hi): Bounds,
    left: f64,
    right: f64,
) -> (Bounds, Bounds)
{
    let mid = 0.5 * (left + right);
    match monotone {
        Monotonicity::Increasing => ((lo, hi.min(mid)), (lo.max(mid), hi)),
        Monotonicity::Decreasing => ((lo.max(mid), hi), (lo, hi.min(mid))),
        Monotonicity::Free => ((lo, hi), (lo, hi)),
    }
}

impl WeakLearner for RegressionTree {
    type Hypothesis = RegressionTreeRegressor;

    fn name(&self) -> &str {
        "Regression Tree"
    }

    fn info(&self) -> Option<Vec<(&str, String)>> {
        let n_bins = self.bins.iter()
            .map(Bins::len)
            .max()
            .unwrap_or(0);
        let max_depth = self.max_depth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "Unbounded".into());
        let info = Vec::from([
            ("# of features", format!("{}", self.names.len())),
            ("# of bins (max)", format!("{n_bins}")),
            ("Max depth", max_depth),
            ("Min data in leaf", format!("{}", self.min_data_in_leaf)),
            ("Regularization param.", format!("{}", self.lambda_l2)),
        ]);
        Some(info)
    }

    fn produce(
        &self,
        sample: &Sample,
        gradient: &[f64],
        hessian: &[f64],
        rows: &[usize],
    ) -> Result<Self::Hypothesis, FitError>
    {
        if gradient.len() != hessian.len() {
            return Err(FitError::LengthMismatch {
                gradient: gradient.len(),
                hessian: hessian.len(),
            });
        }
        if rows.is_empty() {
            return Err(FitError::EmptyRows);
        }
        if let Some(&row) = rows.iter()
            .find(|&&i| !(gradient[i].is_finite() && hessian[i].is_finite()))
        {
            return Err(FitError::NonFinite { row });
        }

        let features = self.names.iter()
            .map(|name| {
                sample.feature(name)
                    .ok_or_else(|| FitError::UnknownFeature(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let used = FixedBitSet::with_capacity(self.names.len());
        let root = self.grow(
            sample,
            &features,
            gradient,
            hessian,
            rows.to_vec(),
            0,
            UNBOUNDED,
            used,
        );
        Ok(RegressionTreeRegressor::from(root))
    }
}

impl fmt::Display for RegressionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_depth = self.max_depth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unbounded".into());
        writeln!(
            f,
            "\
            ----------\n\
            # Regression Tree Weak Learner\n\n\
            - Max depth: {max_depth}\n\
            - Min data in leaf: {}\n\
            - Bins:\
            ",
            self.min_data_in_leaf,
        )?;

        let width = self.names.iter()
            .map(String::len)
            .max()
            .unwrap_or(0);
        for (name, bins) in self.names.iter().zip(&self.bins) {
            let n_bins = bins.len();
            writeln!(f, "\t* [{name: <width$} | {n_bins: >3} bins]  {bins}")?;
        }
        write!(f, "----------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weak_learner::RegressionTreeBuilder;
    use crate::Regressor;

    fn sample() -> Sample {
        Sample::from_columns([
            ("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ("z", vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0]),
        ]).unwrap()
    }

    fn all_rows(sample: &Sample) -> Vec<usize> {
        (0..sample.shape().0).collect()
    }

    #[test]
    fn stump_recovers_a_step() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(Some(1))
            .min_data_in_leaf(1)
            .min_data_in_bin(1)
            .build()
            .unwrap();
        // Newton steps: -1 on x < 3.5, +2 on x >= 3.5.
        let gradient = [1.0, 1.0, 1.0, -2.0, -2.0, -2.0];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();

        assert_eq!(f.depth(), 1);
        assert_eq!(f.predict_all(&sample), vec![-1.0, -1.0, -1.0, 2.0, 2.0, 2.0]);
        // `x` and `z` split equally well; the first feature wins.
        assert_eq!(f.root().split_features(), vec!["x"]);
    }

    #[test]
    fn leaf_value_uses_l2_regularization() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(Some(0))
            .lambda_l2(2.0)
            .build()
            .unwrap();
        let gradient = [1.0; 6];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();
        assert_eq!(f.n_leaves(), 1);
        assert!((f.predict(&sample, 0) + 6.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn min_data_in_leaf_blocks_small_children() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(Some(1))
            .min_data_in_leaf(4)
            .min_data_in_bin(1)
            .build()
            .unwrap();
        let gradient = [1.0, 1.0, 1.0, -2.0, -2.0, -2.0];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();
        assert_eq!(f.n_leaves(), 1);
    }

    #[test]
    fn monotone_constraint_is_respected() {
        let sample = Sample::from_columns([
            ("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        ]).unwrap();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(None)
            .min_data_in_leaf(1)
            .min_data_in_bin(1)
            .monotone_constraints(vec![Monotonicity::Increasing])
            .build()
            .unwrap();
        // Newton steps 1, 3, 2, 4, 3, 5 are not monotone in `x`.
        let gradient = [-1.0, -3.0, -2.0, -4.0, -3.0, -5.0];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();

        let preds = f.predict_all(&sample);
        assert!(preds.windows(2).all(|w| w[0] <= w[1] + 1e-12), "{preds:?}");
        assert!(preds[5] > preds[0]);
    }

    #[test]
    fn violating_feature_is_never_split() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(None)
            .min_data_in_leaf(1)
            .min_data_in_bin(1)
            .monotone_constraints(vec![Monotonicity::Increasing, Monotonicity::Free])
            .build()
            .unwrap();
        // The Newton steps decrease with `x`.
        let gradient = [-3.0, -2.0, -1.0, 1.0, 2.0, 3.0];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();

        let used = f.root().split_features();
        assert!(!used.is_empty());
        assert!(used.iter().all(|&name| name == "z"), "{used:?}");
    }

    #[test]
    fn interaction_constraints_limit_features() {
        let sample = Sample::from_columns([
            ("a", vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]),
            ("b", vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]),
            ("c", vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]),
        ]).unwrap();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(Some(2))
            .min_data_in_leaf(1)
            .min_data_in_bin(1)
            .interaction_constraints(vec![vec![0], vec![1]])
            .build()
            .unwrap();
        let gradient = [-4.0, -3.0, 1.0, 2.0, -2.0, -1.0, 3.0, 4.0];
        let hessian = [1.0; 8];
        let f = tree.produce(&sample, &gradient, &hessian, &all_rows(&sample))
            .unwrap();

        let used = f.root().split_features();
        assert!(!used.is_empty());
        // `c` belongs to no group and a branch never mixes `a` and `b`.
        assert!(!used.contains(&"c"));
        let first = used[0];
        assert!(used.iter().all(|&name| name == first), "{used:?}");
    }

    #[test]
    fn rejects_bad_inputs() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample).build().unwrap();
        let rows = all_rows(&sample);
        let hessian = [1.0; 6];

        let err = tree.produce(&sample, &[0.0; 5], &hessian, &rows).unwrap_err();
        assert_eq!(err, FitError::LengthMismatch { gradient: 5, hessian: 6 });

        let err = tree.produce(&sample, &[0.0; 6], &hessian, &[]).unwrap_err();
        assert_eq!(err, FitError::EmptyRows);

        let mut gradient = [0.0; 6];
        gradient[4] = f64::NAN;
        let err = tree.produce(&sample, &gradient, &hessian, &rows).unwrap_err();
        assert_eq!(err, FitError::NonFinite { row: 4 });

        let other = Sample::from_columns([("x", vec![0.0; 6])]).unwrap();
        let err = tree.produce(&other, &[0.0; 6], &hessian, &rows).unwrap_err();
        assert_eq!(err, FitError::UnknownFeature("z".into()));
    }

    #[test]
    fn fits_on_the_given_rows_only() {
        let sample = sample();
        let tree = RegressionTreeBuilder::new(&sample)
            .max_depth(Some(0))
            .build()
            .unwrap();
        let gradient = [1.0, 1.0, 1.0, 100.0, 100.0, 100.0];
        let hessian = [1.0; 6];
        let f = tree.produce(&sample, &gradient, &hessian, &[0, 1, 2]).unwrap();
        assert!((f.predict(&sample, 5) + 1.0).abs() < 1e-12);
    }
}
