//! Gradients and hessians of the negative log-likelihood
//! with respect to the utility of one alternative.
//!
//! Let `c` be the chosen alternative of an observation and
//! `L = -ln P(c)`.
//! Each [`ChoiceObjective`] returns `dL/dV_j` and `d²L/dV_j²`.
//! Nothing here mutates shared state:
//! the utilities are read, probabilities are returned by value.
use rayon::prelude::*;

use crate::choice_model::{
    ChoiceModel,
    CrossNestStructure,
    Multinomial,
    NestStructure,
};
use crate::constants::{HESSIAN_FLOOR, PROBABILITY_CLIP};
use crate::probability::{
    self,
    CrossNestedProbabilities,
    NestedProbabilities,
};

/// First and second order derivatives for every observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientHessian {
    pub gradient: Vec<f64>,
    pub hessian: Vec<f64>,
}

/// Access to the joint choice probabilities of a model state.
pub trait ProbabilityState {
    /// `P(i)`, `n_obs x n_alternatives`.
    fn joint(&self) -> &[Vec<f64>];
}

impl ProbabilityState for Vec<Vec<f64>> {
    fn joint(&self) -> &[Vec<f64>] { &self[..] }
}

impl ProbabilityState for NestedProbabilities {
    fn joint(&self) -> &[Vec<f64>] { &self.joint[..] }
}

impl ProbabilityState for CrossNestedProbabilities {
    fn joint(&self) -> &[Vec<f64>] { &self.joint[..] }
}

/// A choice model seen as a boosting objective.
pub trait ChoiceObjective: Sync {
    /// Probabilities computed once per round and
    /// shared by every ensemble fitted in that round.
    type State: ProbabilityState + Sync;

    /// Computes the probabilities for the given utilities.
    fn probabilities(&self, utilities: &[Vec<f64>]) -> Self::State;

    /// Exact `(dL/dV_j, d²L/dV_j²)` of observation `row`
    /// whose chosen alternative is `label`.
    fn derivatives(
        &self,
        state: &Self::State,
        row: usize,
        label: usize,
        alternative: usize,
    ) -> (f64, f64);

    /// Gradient and hessian driving a tree that feeds every alternative
    /// in `alternatives`.
    /// Derivatives are summed over the alternatives,
    /// each hessian term is floored at `1e-6`.
    fn gradient_hessian(
        &self,
        state: &Self::State,
        labels: &[usize],
        alternatives: &[usize],
    ) -> GradientHessian
    {
        let (gradient, hessian): (Vec<f64>, Vec<f64>) = labels.par_iter()
            .enumerate()
            .map(|(row, &label)| {
                alternatives.iter()
                    .fold((0f64, 0f64), |(g, h), &j| {
                        let (gj, hj) = self.derivatives(state, row, label, j);
                        (g + gj, h + hj.max(HESSIAN_FLOOR))
                    })
            })
            .unzip();

        GradientHessian { gradient, hessian }
    }
}

impl ChoiceObjective for Multinomial {
    type State = Vec<Vec<f64>>;

    fn probabilities(&self, utilities: &[Vec<f64>]) -> Self::State {
        probability::softmax(utilities)
    }

    fn derivatives(
        &self,
        state: &Self::State,
        row: usize,
        label: usize,
        alternative: usize,
    ) -> (f64, f64)
    {
        let p = state[row][alternative];
        let y = if label == alternative { 1f64 } else { 0f64 };
        (p - y, p * (1.0 - p))
    }
}

impl ChoiceObjective for NestStructure {
    type State = NestedProbabilities;

    fn probabilities(&self, utilities: &[Vec<f64>]) -> Self::State {
        probability::nested(utilities, self)
    }

    fn derivatives(
        &self,
        state: &Self::State,
        row: usize,
        label: usize,
        alternative: usize,
    ) -> (f64, f64)
    {
        let j = alternative;
        let m = self.nest_alt[j];
        let chosen_nest = self.nest_alt[label];

        let p_j = state.joint[row][j];
        let p_jm = state.within[row][j];
        let p_m = state.nest[row][m];
        let mu_m = self.mu[m];

        let mut grad = p_j;
        let mut hess = p_j * ((1.0 - p_jm) / mu_m + p_jm * (1.0 - p_m));

        if m == chosen_nest {
            let chosen = if j == label { 1f64 } else { 0f64 };
            grad -= p_jm * (1.0 - 1.0 / mu_m) + chosen / mu_m;
            hess += (1.0 / mu_m - 1.0) * p_jm * (1.0 - p_jm) / mu_m;
        }

        (grad, hess)
    }
}

impl ChoiceObjective for CrossNestStructure {
    type State = CrossNestedProbabilities;

    fn probabilities(&self, utilities: &[Vec<f64>]) -> Self::State {
        probability::cross_nested(utilities, self)
    }

    fn derivatives(
        &self,
        state: &Self::State,
        row: usize,
        label: usize,
        alternative: usize,
    ) -> (f64, f64)
    {
        let j = alternative;
        let c = label;
        let within = &state.within[row];
        let nest = &state.nest[row];
        let p_j = state.joint[row][j];
        let p_c = state.joint[row][c].max(PROBABILITY_CLIP);
        let chosen = if j == c { 1f64 } else { 0f64 };

        let n_nests = self.n_nests();

        // w_m: posterior weight of nest m given the observed choice.
        let weights = (0..n_nests)
            .map(|m| nest[m] * within[c][m] / p_c)
            .collect::<Vec<_>>();
        let a = (0..n_nests)
            .map(|m| {
                let mu = self.mu[m];
                within[j][m] * (1.0 - 1.0 / mu) + chosen / mu
            })
            .collect::<Vec<_>>();
        let b = a.iter().map(|a_m| a_m - p_j).collect::<Vec<_>>();
        let b_mean = weights.iter()
            .zip(&b)
            .map(|(w, b)| w * b)
            .sum::<f64>();

        let grad = -weights.iter()
            .zip(&b)
            .map(|(w, b)| w * b)
            .sum::<f64>();

        let mut dp_j = 0f64;
        let mut curvature = 0f64;
        for m in 0..n_nests {
            let mu = self.mu[m];
            let p_jm = within[j][m];
            let dp_jm = p_jm * (1.0 - p_jm) / mu;
            dp_j += nest[m] * ((p_jm - p_j) * p_jm + dp_jm);

            let dw = weights[m] * (b[m] - b_mean);
            let da = (1.0 - 1.0 / mu) * dp_jm;
            curvature += dw * a[m] + weights[m] * da;
        }

        (grad, dp_j - curvature)
    }
}

/// Probabilities computed by a [`ChoiceModel`] for one round.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceState {
    Multinomial(Vec<Vec<f64>>),
    Nested(NestedProbabilities),
    CrossNested(CrossNestedProbabilities),
}

impl ProbabilityState for ChoiceState {
    fn joint(&self) -> &[Vec<f64>] {
        match self {
            Self::Multinomial(p) => p.joint(),
            Self::Nested(p) => p.joint(),
            Self::CrossNested(p) => p.joint(),
        }
    }
}

impl ChoiceObjective for ChoiceModel {
    type State = ChoiceState;

    fn probabilities(&self, utilities: &[Vec<f64>]) -> Self::State {
        match self {
            Self::Multinomial(m) => {
                ChoiceState::Multinomial(m.probabilities(utilities))
            },
            Self::Nested(nest) => {
                ChoiceState::Nested(nest.probabilities(utilities))
            },
            Self::CrossNested(cross) => {
                ChoiceState::CrossNested(cross.probabilities(utilities))
            },
        }
    }

    fn derivatives(
        &self,
        state: &Self::State,
        row: usize,
        label: usize,
        alternative: usize,
    ) -> (f64, f64)
    {
        match (self, state) {
            (Self::Multinomial(m), ChoiceState::Multinomial(s)) => {
                m.derivatives(s, row, label, alternative)
            },
            (Self::Nested(nest), ChoiceState::Nested(s)) => {
                nest.derivatives(s, row, label, alternative)
            },
            (Self::CrossNested(cross), ChoiceState::CrossNested(s)) => {
                cross.derivatives(s, row, label, alternative)
            },
            _ => unreachable!("probabilities come from another choice model"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    const STEP: f64 = 1e-5;
    const TOLERANCE: f64 = 1e-4;

    fn random_utilities(n: usize, k: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.5).unwrap();
        (0..n).map(|_| (0..k).map(|_| normal.sample(&mut rng)).collect())
            .collect()
    }

    fn nll<O: ChoiceObjective>(objective: &O, utilities: &[Vec<f64>], row: usize, label: usize) -> f64 {
        let state = objective.probabilities(&utilities[row..=row]);
        -state.joint()[0][label].ln()
    }

    /// Compares the analytic derivatives with central differences
    /// of the loss (gradient) and of the analytic gradient (hessian).
    fn check_derivatives<O: ChoiceObjective>(objective: &O, n_alt: usize) {
        let utilities = random_utilities(6, n_alt, 7);
        for (row, base) in utilities.iter().enumerate() {
            let label = row % n_alt;
            let state = objective.probabilities(&utilities);
            for j in 0..n_alt {
                let (grad, hess) = objective.derivatives(&state, row, label, j);

                let mut plus = utilities.clone();
                plus[row][j] = base[j] + STEP;
                let mut minus = utilities.clone();
                minus[row][j] = base[j] - STEP;

                let fd_grad = (nll(objective, &plus, row, label)
                    - nll(objective, &minus, row, label)) / (2.0 * STEP);
                assert!(
                    (grad - fd_grad).abs() < TOLERANCE,
                    "gradient: row {row}, alt {j}: {grad} vs {fd_grad}",
                );

                let g_plus = objective.derivatives(
                    &objective.probabilities(&plus), row, label, j,
                ).0;
                let g_minus = objective.derivatives(
                    &objective.probabilities(&minus), row, label, j,
                ).0;
                let fd_hess = (g_plus - g_minus) / (2.0 * STEP);
                assert!(
                    (hess - fd_hess).abs() < TOLERANCE,
                    "hessian: row {row}, alt {j}: {hess} vs {fd_hess}",
                );
            }
        }
    }

    fn singleton_nests() -> NestStructure {
        NestStructure::new(
            BTreeMap::from([(0, vec![0]), (1, vec![1]), (2, vec![2])]),
            vec![1.0; 3],
            vec![],
            3,
        ).unwrap()
    }

    #[test]
    fn multinomial_matches_finite_differences() {
        check_derivatives(&Multinomial, 4);
    }

    #[test]
    fn multinomial_known_values() {
        let state = vec![vec![0.2, 0.6, 0.2]];
        let (g, h) = Multinomial.derivatives(&state, 0, 1, 1);
        assert!((g + 0.4).abs() < 1e-12);
        assert!((h - 0.24).abs() < 1e-12);
        let (g, h) = Multinomial.derivatives(&state, 0, 1, 0);
        assert!((g - 0.2).abs() < 1e-12);
        assert!((h - 0.16).abs() < 1e-12);
    }

    #[test]
    fn nested_matches_finite_differences() {
        let nest = NestStructure::new(
            BTreeMap::from([(0, vec![0, 1]), (1, vec![2, 3])]),
            vec![0.6, 0.85],
            vec![],
            4,
        ).unwrap();
        check_derivatives(&nest, 4);
    }

    #[test]
    fn cross_nested_matches_finite_differences() {
        let cross = CrossNestStructure::new(
            vec![
                vec![0.5, 0.5],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.3, 0.7],
            ],
            vec![0.7, 0.9],
            vec![],
            vec![],
            4,
        ).unwrap();
        check_derivatives(&cross, 4);
    }

    #[test]
    fn nested_reduces_to_multinomial() {
        let utilities = random_utilities(10, 3, 11);
        let nest = singleton_nests();
        let labels = (0..10).map(|i| i % 3).collect::<Vec<_>>();

        let mnl_state = Multinomial.probabilities(&utilities);
        let nl_state = nest.probabilities(&utilities);
        for j in 0..3 {
            let a = Multinomial.gradient_hessian(&mnl_state, &labels, &[j]);
            let b = nest.gradient_hessian(&nl_state, &labels, &[j]);
            for (x, y) in a.gradient.iter().zip(&b.gradient) {
                assert!((x - y).abs() < 1e-12);
            }
            for (x, y) in a.hessian.iter().zip(&b.hessian) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn cross_nested_reduces_to_nested() {
        let utilities = random_utilities(10, 3, 13);
        let labels = (0..10).map(|i| (i * 2) % 3).collect::<Vec<_>>();
        let nest = NestStructure::new(
            BTreeMap::from([(0, vec![0, 2]), (1, vec![1])]),
            vec![0.5, 0.75],
            vec![],
            3,
        ).unwrap();
        let cross = CrossNestStructure::new(
            nest.indicator_alphas(), vec![0.5, 0.75], vec![], vec![], 3,
        ).unwrap();

        let nl_state = nest.probabilities(&utilities);
        let cnl_state = cross.probabilities(&utilities);
        for row in 0..10 {
            for j in 0..3 {
                let (g1, h1) = nest.derivatives(&nl_state, row, labels[row], j);
                let (g2, h2) = cross.derivatives(&cnl_state, row, labels[row], j);
                assert!((g1 - g2).abs() < 1e-9, "gradient {g1} vs {g2}");
                assert!((h1 - h2).abs() < 1e-9, "hessian {h1} vs {h2}");
            }
        }
    }

    #[test]
    fn cross_nested_reduces_to_multinomial() {
        let utilities = random_utilities(8, 3, 17);
        let labels = (0..8).map(|i| i % 3).collect::<Vec<_>>();
        let identity = (0..3)
            .map(|i| (0..3).map(|m| if i == m { 1.0 } else { 0.0 }).collect())
            .collect();
        let cross = CrossNestStructure::new(identity, vec![1.0; 3], vec![], vec![], 3)
            .unwrap();

        let mnl_state = Multinomial.probabilities(&utilities);
        let cnl_state = cross.probabilities(&utilities);
        for row in 0..8 {
            for j in 0..3 {
                let (g1, h1) = Multinomial.derivatives(&mnl_state, row, labels[row], j);
                let (g2, h2) = cross.derivatives(&cnl_state, row, labels[row], j);
                assert!((g1 - g2).abs() < 1e-9);
                assert!((h1 - h2).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn shared_alternatives_sum_their_derivatives() {
        let utilities = random_utilities(5, 3, 19);
        let labels = vec![0, 1, 2, 1, 0];
        let state = Multinomial.probabilities(&utilities);

        let shared = Multinomial.gradient_hessian(&state, &labels, &[0, 1, 2]);
        let parts = (0..3)
            .map(|j| Multinomial.gradient_hessian(&state, &labels, &[j]))
            .collect::<Vec<_>>();
        for row in 0..5 {
            let g = parts.iter().map(|p| p.gradient[row]).sum::<f64>();
            let h = parts.iter().map(|p| p.hessian[row]).sum::<f64>();
            assert!((shared.gradient[row] - g).abs() < 1e-12);
            assert!((shared.hessian[row] - h).abs() < 1e-12);
            // Softmax gradients cancel over all alternatives.
            assert!(shared.gradient[row].abs() < 1e-12);
        }
    }

    #[test]
    fn hessian_is_floored() {
        let utilities = vec![vec![50.0, -50.0]];
        let state = Multinomial.probabilities(&utilities);
        let gh = Multinomial.gradient_hessian(&state, &[0], &[1]);
        assert_eq!(gh.hessian[0], HESSIAN_FLOOR);
    }

    #[test]
    fn choice_model_dispatches_to_variant() {
        let utilities = random_utilities(4, 3, 23);
        let labels = vec![0, 1, 2, 0];
        let nest = singleton_nests();
        let model = ChoiceModel::Nested(nest.clone());

        let a = model.gradient_hessian(&model.probabilities(&utilities), &labels, &[2]);
        let b = nest.gradient_hessian(&nest.probabilities(&utilities), &labels, &[2]);
        assert_eq!(a, b);
    }
}
