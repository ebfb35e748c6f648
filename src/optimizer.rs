//! Refits the structural parameters (`mu`, `alphas`) of a nested or
//! cross-nested logit model with the tree utilities held fixed.
//!
//! The optimizer is a projected gradient ascent on the mean
//! log-likelihood. The gradient is approximated by finite differences
//! and each step is chosen by Armijo backtracking.
use crate::choice_model::{CrossNestStructure, NestStructure};
use crate::constants::{
    ARMIJO_C,
    DEFAULT_MAX_OPTIM_ITER,
    DEFAULT_MU_BOUNDS,
    DEFAULT_OPTIM_TOLERANCE,
    FD_STEP,
    MIN_LINE_STEP,
    PROBABILITY_CLIP,
};
use crate::error::OptimizerError;
use crate::objective::{ChoiceObjective, ProbabilityState};

const MAX_LINE_STEP: f64 = 1e3;
const RELATIVE_GAIN: f64 = 1e-2;

/// A choice model whose flagged parameters can be refitted.
pub trait StructuralParameters: ChoiceObjective + Sized {
    /// The flagged parameters, `mu` first then `alphas` row by row.
    fn free_parameters(&self) -> Vec<f64>;

    /// Returns a copy of `self` with the flagged parameters replaced.
    /// No invariant is checked here; see [`StructuralParameters::project`].
    fn with_free_parameters(&self, values: &[f64]) -> Self;

    /// Lower bound of each free parameter.
    fn lower_bounds(&self, mu_bounds: (f64, f64)) -> Vec<f64>;

    /// Projects `values` onto the feasible set:
    /// `mu` is clamped into `mu_bounds`, the free alphas of each row
    /// are put on the simplex scaled to what the fixed entries leave.
    fn project(&self, values: &[f64], mu_bounds: (f64, f64)) -> Vec<f64>;
}

impl StructuralParameters for NestStructure {
    fn free_parameters(&self) -> Vec<f64> {
        free_mu(&self.mu, &self.optimise_mu)
    }

    fn with_free_parameters(&self, values: &[f64]) -> Self {
        let mut structure = self.clone();
        replace_mu(&mut structure.mu, &self.optimise_mu, values);
        structure
    }

    fn lower_bounds(&self, mu_bounds: (f64, f64)) -> Vec<f64> {
        vec![mu_bounds.0; self.free_parameters().len()]
    }

    fn project(&self, values: &[f64], mu_bounds: (f64, f64)) -> Vec<f64> {
        values.iter()
            .map(|v| v.clamp(mu_bounds.0, mu_bounds.1))
            .collect()
    }
}

impl StructuralParameters for CrossNestStructure {
    fn free_parameters(&self) -> Vec<f64> {
        let mut values = free_mu(&self.mu, &self.optimise_mu);
        self.alphas.iter()
            .zip(&self.optimise_alphas)
            .for_each(|(row, flags)| {
                row.iter()
                    .zip(flags)
                    .filter(|(_, &flag)| flag)
                    .for_each(|(&a, _)| values.push(a));
            });
        values
    }

    fn with_free_parameters(&self, values: &[f64]) -> Self {
        let mut structure = self.clone();
        let n_mu = replace_mu(&mut structure.mu, &self.optimise_mu, values);

        let mut rest = values[n_mu..].iter();
        structure.alphas.iter_mut()
            .zip(&self.optimise_alphas)
            .for_each(|(row, flags)| {
                row.iter_mut()
                    .zip(flags)
                    .filter(|(_, &flag)| flag)
                    .for_each(|(a, _)| {
                        if let Some(&v) = rest.next() { *a = v; }
                    });
            });
        structure
    }

    fn lower_bounds(&self, mu_bounds: (f64, f64)) -> Vec<f64> {
        let n_mu = self.optimise_mu.iter().filter(|&&f| f).count();
        let n_alpha = self.optimise_alphas.iter()
            .flatten()
            .filter(|&&f| f)
            .count();
        let mut bounds = vec![mu_bounds.0; n_mu];
        bounds.extend(std::iter::repeat(0f64).take(n_alpha));
        bounds
    }

    fn project(&self, values: &[f64], mu_bounds: (f64, f64)) -> Vec<f64> {
        let n_mu = self.optimise_mu.iter().filter(|&&f| f).count();
        let mut projected = values[..n_mu].iter()
            .map(|v| v.clamp(mu_bounds.0, mu_bounds.1))
            .collect::<Vec<_>>();

        let mut offset = n_mu;
        for (row, flags) in self.alphas.iter().zip(&self.optimise_alphas) {
            let n_free = flags.iter().filter(|&&f| f).count();
            if n_free == 0 { continue; }

            let fixed = row.iter()
                .zip(flags)
                .filter(|(_, &flag)| !flag)
                .map(|(a, _)| a)
                .sum::<f64>();
            let mass = (1.0 - fixed).max(0.0);
            let free = &values[offset..offset + n_free];
            projected.extend(project_onto_simplex(free, mass));
            offset += n_free;
        }
        projected
    }
}

fn free_mu(mu: &[f64], flags: &[bool]) -> Vec<f64> {
    mu.iter()
        .zip(flags)
        .filter(|(_, &flag)| flag)
        .map(|(&m, _)| m)
        .collect()
}

/// Writes the leading values into the flagged `mu` entries.
/// Returns the number of values consumed.
fn replace_mu(mu: &mut [f64], flags: &[bool], values: &[f64]) -> usize {
    let mut consumed = 0;
    mu.iter_mut()
        .zip(flags)
        .filter(|(_, &flag)| flag)
        .for_each(|(m, _)| {
            *m = values[consumed];
            consumed += 1;
        });
    consumed
}

/// Euclidean projection of `v` onto `{x >= 0, Σ x = mass}`.
pub(crate) fn project_onto_simplex(v: &[f64], mass: f64) -> Vec<f64> {
    let n = v.len();
    if n == 0 { return Vec::new(); }

    let mut ix = (0..n).collect::<Vec<usize>>();
    ix.sort_by(|&i, &j| v[j].total_cmp(&v[i]));

    let mut cumsum = 0f64;
    let mut theta = 0f64;
    for (k, &i) in ix.iter().enumerate() {
        cumsum += v[i];
        let t = (cumsum - mass) / (k + 1) as f64;
        if v[i] - t > 0.0 {
            theta = t;
        }
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Projected gradient ascent on the mean log-likelihood.
///
/// # Example
/// ```no_run
/// use rumboost::prelude::*;
///
/// let optimizer = ProjectedGradient::new()
///     .mu_bounds((0.05, 1.0))
///     .max_iter(50)
///     .tolerance(1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGradient {
    mu_bounds: (f64, f64),
    max_iter: usize,
    tolerance: f64,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectedGradient {
    /// Construct a new instance with
    /// `mu_bounds = (0.05, 1.0)`, `max_iter = 100` and `tolerance = 1e-6`.
    pub fn new() -> Self {
        Self {
            mu_bounds: DEFAULT_MU_BOUNDS,
            max_iter: DEFAULT_MAX_OPTIM_ITER,
            tolerance: DEFAULT_OPTIM_TOLERANCE,
        }
    }

    pub fn mu_bounds(mut self, bounds: (f64, f64)) -> Self {
        self.mu_bounds = bounds;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// `P(x + step * grad) - x`.
    fn projected_step<S>(&self, structure: &S, x: &[f64], grad: &[f64], step: f64)
        -> Vec<f64>
        where S: StructuralParameters,
    {
        let trial = x.iter()
            .zip(grad)
            .map(|(xi, gi)| xi + step * gi)
            .collect::<Vec<_>>();
        structure.project(&trial, self.mu_bounds)
            .into_iter()
            .zip(x)
            .map(|(t, xi)| t - xi)
            .collect()
    }

    /// Maximizes the log-likelihood of `labels` over the free
    /// parameters of `structure`, with `utilities` fixed.
    /// Returns the refitted structure.
    pub fn maximize<S>(
        &self,
        structure: &S,
        utilities: &[Vec<f64>],
        labels: &[usize],
    ) -> Result<S, OptimizerError>
        where S: StructuralParameters,
    {
        let lower = structure.lower_bounds(self.mu_bounds);
        let mut x = structure.project(&structure.free_parameters(), self.mu_bounds);
        if x.is_empty() {
            return Ok(structure.with_free_parameters(&x));
        }

        let objective = |values: &[f64]| {
            let candidate = structure.with_free_parameters(values);
            mean_log_likelihood(&candidate, utilities, labels)
        };

        let mut fx = objective(&x);
        if !fx.is_finite() {
            return Err(OptimizerError::NonFinite);
        }

        let mut step_norm = f64::INFINITY;
        let mut step = 1f64;
        for _ in 0..self.max_iter {
            let grad = finite_difference(&objective, &x, &lower, fx);
            if grad.iter().any(|g| !g.is_finite()) {
                return Err(OptimizerError::NonFinite);
            }

            // Stationary under projection.
            let unit = self.projected_step(structure, &x, &grad, 1.0);
            if sup_norm(&unit) < self.tolerance {
                return Ok(structure.with_free_parameters(&x));
            }

            step = (2.0 * step).min(MAX_LINE_STEP);
            let accepted = loop {
                let direction = self.projected_step(structure, &x, &grad, step);
                let trial = x.iter()
                    .zip(&direction)
                    .map(|(xi, d)| xi + d)
                    .collect::<Vec<_>>();

                let f_trial = objective(&trial);
                let ascent = grad.iter()
                    .zip(&direction)
                    .map(|(g, d)| g * d)
                    .sum::<f64>();
                if f_trial.is_finite() && f_trial >= fx + ARMIJO_C * ascent {
                    step_norm = sup_norm(&direction);
                    break Some((trial, f_trial));
                }

                step *= 0.5;
                if step < MIN_LINE_STEP {
                    break None;
                }
            };

            let Some((trial, f_trial)) = accepted else {
                return Ok(structure.with_free_parameters(&x));
            };

            let gain = f_trial - fx;
            x = trial;
            fx = f_trial;
            if step_norm < self.tolerance
                || gain <= RELATIVE_GAIN * self.tolerance * (1.0 + fx.abs())
            {
                return Ok(structure.with_free_parameters(&x));
            }
        }

        Err(OptimizerError::NonConvergence {
            iterations: self.max_iter,
            step_norm,
        })
    }
}

fn sup_norm(v: &[f64]) -> f64 {
    v.iter().fold(0f64, |acc, d| acc.max(d.abs()))
}

/// Mean log-likelihood of the chosen alternatives.
pub fn mean_log_likelihood<O>(
    objective: &O,
    utilities: &[Vec<f64>],
    labels: &[usize],
) -> f64
    where O: ChoiceObjective,
{
    let state = objective.probabilities(utilities);
    let n_sample = labels.len().max(1) as f64;
    state.joint()
        .iter()
        .zip(labels)
        .map(|(row, &y)| row[y].max(PROBABILITY_CLIP).ln())
        .sum::<f64>()
        / n_sample
}

/// Central differences, one-sided when `x - h` leaves the lower bound.
fn finite_difference<F>(f: &F, x: &[f64], lower: &[f64], fx: f64) -> Vec<f64>
    where F: Fn(&[f64]) -> f64,
{
    let mut point = x.to_vec();
    (0..x.len())
        .map(|k| {
            let xk = x[k];
            point[k] = xk + FD_STEP;
            let f_plus = f(&point);
            let grad = if xk - FD_STEP < lower[k] {
                (f_plus - fx) / FD_STEP
            } else {
                point[k] = xk - FD_STEP;
                let f_minus = f(&point);
                (f_plus - f_minus) / (2.0 * FD_STEP)
            };
            point[k] = xk;
            grad
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn simplex_sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn simplex_projection() {
        let p = project_onto_simplex(&[0.5, 0.5], 1.0);
        assert_eq!(p, vec![0.5, 0.5]);

        let p = project_onto_simplex(&[2.0, 0.0], 1.0);
        assert!((p[0] - 1.0).abs() < 1e-12 && p[1] == 0.0);

        let p = project_onto_simplex(&[0.9, 0.8, -0.3], 0.6);
        assert!((simplex_sum(&p) - 0.6).abs() < 1e-12);
        assert!(p.iter().all(|x| *x >= 0.0));
        assert!((p[0] - 0.35).abs() < 1e-12);
        assert!((p[1] - 0.25).abs() < 1e-12);
    }

    fn cross_structure() -> CrossNestStructure {
        CrossNestStructure::new(
            vec![vec![0.5, 0.5], vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![1.0, 1.0],
            vec![true, false],
            vec![vec![true, true], vec![false, false], vec![false, false]],
            3,
        ).unwrap()
    }

    #[test]
    fn free_parameters_roundtrip() {
        let cross = cross_structure();
        assert_eq!(cross.free_parameters(), vec![1.0, 0.5, 0.5]);

        let updated = cross.with_free_parameters(&[0.7, 0.2, 0.8]);
        assert_eq!(updated.mu(), &[0.7, 1.0]);
        assert_eq!(updated.alphas()[0], vec![0.2, 0.8]);
        assert_eq!(updated.alphas()[1], vec![1.0, 0.0]);
    }

    #[test]
    fn projection_restores_invariants() {
        let cross = cross_structure();
        let projected = cross.project(&[3.0, 1.2, -0.4], (0.05, 1.0));
        assert_eq!(projected[0], 1.0);
        assert!((projected[1] + projected[2] - 1.0).abs() < 1e-12);
        assert!(projected[2] >= 0.0);
    }

    /// Simulates choices from a nested logit with known `mu`
    /// and checks the optimizer moves `mu` towards it.
    #[test]
    fn recovers_nest_scale() {
        let mut rng = StdRng::seed_from_u64(3);
        let truth = NestStructure::new(
            BTreeMap::from([(0, vec![0, 1]), (1, vec![2])]),
            vec![0.3, 1.0],
            vec![],
            3,
        ).unwrap();

        let n = 3000;
        let utilities = (0..n)
            .map(|_| (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect::<Vec<f64>>())
            .collect::<Vec<_>>();
        let probs = truth.probabilities(&utilities).joint;
        let labels = probs.iter()
            .map(|row| {
                let u: f64 = rng.gen();
                let mut acc = 0.0;
                row.iter()
                    .position(|p| { acc += p; u < acc })
                    .unwrap_or(2)
            })
            .collect::<Vec<_>>();

        let start = NestStructure::new(
            BTreeMap::from([(0, vec![0, 1]), (1, vec![2])]),
            vec![1.0, 1.0],
            vec![true, false],
            3,
        ).unwrap();

        let before = mean_log_likelihood(&start, &utilities, &labels);
        let fitted = ProjectedGradient::new()
            .max_iter(1_000)
            .maximize(&start, &utilities, &labels)
            .unwrap();
        let after = mean_log_likelihood(&fitted, &utilities, &labels);

        assert!(after >= before);
        assert!(fitted.mu()[0] < 0.7, "mu = {:?}", fitted.mu());
        assert_eq!(fitted.mu()[1], 1.0);
    }

    #[test]
    fn cross_nested_stays_feasible() {
        let cross = cross_structure();
        let utilities = vec![
            vec![0.2, 0.1, -0.3],
            vec![1.0, -1.0, 0.5],
            vec![0.0, 0.4, 0.4],
            vec![-0.5, 0.3, 0.1],
        ];
        let labels = vec![0, 1, 2, 1];

        let fitted = ProjectedGradient::new()
            .max_iter(500)
            .maximize(&cross, &utilities, &labels)
            .unwrap();
        let row = &fitted.alphas()[0];
        assert!((row[0] + row[1] - 1.0).abs() < 1e-9);
        assert!(row.iter().all(|a| (0.0..=1.0).contains(a)));
        assert!((0.05..=1.0).contains(&fitted.mu()[0]));

        let before = mean_log_likelihood(&cross, &utilities, &labels);
        let after = mean_log_likelihood(&fitted, &utilities, &labels);
        assert!(after >= before - 1e-12);
    }

    #[test]
    fn reports_non_convergence() {
        let cross = cross_structure();
        let utilities = vec![vec![0.2, 0.1, -0.3], vec![1.0, -1.0, 0.5]];
        let labels = vec![0, 1];

        let result = ProjectedGradient::new()
            .max_iter(0)
            .maximize(&cross, &utilities, &labels);
        assert!(matches!(
            result,
            Err(OptimizerError::NonConvergence { iterations: 0, .. })
        ));
    }

    #[test]
    fn nothing_to_optimise_is_a_no_op() {
        let nest = NestStructure::new(
            BTreeMap::from([(0, vec![0, 1]), (1, vec![2])]),
            vec![0.5, 1.0],
            vec![],
            3,
        ).unwrap();
        let fitted = ProjectedGradient::new()
            .maximize(&nest, &[vec![0.0, 0.0, 0.0]], &[0])
            .unwrap();
        assert_eq!(fitted, nest);
    }
}
