//! Sequential Minimal Optimization
//!
//! Solves the binary SVM dual problem by repeatedly optimizing the pair of
//! multipliers that most violates the KKT conditions (the maximal-violating-
//! pair rule of Keerthi et al.), with an analytic two-variable update and an
//! incrementally maintained gradient.
//!
//! The solver tracks F_i = sum_j alpha_j * y_j * K(i, j) - y_i per sample.
//! With I_up / I_low the index sets that may still move up or down, the
//! maximum KKT violation is b_low - b_up where b_low = max F over I_low and
//! b_up = min F over I_up; the problem is solved once that gap falls under
//! the tolerance.

use crate::cache::RowCache;
use crate::core::{Result, SolverStatus, SvmConfig, SvmError};
use crate::kernel::Kernel;
use crate::solver::shrinking::ActiveSet;
use log::warn;
use std::sync::Arc;

/// Updates with |K_ii + K_jj - 2K_ij| below this are degenerate: the pair
/// is skipped and selection falls back to the next-best candidates.
const DEGENERATE_ETA: f64 = 1e-12;

/// Pair updates between shrink passes
const SHRINK_INTERVAL: usize = 100;

/// SMO solver for one binary subproblem
pub struct SmoSolver {
    kernel: Kernel,
    c: f64,
    tol: f64,
    max_iter: usize,
    shrinking: bool,
    shrink_interval: usize,
}

/// Solution of one binary subproblem
#[derive(Debug, Clone)]
pub struct BinaryResult {
    /// Lagrange multipliers, one per sample, in [0, C]
    pub alpha: Vec<f64>,
    /// Bias term of the decision function
    pub bias: f64,
    /// Indices with alpha > 0
    pub support: Vec<usize>,
    /// Number of pair updates performed
    pub iterations: usize,
    /// Maximum KKT violation at termination
    pub kkt_violation: f64,
    /// Terminal solver state
    pub status: SolverStatus,
    /// |sum(alpha_i * y_i)| at termination
    pub equality_residual: f64,
}

impl BinaryResult {
    /// Decision value for a query against this subproblem's training set
    pub fn decision(&self, kernel: &Kernel, x: &[&[f64]], y: &[f64], q: &[f64]) -> f64 {
        self.support
            .iter()
            .map(|&k| self.alpha[k] * y[k] * kernel.evaluate(q, x[k]))
            .sum::<f64>()
            + self.bias
    }
}

impl SmoSolver {
    /// Create a solver with explicit parameters
    pub fn new(kernel: Kernel, c: f64, tol: f64, max_iter: usize, shrinking: bool) -> Self {
        Self {
            kernel,
            c,
            tol,
            max_iter,
            shrinking,
            shrink_interval: SHRINK_INTERVAL,
        }
    }

    /// Create a solver from a training configuration
    pub fn from_config(config: &SvmConfig) -> Self {
        Self::new(
            config.kernel,
            config.c,
            config.tol,
            config.max_iter,
            config.shrinking,
        )
    }

    #[cfg(test)]
    pub(crate) fn with_shrink_interval(mut self, every: usize) -> Self {
        self.shrink_interval = every.max(1);
        self
    }

    /// The kernel this solver evaluates
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Solve the dual problem for samples `x` with labels `y` in {-1, +1}
    pub fn solve(&self, x: &[&[f64]], y: &[f64], cache: &mut RowCache) -> Result<BinaryResult> {
        if x.is_empty() {
            return Err(SvmError::InvalidInput("empty subproblem".to_string()));
        }
        if x.len() != y.len() {
            return Err(SvmError::InvalidInput(format!(
                "{} samples but {} labels",
                x.len(),
                y.len()
            )));
        }
        for &label in y {
            if label != 1.0 && label != -1.0 {
                return Err(SvmError::InvalidInput(format!(
                    "binary label must be -1 or +1, got {label}"
                )));
            }
        }

        let n = x.len();
        let mut alpha = vec![0.0; n];
        // F_i = -y_i while every multiplier is zero
        let mut f: Vec<f64> = y.iter().map(|&yk| -yk).collect();
        let mut active = ActiveSet::full(n);

        let mut status = SolverStatus::Initialized;
        let mut violation = f64::INFINITY;
        let mut iterations = 0;
        let mut since_shrink = 0;
        let mut shrink_enabled = self.shrinking;

        loop {
            let sel = select_pair(&alpha, y, &f, self.c, active.indices());
            let viol = sel.map_or(f64::NEG_INFINITY, |(_, _, v)| v);

            if viol <= self.tol {
                if active.is_full() {
                    status = SolverStatus::Converged;
                    violation = viol.max(0.0);
                    break;
                }
                // The shrunk problem converged; verify on the full problem
                // before declaring victory. If a violating pair was missed
                // the loop continues with everything active.
                active.reactivate_all();
                reconstruct_gradient(&self.kernel, x, y, &alpha, &mut f, cache);
                shrink_enabled = false;
                continue;
            }
            let Some((i, j, _)) = sel else {
                break;
            };

            if self.max_iter > 0 && iterations >= self.max_iter {
                status = SolverStatus::MaxIterExceeded;
                violation = viol;
                warn!(
                    "SMO hit the iteration cap ({}) with KKT violation {:.3e} > tol {:.1e}; \
                     the solution is approximate",
                    self.max_iter, viol, self.tol
                );
                break;
            }

            status = SolverStatus::Iterating;
            iterations += 1;

            let b_low = f[i];
            let b_up = f[j];

            if !self.try_step(i, j, x, y, &mut alpha, &mut f, &active, cache)
                && !self.fallback_step(x, y, &mut alpha, &mut f, &active, cache)
            {
                if !active.is_full() {
                    active.reactivate_all();
                    reconstruct_gradient(&self.kernel, x, y, &alpha, &mut f, cache);
                    shrink_enabled = false;
                    continue;
                }
                warn!(
                    "SMO stalled after {} iterations: every violating pair is degenerate \
                     (KKT violation {:.3e})",
                    iterations, viol
                );
                status = SolverStatus::MaxIterExceeded;
                violation = viol;
                break;
            }

            if shrink_enabled {
                since_shrink += 1;
                if since_shrink >= self.shrink_interval {
                    since_shrink = 0;
                    active.shrink(&alpha, y, &f, self.c, b_up, b_low);
                }
            }
        }

        // The gradient of shrunk samples is stale when the cap fired while
        // the active set was reduced.
        if !active.is_full() {
            reconstruct_gradient(&self.kernel, x, y, &alpha, &mut f, cache);
        }

        let bias = compute_bias(&alpha, y, &f, self.c);
        let support: Vec<usize> = (0..n).filter(|&k| alpha[k] > 0.0).collect();
        let equality_residual = alpha
            .iter()
            .zip(y)
            .map(|(&a, &yk)| a * yk)
            .sum::<f64>()
            .abs();

        Ok(BinaryResult {
            alpha,
            bias,
            support,
            iterations,
            kkt_violation: violation,
            status,
            equality_residual,
        })
    }

    /// Analytic two-variable update for the pair (i, j)
    ///
    /// Returns false when the pair cannot make progress: degenerate or
    /// non-positive curvature, an empty feasible segment, or a step too
    /// small to matter.
    #[allow(clippy::too_many_arguments)]
    fn try_step(
        &self,
        i: usize,
        j: usize,
        x: &[&[f64]],
        y: &[f64],
        alpha: &mut [f64],
        f: &mut [f64],
        active: &ActiveSet,
        cache: &mut RowCache,
    ) -> bool {
        if i == j {
            return false;
        }
        let row_i = kernel_row(&self.kernel, x, i, cache);
        let row_j = kernel_row(&self.kernel, x, j, cache);

        let eta = row_i[i] + row_j[j] - 2.0 * row_i[j];
        if eta <= DEGENERATE_ETA {
            return false;
        }

        let s = y[i] * y[j];
        let (lo, hi) = if y[i] != y[j] {
            let diff = alpha[j] - alpha[i];
            (diff.max(0.0), (self.c + diff).min(self.c))
        } else {
            let sum = alpha[i] + alpha[j];
            ((sum - self.c).max(0.0), sum.min(self.c))
        };
        if lo >= hi {
            return false;
        }

        let mut alpha_j_new = alpha[j] + y[j] * (f[i] - f[j]) / eta;
        alpha_j_new = alpha_j_new.clamp(lo, hi);

        let delta_j = alpha_j_new - alpha[j];
        if delta_j.abs() < DEGENERATE_ETA {
            return false;
        }
        // alpha_i follows from the equality constraint, clipped against
        // numerical drift
        let alpha_i_new = (alpha[i] + s * (alpha[j] - alpha_j_new)).clamp(0.0, self.c);
        let delta_i = alpha_i_new - alpha[i];

        alpha[i] = alpha_i_new;
        alpha[j] = alpha_j_new;

        for &k in active.indices() {
            f[k] += y[i] * delta_i * row_i[k] + y[j] * delta_j * row_j[k];
        }
        true
    }

    /// Reselect after a degenerate primary pair
    ///
    /// Scans violating pairs in order of decreasing violation and takes the
    /// first one that admits a step. Only reached in the rare degenerate
    /// case, so the O(n log n) sort does not matter on the hot path.
    fn fallback_step(
        &self,
        x: &[&[f64]],
        y: &[f64],
        alpha: &mut [f64],
        f: &mut [f64],
        active: &ActiveSet,
        cache: &mut RowCache,
    ) -> bool {
        let mut lows: Vec<usize> = active
            .indices()
            .iter()
            .copied()
            .filter(|&k| in_low(alpha[k], y[k], self.c))
            .collect();
        let mut ups: Vec<usize> = active
            .indices()
            .iter()
            .copied()
            .filter(|&k| in_up(alpha[k], y[k], self.c))
            .collect();
        lows.sort_by(|&a, &b| f[b].total_cmp(&f[a]));
        ups.sort_by(|&a, &b| f[a].total_cmp(&f[b]));

        for &i in &lows {
            for &j in &ups {
                if f[i] - f[j] <= self.tol {
                    break;
                }
                if i != j && self.try_step(i, j, x, y, alpha, f, active, cache) {
                    return true;
                }
            }
        }
        false
    }
}

#[inline]
fn in_up(alpha: f64, y: f64, c: f64) -> bool {
    (y > 0.0 && alpha < c) || (y < 0.0 && alpha > 0.0)
}

#[inline]
fn in_low(alpha: f64, y: f64, c: f64) -> bool {
    (y > 0.0 && alpha > 0.0) || (y < 0.0 && alpha < c)
}

/// Maximal violating pair over the active set
///
/// Returns (i, j, violation) with i the argmax of F over I_low and j the
/// argmin of F over I_up. Ties go to the lowest index because the scan is
/// ascending and comparisons are strict.
fn select_pair(
    alpha: &[f64],
    y: &[f64],
    f: &[f64],
    c: f64,
    active: &[usize],
) -> Option<(usize, usize, f64)> {
    let mut best_low: Option<usize> = None;
    let mut best_up: Option<usize> = None;
    for &k in active {
        if in_low(alpha[k], y[k], c) && best_low.map_or(true, |b| f[k] > f[b]) {
            best_low = Some(k);
        }
        if in_up(alpha[k], y[k], c) && best_up.map_or(true, |b| f[k] < f[b]) {
            best_up = Some(k);
        }
    }
    match (best_low, best_up) {
        (Some(i), Some(j)) => Some((i, j, f[i] - f[j])),
        _ => None,
    }
}

/// Fetch the kernel row K(i, .) through the cache
fn kernel_row(kernel: &Kernel, x: &[&[f64]], i: usize, cache: &mut RowCache) -> Arc<Vec<f64>> {
    cache.row(i, || x.iter().map(|xk| kernel.evaluate(x[i], xk)).collect())
}

/// Rebuild F from scratch, used when shrunk samples come back into play
fn reconstruct_gradient(
    kernel: &Kernel,
    x: &[&[f64]],
    y: &[f64],
    alpha: &[f64],
    f: &mut [f64],
    cache: &mut RowCache,
) {
    for (k, fk) in f.iter_mut().enumerate() {
        *fk = -y[k];
    }
    for m in 0..alpha.len() {
        if alpha[m] > 0.0 {
            let row = kernel_row(kernel, x, m, cache);
            let w = alpha[m] * y[m];
            for (k, fk) in f.iter_mut().enumerate() {
                *fk += w * row[k];
            }
        }
    }
}

/// Bias from the free support vectors, falling back to the midpoint of the
/// feasible range when every multiplier sits at a bound
fn compute_bias(alpha: &[f64], y: &[f64], f: &[f64], c: f64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0;
    for k in 0..alpha.len() {
        if alpha[k] > 0.0 && alpha[k] < c {
            sum += f[k];
            count += 1;
        }
    }
    if count > 0 {
        return -sum / count as f64;
    }

    let mut b_up = f64::INFINITY;
    let mut b_low = f64::NEG_INFINITY;
    for k in 0..alpha.len() {
        if in_up(alpha[k], y[k], c) {
            b_up = b_up.min(f[k]);
        }
        if in_low(alpha[k], y[k], c) {
            b_low = b_low.max(f[k]);
        }
    }
    match (b_up.is_finite(), b_low.is_finite()) {
        (true, true) => -(b_up + b_low) / 2.0,
        (true, false) => -b_up,
        (false, true) => -b_low,
        (false, false) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(
        solver: &SmoSolver,
        x: &[Vec<f64>],
        y: &[f64],
    ) -> BinaryResult {
        let rows: Vec<&[f64]> = x.iter().map(|r| r.as_slice()).collect();
        let mut cache = RowCache::new(64);
        solver
            .solve(&rows, y, &mut cache)
            .expect("solve should succeed")
    }

    fn decision(kernel: &Kernel, res: &BinaryResult, x: &[Vec<f64>], y: &[f64], q: &[f64]) -> f64 {
        let rows: Vec<&[f64]> = x.iter().map(|r| r.as_slice()).collect();
        res.decision(kernel, &rows, y, q)
    }

    #[test]
    fn test_empty_subproblem() {
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 1000, false);
        let mut cache = RowCache::new(4);
        let result = solver.solve(&[], &[], &mut cache);
        assert!(matches!(result, Err(SvmError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_label() {
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 1000, false);
        let mut cache = RowCache::new(4);
        let x = [vec![1.0]];
        let rows: Vec<&[f64]> = x.iter().map(|r| r.as_slice()).collect();
        let result = solver.solve(&rows, &[0.5], &mut cache);
        assert!(matches!(result, Err(SvmError::InvalidInput(_))));
    }

    #[test]
    fn test_two_point_separable() {
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 1000, false);
        let x = vec![vec![2.0], vec![-2.0]];
        let y = [1.0, -1.0];
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::Converged);
        assert_eq!(res.support, vec![0, 1]);
        // The maximum-margin separator is w = 0.5, b = 0: both points sit
        // exactly on the margin.
        assert!((decision(&solver.kernel, &res, &x, &y, &[2.0]) - 1.0).abs() < 1e-6);
        assert!((decision(&solver.kernel, &res, &x, &y, &[-2.0]) + 1.0).abs() < 1e-6);
        assert!(res.bias.abs() < 1e-6);
        assert!(res.equality_residual < 1e-6);
    }

    #[test]
    fn test_separable_zero_training_error() {
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 10_000, false);
        let x = vec![
            vec![2.0, 1.0],
            vec![1.8, 1.1],
            vec![2.2, 0.9],
            vec![-2.0, -1.0],
            vec![-1.8, -1.1],
            vec![-2.2, -0.9],
        ];
        let y = [1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::Converged);
        for (xi, &yi) in x.iter().zip(&y) {
            let d = decision(&solver.kernel, &res, &x, &y, xi);
            assert!(d * yi > 0.0, "training point misclassified: d = {d}");
        }
        assert!(res.equality_residual < 1e-6);
        assert!(res.kkt_violation <= 1e-3);
    }

    #[test]
    fn test_box_constraint_respected() {
        let c = 0.25;
        let solver = SmoSolver::new(Kernel::linear(), c, 1e-3, 10_000, false);
        // overlapping classes force multipliers onto the upper bound
        let x = vec![vec![1.0], vec![-0.5], vec![0.5], vec![-1.0]];
        let y = [1.0, 1.0, -1.0, -1.0];
        let res = solve(&solver, &x, &y);

        for &a in &res.alpha {
            assert!((0.0..=c + 1e-12).contains(&a));
        }
        assert!(res.equality_residual < 1e-6);
    }

    #[test]
    fn test_xor_with_linear_kernel_is_symmetric() {
        // Not linearly separable; the symmetric optimum puts every
        // multiplier at C with zero bias.
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 10_000, false);
        let x = vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ];
        let y = [1.0, 1.0, -1.0, -1.0];
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::Converged);
        for &a in &res.alpha {
            assert!((a - 1.0).abs() < 1e-9);
        }
        assert!(res.bias.abs() < 1e-9);
    }

    #[test]
    fn test_rbf_separates_xor() {
        let solver = SmoSolver::new(Kernel::rbf(2.0), 10.0, 1e-3, 10_000, false);
        let x = vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ];
        let y = [1.0, 1.0, -1.0, -1.0];
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::Converged);
        for (xi, &yi) in x.iter().zip(&y) {
            let d = decision(&solver.kernel, &res, &x, &y, xi);
            assert!(d * yi > 0.0);
        }
    }

    #[test]
    fn test_max_iter_reported() {
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-9, 1, false);
        let x = vec![vec![1.0, 0.3], vec![0.2, -1.0], vec![-1.0, 0.5], vec![-0.4, -0.6]];
        let y = [1.0, 1.0, -1.0, -1.0];
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::MaxIterExceeded);
        assert_eq!(res.iterations, 1);
        assert!(res.kkt_violation > 1e-9);
    }

    #[test]
    fn test_shrinking_matches_plain_solution() {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                vec![sign * (1.0 + 0.05 * k as f64), sign * 0.5]
            })
            .collect();
        let y: Vec<f64> = (0..20).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();

        let plain = SmoSolver::new(Kernel::linear(), 0.5, 1e-4, 50_000, false);
        let shrunk = SmoSolver::new(Kernel::linear(), 0.5, 1e-4, 50_000, true)
            .with_shrink_interval(2);

        let res_plain = solve(&plain, &x, &y);
        let res_shrunk = solve(&shrunk, &x, &y);

        assert_eq!(res_plain.status, SolverStatus::Converged);
        assert_eq!(res_shrunk.status, SolverStatus::Converged);
        // shrinking must not change the solution, only the path to it
        for q in [vec![0.8, 0.4], vec![-0.8, -0.4], vec![2.0, 1.0]] {
            let d_plain = decision(&plain.kernel, &res_plain, &x, &y, &q);
            let d_shrunk = decision(&shrunk.kernel, &res_shrunk, &x, &y, &q);
            assert!(
                (d_plain - d_shrunk).abs() < 1e-3,
                "decisions diverge: {d_plain} vs {d_shrunk}"
            );
        }
    }

    #[test]
    fn test_degenerate_kernel_stalls_without_panic() {
        // duplicated points with opposite labels give eta = 0 for the
        // primary pair; the solver must skip it and terminate
        let solver = SmoSolver::new(Kernel::linear(), 1.0, 1e-3, 100, false);
        let x = vec![vec![1.0], vec![1.0]];
        let y = [1.0, -1.0];
        let res = solve(&solver, &x, &y);
        assert!(res.iterations <= 100);
        for &a in &res.alpha {
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_precomputed_kernel_training() {
        // Gram matrix of the 1-D points [2, -2] under the linear kernel,
        // with leading index columns
        let x = vec![vec![1.0, 4.0, -4.0], vec![2.0, -4.0, 4.0]];
        let y = [1.0, -1.0];
        let solver = SmoSolver::new(Kernel::precomputed(), 1.0, 1e-3, 1000, false);
        let res = solve(&solver, &x, &y);

        assert_eq!(res.status, SolverStatus::Converged);
        assert_eq!(res.support, vec![0, 1]);
        // same geometry as the explicit two-point problem
        assert!((res.alpha[0] - 0.125).abs() < 1e-9);
        assert!((res.alpha[1] - 0.125).abs() < 1e-9);
    }
}
