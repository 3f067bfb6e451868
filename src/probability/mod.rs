//! Probability calibration
//!
//! Platt scaling: per class pair, a sigmoid P(y=+1 | d) = 1/(1 + exp(A*d + B))
//! is fit to cross-validated decision values by minimizing the regularized
//! negative log-likelihood with Newton's method and a backtracking line
//! search (Lin, Weng & Keerthi's robust variant). Multi-class probabilities
//! come from coupling the pairwise estimates with iterative proportional
//! fitting, which lands on a valid probability simplex.

use crate::cache::RowCache;
use crate::core::{Result, SvmError};
use crate::solver::SmoSolver;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Sigmoid parameters of one class pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattParams {
    pub a: f64,
    pub b: f64,
}

const NEWTON_MAX_ITER: usize = 100;
const MIN_STEP: f64 = 1e-10;
/// Ridge term keeping the Hessian positive definite
const SIGMA: f64 = 1e-12;
const GRAD_EPS: f64 = 1e-5;

/// Fit sigmoid parameters to decision values with targets in {-1, +1}
///
/// Fails with `Calibration` when the backtracking line search cannot
/// decrease the objective within the bounded number of halvings.
pub fn fit_sigmoid(decisions: &[f64], targets: &[f64]) -> Result<PlattParams> {
    let l = decisions.len();
    if l == 0 || l != targets.len() {
        return Err(SvmError::InvalidInput(format!(
            "{} decision values but {} targets",
            l,
            targets.len()
        )));
    }

    let prior1 = targets.iter().filter(|&&t| t > 0.0).count() as f64;
    let prior0 = l as f64 - prior1;

    // soft targets from the label priors
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let t: Vec<f64> = targets
        .iter()
        .map(|&y| if y > 0.0 { hi } else { lo })
        .collect();

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(decisions, &t, a, b);
    let mut reached_tolerance = false;

    for _ in 0..NEWTON_MAX_ITER {
        // gradient and Hessian of the negative log-likelihood
        let mut h11 = SIGMA;
        let mut h22 = SIGMA;
        let mut h21 = 0.0;
        let mut g1 = 0.0;
        let mut g2 = 0.0;
        for (&d, &ti) in decisions.iter().zip(&t) {
            let fapb = d * a + b;
            let (p, q) = if fapb >= 0.0 {
                let e = (-fapb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = fapb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += d * d * d2;
            h22 += d2;
            h21 += d * d2;
            let d1 = ti - p;
            g1 += d * d1;
            g2 += d1;
        }
        if g1.abs() < GRAD_EPS && g2.abs() < GRAD_EPS {
            reached_tolerance = true;
            break;
        }

        // Newton direction
        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut stepsize = 1.0;
        let mut accepted = false;
        while stepsize >= MIN_STEP {
            let new_a = a + stepsize * da;
            let new_b = b + stepsize * db;
            let new_f = objective(decisions, &t, new_a, new_b);
            if new_f < fval + 1e-4 * stepsize * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                accepted = true;
                break;
            }
            stepsize /= 2.0;
        }
        if !accepted {
            return Err(SvmError::Calibration(
                "line search cannot decrease the objective".to_string(),
            ));
        }
    }
    if !reached_tolerance {
        warn!("sigmoid fit stopped at the Newton iteration cap");
    }

    Ok(PlattParams { a, b })
}

/// Regularized negative log-likelihood, evaluated in the overflow-safe form
fn objective(decisions: &[f64], t: &[f64], a: f64, b: f64) -> f64 {
    let mut fval = 0.0;
    for (&d, &ti) in decisions.iter().zip(t) {
        let fapb = d * a + b;
        if fapb >= 0.0 {
            fval += ti * fapb + (1.0 + (-fapb).exp()).ln();
        } else {
            fval += (ti - 1.0) * fapb + (1.0 + fapb.exp()).ln();
        }
    }
    fval
}

/// P(y = +1 | decision) under fitted sigmoid parameters
pub fn sigmoid_predict(decision: f64, params: &PlattParams) -> f64 {
    let fapb = decision * params.a + params.b;
    if fapb >= 0.0 {
        let e = (-fapb).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + fapb.exp())
    }
}

/// Out-of-sample decision values via k-fold cross-validation
///
/// Calibrating on in-sample decision values overfits badly (they cluster at
/// +-1), so each sample's value comes from a model trained without it.
/// Folds are assigned from a seeded shuffle; a fold whose training part is
/// single-class short-circuits to that class's sign.
pub fn cross_validated_decisions(
    solver: &SmoSolver,
    x: &[&[f64]],
    y: &[f64],
    cache_bytes: usize,
    seed: Option<u64>,
) -> Result<Vec<f64>> {
    let n = x.len();
    if n == 0 || n != y.len() {
        return Err(SvmError::InvalidInput(format!(
            "{} samples but {} labels",
            n,
            y.len()
        )));
    }
    let folds = n.min(5);

    let mut perm: Vec<usize> = (0..n).collect();
    match seed {
        Some(s) => perm.shuffle(&mut StdRng::seed_from_u64(s)),
        None => perm.shuffle(&mut rand::thread_rng()),
    }

    let mut decisions = vec![0.0; n];
    for fold in 0..folds {
        let begin = fold * n / folds;
        let end = (fold + 1) * n / folds;
        let held_out = &perm[begin..end];
        let train: Vec<usize> = perm[..begin]
            .iter()
            .chain(&perm[end..])
            .copied()
            .collect();

        let n_pos = train.iter().filter(|&&k| y[k] > 0.0).count();
        let n_neg = train.len() - n_pos;
        if n_pos == 0 && n_neg == 0 {
            for &t in held_out {
                decisions[t] = 0.0;
            }
        } else if n_neg == 0 {
            for &t in held_out {
                decisions[t] = 1.0;
            }
        } else if n_pos == 0 {
            for &t in held_out {
                decisions[t] = -1.0;
            }
        } else {
            let sub_x: Vec<&[f64]> = train.iter().map(|&k| x[k]).collect();
            let sub_y: Vec<f64> = train.iter().map(|&k| y[k]).collect();
            let mut cache = RowCache::with_byte_budget(cache_bytes, sub_x.len());
            let result = solver.solve(&sub_x, &sub_y, &mut cache)?;
            for &t in held_out {
                decisions[t] = result.decision(solver.kernel(), &sub_x, &sub_y, x[t]);
            }
        }
    }
    Ok(decisions)
}

/// Couple pairwise probabilities into class probabilities
///
/// `r[i][j]` estimates P(class i | class i or j) for i != j; the diagonal is
/// ignored. Iterative proportional fitting in the second formulation of
/// Wu, Lin & Weng; the fixed point is a valid probability simplex.
pub fn couple_pairwise(r: &[Vec<f64>]) -> Vec<f64> {
    let k = r.len();
    if k == 0 {
        return Vec::new();
    }
    if k == 1 {
        return vec![1.0];
    }

    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..k {
            if j != t {
                q[t][t] += r[j][t] * r[j][t];
                q[t][j] = -r[j][t] * r[t][j];
            }
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    let eps = 0.005 / k as f64;
    let max_iter = k.max(100);

    for _ in 0..max_iter {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_err = (0..k).map(|t| (qp[t] - pqp).abs()).fold(0.0, f64::max);
        if max_err < eps {
            break;
        }
        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[t][t];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[t][t] + 2.0 * qp[t])) / ((1.0 + diff) * (1.0 + diff));
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
    }
    p
}
