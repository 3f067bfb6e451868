//! One-vs-one multi-class orchestration
//!
//! For C classes, C*(C-1)/2 binary subproblems are built over the samples
//! of each class pair and trained independently; they share nothing but
//! read-only access to the sample matrix, so the pair loop runs on the
//! rayon worker pool. Each subproblem gets its own kernel cache carved out
//! of the global budget, weighted by subproblem size. At inference every
//! machine casts one vote and ties go to the lowest class index.

use crate::cache::RowCache;
use crate::core::{PairDiagnostics, Result, SvmConfig, SvmError};
use crate::kernel::{validate_precomputed, Kernel};
use crate::model::{PairMachine, SvmModel};
use crate::probability::{cross_validated_decisions, fit_sigmoid, PlattParams};
use crate::solver::SmoSolver;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Sorted distinct class labels
pub fn class_set(labels: &[i32]) -> Vec<i32> {
    let set: BTreeSet<i32> = labels.iter().copied().collect();
    set.into_iter().collect()
}

/// Class-index pairs (a, b) with a < b, in lexicographic order
pub fn pair_list(n_classes: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n_classes * n_classes.saturating_sub(1) / 2);
    for a in 0..n_classes {
        for b in (a + 1)..n_classes {
            pairs.push((a, b));
        }
    }
    pairs
}

/// One-vs-one vote over pairwise decision values
///
/// A decision value >= 0 votes the lower-indexed class of its pair; ties in
/// the final tally go to the lowest class index.
pub fn vote(decisions: &[f64], pairs: &[(usize, usize)], n_classes: usize) -> usize {
    let mut votes = vec![0usize; n_classes];
    for (&d, &(a, b)) in decisions.iter().zip(pairs) {
        if d >= 0.0 {
            votes[a] += 1;
        } else {
            votes[b] += 1;
        }
    }
    let mut winner = 0;
    for (class, &count) in votes.iter().enumerate() {
        if count > votes[winner] {
            winner = class;
        }
    }
    winner
}

/// One binary subproblem, ready to train
struct PairTask {
    a: usize,
    b: usize,
    indices: Vec<usize>,
    y: Vec<f64>,
    cache_bytes: usize,
}

/// Output of one trained subproblem
struct TrainedPair {
    a: usize,
    b: usize,
    support_global: Vec<usize>,
    coef: Vec<f64>,
    bias: f64,
    diagnostics: PairDiagnostics,
    platt: Option<PlattParams>,
}

/// Train a one-vs-one model over the full training set
pub fn train_one_vs_one(
    samples: &[Vec<f64>],
    labels: &[i32],
    config: &SvmConfig,
) -> Result<SvmModel> {
    validate_inputs(samples, labels, config)?;

    let classes = class_set(labels);
    if classes.len() < 2 {
        return Err(SvmError::InvalidInput(
            "training data contains a single class".to_string(),
        ));
    }
    let class_of: Vec<usize> = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_default())
        .collect();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); classes.len()];
    for (k, &c) in class_of.iter().enumerate() {
        members[c].push(k);
    }

    // split the cache budget across subproblems, weighted by their size
    let pairs = pair_list(classes.len());
    let sizes: Vec<usize> = pairs
        .iter()
        .map(|&(a, b)| members[a].len() + members[b].len())
        .collect();
    let total_size: usize = sizes.iter().sum();
    let total_bytes = config.cache_bytes();

    let tasks: Vec<PairTask> = pairs
        .iter()
        .zip(&sizes)
        .map(|(&(a, b), &size)| {
            let indices: Vec<usize> = members[a]
                .iter()
                .chain(&members[b])
                .copied()
                .collect();
            let y: Vec<f64> = indices
                .iter()
                .map(|&k| if class_of[k] == a { 1.0 } else { -1.0 })
                .collect();
            PairTask {
                a,
                b,
                indices,
                y,
                cache_bytes: total_bytes * size / total_size.max(1),
            }
        })
        .collect();

    debug!(
        "training {} one-vs-one subproblems over {} classes ({} samples)",
        tasks.len(),
        classes.len(),
        samples.len()
    );

    let trained: Vec<TrainedPair> = tasks
        .par_iter()
        .map(|task| train_pair(samples, config, task))
        .collect::<Result<Vec<_>>>()?;

    // union support-vector set, referenced by position from every machine
    let union_set: BTreeSet<usize> = trained
        .iter()
        .flat_map(|t| t.support_global.iter().copied())
        .collect();
    let union: Vec<usize> = union_set.into_iter().collect();
    let support_vectors: Vec<Vec<f64>> = union.iter().map(|&g| samples[g].clone()).collect();

    let machines: Vec<PairMachine> = trained
        .iter()
        .map(|t| PairMachine {
            class_a: t.a,
            class_b: t.b,
            sv_pos: t
                .support_global
                .iter()
                .map(|g| union.binary_search(g).unwrap_or_default())
                .collect(),
            coef: t.coef.clone(),
            bias: t.bias,
        })
        .collect();
    let calibration: Option<Vec<PlattParams>> = if config.probability {
        Some(trained.iter().filter_map(|t| t.platt).collect())
    } else {
        None
    };
    let diagnostics: Vec<PairDiagnostics> =
        trained.into_iter().map(|t| t.diagnostics).collect();

    Ok(SvmModel::new(
        config.kernel,
        classes,
        samples[0].len(),
        support_vectors,
        union,
        machines,
        calibration,
        diagnostics,
    ))
}

fn train_pair(samples: &[Vec<f64>], config: &SvmConfig, task: &PairTask) -> Result<TrainedPair> {
    let x: Vec<&[f64]> = task.indices.iter().map(|&k| samples[k].as_slice()).collect();
    let solver = SmoSolver::from_config(config);
    let mut cache = RowCache::with_byte_budget(task.cache_bytes, x.len());
    let result = solver.solve(&x, &task.y, &mut cache)?;

    let platt = if config.probability {
        // decorrelate the per-pair shuffles while staying reproducible
        let seed = config
            .random_seed
            .map(|s| s.wrapping_add((task.a * 31 + task.b) as u64));
        let decisions = cross_validated_decisions(&solver, &x, &task.y, task.cache_bytes, seed)?;
        Some(fit_sigmoid(&decisions, &task.y)?)
    } else {
        None
    };

    let support_global: Vec<usize> = result.support.iter().map(|&s| task.indices[s]).collect();
    let coef: Vec<f64> = result
        .support
        .iter()
        .map(|&s| result.alpha[s] * task.y[s])
        .collect();

    debug!(
        "pair ({}, {}): {} iterations, {} support vectors, violation {:.3e}",
        task.a,
        task.b,
        result.iterations,
        support_global.len(),
        result.kkt_violation
    );

    Ok(TrainedPair {
        a: task.a,
        b: task.b,
        diagnostics: PairDiagnostics {
            classes: (task.a, task.b),
            iterations: result.iterations,
            kkt_violation: result.kkt_violation,
            status: result.status,
            equality_residual: result.equality_residual,
            n_support: support_global.len(),
        },
        support_global,
        coef,
        bias: result.bias,
        platt,
    })
}

fn validate_inputs(samples: &[Vec<f64>], labels: &[i32], config: &SvmConfig) -> Result<()> {
    config.validate()?;
    if samples.is_empty() {
        return Err(SvmError::InvalidInput("no training samples".to_string()));
    }
    if samples.len() != labels.len() {
        return Err(SvmError::InvalidInput(format!(
            "{} samples but {} labels",
            samples.len(),
            labels.len()
        )));
    }
    let dim = samples[0].len();
    if dim == 0 {
        return Err(SvmError::InvalidInput(
            "samples have zero features".to_string(),
        ));
    }
    for (k, row) in samples.iter().enumerate() {
        if row.len() != dim {
            return Err(SvmError::InvalidInput(format!(
                "sample {k} has {} features, expected {dim}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(SvmError::InvalidInput(format!(
                "sample {k} contains a non-finite value"
            )));
        }
    }
    if config.kernel == Kernel::Precomputed {
        validate_precomputed(samples)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_clusters() -> (Vec<Vec<f64>>, Vec<i32>) {
        let samples = vec![
            vec![0.0, 0.0],
            vec![0.2, 0.1],
            vec![0.1, 0.2],
            vec![4.0, 0.0],
            vec![4.2, 0.1],
            vec![3.9, 0.2],
            vec![0.0, 4.0],
            vec![0.1, 4.2],
            vec![0.2, 3.9],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        (samples, labels)
    }

    #[test]
    fn test_class_set_sorted_unique() {
        assert_eq!(class_set(&[3, 1, 3, -2, 1]), vec![-2, 1, 3]);
    }

    #[test]
    fn test_pair_list() {
        assert_eq!(pair_list(2), vec![(0, 1)]);
        assert_eq!(pair_list(3), vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(pair_list(4).len(), 6);
    }

    #[test]
    fn test_vote_majority() {
        // pairs (0,1), (0,2), (1,2): class 0 wins both of its duels
        let pairs = pair_list(3);
        let winner = vote(&[1.0, 1.0, -1.0], &pairs, 3);
        assert_eq!(winner, 0);
    }

    #[test]
    fn test_vote_tie_breaks_low() {
        // one vote each: 0 beats 1, 2 beats 0, 1 beats 2
        let pairs = pair_list(3);
        let winner = vote(&[1.0, -1.0, 1.0], &pairs, 3);
        assert_eq!(winner, 0);
    }

    #[test]
    fn test_three_class_training() {
        let (samples, labels) = three_clusters();
        let config = SvmConfig::default();
        let model = train_one_vs_one(&samples, &labels, &config).expect("training");

        assert_eq!(model.classes(), &[0, 1, 2]);
        assert_eq!(model.predict(&samples).expect("predict"), labels);

        let dec = model.decision_function(&samples).expect("decision");
        assert_eq!(dec[0].len(), 3);
        assert!(model.converged());
    }

    #[test]
    fn test_diagnostics_equality_constraint() {
        let (samples, labels) = three_clusters();
        let model =
            train_one_vs_one(&samples, &labels, &SvmConfig::default()).expect("training");
        for d in model.diagnostics() {
            assert!(d.equality_residual < 1e-6);
            assert!(d.kkt_violation <= 1e-3);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let samples = vec![vec![1.0], vec![2.0]];
        let labels = vec![7, 7];
        assert!(matches!(
            train_one_vs_one(&samples, &labels, &SvmConfig::default()),
            Err(SvmError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let samples = vec![vec![1.0], vec![2.0]];
        assert!(train_one_vs_one(&samples, &[0], &SvmConfig::default()).is_err());

        let ragged = vec![vec![1.0], vec![2.0, 3.0]];
        assert!(train_one_vs_one(&ragged, &[0, 1], &SvmConfig::default()).is_err());
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let samples = vec![vec![1.0], vec![f64::NAN]];
        assert!(train_one_vs_one(&samples, &[0, 1], &SvmConfig::default()).is_err());
    }

    #[test]
    fn test_precomputed_structure_checked() {
        // duplicate index column
        let samples = vec![vec![1.0, 1.0, 0.2], vec![1.0, 0.2, 1.0]];
        let config = SvmConfig {
            kernel: Kernel::precomputed(),
            ..SvmConfig::default()
        };
        assert!(matches!(
            train_one_vs_one(&samples, &[0, 1], &config),
            Err(SvmError::DegenerateKernel(_))
        ));
    }

    #[test]
    fn test_labels_preserved_not_reindexed() {
        let samples = vec![vec![-2.0], vec![-1.8], vec![2.0], vec![1.8]];
        let labels = vec![10, 10, -5, -5];
        let model =
            train_one_vs_one(&samples, &labels, &SvmConfig::default()).expect("training");

        assert_eq!(model.classes(), &[-5, 10]);
        let predicted = model.predict(&samples).expect("predict");
        assert_eq!(predicted, labels);
    }
}
