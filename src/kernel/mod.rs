//! Kernel functions
//!
//! A kernel K(x, y) must satisfy Mercer's condition to be valid for SVM
//! training (the sigmoid kernel is the usual exception and may be indefinite
//! for some parameter choices). Kernels are a closed set of variants, each
//! with a pure evaluation function of two feature rows plus its fixed
//! parameters.

use crate::core::{Result, SvmError};
use serde::{Deserialize, Serialize};

/// Kernel function over dense feature rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    /// K(x, y) = x . y
    Linear,
    /// K(x, y) = (gamma * x . y + coef0)^degree
    Poly { degree: u32, gamma: f64, coef0: f64 },
    /// K(x, y) = exp(-gamma * ||x - y||^2)
    Rbf { gamma: f64 },
    /// K(x, y) = tanh(gamma * x . y + coef0)
    Sigmoid { gamma: f64, coef0: f64 },
    /// Caller supplies the kernel matrix: column 0 of every row is a 1-based
    /// sample index and columns 1..=n hold the kernel values against the
    /// training set. Evaluation is a lookup, not a computation.
    Precomputed,
}

impl Kernel {
    /// Linear kernel
    pub fn linear() -> Self {
        Kernel::Linear
    }

    /// Polynomial kernel of the given degree
    pub fn poly(degree: u32, gamma: f64, coef0: f64) -> Self {
        Kernel::Poly {
            degree,
            gamma,
            coef0,
        }
    }

    /// RBF (Gaussian) kernel
    pub fn rbf(gamma: f64) -> Self {
        Kernel::Rbf { gamma }
    }

    /// Sigmoid (hyperbolic tangent) kernel
    pub fn sigmoid(gamma: f64, coef0: f64) -> Self {
        Kernel::Sigmoid { gamma, coef0 }
    }

    /// Precomputed kernel matrix lookup
    pub fn precomputed() -> Self {
        Kernel::Precomputed
    }

    /// Kernel name as used in logs and serialized metadata
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Linear => "linear",
            Kernel::Poly { .. } => "poly",
            Kernel::Rbf { .. } => "rbf",
            Kernel::Sigmoid { .. } => "sigmoid",
            Kernel::Precomputed => "precomputed",
        }
    }

    /// Check kernel parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Kernel::Linear | Kernel::Precomputed => Ok(()),
            Kernel::Poly { degree, gamma, .. } => {
                if degree < 1 {
                    return Err(SvmError::InvalidInput(format!(
                        "poly degree must be >= 1, got {degree}"
                    )));
                }
                check_gamma(gamma)
            }
            Kernel::Rbf { gamma } => check_gamma(gamma),
            Kernel::Sigmoid { gamma, .. } => check_gamma(gamma),
        }
    }

    /// Compute K(x, y)
    ///
    /// For `Precomputed`, `x` is the querying row and `y` the stored
    /// (training) row whose index column selects the entry in `x`. Both
    /// orders agree whenever the supplied matrix is symmetric.
    pub fn evaluate(&self, x: &[f64], y: &[f64]) -> f64 {
        match *self {
            Kernel::Linear => dot(x, y),
            Kernel::Poly {
                degree,
                gamma,
                coef0,
            } => (gamma * dot(x, y) + coef0).powi(degree as i32),
            Kernel::Rbf { gamma } => (-gamma * squared_distance(x, y)).exp(),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(x, y) + coef0).tanh(),
            Kernel::Precomputed => x[y[0] as usize],
        }
    }
}

fn check_gamma(gamma: f64) -> Result<()> {
    if gamma <= 0.0 || !gamma.is_finite() {
        return Err(SvmError::InvalidInput(format!(
            "gamma must be positive and finite, got {gamma}"
        )));
    }
    Ok(())
}

/// Dot product of two dense rows
fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Squared Euclidean distance ||x - y||^2
fn squared_distance(x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum()
}

/// Validate the index structure of a precomputed kernel matrix
///
/// Every row must carry n_train + 1 columns, with column 0 an integral,
/// unique, 1-based index into the training set. Violations surface as
/// `DegenerateKernel`.
pub(crate) fn validate_precomputed(samples: &[Vec<f64>]) -> Result<()> {
    let n = samples.len();
    let mut seen = vec![false; n];
    for (row, sample) in samples.iter().enumerate() {
        if sample.len() != n + 1 {
            return Err(SvmError::DegenerateKernel(format!(
                "precomputed row {} has {} columns, expected {} (index column + {} kernel values)",
                row,
                sample.len(),
                n + 1,
                n
            )));
        }
        let idx = sample[0];
        if idx.fract() != 0.0 || idx < 1.0 || idx > n as f64 {
            return Err(SvmError::DegenerateKernel(format!(
                "precomputed row {row} has index column {idx}, expected an integer in 1..={n}"
            )));
        }
        let pos = idx as usize - 1;
        if seen[pos] {
            return Err(SvmError::DegenerateKernel(format!(
                "precomputed index {idx} appears more than once"
            )));
        }
        seen[pos] = true;
    }
    Ok(())
}
