//! Configuration and training diagnostics

use crate::core::{Result, SvmError};
use crate::kernel::Kernel;
use serde::{Deserialize, Serialize};

/// Training configuration
///
/// Recognized options mirror the usual SVM parameter set: the kernel
/// (with degree/gamma/coef0 folded into the variant), the box constraint C,
/// the KKT convergence tolerance, the kernel cache budget, the shrinking
/// heuristic, probability calibration, the iteration cap and the seed used
/// for calibration cross-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    /// Kernel function
    pub kernel: Kernel,
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Tolerance on the maximum KKT violation
    pub tol: f64,
    /// Kernel cache budget in megabytes, shared across subproblems
    pub cache_size_mb: f64,
    /// Enable the shrinking heuristic
    pub shrinking: bool,
    /// Fit Platt-scaling probability estimates during training
    pub probability: bool,
    /// Maximum number of pair updates per subproblem (0 = no cap)
    pub max_iter: usize,
    /// Seed for the calibration cross-validation shuffle
    pub random_seed: Option<u64>,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            kernel: Kernel::Linear,
            c: 1.0,
            tol: 1e-3,
            cache_size_mb: 100.0,
            shrinking: true,
            probability: false,
            max_iter: 100_000,
            random_seed: None,
        }
    }
}

impl SvmConfig {
    /// Check that every parameter is in its valid range
    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        if self.c <= 0.0 || !self.c.is_finite() {
            return Err(SvmError::InvalidInput(format!(
                "reg_param C must be positive and finite, got {}",
                self.c
            )));
        }
        if self.tol <= 0.0 || !self.tol.is_finite() {
            return Err(SvmError::InvalidInput(format!(
                "tol must be positive and finite, got {}",
                self.tol
            )));
        }
        if self.cache_size_mb <= 0.0 || !self.cache_size_mb.is_finite() {
            return Err(SvmError::InvalidInput(format!(
                "cache_size_mb must be positive and finite, got {}",
                self.cache_size_mb
            )));
        }
        Ok(())
    }

    /// Total kernel cache budget in bytes
    pub fn cache_bytes(&self) -> usize {
        (self.cache_size_mb * (1 << 20) as f64) as usize
    }
}

/// Solver state machine
///
/// A solve starts `Initialized`, moves to `Iterating` on the first pair
/// update and terminates in one of the last two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Initialized,
    Iterating,
    Converged,
    MaxIterExceeded,
}

impl SolverStatus {
    /// Whether the solver reached the tolerance (as opposed to the cap)
    pub fn converged(&self) -> bool {
        matches!(self, SolverStatus::Converged)
    }
}

/// Per-subproblem training diagnostics, retained in the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDiagnostics {
    /// Class-index pair (a, b) with a < b
    pub classes: (usize, usize),
    /// Number of pair updates performed
    pub iterations: usize,
    /// Maximum KKT violation at termination
    pub kkt_violation: f64,
    /// Terminal solver state
    pub status: SolverStatus,
    /// |sum(alpha_i * y_i)| at termination
    pub equality_residual: f64,
    /// Number of support vectors of this subproblem
    pub n_support: usize,
}
