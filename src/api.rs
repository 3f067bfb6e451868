//! High-level training interface
//!
//! # Quick start
//!
//! ```rust
//! use ksvm::{Kernel, Svm};
//!
//! # fn main() -> ksvm::Result<()> {
//! let samples = vec![
//!     vec![0.0, 0.0],
//!     vec![0.2, 0.1],
//!     vec![2.0, 2.0],
//!     vec![2.1, 1.9],
//! ];
//! let labels = vec![0, 0, 1, 1];
//!
//! let model = Svm::new()
//!     .with_kernel(Kernel::rbf(0.5))
//!     .with_c(1.0)
//!     .fit(&samples, &labels)?;
//!
//! assert_eq!(model.predict(&[vec![0.1, 0.0]])?, vec![0]);
//! # Ok(())
//! # }
//! ```

use crate::core::{Result, SvmConfig};
use crate::kernel::Kernel;
use crate::model::SvmModel;
use crate::multiclass::train_one_vs_one;

/// SVM trainer with builder-style configuration
pub struct Svm {
    config: SvmConfig,
}

impl Svm {
    /// Create a trainer with the default configuration (linear kernel)
    pub fn new() -> Self {
        Self {
            config: SvmConfig::default(),
        }
    }

    /// Create a trainer from an explicit configuration
    pub fn from_config(config: SvmConfig) -> Self {
        Self { config }
    }

    /// Set the kernel
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    /// Set the regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    /// Set the KKT convergence tolerance
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    /// Set the kernel cache budget in megabytes
    pub fn with_cache_size_mb(mut self, mb: f64) -> Self {
        self.config.cache_size_mb = mb;
        self
    }

    /// Enable or disable the shrinking heuristic
    pub fn with_shrinking(mut self, shrinking: bool) -> Self {
        self.config.shrinking = shrinking;
        self
    }

    /// Fit Platt-scaling probability estimates during training
    pub fn with_probability(mut self, probability: bool) -> Self {
        self.config.probability = probability;
        self
    }

    /// Cap the number of pair updates per subproblem (0 = no cap)
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    /// Seed the calibration cross-validation shuffle
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = Some(seed);
        self
    }

    /// The current configuration
    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    /// Train a model
    ///
    /// Either returns a fully valid model or an error; a failed fit never
    /// exposes partial state.
    pub fn fit(self, samples: &[Vec<f64>], labels: &[i32]) -> Result<SvmModel> {
        train_one_vs_one(samples, labels, &self.config)
    }
}

impl Default for Svm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let svm = Svm::new()
            .with_kernel(Kernel::rbf(0.5))
            .with_c(2.0)
            .with_tol(0.01)
            .with_cache_size_mb(10.0)
            .with_shrinking(false)
            .with_probability(true)
            .with_max_iter(5000)
            .with_random_seed(42);

        let config = svm.config();
        assert_eq!(config.kernel, Kernel::rbf(0.5));
        assert_eq!(config.c, 2.0);
        assert_eq!(config.tol, 0.01);
        assert_eq!(config.cache_size_mb, 10.0);
        assert!(!config.shrinking);
        assert!(config.probability);
        assert_eq!(config.max_iter, 5000);
        assert_eq!(config.random_seed, Some(42));
    }

    #[test]
    fn test_fit_rejects_invalid_config() {
        let samples = vec![vec![1.0], vec![-1.0]];
        let labels = vec![0, 1];
        let result = Svm::new().with_c(-1.0).fit(&samples, &labels);
        assert!(result.is_err());
    }

    #[test]
    fn test_fit_and_predict() {
        let samples = vec![vec![2.0], vec![1.5], vec![-2.0], vec![-1.5]];
        let labels = vec![1, 1, 0, 0];
        let model = Svm::new().fit(&samples, &labels).expect("fit");

        assert_eq!(model.predict(&samples).expect("predict"), labels);
        assert!(model.converged());
    }
}
