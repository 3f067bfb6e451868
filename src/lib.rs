//! Kernelized Support Vector Machine engine
//!
//! SMO-based dual optimization (Platt's algorithm with the maximal-
//! violating-pair working-set selection of Keerthi et al.), the shrinking
//! heuristic, one-vs-one multi-class training and Platt-scaling probability
//! estimates.

pub mod api;
pub mod cache;
pub mod core;
pub mod kernel;
pub mod model;
pub mod multiclass;
pub mod persistence;
pub mod probability;
pub mod solver;

// Re-export main types for convenience
pub use crate::api::Svm;
pub use crate::cache::{CacheStats, RowCache};
pub use crate::core::error::{Result, SvmError};
pub use crate::core::types::{PairDiagnostics, SolverStatus, SvmConfig};
pub use crate::kernel::Kernel;
pub use crate::model::SvmModel;
pub use crate::persistence::ModelFile;
pub use crate::probability::PlattParams;
pub use crate::solver::{BinaryResult, SmoSolver};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
