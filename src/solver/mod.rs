//! SVM dual solvers
//!
//! Sequential Minimal Optimization with maximal-violating-pair working-set
//! selection (Keerthi et al.) and the shrinking heuristic of the SVMlight /
//! LIBSVM family.

pub mod shrinking;
pub mod smo;

pub use self::shrinking::*;
pub use self::smo::*;
