//! Trained model
//!
//! `SvmModel` is constructed once at the end of training and never mutated:
//! it owns the union support-vector set, the per-pair dual coefficients and
//! biases, optional calibration parameters and the per-pair training
//! diagnostics. All inference goes through `&self`, so concurrent readers
//! need no locking.

use crate::core::{PairDiagnostics, Result, SvmError};
use crate::kernel::Kernel;
use crate::multiclass::vote;
use crate::probability::{couple_pairwise, sigmoid_predict, PlattParams};
use serde::{Deserialize, Serialize};

/// One one-vs-one binary machine inside the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMachine {
    /// Lower class index; the positive side of the decision function
    pub(crate) class_a: usize,
    /// Higher class index; the negative side
    pub(crate) class_b: usize,
    /// Positions into the model's union support-vector set
    pub(crate) sv_pos: Vec<usize>,
    /// alpha_i * y_i per referenced support vector
    pub(crate) coef: Vec<f64>,
    pub(crate) bias: f64,
}

/// Immutable trained SVM model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmModel {
    kernel: Kernel,
    classes: Vec<i32>,
    n_features: usize,
    support_vectors: Vec<Vec<f64>>,
    /// Original training indices of the union support vectors
    support_indices: Vec<usize>,
    machines: Vec<PairMachine>,
    calibration: Option<Vec<PlattParams>>,
    diagnostics: Vec<PairDiagnostics>,
}

impl SvmModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kernel: Kernel,
        classes: Vec<i32>,
        n_features: usize,
        support_vectors: Vec<Vec<f64>>,
        support_indices: Vec<usize>,
        machines: Vec<PairMachine>,
        calibration: Option<Vec<PlattParams>>,
        diagnostics: Vec<PairDiagnostics>,
    ) -> Self {
        Self {
            kernel,
            classes,
            n_features,
            support_vectors,
            support_indices,
            machines,
            calibration,
            diagnostics,
        }
    }

    /// Class labels in their stable (sorted) order
    pub fn classes(&self) -> &[i32] {
        &self.classes
    }

    /// Number of classes
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// The kernel the model was trained with
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Expected query dimensionality
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Size of the union support-vector set
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    /// Training-set indices of the union support vectors
    pub fn support_indices(&self) -> &[usize] {
        &self.support_indices
    }

    /// Bias term of every pairwise machine, in pair order
    pub fn intercepts(&self) -> Vec<f64> {
        self.machines.iter().map(|m| m.bias).collect()
    }

    /// Dual coefficients (alpha_i * y_i) of every pairwise machine
    pub fn dual_coefficients(&self) -> Vec<&[f64]> {
        self.machines.iter().map(|m| m.coef.as_slice()).collect()
    }

    /// Class-label pairs in decision-function order
    pub fn class_pairs(&self) -> Vec<(i32, i32)> {
        self.machines
            .iter()
            .map(|m| (self.classes[m.class_a], self.classes[m.class_b]))
            .collect()
    }

    /// Per-pair training diagnostics
    pub fn diagnostics(&self) -> &[PairDiagnostics] {
        &self.diagnostics
    }

    /// Whether probability estimates were fitted during training
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// True if every subproblem reached the tolerance
    pub fn converged(&self) -> bool {
        self.diagnostics.iter().all(|d| d.status.converged())
    }

    /// Pairwise decision values for one query
    fn decision_one(&self, query: &[f64]) -> Result<Vec<f64>> {
        if query.len() != self.n_features {
            return Err(SvmError::InvalidInput(format!(
                "query has {} features, model expects {}",
                query.len(),
                self.n_features
            )));
        }
        // kernel values against the union set once, shared by all machines
        let kv: Vec<f64> = self
            .support_vectors
            .iter()
            .map(|sv| self.kernel.evaluate(query, sv))
            .collect();
        Ok(self
            .machines
            .iter()
            .map(|m| {
                m.sv_pos
                    .iter()
                    .zip(&m.coef)
                    .map(|(&pos, &c)| c * kv[pos])
                    .sum::<f64>()
                    + m.bias
            })
            .collect())
    }

    /// Raw pairwise decision values, one row of length C*(C-1)/2 per sample
    pub fn decision_function(&self, samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        samples.iter().map(|q| self.decision_one(q)).collect()
    }

    /// Predicted class labels by one-vs-one voting
    pub fn predict(&self, samples: &[Vec<f64>]) -> Result<Vec<i32>> {
        let pairs: Vec<(usize, usize)> =
            self.machines.iter().map(|m| (m.class_a, m.class_b)).collect();
        samples
            .iter()
            .map(|q| {
                let dec = self.decision_one(q)?;
                Ok(self.classes[vote(&dec, &pairs, self.classes.len())])
            })
            .collect()
    }

    /// Class probabilities, one row per sample in class order
    ///
    /// Fails with `NotCalibrated` unless the model was trained with
    /// probability estimates.
    pub fn predict_proba(&self, samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let calibration = self.calibration.as_ref().ok_or(SvmError::NotCalibrated)?;
        let k = self.classes.len();
        samples
            .iter()
            .map(|q| {
                let dec = self.decision_one(q)?;
                let mut r = vec![vec![0.0; k]; k];
                for (m, machine) in self.machines.iter().enumerate() {
                    // clamp away from 0/1 so the coupling stays well posed
                    let p = sigmoid_predict(dec[m], &calibration[m]).clamp(1e-7, 1.0 - 1e-7);
                    r[machine.class_a][machine.class_b] = p;
                    r[machine.class_b][machine.class_a] = 1.0 - p;
                }
                Ok(couple_pairwise(&r))
            })
            .collect()
    }
}
