//! Error types for the SVM engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SvmError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Degenerate kernel: {0}")]
    DegenerateKernel(String),

    #[error("Probability calibration failed: {0}")]
    Calibration(String),

    #[error("Model was trained without probability estimates")]
    NotCalibrated,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SvmError>;
