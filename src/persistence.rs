//! Model serialization
//!
//! A trained model round-trips through a versioned JSON document (or byte
//! stream) with an explicit field list. Floating-point fields survive the
//! round trip bit-exactly, so a restored model produces identical
//! predictions.

use crate::core::{Result, SvmError};
use crate::model::SvmModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Versioned model document
#[derive(Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub metadata: ModelMetadata,
    pub model: SvmModel,
}

/// Metadata for tracking and validation
#[derive(Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version that wrote the file
    pub library_version: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    pub kernel: String,
    pub n_classes: usize,
    pub n_support_vectors: usize,
}

impl ModelFile {
    /// Wrap a trained model for serialization
    pub fn new(model: SvmModel) -> Self {
        let metadata = ModelMetadata {
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            kernel: model.kernel().name().to_string(),
            n_classes: model.n_classes(),
            n_support_vectors: model.n_support_vectors(),
        };
        Self {
            format_version: FORMAT_VERSION,
            metadata,
            model,
        }
    }

    /// Unwrap the model
    pub fn into_model(self) -> SvmModel {
        self.model
    }

    /// Serialize to a byte stream
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SvmError::Serialization(e.to_string()))
    }

    /// Deserialize from a byte stream, checking the format version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: ModelFile =
            serde_json::from_slice(bytes).map_err(|e| SvmError::Serialization(e.to_string()))?;
        file.check_version()?;
        Ok(file)
    }

    /// Save to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self).map_err(|e| SvmError::Serialization(e.to_string()))
    }

    /// Load from a file, checking the format version
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model_file: ModelFile =
            serde_json::from_reader(reader).map_err(|e| SvmError::Serialization(e.to_string()))?;
        model_file.check_version()?;
        Ok(model_file)
    }

    fn check_version(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(SvmError::Serialization(format!(
                "unsupported format version {} (this build reads {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        Ok(())
    }
}
