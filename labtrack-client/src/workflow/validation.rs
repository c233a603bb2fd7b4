//! Upload validation
//!
//! One path for picker and drag-and-drop alike. Type is checked before size.

use crate::models::SelectedFile;
use labtrack_common::config::UploadConfig;
use thiserror::Error;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Why a candidate file was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// MIME type not in the allow-list
    #[error("Unsupported file type: {mime_type}")]
    Unsupported { mime_type: String },

    /// File larger than the configured maximum
    #[error("File is larger than {max_mb} MB")]
    TooLarge { max_mb: u64, size: u64 },

    /// Zero-byte file, or a drop that carried no files
    #[error("No file provided")]
    Empty,
}

impl UploadError {
    /// Localization key for the inline message
    pub fn message_key(&self) -> &'static str {
        match self {
            UploadError::Unsupported { .. } => "errors.unsupported",
            UploadError::TooLarge { .. } => "errors.tooLarge",
            UploadError::Empty => "errors.noFile",
        }
    }
}

/// Allow-list and size cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    allowed_types: Vec<String>,
    max_bytes: u64,
}

impl UploadLimits {
    pub fn new(allowed_types: Vec<String>, max_mb: u64) -> Self {
        Self {
            allowed_types: allowed_types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_bytes: max_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.allowed_types.clone(), config.max_size_mb)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_mb(&self) -> u64 {
        self.max_bytes / BYTES_PER_MB
    }

    /// Check a candidate against the limits
    pub fn validate(&self, file: &SelectedFile) -> Result<(), UploadError> {
        let mime_type = file.mime_type.to_ascii_lowercase();
        if !self.allowed_types.iter().any(|t| *t == mime_type) {
            return Err(UploadError::Unsupported {
                mime_type: file.mime_type.clone(),
            });
        }

        if file.size == 0 {
            return Err(UploadError::Empty);
        }

        if file.size > self.max_bytes {
            return Err(UploadError::TooLarge {
                max_mb: self.max_mb(),
                size: file.size,
            });
        }

        Ok(())
    }
}

/// Validate `file` against `limits`
pub fn validate_file(file: &SelectedFile, limits: &UploadLimits) -> Result<(), UploadError> {
    limits.validate(file)
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}
