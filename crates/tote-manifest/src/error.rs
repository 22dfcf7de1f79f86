//! Error types for manifest loading and normalization.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("package.json not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("package.json exceeds maximum size of {max_mib}MB")]
    TooLarge { max_mib: u64 },

    #[error("invalid package.json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: String, message: String },

    /// `exports` mixes subpath keys (`./x`) with condition keys (`import`).
    #[error("`exports` mixes subpath keys and condition keys (found `{subpath}` next to `{condition}`)")]
    MixedExportKeys { subpath: String, condition: String },
}

impl ManifestError {
    /// The manifest field this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ManifestError::InvalidField { field, .. } => Some(field),
            ManifestError::MixedExportKeys { .. } => Some("exports"),
            _ => None,
        }
    }
}
