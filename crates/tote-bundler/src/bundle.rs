//! The bundling capability seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::format::OutputFormat;
use crate::graph::ModuleGraph;

/// Produces the module graph of one entry for one output format.
///
/// Implementations must be deterministic: bundling the same entry twice
/// yields identical module ids, bodies and generated names.
#[async_trait]
pub trait BundleCapability: Send + Sync {
    async fn bundle(&self, entry: &Path, format: OutputFormat) -> Result<ModuleGraph, BundleError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    #[error("cannot read `{}`: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("failed to parse `{}`: {}", .path.display(), .messages.join("; "))]
    Parse { path: PathBuf, messages: Vec<String> },

    #[error("cannot resolve `{specifier}` from `{}`", .importer.display())]
    Unresolved { specifier: String, importer: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl BundleError {
    /// The file the failure is about, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            BundleError::Unreadable { path, .. } | BundleError::Parse { path, .. } => Some(path),
            BundleError::Unresolved { importer, .. } => Some(importer),
            BundleError::Other(_) => None,
        }
    }
}
