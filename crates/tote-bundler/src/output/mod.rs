//! Artifacts produced by a build and the code that puts them on disk.

pub mod writer;

use std::path::PathBuf;

use serde::Serialize;

pub use writer::{clean_dir, remove_stale, validate_output_path, write_artifacts};

/// What kind of file an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The output of an entry for one condition path
    Bundle,
    /// A standalone shared or directive chunk
    Chunk,
    /// A type declaration file
    Declaration,
}

/// One file the build writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Absolute path inside the package root
    pub path: PathBuf,
    pub contents: String,
    pub kind: ArtifactKind,
    /// Written with mode `0o755` on Unix
    pub executable: bool,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            kind,
            executable: false,
        }
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}
