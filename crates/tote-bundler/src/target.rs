//! Fully resolved units of work.

use std::fmt;
use std::path::{Path, PathBuf};

use tote_manifest::FieldPath;

use crate::format::OutputFormat;

/// What a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A bundle in the given module format
    Bundle { format: OutputFormat },
    /// A declaration file only
    Declaration,
}

impl TargetKind {
    pub fn format(self) -> Option<OutputFormat> {
        match self {
            TargetKind::Bundle { format } => Some(format),
            TargetKind::Declaration => None,
        }
    }
}

/// One output file derived from one manifest leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Entry name (`.`, `./shared`, `bin/cli`)
    pub entry: String,
    /// Absolute source file (variant-resolved)
    pub source: PathBuf,
    pub kind: TargetKind,
    /// Condition keys from the export root down to the leaf
    pub conditions: Vec<String>,
    /// Package-relative output path, `/`-separated, e.g. `dist/index.mjs`
    pub output: PathBuf,
    /// Manifest location the leaf was declared at
    pub field: FieldPath,
    /// The condition that decided the format, if one did
    pub decided_by: Option<String>,
    /// Output starts with a hashbang and gets the executable bit
    pub executable: bool,
}

impl BuildTarget {
    pub fn format(&self) -> Option<OutputFormat> {
        self.kind.format()
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self.kind, TargetKind::Bundle { .. })
    }

    /// Output path as displayed in diagnostics and the report.
    pub fn label(&self) -> String {
        display_path(&self.output)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Bundle { format } => write!(f, "{} ({format})", self.label()),
            TargetKind::Declaration => write!(f, "{} (types)", self.label()),
        }
    }
}

/// `/`-separated rendering of a relative path.
pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
