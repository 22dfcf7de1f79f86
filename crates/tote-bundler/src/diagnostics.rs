//! Categorized build diagnostics.
//!
//! Every warning or failure the engine encounters is recorded as a
//! [`Diagnostic`]. Whole-build failures are additionally returned as
//! [`crate::Error`]; target-scoped failures only live here.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Emission stopped for the diagnostic's scope
    Fatal,
    /// Surfaced, build proceeds
    Warning,
    /// Use of an experimental feature
    Experimental,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Fatal => "error",
            Severity::Warning => "warning",
            Severity::Experimental => "experimental",
        }
    }
}

/// What a diagnostic applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "target")]
pub enum Scope {
    /// The whole build
    Build,
    /// One output (the label is the output path or entry name)
    Target(String),
}

/// Stable identifiers for diagnostics.
pub mod codes {
    pub const CONFIGURATION: &str = "CONFIGURATION_ERROR";
    pub const NO_ENTRY: &str = "NO_ENTRY";
    pub const AMBIGUOUS_DIRECTIVE: &str = "AMBIGUOUS_DIRECTIVE";
    pub const DUAL_PACKAGE_HAZARD: &str = "DUAL_PACKAGE_HAZARD";
    pub const EXPERIMENTAL_WILDCARD: &str = "EXPERIMENTAL_WILDCARD";
    pub const MISSING_SOURCE: &str = "MISSING_SOURCE";
    pub const BUNDLE_FAILED: &str = "BUNDLE_FAILED";
    pub const COMPILER_UNAVAILABLE: &str = "COMPILER_UNAVAILABLE";
    pub const DECLARATION_FAILED: &str = "DECLARATION_FAILED";
    pub const TSCONFIG: &str = "TSCONFIG";
    pub const SIDEBAND_STRIPPED: &str = "SIDEBAND_STRIPPED";
    pub const UNRESOLVED_BINDING: &str = "UNRESOLVED_BINDING";
    pub const MANIFEST_LINT: &str = "MANIFEST_LINT";
    pub const IO: &str = "IO_ERROR";
}

/// One categorized build outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub scope: Scope,
    pub code: &'static str,
    pub message: String,
    /// Offending manifest field, e.g. `exports["."].require`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Offending file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        scope: Scope,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            scope,
            code,
            message: message.into(),
            field: None,
            file: None,
        }
    }

    pub fn warning(scope: Scope, code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, scope, code, message)
    }

    pub fn target_fatal(
        target: impl Into<String>,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Fatal, Scope::Target(target.into()), code, message)
    }

    pub fn experimental(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Experimental, Scope::Build, code, message)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Fatal for the whole build (as opposed to one target).
    pub fn is_build_fatal(&self) -> bool {
        self.severity == Severity::Fatal && self.scope == Scope::Build
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity.label(), self.code)?;
        if let Scope::Target(target) = &self.scope {
            write!(f, " {target}:")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(field) = &self.field {
            write!(f, " (at `{field}`)")?;
        }
        if let Some(file) = &self.file {
            write!(f, " ({})", file.display())?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic, mirroring it to the tracing log.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Fatal => tracing::error!(code = diagnostic.code, "{}", diagnostic.message),
            Severity::Warning => tracing::warn!(code = diagnostic.code, "{}", diagnostic.message),
            Severity::Experimental => {
                tracing::info!(code = diagnostic.code, "{}", diagnostic.message)
            }
        }
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_field_and_target() {
        let diagnostic = Diagnostic::target_fatal(
            "dist/index.d.ts",
            codes::COMPILER_UNAVAILABLE,
            "Could not load TypeScript compiler",
        )
        .with_field("types");
        assert_eq!(
            diagnostic.to_string(),
            "error [COMPILER_UNAVAILABLE] dist/index.d.ts: Could not load TypeScript compiler (at `types`)"
        );
        assert!(!diagnostic.is_build_fatal());
    }

    #[test]
    fn build_scope_fatal() {
        let diagnostic = Diagnostic::new(
            Severity::Fatal,
            Scope::Build,
            codes::NO_ENTRY,
            "no entries",
        );
        assert!(diagnostic.is_build_fatal());
    }
}
