//! The outcome of a build: the artifact manifest and its diagnostics.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::diagnostics::{Diagnostic, Severity};
use crate::error::Error;
use crate::output::ArtifactKind;

/// One emitted file, relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Emitted files in the order they were finalized
    pub artifacts: Vec<ReportedArtifact>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    /// Report of a build that failed as a whole; nothing was written.
    pub fn aborted(error: &Error, diagnostics: Vec<Diagnostic>) -> Self {
        let fatal = error.to_diagnostic();
        let mut diagnostics = diagnostics;
        if !diagnostics.contains(&fatal) {
            diagnostics.push(fatal);
        }
        Self {
            artifacts: Vec::new(),
            diagnostics,
        }
    }

    /// Emitted paths, one per artifact.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(|a| a.path.as_path())
    }

    pub fn is_build_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_build_fatal)
    }

    /// Process exit status: `1` when the whole build failed, `0` otherwise,
    /// even if individual targets failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_build_fatal() { 1 } else { 0 }
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    /// Plain-text rendering: one line per emitted path, then diagnostics
    /// grouped by severity.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .paths()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();

        for severity in [Severity::Fatal, Severity::Warning, Severity::Experimental] {
            let group: Vec<String> = self.with_severity(severity).map(|d| d.to_string()).collect();
            if group.is_empty() {
                continue;
            }
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(group);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Scope, codes};

    fn artifact(path: &str, kind: ArtifactKind) -> ReportedArtifact {
        ReportedArtifact {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn target_failures_keep_exit_code_zero() {
        let report = BuildReport {
            artifacts: vec![artifact("dist/index.js", ArtifactKind::Bundle)],
            diagnostics: vec![Diagnostic::target_fatal(
                "dist/index.d.ts",
                codes::COMPILER_UNAVAILABLE,
                "Could not load TypeScript compiler",
            )],
        };
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn aborted_build_exits_nonzero() {
        let err = Error::configuration("main", "bad main");
        let report = BuildReport::aborted(&err, Vec::new());
        assert_eq!(report.exit_code(), 1);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn render_lists_paths_then_grouped_diagnostics() {
        let report = BuildReport {
            artifacts: vec![
                artifact("dist/index.js", ArtifactKind::Bundle),
                artifact("dist/index.d.ts", ArtifactKind::Declaration),
            ],
            diagnostics: vec![
                Diagnostic::experimental(codes::EXPERIMENTAL_WILDCARD, "wildcards"),
                Diagnostic::warning(Scope::Build, codes::DUAL_PACKAGE_HAZARD, "hazard"),
            ],
        };
        let text = report.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "dist/index.js");
        assert_eq!(lines[1], "dist/index.d.ts");
        assert_eq!(lines[2], "");
        assert!(lines[3].contains("hazard"));
        assert!(lines[5].contains("wildcards"));
    }
}
