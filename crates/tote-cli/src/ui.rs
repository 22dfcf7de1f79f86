//! Terminal output for build reports.

use std::io::IsTerminal;

use owo_colors::OwoColorize;
use tote_bundler::{BuildReport, Diagnostic, Severity};

/// Whether stderr output should be colored.
///
/// `--no-color` and `NO_COLOR` disable colors, `FORCE_COLOR` enables them
/// even when stderr is not a terminal.
pub fn should_use_color(no_color: bool) -> bool {
    if no_color || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    std::io::stderr().is_terminal()
}

/// Prints reports: emitted paths on stdout, everything else on stderr.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    pub color: bool,
    pub quiet: bool,
}

impl Printer {
    pub fn new(color: bool, quiet: bool) -> Self {
        Self { color, quiet }
    }

    pub fn report(&self, report: &BuildReport) {
        for path in report.paths() {
            println!("{}", path.to_string_lossy().replace('\\', "/"));
        }

        for severity in [Severity::Fatal, Severity::Warning, Severity::Experimental] {
            if self.quiet && severity != Severity::Fatal {
                continue;
            }
            for diagnostic in report.with_severity(severity) {
                eprintln!("{}", self.diagnostic(diagnostic));
            }
        }

        if self.quiet {
            return;
        }
        let count = report.artifacts.len();
        let noun = if count == 1 { "file" } else { "files" };
        if report.exit_code() == 0 {
            self.status("✓", &format!("wrote {count} {noun}"), true);
        } else {
            self.status("✗", "build failed; nothing was written", false);
        }
    }

    /// One diagnostic line, e.g. `warning [DUAL_PACKAGE_HAZARD] dist/index.js: ...`.
    pub fn diagnostic(&self, diagnostic: &Diagnostic) -> String {
        let text = diagnostic.to_string();
        if !self.color {
            return text;
        }
        match diagnostic.severity {
            Severity::Fatal => text.red().to_string(),
            Severity::Warning => text.yellow().to_string(),
            Severity::Experimental => text.cyan().to_string(),
        }
    }

    pub fn status(&self, mark: &str, message: &str, ok: bool) {
        match (self.color, ok) {
            (false, _) => eprintln!("{mark} {message}"),
            (true, true) => eprintln!("{} {message}", mark.green().bold()),
            (true, false) => eprintln!("{} {}", mark.red().bold(), message.red()),
        }
    }
}
