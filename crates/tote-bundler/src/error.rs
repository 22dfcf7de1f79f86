use std::path::PathBuf;

use tote_config::ConfigError;
use tote_manifest::ManifestError;

use crate::diagnostics::{Diagnostic, Scope, Severity, codes};

/// No entry could be resolved from the manifest or the source directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no entry files found in `{}`", .src_dir.display())]
pub struct NoEntryError {
    /// The directory that was scanned
    pub src_dir: PathBuf,
}

impl NoEntryError {
    pub fn usage(&self) -> String {
        format!(
            "Add `{}/index.ts` (or .tsx, .js, .mjs, ...) or declare `exports`, `main` or `bin` in package.json. Run `tote --help` for usage.",
            self.src_dir.display()
        )
    }
}

/// Error types for tote-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest's declared shape violates a packaging rule.
    #[error("{message} (at `{field}`)")]
    Configuration { field: String, message: String },

    /// Nothing to build.
    #[error(transparent)]
    Resolution(#[from] NoEntryError),

    /// A module is reachable from both a client and a server directive root.
    #[error(
        "module `{module}` is reachable from the \"use client\" module `{client_root}` and the \"use server\" module `{server_root}`"
    )]
    AmbiguousDirective {
        module: String,
        client_root: String,
        server_root: String,
    },

    #[error("Invalid package.json: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// The bundling capability failed for one entry.
    #[error("failed to bundle `{entry}`: {message}")]
    Bundle { entry: String, message: String },

    /// No declaration compiler is available.
    #[error("Could not load TypeScript compiler")]
    CompilerUnavailable { target: String },

    /// The declaration compiler reported errors.
    #[error("declaration generation failed for `{target}`: {}", .messages.join("; "))]
    Declaration {
        target: String,
        messages: Vec<String>,
    },
}

/// Result type alias for tote-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whole-build failures abort emission entirely. Bundle and declaration
    /// failures only affect their own target.
    pub fn is_build_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Bundle { .. } | Error::CompilerUnavailable { .. } | Error::Declaration { .. }
        )
    }

    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Error::Configuration { .. } | Error::Manifest(_) | Error::Config(_) => {
                codes::CONFIGURATION
            }
            Error::Resolution(_) => codes::NO_ENTRY,
            Error::AmbiguousDirective { .. } => codes::AMBIGUOUS_DIRECTIVE,
            Error::Io(_) | Error::InvalidOutputPath(_) | Error::WriteFailure(_) => codes::IO,
            Error::Bundle { .. } => codes::BUNDLE_FAILED,
            Error::CompilerUnavailable { .. } => codes::COMPILER_UNAVAILABLE,
            Error::Declaration { .. } => codes::DECLARATION_FAILED,
        }
    }

    /// The diagnostic recorded for this error.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let scope = match self {
            Error::Bundle { entry, .. } => Scope::Target(entry.clone()),
            Error::CompilerUnavailable { target } | Error::Declaration { target, .. } => {
                Scope::Target(target.clone())
            }
            _ => Scope::Build,
        };
        let message = match self {
            Error::Configuration { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let mut diagnostic = Diagnostic::new(Severity::Fatal, scope, self.diagnostic_code(), message);
        match self {
            Error::Configuration { field, .. } => diagnostic = diagnostic.with_field(field.clone()),
            Error::Manifest(err) => {
                if let Some(field) = err.field() {
                    diagnostic = diagnostic.with_field(field);
                }
            }
            Error::Resolution(err) => diagnostic = diagnostic.with_file(err.src_dir.clone()),
            Error::AmbiguousDirective { module, .. } => {
                diagnostic = diagnostic.with_file(module.clone())
            }
            _ => {}
        }
        diagnostic
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(self.diagnostic_code()))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Configuration { field, .. } => Some(Box::new(format!(
                "Fix `{field}` in package.json; nothing was written."
            ))),
            Error::Resolution(err) => Some(Box::new(err.usage())),
            Error::AmbiguousDirective { module, .. } => Some(Box::new(format!(
                "Move the code shared by client and server components out of `{module}`'s import chain, or give `{module}` its own directive."
            ))),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it's within the package directory and doesn't contain '..' components.",
                path
            ))),
            Error::WriteFailure(msg) => Some(Box::new(format!(
                "Failed to write file. Check disk space and permissions.\nError: {}",
                msg
            ))),
            Error::CompilerUnavailable { .. } => Some(Box::new(
                "Build with the `dts-generation` feature or disable declarations with `--no-dts`.",
            )),
            _ => None,
        }
    }
}
