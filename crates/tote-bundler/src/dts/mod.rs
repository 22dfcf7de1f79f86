//! Declaration assembler.
//!
//! Every bundle target of a TypeScript entry gets a declaration file next to
//! it (`.d.ts`, `.d.mts` or `.d.cts` by output extension), and every
//! declaration leaf in the manifest (`types` conditions, the legacy `types`
//! field) gets one at its declared path. The text comes from a
//! [`DeclarationCompiler`]; failures are recorded against that file only.

mod isolated;
mod tsconfig;

#[cfg(feature = "dts-generation")]
pub use isolated::IsolatedDeclarationsCompiler;
pub use isolated::loose_declarations;
pub use tsconfig::{CompilerOptionsFile, TsConfig};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tote_config::ToteConfig;
use tote_manifest::{FieldPath, ModuleType};

use crate::diagnostics::{Diagnostic, Diagnostics, Scope, codes};
use crate::entries::is_typescript;
use crate::error::Error;
use crate::format::OutputFormat;
use crate::target::{BuildTarget, TargetKind, display_path};

/// One input file handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

/// Options the compiler runs with. Build-metadata settings from the project
/// file are cleared before a request is made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub allow_js: bool,
    pub strip_internal: bool,
    pub incremental: bool,
    pub composite: bool,
    pub ts_build_info_file: Option<PathBuf>,
    pub no_emit: bool,
}

impl CompilerOptions {
    pub fn from_project(file: &CompilerOptionsFile) -> Self {
        Self {
            allow_js: file.allow_js,
            strip_internal: file.strip_internal,
            incremental: file.incremental,
            composite: file.composite,
            ts_build_info_file: file.ts_build_info_file.clone(),
            no_emit: file.no_emit,
        }
    }

    /// Drop settings that make a compiler write build metadata or skip output.
    pub fn sanitized(mut self) -> Self {
        if self.incremental || self.composite || self.ts_build_info_file.is_some() {
            tracing::debug!("disabling incremental compiler state for declaration emit");
        }
        self.incremental = false;
        self.composite = false;
        self.ts_build_info_file = None;
        self.no_emit = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationRequest {
    /// The entry source first
    pub sources: Vec<SourceFile>,
    pub options: CompilerOptions,
}

/// A file the compiler produced besides the declaration (build info etc.).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebandFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedTypes {
    pub declaration: String,
    pub sideband: Vec<SidebandFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationFailure {
    #[error("Could not load TypeScript compiler")]
    Unavailable,
    #[error("{}", .0.join("; "))]
    Diagnostics(Vec<String>),
}

/// The declaration-generation capability.
pub trait DeclarationCompiler: Send + Sync {
    fn emit_types(&self, request: &DeclarationRequest) -> Result<EmittedTypes, DeclarationFailure>;
}

/// A compiler that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCompiler;

impl DeclarationCompiler for UnavailableCompiler {
    fn emit_types(&self, _request: &DeclarationRequest) -> Result<EmittedTypes, DeclarationFailure> {
        Err(DeclarationFailure::Unavailable)
    }
}

/// The compiler used when none is configured.
pub fn default_compiler() -> Arc<dyn DeclarationCompiler> {
    #[cfg(feature = "dts-generation")]
    {
        Arc::new(IsolatedDeclarationsCompiler)
    }
    #[cfg(not(feature = "dts-generation"))]
    {
        Arc::new(UnavailableCompiler)
    }
}

/// A declaration file to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationTarget {
    pub entry: String,
    pub source: PathBuf,
    /// Package-relative output path
    pub output: PathBuf,
    /// Format of the code the declaration describes
    pub format: OutputFormat,
    pub field: FieldPath,
}

impl DeclarationTarget {
    pub fn label(&self) -> String {
        display_path(&self.output)
    }
}

/// Work out every declaration file the build produces.
pub fn assemble_targets(
    targets: &[BuildTarget],
    config: &ToteConfig,
    tsconfig: &TsConfig,
    module_type: ModuleType,
    diagnostics: &mut Diagnostics,
) -> Vec<DeclarationTarget> {
    if !config.dts {
        tracing::debug!("declarations disabled");
        return Vec::new();
    }

    let mut assembled: IndexMap<PathBuf, DeclarationTarget> = IndexMap::new();
    for target in targets {
        let (output, format, explicit) = match target.kind {
            TargetKind::Declaration => {
                let label = target.label();
                let format = if label.ends_with(".d.mts") {
                    OutputFormat::Esm
                } else if label.ends_with(".d.cts") {
                    OutputFormat::Cjs
                } else {
                    OutputFormat::for_package(module_type)
                };
                (target.output.clone(), format, true)
            }
            TargetKind::Bundle { format } => {
                (OutputFormat::declaration_path_for(&target.output), format, false)
            }
        };

        let checkable = is_typescript(&target.source)
            || tsconfig.compiler_options.allow_js
            || config.allow_js.iter().any(|js| format.matches(*js));
        if !checkable {
            if explicit {
                diagnostics.push(
                    Diagnostic::warning(
                        Scope::Target(target.label()),
                        codes::DECLARATION_FAILED,
                        format!(
                            "`{}` is plain JavaScript; declarations for it need `allowJs`",
                            target.source.display()
                        ),
                    )
                    .with_field(target.field.to_string()),
                );
            }
            continue;
        }

        assembled.entry(output.clone()).or_insert_with(|| DeclarationTarget {
            entry: target.entry.clone(),
            source: target.source.clone(),
            output,
            format,
            field: target.field.clone(),
        });
    }

    let assembled: Vec<_> = assembled.into_values().collect();
    tracing::debug!(count = assembled.len(), "assembled declaration targets");
    assembled
}

/// Result of running the compiler over all declaration targets.
#[derive(Debug, Default)]
pub struct DeclarationOutcome {
    /// Output path and text, in target order
    pub emitted: Vec<(DeclarationTarget, String)>,
    /// Targets that produced nothing; stale files at these paths are removed
    pub failed: Vec<DeclarationTarget>,
}

/// Run `compiler` for every target. Sources are read once up front; results
/// are shared between targets built from the same source.
pub async fn emit_declarations(
    targets: &[DeclarationTarget],
    compiler: &dyn DeclarationCompiler,
    tsconfig: &TsConfig,
    diagnostics: &mut Diagnostics,
) -> DeclarationOutcome {
    let mut texts: FxHashMap<&Path, Result<String, String>> = FxHashMap::default();
    for target in targets {
        if texts.contains_key(target.source.as_path()) {
            continue;
        }
        let text = tokio::fs::read_to_string(&target.source)
            .await
            .map_err(|err| format!("cannot read `{}`: {err}", target.source.display()));
        texts.insert(target.source.as_path(), text);
    }

    let options = CompilerOptions::from_project(&tsconfig.compiler_options).sanitized();
    let mut cache: FxHashMap<&Path, Result<String, DeclarationFailure>> = FxHashMap::default();
    let mut outcome = DeclarationOutcome::default();
    let mut stripped = Vec::new();

    for target in targets {
        let result = cache.entry(target.source.as_path()).or_insert_with(|| {
            let text = match texts.get(target.source.as_path()) {
                Some(Ok(text)) => text.clone(),
                Some(Err(message)) => {
                    return Err(DeclarationFailure::Diagnostics(vec![message.clone()]));
                }
                None => return Err(DeclarationFailure::Diagnostics(Vec::new())),
            };
            let request = DeclarationRequest {
                sources: vec![SourceFile {
                    path: target.source.clone(),
                    text,
                }],
                options: options.clone(),
            };
            let emitted = compiler.emit_types(&request)?;
            for file in emitted.sideband {
                tracing::debug!(path = %file.path.display(), "discarding compiler sideband output");
                stripped.push(file.path);
            }
            Ok(emitted.declaration)
        });

        match result {
            Ok(text) => {
                tracing::debug!(output = %target.label(), "declaration generated");
                outcome.emitted.push((target.clone(), text.clone()));
            }
            Err(failure) => {
                let error = match failure {
                    DeclarationFailure::Unavailable => Error::CompilerUnavailable {
                        target: target.label(),
                    },
                    DeclarationFailure::Diagnostics(messages) => Error::Declaration {
                        target: target.label(),
                        messages: messages.clone(),
                    },
                };
                diagnostics.push(
                    error
                        .to_diagnostic()
                        .with_field(target.field.to_string())
                        .with_file(target.source.clone()),
                );
                outcome.failed.push(target.clone());
            }
        }
    }

    if !stripped.is_empty() {
        let names: Vec<String> = stripped.iter().map(|p| p.display().to_string()).collect();
        diagnostics.push(Diagnostic::warning(
            Scope::Build,
            codes::SIDEBAND_STRIPPED,
            format!(
                "the declaration compiler produced build metadata that was not written: {}",
                names.join(", ")
            ),
        ));
    }

    outcome
}
