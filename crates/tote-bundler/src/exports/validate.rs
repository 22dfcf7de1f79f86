//! Packaging-correctness rules over the full target set.

use std::path::PathBuf;

use indexmap::IndexMap;
use tote_manifest::ModuleType;

use crate::diagnostics::{Diagnostic, Diagnostics, Scope, codes};
use crate::error::{Error, Result};
use crate::format::OutputFormat;
use crate::target::{BuildTarget, TargetKind};

const MAIN_ENTRY: &str = ".";

/// Check every target against the packaging rules and collapse duplicates.
///
/// Returns the surviving targets in declaration order. Fatal violations are
/// returned as [`Error::Configuration`] before anything is built; hazards are
/// recorded in `diagnostics`.
pub fn validate_targets(
    targets: Vec<BuildTarget>,
    module_type: ModuleType,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<BuildTarget>> {
    for target in &targets {
        check_explicit_extension(target)?;
    }
    check_main_entry(&targets, module_type)?;

    let mut by_output: IndexMap<PathBuf, BuildTarget> = IndexMap::new();
    for target in targets {
        let Some(existing) = by_output.get(&target.output) else {
            by_output.insert(target.output.clone(), target);
            continue;
        };

        if existing.source != target.source {
            return Err(Error::configuration(
                target.field.to_string(),
                format!(
                    "`{}` is also produced from `{}` (at `{}`); one output file cannot hold two sources",
                    target.label(),
                    existing.source.display(),
                    existing.field
                ),
            ));
        }

        match (existing.kind, target.kind) {
            (a, b) if a == b => {
                tracing::debug!(output = %target.label(), field = %target.field, "duplicate target collapsed");
            }
            (TargetKind::Bundle { format: kept }, TargetKind::Bundle { format: other }) => {
                let natural = OutputFormat::natural(&target.label(), module_type);
                let (winner, loser) = if other == natural {
                    (target.clone(), existing.clone())
                } else {
                    (existing.clone(), target.clone())
                };
                diagnostics.push(
                    Diagnostic::warning(
                        Scope::Target(winner.label()),
                        codes::DUAL_PACKAGE_HAZARD,
                        format!(
                            "`{}` is declared as both {kept} (at `{}`) and {other} (at `{}`); only the {} build is written, so consumers of the other condition receive a different module instance",
                            winner.label(),
                            existing.field,
                            target.field,
                            winner.kind.format().unwrap_or(natural),
                        ),
                    )
                    .with_field(loser.field.to_string()),
                );
                by_output.insert(winner.output.clone(), winner);
            }
            _ => {
                tracing::debug!(output = %target.label(), "declaration and bundle share an output path");
            }
        }
    }

    Ok(by_output.into_values().collect())
}

/// `require` pointing at `.mjs`, or `import`/`module` pointing at `.cjs`.
fn check_explicit_extension(target: &BuildTarget) -> Result<()> {
    let (Some(format), Some(condition)) = (target.format(), target.decided_by.as_deref()) else {
        return Ok(());
    };
    let Some(extension_format) = OutputFormat::from_extension(&target.label()) else {
        return Ok(());
    };
    if extension_format != format {
        return Err(Error::configuration(
            target.field.to_string(),
            format!(
                "the `{condition}` condition expects {format} but `{}` is always loaded as {extension_format}",
                target.label()
            ),
        ));
    }
    Ok(())
}

/// A CommonJS `.cjs` file cannot be the sole unconditioned main entry of a
/// `"type": "module"` package.
fn check_main_entry(targets: &[BuildTarget], module_type: ModuleType) -> Result<()> {
    if !module_type.is_module() {
        return Ok(());
    }
    let has_esm_main = targets.iter().any(|t| {
        t.entry == MAIN_ENTRY && t.kind == TargetKind::Bundle { format: OutputFormat::Esm }
    });
    if has_esm_main {
        return Ok(());
    }

    let offending = targets.iter().find(|t| {
        t.entry == MAIN_ENTRY
            && t.kind == TargetKind::Bundle { format: OutputFormat::Cjs }
            && t.label().ends_with(".cjs")
            && t
                .conditions
                .iter()
                .all(|c| matches!(c.as_str(), "require" | "default"))
    });
    match offending {
        Some(target) => Err(Error::configuration(
            target.field.to_string(),
            format!(
                "`{}` is CommonJS but it is the only main entry of a \"type\": \"module\" package; add an ES module build for `.` or drop \"type\": \"module\"",
                target.label()
            ),
        )),
        None => Ok(()),
    }
}
