//! The build plan: every target of every entry, collapsed into the minimal
//! set of bundler invocations.
//!
//! Targets that share a source file and an output format are served by one
//! invocation; its rendered output is written to each target's path.

mod execute;

pub use execute::{Capabilities, execute};

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tote_config::ToteConfig;
use tote_manifest::{Manifest, ModuleType};

use crate::diagnostics::Diagnostics;
use crate::dts::{DeclarationTarget, TsConfig, assemble_targets};
use crate::entries::resolve_entries;
use crate::error::Result;
use crate::exports::{targets_for_entry, validate_targets};
use crate::format::OutputFormat;
use crate::target::BuildTarget;

/// One call into the bundling capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub source: PathBuf,
    pub format: OutputFormat,
    /// Entry of the first target served
    pub entry: String,
    /// Indices into [`BuildPlan::targets`]
    pub targets: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub module_type: ModuleType,
    pub targets: Vec<BuildTarget>,
    pub invocations: Vec<Invocation>,
    pub declarations: Vec<DeclarationTarget>,
}

impl BuildPlan {
    /// Group bundle targets by `(source, format)`, keeping first-seen order.
    pub fn new(
        module_type: ModuleType,
        targets: Vec<BuildTarget>,
        declarations: Vec<DeclarationTarget>,
    ) -> Self {
        let mut grouped: IndexMap<(PathBuf, OutputFormat), Invocation> = IndexMap::new();
        for (index, target) in targets.iter().enumerate() {
            let Some(format) = target.format() else {
                continue;
            };
            grouped
                .entry((target.source.clone(), format))
                .or_insert_with(|| Invocation {
                    source: target.source.clone(),
                    format,
                    entry: target.entry.clone(),
                    targets: Vec::new(),
                })
                .targets
                .push(index);
        }

        let invocations: Vec<Invocation> = grouped.into_values().collect();
        tracing::debug!(
            targets = targets.len(),
            invocations = invocations.len(),
            declarations = declarations.len(),
            "build plan ready"
        );
        Self {
            module_type,
            targets,
            invocations,
            declarations,
        }
    }

    /// Formats with at least one invocation, ES modules first.
    pub fn formats(&self) -> Vec<OutputFormat> {
        OutputFormat::ALL
            .into_iter()
            .filter(|format| self.invocations.iter().any(|i| i.format == *format))
            .collect()
    }

    /// Package-relative paths no chunk may take.
    pub fn reserved_outputs(&self) -> impl Iterator<Item = &Path> {
        self.targets
            .iter()
            .map(|t| t.output.as_path())
            .chain(self.declarations.iter().map(|d| d.output.as_path()))
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty() && self.declarations.is_empty()
    }
}

/// Resolve entries, derive and validate targets, and assemble the plan.
///
/// Every whole-build configuration error surfaces here, before any
/// invocation starts.
pub fn plan_build(
    root: &Path,
    config: &ToteConfig,
    manifest: &Manifest,
    tsconfig: &TsConfig,
    diagnostics: &mut Diagnostics,
) -> Result<BuildPlan> {
    let module_type = manifest.module_type;
    let resolved = resolve_entries(root, &config.src_dir, &config.out_dir, manifest)?;
    diagnostics.extend(resolved.diagnostics);
    if resolved.synthesized {
        tracing::info!("no entry fields declared; using the exports derived from the source tree");
    }

    let mut targets = Vec::new();
    for entry in resolved.entries.values() {
        targets.extend(targets_for_entry(entry, &config.out_dir, module_type)?);
    }
    let targets = validate_targets(targets, module_type, diagnostics)?;
    let declarations = assemble_targets(&targets, config, tsconfig, module_type, diagnostics);

    Ok(BuildPlan::new(module_type, targets, declarations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;
    use tote_manifest::FieldPath;

    fn target(source: &str, format: OutputFormat, output: &str) -> BuildTarget {
        BuildTarget {
            entry: ".".into(),
            source: PathBuf::from(source),
            kind: TargetKind::Bundle { format },
            conditions: Vec::new(),
            output: PathBuf::from(output),
            field: FieldPath::exports().subpath("."),
            decided_by: None,
            executable: false,
        }
    }

    #[test]
    fn same_source_and_format_share_one_invocation() {
        let targets = vec![
            target("/pkg/src/index.ts", OutputFormat::Esm, "dist/index.mjs"),
            target("/pkg/src/index.ts", OutputFormat::Cjs, "dist/index.cjs"),
            target("/pkg/src/index.ts", OutputFormat::Esm, "dist/node/index.mjs"),
            target("/pkg/src/index.edge.ts", OutputFormat::Esm, "dist/edge.mjs"),
        ];
        let plan = BuildPlan::new(ModuleType::CommonJs, targets, Vec::new());

        assert_eq!(plan.invocations.len(), 3);
        assert_eq!(plan.invocations[0].targets, vec![0, 2]);
        assert_eq!(plan.invocations[1].format, OutputFormat::Cjs);
        assert_eq!(plan.formats(), vec![OutputFormat::Esm, OutputFormat::Cjs]);
    }

    #[test]
    fn declaration_only_targets_need_no_invocation() {
        let mut types = target("/pkg/src/index.ts", OutputFormat::Esm, "dist/index.d.ts");
        types.kind = TargetKind::Declaration;
        let plan = BuildPlan::new(ModuleType::Module, vec![types], Vec::new());
        assert!(plan.invocations.is_empty());
        assert!(plan.formats().is_empty());
        assert_eq!(plan.reserved_outputs().count(), 1);
    }
}
