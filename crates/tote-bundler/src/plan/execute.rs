//! Two-phase execution of a [`BuildPlan`].
//!
//! Phase 1 bundles every invocation concurrently and only produces module
//! graphs in memory. Phase 2 runs on a single task: it merges the graphs of
//! each format, splits them into chunks, names shared chunks, renders every
//! file and writes everything in one atomic batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tote_config::{Runtime, ToteConfig};
use tracing::Instrument;

use super::BuildPlan;
use crate::bundle::{BundleCapability, BundleError};
use crate::diagnostics::{Diagnostic, Diagnostics, Scope, codes};
use crate::dts::{DeclarationCompiler, DeclarationTarget, TsConfig, emit_declarations};
use crate::error::{Error, Result};
use crate::format::OutputFormat;
use crate::graph::ModuleGraph;
use crate::output::{Artifact, ArtifactKind, clean_dir, remove_stale, write_artifacts};
use crate::render::{RenderUnit, Renderer, UnitKind};
use crate::report::ReportedArtifact;
use crate::shims::apply_shims;
use crate::splitter::{ChunkNamer, FormatGraph, check_directives, split};
use crate::target::display_path;

/// The pluggable capabilities a build runs against.
#[derive(Clone)]
pub struct Capabilities {
    pub bundler: Arc<dyn BundleCapability>,
    pub compiler: Arc<dyn DeclarationCompiler>,
}

enum Failure {
    /// Affects the targets of one invocation
    Bundle(BundleError),
    /// Aborts the build
    Fatal(Error),
}

/// Run both phases and return the written artifacts in the order they were
/// finalized: bundles, then shared chunks, then declarations.
pub async fn execute(
    root: &Path,
    plan: &BuildPlan,
    config: &ToteConfig,
    tsconfig: &TsConfig,
    capabilities: &Capabilities,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<ReportedArtifact>> {
    let max_parallel = config
        .max_parallel
        .unwrap_or_else(|| num_cpus::get().min(8));
    let graphs = bundle_all(plan, &capabilities.bundler, max_parallel, diagnostics).await?;

    let mut artifacts = render_all(root, plan, &graphs, config, diagnostics)?;

    // Declarations of targets whose bundle failed are not emitted, and stale
    // copies are removed like any other failed declaration.
    let unbundled: FxHashSet<(&str, &Path, OutputFormat)> = plan
        .invocations
        .iter()
        .zip(&graphs)
        .filter(|(_, graph)| graph.is_none())
        .flat_map(|(invocation, _)| {
            invocation.targets.iter().map(|&t| {
                (
                    plan.targets[t].entry.as_str(),
                    invocation.source.as_path(),
                    invocation.format,
                )
            })
        })
        .collect();
    let (skipped, declarations): (Vec<DeclarationTarget>, Vec<DeclarationTarget>) =
        plan.declarations.iter().cloned().partition(|declaration| {
            unbundled.contains(&(
                declaration.entry.as_str(),
                declaration.source.as_path(),
                declaration.format,
            ))
        });
    for declaration in &skipped {
        tracing::debug!(output = %declaration.label(), "bundle failed; declaration skipped");
    }

    let mut outcome = emit_declarations(
        &declarations,
        capabilities.compiler.as_ref(),
        tsconfig,
        diagnostics,
    )
    .await;
    outcome.failed.extend(skipped);
    artifacts.extend(outcome.emitted.into_iter().map(|(target, text)| {
        Artifact::new(root.join(&target.output), text, ArtifactKind::Declaration)
    }));

    if config.clean {
        clean_dir(root, &config.out_dir)?;
    }
    write_artifacts(root, &artifacts)?;
    let stale: Vec<PathBuf> = outcome
        .failed
        .iter()
        .map(|target| root.join(&target.output))
        .collect();
    remove_stale(root, &stale)?;

    tracing::info!(artifacts = artifacts.len(), "build output written");

    Ok(artifacts
        .into_iter()
        .map(|artifact| ReportedArtifact {
            path: artifact
                .path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or(artifact.path),
            kind: artifact.kind,
        })
        .collect())
}

/// Phase 1: one task per invocation, bounded by a semaphore. Results are
/// stored by invocation index so later phases see them in plan order.
async fn bundle_all(
    plan: &BuildPlan,
    bundler: &Arc<dyn BundleCapability>,
    max_parallel: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Option<ModuleGraph>>> {
    let mut join_set = JoinSet::new();
    let semaphore = Arc::new(Semaphore::new(max_parallel));

    for (index, invocation) in plan.invocations.iter().enumerate() {
        let bundler = Arc::clone(bundler);
        let permit = Arc::clone(&semaphore);
        let source = invocation.source.clone();
        let format = invocation.format;
        let span = tracing::info_span!("bundle", entry = %invocation.entry, format = %format);

        join_set.spawn(
            async move {
                let Ok(_permit) = permit.acquire().await else {
                    return (index, Err(Failure::Bundle(BundleError::Other("scheduler closed".into()))));
                };
                tracing::debug!(source = %source.display(), "bundling");
                let outcome = match bundler.bundle(&source, format).await {
                    Ok(graph) => match check_directives(&graph, format) {
                        Ok(()) => Ok(graph),
                        Err(err) => Err(Failure::Fatal(err)),
                    },
                    Err(err) => Err(Failure::Bundle(err)),
                };
                (index, outcome)
            }
            .instrument(span),
        );
    }

    let mut graphs: Vec<Option<ModuleGraph>> = plan.invocations.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(graph))) => {
                tracing::debug!(
                    entry = %plan.invocations[index].entry,
                    modules = graph.modules.len(),
                    "bundled"
                );
                graphs[index] = Some(graph);
            }
            Ok((index, Err(Failure::Bundle(err)))) => {
                record_bundle_failure(plan, index, &err, diagnostics);
            }
            Ok((_, Err(Failure::Fatal(err)))) => {
                join_set.abort_all();
                while join_set.join_next().await.is_some() {}
                tracing::debug!("whole-build failure during bundling; discarded phase 1 results");
                return Err(err);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                diagnostics.push(
                    Error::Bundle {
                        entry: "unknown".into(),
                        message: format!("bundle task panicked: {join_err}"),
                    }
                    .to_diagnostic(),
                );
            }
        }
    }

    Ok(graphs)
}

fn record_bundle_failure(
    plan: &BuildPlan,
    index: usize,
    err: &BundleError,
    diagnostics: &mut Diagnostics,
) {
    for &t in &plan.invocations[index].targets {
        let target = &plan.targets[t];
        let mut diagnostic = Error::Bundle {
            entry: target.label(),
            message: err.to_string(),
        }
        .to_diagnostic()
        .with_field(target.field.to_string());
        if let Some(file) = err.file() {
            diagnostic = diagnostic.with_file(file);
        }
        diagnostics.push(diagnostic);
    }
}

/// Phase 2 up to writing: split, name and render every format.
fn render_all(
    root: &Path,
    plan: &BuildPlan,
    graphs: &[Option<ModuleGraph>],
    config: &ToteConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Artifact>> {
    let out_dir = config.out_path(root);
    let mut namer = ChunkNamer::new(plan.reserved_outputs().map(|p| root.join(p)));
    let mut bundles: Vec<Option<Artifact>> = plan.targets.iter().map(|_| None).collect();
    let mut chunks = Vec::new();

    for format in plan.formats() {
        let members: Vec<(usize, &ModuleGraph)> = plan
            .invocations
            .iter()
            .enumerate()
            .filter(|(_, invocation)| invocation.format == format)
            .filter_map(|(index, _)| graphs[index].as_ref().map(|graph| (index, graph)))
            .collect();
        if members.is_empty() {
            continue;
        }

        let graph = FormatGraph::merge(format, &members);
        let chunk_plan = split(&graph)?;

        let mut chunk_paths = FxHashMap::default();
        for (index, chunk) in chunk_plan.chunks.iter().enumerate() {
            if chunk.is_standalone() {
                let path = namer.name(&out_dir, &graph, chunk, plan.module_type);
                tracing::debug!(
                    format = %format,
                    chunk = %path.display(),
                    importers = chunk.reachability(),
                    "named shared chunk"
                );
                chunk_paths.insert(index, path);
            }
        }

        let renderer = Renderer::new(&graph, &chunk_plan, &chunk_paths);
        for (view, linked) in graph.views.iter().enumerate() {
            for &t in &plan.invocations[linked.invocation].targets {
                let target = &plan.targets[t];
                let unit = RenderUnit {
                    path: root.join(&target.output),
                    kind: UnitKind::Entry { view },
                    hashbang: target.executable.then(|| config.hashbang.clone()),
                };
                let contents = finish(&renderer, &unit, config.runtime, target.label(), diagnostics);
                bundles[t] = Some(
                    Artifact::new(unit.path, contents, ArtifactKind::Bundle)
                        .executable(target.executable),
                );
            }
        }

        for index in 0..chunk_plan.chunks.len() {
            let Some(path) = chunk_paths.get(&index) else {
                continue;
            };
            let unit = RenderUnit {
                path: path.clone(),
                kind: UnitKind::Chunk { chunk: index },
                hashbang: None,
            };
            let label = display_path(path.strip_prefix(root).unwrap_or(path));
            let contents = finish(&renderer, &unit, config.runtime, label, diagnostics);
            chunks.push(Artifact::new(unit.path, contents, ArtifactKind::Chunk));
        }
    }

    let mut artifacts: Vec<Artifact> = bundles.into_iter().flatten().collect();
    artifacts.extend(chunks);
    Ok(artifacts)
}

fn finish(
    renderer: &Renderer<'_, '_>,
    unit: &RenderUnit,
    runtime: Runtime,
    label: String,
    diagnostics: &mut Diagnostics,
) -> String {
    let mut file = renderer.render(unit);
    let shims = apply_shims(&mut file, renderer.format(), runtime);
    if shims > 0 {
        tracing::debug!(output = %label, shims, "applied shims");
    }
    for warning in file.warnings.drain(..) {
        diagnostics.push(Diagnostic::warning(
            Scope::Target(label.clone()),
            codes::UNRESOLVED_BINDING,
            warning,
        ));
    }
    file.assemble()
}
