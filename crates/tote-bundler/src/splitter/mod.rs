//! Directive-aware splitting.
//!
//! All module graphs of one output format are merged by module id. Every
//! module carrying `"use client"` / `"use server"` that some invocation
//! reaches as a non-entry module is an isolation root. Each module is
//! colored with the set of origins (invocations and roots) that reach it
//! without crossing another root; modules with the same color form one
//! chunk. A chunk is inlined into its importer when exactly one invocation
//! reaches it and the directives agree, and becomes a standalone file
//! otherwise.

mod naming;

pub use naming::{ChunkNamer, chunk_hash};

use std::collections::BTreeSet;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::format::OutputFormat;
use crate::graph::{
    Directive, ImportBinding, ModuleGraph, ModuleIdx, ModuleNode, ReExport, StarExport,
};

/// A star export with its target mapped into the merged graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedStar<'g> {
    Internal(usize),
    External(&'g str),
}

/// One module of a merged graph, with edges as merged indices.
#[derive(Debug, Clone)]
pub struct LinkedModule<'g> {
    pub node: &'g ModuleNode,
    pub imports: Vec<(usize, &'g [ImportBinding])>,
    pub reexports: Vec<(usize, &'g ReExport)>,
    pub stars: Vec<LinkedStar<'g>>,
    /// Dependencies in source order
    pub deps: Vec<usize>,
}

/// One invocation's view of the merged graph.
#[derive(Debug, Clone)]
pub struct InvocationView {
    /// Index of the invocation in the build plan
    pub invocation: usize,
    pub entry: usize,
    pub members: FxHashSet<usize>,
}

/// All graphs of one format, merged by module id.
#[derive(Debug, Clone)]
pub struct FormatGraph<'g> {
    pub format: OutputFormat,
    pub modules: Vec<LinkedModule<'g>>,
    pub views: Vec<InvocationView>,
}

impl<'g> FormatGraph<'g> {
    /// Merge `(invocation index, graph)` pairs. Modules with the same id are
    /// the same module; the first occurrence provides its body.
    pub fn merge(format: OutputFormat, graphs: &[(usize, &'g ModuleGraph)]) -> Self {
        let mut by_id: FxHashMap<&'g str, usize> = FxHashMap::default();
        let mut owners: Vec<(&'g ModuleNode, &'g ModuleGraph)> = Vec::new();

        for &(_, graph) in graphs {
            for module in &graph.modules {
                by_id.entry(module.id.as_str()).or_insert_with(|| {
                    owners.push((module, graph));
                    owners.len() - 1
                });
            }
        }

        let lookup = |graph: &ModuleGraph, idx: ModuleIdx| -> usize {
            by_id[graph.module(idx).id.as_str()]
        };

        let modules = owners
            .iter()
            .map(|&(node, graph)| {
                let imports: Vec<_> = node
                    .imports
                    .iter()
                    .map(|edge| (lookup(graph, edge.target), edge.bindings.as_slice()))
                    .collect();
                let reexports: Vec<_> = node
                    .reexports
                    .iter()
                    .map(|re| (lookup(graph, re.target), re))
                    .collect();
                let stars: Vec<_> = node
                    .star_exports
                    .iter()
                    .map(|star| match star {
                        StarExport::Internal(idx) => {
                            LinkedStar::Internal(lookup(graph, *idx))
                        }
                        StarExport::External(spec) => LinkedStar::External(spec),
                    })
                    .collect();
                let deps = node.dependencies().map(|idx| lookup(graph, idx)).collect();
                LinkedModule {
                    node,
                    imports,
                    reexports,
                    stars,
                    deps,
                }
            })
            .collect();

        let views = graphs
            .iter()
            .map(|(invocation, graph)| InvocationView {
                invocation: *invocation,
                entry: by_id[graph.entry_module().id.as_str()],
                members: graph.modules.iter().map(|m| by_id[m.id.as_str()]).collect(),
            })
            .collect();

        Self {
            format,
            modules,
            views,
        }
    }

    pub fn id(&self, module: usize) -> &'g str {
        &self.modules[module].node.id
    }

    pub fn directive(&self, module: usize) -> Option<Directive> {
        self.modules[module].node.directive
    }

    /// Dependency-first order of every module, entries in view order.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut visited = vec![false; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        for view in &self.views {
            self.postorder(view.entry, &mut visited, &mut order);
        }
        for module in 0..self.modules.len() {
            self.postorder(module, &mut visited, &mut order);
        }
        order
    }

    fn postorder(&self, start: usize, visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[start] {
            return;
        }
        visited[start] = true;
        // iterative: (module, next dependency to visit)
        let mut stack = vec![(start, 0usize)];
        while let Some((module, next)) = stack.pop() {
            let deps = &self.modules[module].deps;
            if next < deps.len() {
                stack.push((module, next + 1));
                let dep = deps[next];
                if !visited[dep] {
                    visited[dep] = true;
                    stack.push((dep, 0));
                }
            } else {
                order.push(module);
            }
        }
    }
}

/// Where a module's color comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    /// Reached from a view's entry (index into `views`)
    Invocation(usize),
    /// Reached from an isolation root (merged module index)
    Root(usize),
}

/// How a chunk is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Part of the output of this view
    Inline(usize),
    /// A file of its own
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Members in dependency-first order
    pub modules: Vec<usize>,
    pub directive: Option<Directive>,
    /// Views whose graph contains any member
    pub importers: Vec<usize>,
    pub placement: Placement,
    /// Isolation roots that color this chunk (empty for plain shared code)
    pub roots: Vec<usize>,
}

impl Chunk {
    pub fn is_standalone(&self) -> bool {
        self.placement == Placement::Standalone
    }

    /// Number of distinct outputs that import this chunk.
    pub fn reachability(&self) -> usize {
        self.importers.len()
    }
}

/// The chunk layout of one format.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    /// Chunk index of every module reached by some view
    pub module_chunk: FxHashMap<usize, usize>,
    /// Dependency-first order of all modules
    pub order: Vec<usize>,
}

/// Split a merged format graph into chunks.
///
/// Fails with [`Error::AmbiguousDirective`] when a module is reached from
/// both a client and a server origin.
pub fn split(graph: &FormatGraph<'_>) -> Result<ChunkPlan> {
    let roots = isolation_roots(graph);
    let colors = color(graph, &roots)?;
    let order = graph.topological_order();

    let mut groups: IndexMap<Vec<Origin>, Vec<usize>> = IndexMap::new();
    for &module in &order {
        if let Some(key) = colors.get(&module) {
            groups.entry(key.clone()).or_default().push(module);
        }
    }

    let entry_directive = |view: usize| graph.directive(graph.views[view].entry);
    let mut chunks = Vec::with_capacity(groups.len());
    let mut module_chunk = FxHashMap::default();

    for (key, modules) in groups {
        let chunk_roots: Vec<usize> = key
            .iter()
            .filter_map(|origin| match origin {
                Origin::Root(root) => Some(*root),
                Origin::Invocation(_) => None,
            })
            .collect();
        let importers: Vec<usize> = graph
            .views
            .iter()
            .enumerate()
            .filter(|(_, view)| modules.iter().any(|m| view.members.contains(m)))
            .map(|(i, _)| i)
            .collect();

        let (directive, placement) = if let Some(&root) = chunk_roots.first() {
            let directive = graph.directive(root);
            let inline = importers.len() == 1 && entry_directive(importers[0]) == directive;
            let placement = if inline {
                Placement::Inline(importers[0])
            } else {
                Placement::Standalone
            };
            (directive, placement)
        } else {
            let views: Vec<usize> = key
                .iter()
                .filter_map(|origin| match origin {
                    Origin::Invocation(view) => Some(*view),
                    Origin::Root(_) => None,
                })
                .collect();
            if views.len() == 1 {
                (entry_directive(views[0]), Placement::Inline(views[0]))
            } else {
                let first = entry_directive(views[0]);
                let shared = views.iter().all(|v| entry_directive(*v) == first);
                (if shared { first } else { None }, Placement::Standalone)
            }
        };

        let index = chunks.len();
        for &module in &modules {
            module_chunk.insert(module, index);
        }
        tracing::debug!(
            format = %graph.format,
            modules = modules.len(),
            importers = importers.len(),
            standalone = placement == Placement::Standalone,
            directive = ?directive,
            "chunk formed"
        );
        chunks.push(Chunk {
            modules,
            directive,
            importers,
            placement,
            roots: chunk_roots,
        });
    }

    Ok(ChunkPlan {
        chunks,
        module_chunk,
        order,
    })
}

/// Directive modules some view reaches as a non-entry module.
fn isolation_roots(graph: &FormatGraph<'_>) -> BTreeSet<usize> {
    let mut roots = BTreeSet::new();
    for view in &graph.views {
        for &member in &view.members {
            if member != view.entry && graph.directive(member).is_some() {
                roots.insert(member);
            }
        }
    }
    roots
}

/// Color every module with the origins that reach it. Root origins win over
/// invocation origins: directives do not leak upward into importers.
fn color(
    graph: &FormatGraph<'_>,
    roots: &BTreeSet<usize>,
) -> Result<FxHashMap<usize, Vec<Origin>>> {
    let origins: Vec<(Origin, usize)> = (0..graph.views.len())
        .map(|view| (Origin::Invocation(view), graph.views[view].entry))
        .chain(roots.iter().map(|&root| (Origin::Root(root), root)))
        .collect();

    let mut reached: FxHashMap<usize, BTreeSet<Origin>> = FxHashMap::default();
    for &(origin, start) in &origins {
        let mut stack = vec![start];
        let mut seen = FxHashSet::default();
        seen.insert(start);
        while let Some(module) = stack.pop() {
            reached.entry(module).or_default().insert(origin);
            for &dep in &graph.modules[module].deps {
                if roots.contains(&dep) || !seen.insert(dep) {
                    continue;
                }
                stack.push(dep);
            }
        }
    }

    let mut colors = FxHashMap::default();
    for (module, set) in reached {
        check_ambiguity(graph, module, &set)?;
        let has_root = set.iter().any(|o| matches!(o, Origin::Root(_)));
        let key: Vec<Origin> = set
            .into_iter()
            .filter(|o| !has_root || matches!(o, Origin::Root(_)))
            .collect();
        colors.insert(module, key);
    }
    Ok(colors)
}

fn check_ambiguity(graph: &FormatGraph<'_>, module: usize, origins: &BTreeSet<Origin>) -> Result<()> {
    let mut client = None;
    let mut server = None;
    for origin in origins {
        let source = match origin {
            Origin::Root(root) => *root,
            Origin::Invocation(view) => graph.views[*view].entry,
        };
        match graph.directive(source) {
            Some(Directive::Client) => client = client.or(Some(source)),
            Some(Directive::Server) => server = server.or(Some(source)),
            None => {}
        }
    }
    if let (Some(client), Some(server)) = (client, server) {
        return Err(Error::AmbiguousDirective {
            module: graph.id(module).to_string(),
            client_root: graph.id(client).to_string(),
            server_root: graph.id(server).to_string(),
        });
    }
    Ok(())
}

/// Check one invocation's graph on its own, before anything else runs.
pub fn check_directives(graph: &ModuleGraph, format: OutputFormat) -> Result<()> {
    let merged = FormatGraph::merge(format, &[(0, graph)]);
    let roots = isolation_roots(&merged);
    color(&merged, &roots).map(|_| ())
}
