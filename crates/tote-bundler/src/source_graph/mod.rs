//! The default bundling capability.
//!
//! [`SourceGraphBundler`] walks the import graph of an entry, strips
//! TypeScript and JSX with OXC, and describes each module's bindings so the
//! splitter and renderer can regroup and re-link them.

mod scan;

pub(crate) use scan::id_hash;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use path_clean::PathClean;
use rustc_hash::FxHashMap;

use crate::bundle::{BundleCapability, BundleError};
use crate::format::OutputFormat;
use crate::graph::{
    ExternalImport, ImportBinding, ImportEdge, LocalExport, ModuleGraph, ModuleIdx, ModuleNode,
    ReExport, StarExport,
};
use scan::{ScannedModule, scan_source};

/// Extensions tried, in order, for extensionless relative specifiers.
const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "json"];

/// Bundles modules reachable through relative imports. Everything else
/// (bare specifiers, `node:` builtins, configured externals) stays external.
#[derive(Debug, Clone)]
pub struct SourceGraphBundler {
    root: PathBuf,
    externals: Vec<String>,
}

impl SourceGraphBundler {
    /// A bundler for the package at `root`; module ids are relative to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            externals: Vec::new(),
        }
    }

    /// Specifiers (or specifier prefixes ending in `/`) never bundled.
    pub fn with_externals(mut self, externals: impl IntoIterator<Item = String>) -> Self {
        self.externals.extend(externals);
        self
    }

    fn module_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }

    fn is_external(&self, specifier: &str) -> bool {
        let relative = specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/');
        !relative
            || self.externals.iter().any(|external| {
                specifier == external
                    || specifier
                        .strip_prefix(external.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }

    /// Resolve a specifier from `importer`. `Ok(None)` means external.
    fn resolve(&self, importer: &Path, specifier: &str) -> Result<Option<PathBuf>, BundleError> {
        if self.is_external(specifier) {
            return Ok(None);
        }
        let base = if let Some(absolute) = specifier.strip_prefix('/') {
            self.root.join(absolute)
        } else {
            importer
                .parent()
                .unwrap_or(Path::new(""))
                .join(specifier)
        }
        .clean();

        lookup_candidates(&base).map(Some).ok_or_else(|| BundleError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        })
    }
}

/// Find the file a relative specifier refers to.
fn lookup_candidates(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    let with_extension = |path: &Path, ext: &str| {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    };
    for ext in PROBE_EXTENSIONS {
        let candidate = with_extension(base, ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for ext in PROBE_EXTENSIONS {
        let candidate = base.join(format!("index.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    // `./utils.js` written against `./utils.ts`
    let swaps: &[(&str, &[&str])] = &[
        ("js", &["ts", "tsx"]),
        ("jsx", &["tsx"]),
        ("mjs", &["mts"]),
        ("cjs", &["cts"]),
    ];
    let ext = base.extension().and_then(|e| e.to_str())?;
    let (_, replacements) = swaps.iter().find(|(from, _)| *from == ext)?;
    replacements
        .iter()
        .map(|to| base.with_extension(to))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl BundleCapability for SourceGraphBundler {
    async fn bundle(&self, entry: &Path, format: OutputFormat) -> Result<ModuleGraph, BundleError> {
        let mut paths: Vec<PathBuf> = vec![entry.to_path_buf().clean()];
        let mut index: FxHashMap<PathBuf, usize> = FxHashMap::default();
        index.insert(paths[0].clone(), 0);
        let mut scanned: Vec<(String, ScannedModule, FxHashMap<String, Option<usize>>)> = Vec::new();

        let mut cursor = 0;
        while cursor < paths.len() {
            let path = paths[cursor].clone();
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| BundleError::Unreadable {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            let id = self.module_id(&path);
            let module = scan_source(&path, &id, &text)?;

            let mut resolved: FxHashMap<String, Option<usize>> = FxHashMap::default();
            for specifier in module.specifiers() {
                if resolved.contains_key(specifier) {
                    continue;
                }
                let target = match self.resolve(&path, specifier)? {
                    Some(target) => Some(*index.entry(target.clone()).or_insert_with(|| {
                        paths.push(target);
                        paths.len() - 1
                    })),
                    None => None,
                };
                resolved.insert(specifier.to_string(), target);
            }

            tracing::trace!(module = %id, format = %format, "scanned module");
            scanned.push((id, module, resolved));
            cursor += 1;
        }

        let modules = scanned
            .into_iter()
            .map(|(id, module, resolved)| link(id, module, &resolved))
            .collect::<Vec<_>>();
        tracing::debug!(
            entry = %entry.display(),
            format = %format,
            modules = modules.len(),
            "module graph built"
        );

        Ok(ModuleGraph {
            modules,
            entry: ModuleIdx(0),
        })
    }
}

/// Turn a scanned module plus resolved specifiers into a graph node.
fn link(id: String, module: ScannedModule, resolved: &FxHashMap<String, Option<usize>>) -> ModuleNode {
    let target_of = |specifier: &str| resolved.get(specifier).copied().flatten().map(ModuleIdx);
    let hash = id_hash(&id);

    let mut node = ModuleNode::new(id, module.kind);
    node.directive = module.directive;
    node.code = module.code;
    node.declared = module.declared;
    node.ambient = module.ambient;
    node.exports = module.exports;

    for import in module.imports {
        match target_of(&import.specifier) {
            Some(target) => node.imports.push(ImportEdge {
                target,
                bindings: import.bindings,
            }),
            None => node.externals.push(ExternalImport {
                specifier: import.specifier,
                bindings: import.bindings,
            }),
        }
    }

    for (n, reexport) in module.reexports.into_iter().enumerate() {
        match target_of(&reexport.specifier) {
            Some(target) => node.reexports.push(ReExport {
                exported: reexport.exported,
                target,
                imported: reexport.imported,
            }),
            None => {
                let local = format!("__reexport_{hash}_{n}");
                node.externals.push(ExternalImport {
                    specifier: reexport.specifier,
                    bindings: vec![ImportBinding {
                        imported: reexport.imported,
                        local: local.clone(),
                    }],
                });
                node.exports.push(LocalExport {
                    exported: reexport.exported,
                    local,
                });
            }
        }
    }

    for specifier in module.stars {
        node.star_exports.push(match target_of(&specifier) {
            Some(target) => StarExport::Internal(target),
            None => StarExport::External(specifier),
        });
    }

    node
}
