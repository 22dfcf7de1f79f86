//! Entry resolution.
//!
//! Maps the manifest's declared entry points (export map subpaths, legacy
//! `main`/`module`/`types`, `bin`) onto source files under the source
//! directory, expanding wildcard subpaths and synthesizing an export map for
//! packages that declare nothing.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tote_manifest::{BinField, ExportNode, ExportsField, FieldPath, Manifest};
use walkdir::WalkDir;

use crate::diagnostics::{Diagnostic, Diagnostics, Scope, codes};
use crate::error::{NoEntryError, Result};
use crate::format::{is_declaration_path, is_script_path};

/// Recognized source extensions, highest priority first.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

const BIN_STEM: &str = "bin";
const INDEX_STEM: &str = "index";

/// Source files discovered under the source directory.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    /// Entry stem (`index`, `shared`, `utils/format`) to source file
    pub stems: IndexMap<String, PathBuf>,
    /// `(stem, condition)` to variant source, e.g. `src/index.react-server.ts`
    pub variants: IndexMap<(String, String), PathBuf>,
    /// Files under `src/bin/`, by name without extension
    pub bins: IndexMap<String, PathBuf>,
}

impl SourceIndex {
    /// Scan `src_dir` (two levels deep).
    pub fn scan(src_dir: &Path) -> Self {
        let mut candidates: IndexMap<String, (usize, PathBuf)> = IndexMap::new();
        let mut bins: IndexMap<String, (usize, PathBuf)> = IndexMap::new();

        let walker = WalkDir::new(src_dir)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file());

        for entry in walker {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_declaration_path(file_name) {
                continue;
            }
            let Some((base, priority)) = split_source_extension(file_name) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(src_dir) else {
                continue;
            };
            let parent = relative
                .parent()
                .and_then(|p| p.to_str())
                .filter(|p| !p.is_empty());

            if parent == Some(BIN_STEM) {
                insert_preferred(&mut bins, base.to_string(), priority, path.to_path_buf());
                continue;
            }

            let stem = match parent {
                Some(dir) if base == INDEX_STEM => dir.to_string(),
                Some(dir) => format!("{dir}/{base}"),
                None => base.to_string(),
            };
            insert_preferred(&mut candidates, stem, priority, path.to_path_buf());
        }

        let mut index = SourceIndex {
            bins: bins.into_iter().map(|(k, (_, p))| (k, p)).collect(),
            ..SourceIndex::default()
        };

        // `index.edge-light` is a variant only when `index` itself exists.
        let mut dotted = Vec::new();
        for (stem, (_, path)) in candidates {
            let last_segment = stem.rsplit('/').next().unwrap_or(&stem);
            if last_segment.contains('.') {
                dotted.push((stem, path));
            } else {
                index.stems.insert(stem, path);
            }
        }
        for (stem, path) in dotted {
            match split_variant(&stem) {
                Some((base, condition)) if index.stems.contains_key(&base) => {
                    index.variants.insert((base, condition), path);
                }
                _ => {
                    index.stems.insert(stem, path);
                }
            }
        }

        index
    }

    pub fn get(&self, stem: &str) -> Option<&PathBuf> {
        self.stems.get(stem)
    }

    /// Conditions with a variant source for `stem`.
    pub fn variants_of(&self, stem: &str) -> IndexMap<String, PathBuf> {
        self.variants
            .iter()
            .filter(|((base, _), _)| base == stem)
            .map(|((_, condition), path)| (condition.clone(), path.clone()))
            .collect()
    }

    /// Source for a single `bin` field: `src/bin.*` or `src/bin/index.*`.
    pub fn bin_source(&self) -> Option<&PathBuf> {
        self.stems.get(BIN_STEM).or_else(|| self.bins.get(INDEX_STEM))
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty() && self.bins.is_empty()
    }
}

fn insert_preferred(
    map: &mut IndexMap<String, (usize, PathBuf)>,
    key: String,
    priority: usize,
    path: PathBuf,
) {
    match map.get(&key) {
        Some((existing, _)) if *existing <= priority => {}
        _ => {
            map.insert(key, (priority, path));
        }
    }
}

/// `index.ts` -> (`index`, priority of `ts`)
fn split_source_extension(file_name: &str) -> Option<(&str, usize)> {
    let (base, ext) = file_name.rsplit_once('.')?;
    let priority = SOURCE_EXTENSIONS.iter().position(|e| *e == ext)?;
    (!base.is_empty()).then_some((base, priority))
}

/// `index.react-server` -> (`index`, `react-server`), `ui/index.edge` -> (`ui`, `edge`)
fn split_variant(stem: &str) -> Option<(String, String)> {
    let (dir, last) = match stem.rsplit_once('/') {
        Some((dir, last)) => (Some(dir), last),
        None => (None, stem),
    };
    let (base, condition) = last.split_once('.')?;
    if base.is_empty() || condition.is_empty() {
        return None;
    }
    let base = match dir {
        Some(dir) if base == INDEX_STEM => dir.to_string(),
        Some(dir) => format!("{dir}/{base}"),
        None => base.to_string(),
    };
    Some((base, condition.to_string()))
}

/// Where an entry's targets are declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOrigin {
    pub node: ExportNode,
    pub field: FieldPath,
    /// Conditions implied by a legacy field (`module` implies `module`)
    pub implied: Vec<String>,
    pub executable: bool,
}

/// One publishable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// `.`, `./shared`, `./button` (wildcard-expanded), `bin`, `bin/cli`
    pub name: String,
    pub stem: String,
    pub source: PathBuf,
    /// Condition to variant source
    pub variants: IndexMap<String, PathBuf>,
    pub origins: Vec<EntryOrigin>,
}

impl Entry {
    /// Source used for a leaf reached through `conditions`: the variant for
    /// the deepest condition that has one, the entry source otherwise.
    pub fn source_for(&self, conditions: &[String]) -> &Path {
        conditions
            .iter()
            .rev()
            .find_map(|condition| self.variants.get(condition))
            .unwrap_or(&self.source)
    }

    pub fn is_executable(&self) -> bool {
        self.origins.iter().any(|origin| origin.executable)
    }
}

/// Result of entry resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntries {
    pub entries: IndexMap<String, Entry>,
    pub diagnostics: Vec<Diagnostic>,
    /// The export map was synthesized from the source tree
    pub synthesized: bool,
}

/// Resolve all entries of the package at `root`.
pub fn resolve_entries(
    root: &Path,
    src_dir: &Path,
    out_dir: &Path,
    manifest: &Manifest,
) -> Result<ResolvedEntries> {
    let src = root.join(src_dir);
    let index = SourceIndex::scan(&src);
    tracing::debug!(
        src = %src.display(),
        stems = index.stems.len(),
        variants = index.variants.len(),
        "scanned sources"
    );

    let mut resolver = Resolver {
        index: &index,
        out_dir: normalize_relative(out_dir),
        entries: IndexMap::new(),
        diagnostics: Diagnostics::new(),
    };

    let synthesized = manifest.declares_no_entries();
    let exports = if synthesized {
        synthesize_exports(&index, &resolver.out_dir)
    } else {
        manifest.exports.clone().unwrap_or_default()
    };

    resolver.add_exports(&exports);
    resolver.add_legacy(manifest);
    if let Some(bin) = &manifest.bin {
        resolver.add_bins(bin, manifest.name.as_deref());
    }

    if resolver.entries.is_empty() {
        return Err(NoEntryError {
            src_dir: src_dir.to_path_buf(),
        }
        .into());
    }

    for entry in resolver.entries.values() {
        tracing::debug!(entry = %entry.name, source = %entry.source.display(), "resolved entry");
    }

    Ok(ResolvedEntries {
        entries: resolver.entries,
        diagnostics: resolver.diagnostics.into_vec(),
        synthesized,
    })
}

struct Resolver<'a> {
    index: &'a SourceIndex,
    out_dir: String,
    entries: IndexMap<String, Entry>,
    diagnostics: Diagnostics,
}

impl Resolver<'_> {
    fn add_exports(&mut self, exports: &ExportsField) {
        let mut wildcards = Vec::new();
        let mut excluded = Vec::new();

        for (subpath, node) in exports.iter() {
            if matches!(node, ExportNode::Excluded) {
                excluded.push(subpath.to_string());
                continue;
            }
            if subpath.contains('*') {
                wildcards.push((subpath.to_string(), node.clone()));
                continue;
            }
            let field = FieldPath::exports().subpath(subpath);
            let Some(stem) = self.stem_for(subpath, node) else {
                self.report_missing(subpath, node, &field);
                continue;
            };
            self.attach(subpath, &stem, EntryOrigin {
                node: node.clone(),
                field,
                implied: Vec::new(),
                executable: false,
            });
        }

        if wildcards.is_empty() {
            return;
        }
        self.diagnostics.push(Diagnostic::experimental(
            codes::EXPERIMENTAL_WILDCARD,
            "wildcard exports are experimental; each matching source file becomes its own entry",
        ));

        for (pattern, node) in wildcards {
            let Some((prefix, suffix)) = pattern.split_once('*') else {
                continue;
            };
            let stems: Vec<String> = self.index.stems.keys().cloned().collect();
            for stem in stems {
                if stem == INDEX_STEM || stem == BIN_STEM {
                    continue;
                }
                let subpath = format!("./{stem}");
                if self.entries.contains_key(&subpath) || excluded.contains(&subpath) {
                    continue;
                }
                let Some(capture) = subpath
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_suffix(suffix))
                    .filter(|capture| !capture.is_empty())
                else {
                    continue;
                };
                let origin = EntryOrigin {
                    node: node.substitute_wildcard(capture),
                    field: FieldPath::exports().subpath(&pattern),
                    implied: Vec::new(),
                    executable: false,
                };
                self.attach(&subpath, &stem, origin);
            }
        }
    }

    fn add_legacy(&mut self, manifest: &Manifest) {
        let legacy = [
            ("main", manifest.main.as_ref(), None),
            ("module", manifest.module.as_ref(), Some("module")),
            ("types", manifest.types.as_ref(), Some("types")),
        ];
        for (field_name, value, implied) in legacy {
            let Some(path) = value else {
                continue;
            };
            let node = ExportNode::Leaf(path.clone());
            let field = FieldPath::field(field_name);
            let stem = self.stem_for(".", &node);
            let Some(stem) = stem else {
                self.report_missing(".", &node, &field);
                continue;
            };
            self.attach(".", &stem, EntryOrigin {
                node,
                field,
                implied: implied.into_iter().map(str::to_string).collect(),
                executable: false,
            });
        }
    }

    fn add_bins(&mut self, bin: &BinField, package_name: Option<&str>) {
        let named_count = match bin {
            BinField::Single(_) => 0,
            BinField::Named(map) => map.len(),
        };
        for (name, path, field) in bin.entries(package_name) {
            let source = match bin {
                BinField::Single(_) => self.index.bin_source(),
                BinField::Named(_) => self
                    .index
                    .bins
                    .get(name)
                    .or_else(|| (named_count == 1).then(|| self.index.bin_source()).flatten()),
            };
            let entry_name = match bin {
                BinField::Single(_) => BIN_STEM.to_string(),
                BinField::Named(_) => format!("{BIN_STEM}/{name}"),
            };
            let node = ExportNode::Leaf(path.to_string());
            let Some(source) = source.cloned() else {
                self.report_missing(&entry_name, &node, &field);
                continue;
            };
            self.entries
                .entry(entry_name.clone())
                .or_insert_with(|| Entry {
                    name: entry_name,
                    stem: BIN_STEM.to_string(),
                    source,
                    variants: IndexMap::new(),
                    origins: Vec::new(),
                })
                .origins
                .push(EntryOrigin {
                    node,
                    field,
                    implied: Vec::new(),
                    executable: true,
                });
        }
    }

    fn attach(&mut self, name: &str, stem: &str, origin: EntryOrigin) {
        let Some(source) = self.index.get(stem).cloned() else {
            return;
        };
        let variants = self.index.variants_of(stem);
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| Entry {
                name: name.to_string(),
                stem: stem.to_string(),
                source,
                variants,
                origins: Vec::new(),
            })
            .origins
            .push(origin);
    }

    /// The source stem for a subpath: `.` -> `index`, `./shared` -> `shared`.
    /// Falls back to the leaf file names below the output directory.
    fn stem_for(&self, subpath: &str, node: &ExportNode) -> Option<String> {
        let from_subpath = match subpath {
            "." => INDEX_STEM.to_string(),
            other => other.trim_start_matches("./").to_string(),
        };
        if self.index.get(&from_subpath).is_some() {
            return Some(from_subpath);
        }
        node.leaves()
            .into_iter()
            .filter_map(|leaf| self.stem_from_leaf(leaf))
            .find(|stem| self.index.get(stem).is_some())
    }

    fn stem_from_leaf(&self, leaf: &str) -> Option<String> {
        let output = output_location(&normalize_relative(Path::new(leaf)), &self.out_dir)?;
        let rest = output.strip_prefix(&self.out_dir)?.strip_prefix('/')?;
        let stem = [".d.mts", ".d.cts", ".d.ts", ".mjs", ".cjs", ".js"]
            .iter()
            .find_map(|ext| rest.strip_suffix(ext))?;
        Some(stem.strip_suffix("/index").unwrap_or(stem).to_string())
    }

    fn report_missing(&mut self, name: &str, node: &ExportNode, field: &FieldPath) {
        let buildable = node
            .leaves()
            .into_iter()
            .any(|leaf| is_script_path(leaf) || is_declaration_path(leaf));
        if !buildable {
            tracing::debug!(field = %field, "skipping export without buildable leaves");
            return;
        }
        self.diagnostics.push(
            Diagnostic::warning(
                Scope::Target(name.to_string()),
                codes::MISSING_SOURCE,
                format!("no source file found for `{name}`; it will not be built"),
            )
            .with_field(field.to_string()),
        );
    }
}

/// Export map for a package that declares no entries: every top-level source
/// stem becomes a subpath built in the package's own format.
pub fn synthesize_exports(index: &SourceIndex, out_dir: &str) -> ExportsField {
    let mut exports = ExportsField::new();
    for (stem, source) in &index.stems {
        if stem == BIN_STEM || stem.contains('/') {
            continue;
        }
        let subpath = if stem == INDEX_STEM {
            ".".to_string()
        } else {
            format!("./{stem}")
        };
        let script = format!("./{out_dir}/{stem}.js");
        let node = if is_typescript(source) {
            let mut conditions = IndexMap::new();
            conditions.insert(
                "types".to_string(),
                ExportNode::Leaf(format!("./{out_dir}/{stem}.d.ts")),
            );
            conditions.insert("default".to_string(), ExportNode::Leaf(script));
            ExportNode::Conditional(conditions)
        } else {
            ExportNode::Leaf(script)
        };
        exports.insert(subpath, node);
    }
    tracing::debug!(subpaths = exports.len(), "synthesized export map");
    exports
}

/// True for `.ts`, `.tsx`, `.mts` and `.cts` sources.
pub fn is_typescript(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "mts" | "cts")
    )
}

/// Where a normalized leaf path is written: leaves inside `out_dir` as
/// declared, bare file names at the package root inside `out_dir`
/// (`index.mjs` -> `dist/index.mjs`). Other locations are not build outputs.
pub fn output_location(leaf: &str, out_dir: &str) -> Option<String> {
    if leaf
        .strip_prefix(out_dir)
        .is_some_and(|rest| rest.starts_with('/'))
    {
        Some(leaf.to_string())
    } else if !leaf.contains('/') {
        Some(format!("{out_dir}/{leaf}"))
    } else {
        None
    }
}

/// `./dist//index.js` -> `dist/index.js`
pub fn normalize_relative(path: &Path) -> String {
    use path_clean::PathClean;
    let cleaned = path.clean();
    let text = cleaned.to_string_lossy().replace('\\', "/");
    text.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {}\n").unwrap();
    }

    #[test]
    fn scan_prefers_typescript_and_finds_variants() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.js");
        touch(dir.path(), "index.ts");
        touch(dir.path(), "index.react-server.ts");
        touch(dir.path(), "types.d.ts");
        touch(dir.path(), "button/index.tsx");
        touch(dir.path(), "bin/cli.ts");
        touch(dir.path(), "lone.config.ts");

        let index = SourceIndex::scan(dir.path());
        assert!(index.get("index").unwrap().ends_with("index.ts"));
        assert!(index.get("button").unwrap().ends_with("button/index.tsx"));
        assert!(index.get("types").is_none());
        assert!(index.get("lone.config").is_some());
        assert!(index.bins.contains_key("cli"));
        let variants = index.variants_of("index");
        assert!(variants["react-server"].ends_with("index.react-server.ts"));
    }

    #[test]
    fn deepest_variant_wins() {
        let mut variants = IndexMap::new();
        variants.insert("node".to_string(), PathBuf::from("src/index.node.ts"));
        variants.insert("edge-light".to_string(), PathBuf::from("src/index.edge-light.ts"));
        let entry = Entry {
            name: ".".into(),
            stem: "index".into(),
            source: PathBuf::from("src/index.ts"),
            variants,
            origins: Vec::new(),
        };
        let conditions = vec!["node".to_string(), "edge-light".to_string(), "import".to_string()];
        assert_eq!(entry.source_for(&conditions), Path::new("src/index.edge-light.ts"));
        assert_eq!(entry.source_for(&["import".to_string()]), Path::new("src/index.ts"));
    }

    #[test]
    fn synthesized_exports_cover_top_level_stems() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.ts");
        touch(dir.path(), "utils.js");
        touch(dir.path(), "bin.ts");
        let index = SourceIndex::scan(dir.path());

        let exports = synthesize_exports(&index, "dist");
        assert_eq!(exports.len(), 2);
        assert_eq!(
            exports.get(".").unwrap().leaves(),
            vec!["./dist/index.d.ts", "./dist/index.js"]
        );
        assert_eq!(
            exports.get("./utils"),
            Some(&ExportNode::Leaf("./dist/utils.js".into()))
        );
    }

    #[test]
    fn root_level_leaves_land_in_out_dir() {
        assert_eq!(output_location("index.mjs", "dist").as_deref(), Some("dist/index.mjs"));
        assert_eq!(output_location("dist/a/b.js", "dist").as_deref(), Some("dist/a/b.js"));
        assert_eq!(output_location("lib/a.js", "dist"), None);
        assert_eq!(output_location("distribution/a.js", "dist"), None);
    }

    #[test]
    fn normalize_strips_dot_segments() {
        assert_eq!(normalize_relative(Path::new("./dist//index.js")), "dist/index.js");
        assert_eq!(normalize_relative(Path::new("dist/./a/../b.js")), "dist/b.js");
    }
}
