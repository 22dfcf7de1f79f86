//! Export condition graph: flattening condition trees into build targets.
//!
//! Each leaf's format is decided by the nearest format-bearing ancestor
//! condition (`require`, `import`, `module`, `types`), then by the `.mjs` /
//! `.cjs` extension, then by the package's own `type`.

mod validate;

pub use validate::validate_targets;

use std::path::{Component, Path, PathBuf};

use tote_manifest::{ExportNode, FieldPath, ModuleType};

use crate::entries::{Entry, normalize_relative, output_location};
use crate::error::{Error, Result};
use crate::format::{OutputFormat, is_declaration_path, is_script_path};
use crate::target::{BuildTarget, TargetKind};

/// A leaf reached by a depth-first walk of a condition tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionLeaf<'a> {
    pub path: &'a str,
    pub conditions: Vec<String>,
    pub field: FieldPath,
}

/// Walk `node` in consult order, collecting leaves with their condition path.
pub fn flatten<'a>(node: &'a ExportNode, implied: &[String], field: &FieldPath) -> Vec<ConditionLeaf<'a>> {
    let mut out = Vec::new();
    walk(node, implied.to_vec(), field.clone(), &mut out);
    out
}

fn walk<'a>(
    node: &'a ExportNode,
    conditions: Vec<String>,
    field: FieldPath,
    out: &mut Vec<ConditionLeaf<'a>>,
) {
    match node {
        ExportNode::Leaf(path) => out.push(ConditionLeaf {
            path,
            conditions,
            field,
        }),
        ExportNode::Conditional(_) => {
            for (key, child) in node.consult_order() {
                let mut nested = conditions.clone();
                nested.push(key.to_string());
                walk(child, nested, field.condition(key), out);
            }
        }
        ExportNode::Excluded => {}
    }
}

/// Decide what a leaf produces. `None` for leaves that are not build
/// outputs (stylesheets, `package.json`, ...).
pub fn classify(
    path: &str,
    conditions: &[String],
    module_type: ModuleType,
) -> Option<(TargetKind, Option<String>)> {
    let decisive = conditions
        .iter()
        .rev()
        .find(|c| matches!(c.as_str(), "require" | "import" | "module" | "types"));

    if is_declaration_path(path) {
        return Some((TargetKind::Declaration, decisive.cloned()));
    }
    if !is_script_path(path) {
        return None;
    }

    let format = match decisive.map(String::as_str) {
        Some("require") => OutputFormat::Cjs,
        Some("import" | "module") => OutputFormat::Esm,
        // a script file under `types` is not something we can produce
        Some(_) => return None,
        None => OutputFormat::natural(path, module_type),
    };
    Some((TargetKind::Bundle { format }, decisive.cloned()))
}

/// All build targets declared for `entry`, in manifest order.
pub fn targets_for_entry(
    entry: &Entry,
    out_dir: &Path,
    module_type: ModuleType,
) -> Result<Vec<BuildTarget>> {
    let out_dir = normalize_relative(out_dir);
    let mut targets = Vec::new();

    for origin in &entry.origins {
        for leaf in flatten(&origin.node, &origin.implied, &origin.field) {
            let Some((kind, decided_by)) = classify(leaf.path, &leaf.conditions, module_type) else {
                tracing::debug!(field = %leaf.field, path = leaf.path, "ignoring non-buildable leaf");
                continue;
            };
            let relative = package_relative(leaf.path, &leaf.field)?;
            let Some(output) = output_location(&relative, &out_dir) else {
                tracing::debug!(
                    field = %leaf.field,
                    path = leaf.path,
                    out_dir = %out_dir,
                    "leaf is outside the output directory; not built"
                );
                continue;
            };
            let output = PathBuf::from(output);

            let target = BuildTarget {
                entry: entry.name.clone(),
                source: entry.source_for(&leaf.conditions).to_path_buf(),
                kind,
                conditions: leaf.conditions,
                output,
                field: leaf.field,
                decided_by,
                executable: origin.executable,
            };
            tracing::debug!(target = %target, source = %target.source.display(), "resolved target");
            targets.push(target);
        }
    }

    Ok(targets)
}

/// Normalize a manifest path, rejecting anything that leaves the package.
fn package_relative(path: &str, field: &FieldPath) -> Result<String> {
    let candidate = Path::new(path);
    let escapes = candidate.is_absolute()
        || Path::new(&normalize_relative(candidate))
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(Error::configuration(
            field.to_string(),
            format!("`{path}` points outside the package"),
        ));
    }
    Ok(normalize_relative(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntryOrigin;
    use indexmap::IndexMap;
    use serde_json::json;

    fn node(value: serde_json::Value) -> ExportNode {
        ExportNode::from_value(&value, &FieldPath::exports()).unwrap()
    }

    fn entry(value: serde_json::Value) -> Entry {
        Entry {
            name: ".".into(),
            stem: "index".into(),
            source: PathBuf::from("/pkg/src/index.ts"),
            variants: IndexMap::new(),
            origins: vec![EntryOrigin {
                node: node(value),
                field: FieldPath::exports().subpath("."),
                implied: Vec::new(),
                executable: false,
            }],
        }
    }

    #[test]
    fn flatten_keeps_default_last() {
        let tree = node(json!({
            "default": "./dist/index.js",
            "node": { "import": "./dist/node.mjs" },
        }));
        let leaves = flatten(&tree, &[], &FieldPath::exports().subpath("."));
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].conditions, vec!["node", "import"]);
        assert_eq!(leaves[0].field.as_str(), "exports[\".\"].node.import");
        assert_eq!(leaves[1].conditions, vec!["default"]);
    }

    #[test]
    fn nearest_condition_decides_format() {
        let conditions = vec!["require".to_string(), "import".to_string()];
        let (kind, decided_by) = classify("./dist/a.js", &conditions, ModuleType::CommonJs).unwrap();
        assert_eq!(kind, TargetKind::Bundle { format: OutputFormat::Esm });
        assert_eq!(decided_by.as_deref(), Some("import"));
    }

    #[test]
    fn extension_then_package_type() {
        let (kind, _) = classify("./dist/a.mjs", &[], ModuleType::CommonJs).unwrap();
        assert_eq!(kind, TargetKind::Bundle { format: OutputFormat::Esm });
        let (kind, _) = classify("./dist/a.js", &["node".into()], ModuleType::Module).unwrap();
        assert_eq!(kind, TargetKind::Bundle { format: OutputFormat::Esm });
        let (kind, _) = classify("./dist/a.js", &[], ModuleType::CommonJs).unwrap();
        assert_eq!(kind, TargetKind::Bundle { format: OutputFormat::Cjs });
    }

    #[test]
    fn types_and_declaration_paths_are_declaration_only() {
        let (kind, _) = classify("./dist/a.d.mts", &["import".into()], ModuleType::CommonJs).unwrap();
        assert_eq!(kind, TargetKind::Declaration);
        assert!(classify("./dist/a.css", &[], ModuleType::CommonJs).is_none());
    }

    #[test]
    fn targets_use_variant_sources() {
        let mut e = entry(json!({
            "react-server": "./dist/index.react-server.mjs",
            "import": "./dist/index.mjs",
        }));
        e.variants.insert(
            "react-server".into(),
            PathBuf::from("/pkg/src/index.react-server.ts"),
        );
        let targets = targets_for_entry(&e, Path::new("dist"), ModuleType::CommonJs).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].source.ends_with("index.react-server.ts"));
        assert_eq!(targets[0].output, PathBuf::from("dist/index.react-server.mjs"));
        assert!(targets[1].source.ends_with("index.ts"));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let e = entry(json!({ "import": "../outside.mjs" }));
        let err = targets_for_entry(&e, Path::new("dist"), ModuleType::CommonJs).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref field, .. } if field == "exports[\".\"].import"));
    }
}
