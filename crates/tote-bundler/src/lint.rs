//! Post-build manifest checks.
//!
//! Linters look at the manifest together with the finished report and only
//! ever produce warnings; they never change what was built.

use tote_manifest::{DEFAULT_CONDITION, ExportNode, FieldPath, Manifest, ModuleType};

use crate::diagnostics::{Diagnostic, Scope, codes};
use crate::report::BuildReport;

/// A validator run after the build has been written.
pub trait ManifestLinter: Send + Sync {
    fn lint(&self, manifest: &Manifest, report: &BuildReport) -> Vec<Diagnostic>;
}

/// Checks the shape of the export map against how resolvers read it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageShapeLinter;

impl ManifestLinter for PackageShapeLinter {
    fn lint(&self, manifest: &Manifest, _report: &BuildReport) -> Vec<Diagnostic> {
        let mut found = Vec::new();
        if let Some(exports) = &manifest.exports {
            for (subpath, node) in exports.iter() {
                check_node(
                    node,
                    &FieldPath::exports().subpath(subpath),
                    None,
                    manifest.module_type,
                    &mut found,
                );
            }

            let main_requires = exports
                .get(".")
                .is_some_and(|node| has_condition(node, "require"));
            if main_requires && manifest.main.is_none() {
                found.push(warn(
                    "main",
                    "`exports[\".\"]` has a `require` condition but `main` is missing; older resolvers will not find the package",
                ));
            }
        }
        found
    }
}

fn check_node(
    node: &ExportNode,
    field: &FieldPath,
    condition: Option<&str>,
    module_type: ModuleType,
    found: &mut Vec<Diagnostic>,
) {
    match node {
        ExportNode::Conditional(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            if let Some(position) = keys.iter().position(|k| *k == "types") {
                if position != 0 {
                    found.push(warn(
                        field.condition("types").as_str(),
                        "`types` should be the first condition so TypeScript picks it up",
                    ));
                }
            }
            if let Some(position) = keys.iter().position(|k| *k == DEFAULT_CONDITION) {
                if position + 1 != keys.len() {
                    found.push(warn(
                        field.condition(DEFAULT_CONDITION).as_str(),
                        "`default` should be the last condition; resolvers stop at the first match",
                    ));
                }
            }
            for (key, child) in map {
                check_node(child, &field.condition(key), Some(key), module_type, found);
            }
        }
        ExportNode::Leaf(path) if path.ends_with(".js") => match (condition, module_type) {
            (Some("import"), ModuleType::CommonJs) => found.push(warn(
                field.as_str(),
                format!("`{path}` is CommonJS in a package without `\"type\": \"module\"`; use `.mjs` for `import`"),
            )),
            (Some("require"), ModuleType::Module) => found.push(warn(
                field.as_str(),
                format!("`{path}` is an ES module in a `\"type\": \"module\"` package; use `.cjs` for `require`"),
            )),
            _ => {}
        },
        ExportNode::Leaf(_) | ExportNode::Excluded => {}
    }
}

fn has_condition(node: &ExportNode, name: &str) -> bool {
    match node {
        ExportNode::Conditional(map) => map
            .iter()
            .any(|(key, child)| key == name || has_condition(child, name)),
        _ => false,
    }
}

fn warn(field: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::warning(Scope::Build, codes::MANIFEST_LINT, message).with_field(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lint(value: serde_json::Value) -> Vec<Diagnostic> {
        let manifest = Manifest::from_value(value).unwrap();
        PackageShapeLinter.lint(&manifest, &BuildReport::default())
    }

    #[test]
    fn well_formed_exports_pass() {
        let found = lint(json!({
            "main": "./dist/index.js",
            "exports": {
                ".": {
                    "types": "./dist/index.d.ts",
                    "import": "./dist/index.mjs",
                    "require": "./dist/index.js",
                    "default": "./dist/index.js"
                }
            }
        }));
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn misplaced_types_and_default() {
        let found = lint(json!({
            "type": "module",
            "exports": {
                ".": {
                    "default": "./dist/index.js",
                    "types": "./dist/index.d.ts"
                }
            }
        }));
        let fields: Vec<_> = found.iter().filter_map(|d| d.field.as_deref()).collect();
        assert!(fields.contains(&"exports[\".\"].types"));
        assert!(fields.contains(&"exports[\".\"].default"));
    }

    #[test]
    fn js_extension_against_package_type() {
        let found = lint(json!({
            "main": "./dist/index.js",
            "exports": { ".": { "import": "./dist/index.js", "require": "./dist/index.cjs" } }
        }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field.as_deref(), Some("exports[\".\"].import"));
        assert_eq!(found[0].code, codes::MANIFEST_LINT);
    }

    #[test]
    fn missing_main_with_require() {
        let found = lint(json!({
            "exports": { ".": { "import": "./dist/index.mjs", "require": "./dist/index.js" } }
        }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field.as_deref(), Some("main"));
    }
}
