//! Derive an export map from the source tree.
//!
//! `tote prepare` prints the result; with `--write` it is stored in
//! `package.json` as the new `exports` field.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use tote_config::ToteConfig;
use tote_manifest::{ExportNode, ExportsField, Manifest, ModuleType};

use crate::entries::{SourceIndex, is_typescript, normalize_relative};
use crate::error::{Error, NoEntryError, Result};

/// Export map for the package at `root`: every top-level source stem gets
/// `import` and `require` leaves with the extensions its package type needs,
/// led by `types` for TypeScript sources.
pub fn prepare_exports(root: &Path, config: &ToteConfig) -> Result<ExportsField> {
    let manifest = Manifest::from_dir(root)?;
    let index = SourceIndex::scan(&config.src_path(root));
    if index.stems.is_empty() {
        return Err(NoEntryError {
            src_dir: config.src_dir.clone(),
        }
        .into());
    }

    let out_dir = normalize_relative(&config.out_dir);
    let (esm_ext, cjs_ext) = match manifest.module_type {
        ModuleType::Module => ("js", "cjs"),
        ModuleType::CommonJs => ("mjs", "js"),
    };

    let mut exports = ExportsField::new();
    for (stem, source) in &index.stems {
        if stem == "bin" || stem.contains('/') {
            continue;
        }
        let subpath = if stem == "index" {
            ".".to_string()
        } else {
            format!("./{stem}")
        };

        let mut conditions = IndexMap::new();
        if is_typescript(source) {
            conditions.insert(
                "types".to_string(),
                ExportNode::Leaf(format!("./{out_dir}/{stem}.d.ts")),
            );
        }
        conditions.insert(
            "import".to_string(),
            ExportNode::Leaf(format!("./{out_dir}/{stem}.{esm_ext}")),
        );
        conditions.insert(
            "require".to_string(),
            ExportNode::Leaf(format!("./{out_dir}/{stem}.{cjs_ext}")),
        );
        exports.insert(subpath, ExportNode::Conditional(conditions));
    }

    tracing::debug!(subpaths = exports.len(), "prepared export map");
    Ok(exports)
}

/// Replace the `exports` field of `package.json`, keeping every other field
/// and the key order as they were.
pub fn write_exports(root: &Path, exports: &ExportsField) -> Result<()> {
    let manifest = Manifest::from_dir(root)?;
    let mut raw = manifest.raw.clone();
    let Value::Object(fields) = &mut raw else {
        return Err(Error::configuration("package.json", "expected a JSON object"));
    };
    let value = serde_json::to_value(exports)
        .map_err(|e| Error::WriteFailure(format!("Failed to serialize exports: {e}")))?;
    fields.insert("exports".to_string(), value);

    let mut text = serde_json::to_string_pretty(&raw)
        .map_err(|e| Error::WriteFailure(format!("Failed to serialize package.json: {e}")))?;
    text.push('\n');
    fs::write(&manifest.path, text).map_err(|e| {
        Error::WriteFailure(format!(
            "Failed to write '{}': {}",
            manifest.path.display(),
            e
        ))
    })?;
    tracing::info!(path = %manifest.path.display(), "updated exports");
    Ok(())
}
