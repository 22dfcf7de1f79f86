//! Package.json parsing.
//!
//! Only the fields that shape a build are modelled. Everything else in the
//! file is kept verbatim in [`Manifest::raw`] so callers can write the
//! manifest back without losing data.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ManifestError, Result};
use crate::export_node::{ExportsField, FieldPath};

/// Maximum allowed size for package.json files (10MB)
const MAX_PACKAGE_JSON_SIZE: u64 = 10 * 1024 * 1024;

/// The package's own module type (`"type"` field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// `"type": "commonjs"` or no `type` field.
    #[default]
    #[serde(rename = "commonjs")]
    CommonJs,
    /// `"type": "module"`.
    Module,
}

impl ModuleType {
    fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("module") => ModuleType::Module,
            _ => ModuleType::CommonJs,
        }
    }

    pub fn is_module(self) -> bool {
        matches!(self, ModuleType::Module)
    }
}

/// The `bin` field: a single executable or a map of command name to path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BinField {
    Single(String),
    Named(IndexMap<String, String>),
}

impl BinField {
    /// `(command name, path, field path)` triples. A single bin is named
    /// after the package.
    pub fn entries<'a>(&'a self, package_name: Option<&'a str>) -> Vec<(&'a str, &'a str, FieldPath)> {
        match self {
            BinField::Single(path) => {
                vec![(package_name.unwrap_or("bin"), path.as_str(), FieldPath::field("bin"))]
            }
            BinField::Named(map) => map
                .iter()
                .map(|(name, path)| {
                    (
                        name.as_str(),
                        path.as_str(),
                        FieldPath::field("bin").condition(name),
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "type")]
    module_type: Option<String>,
    main: Option<String>,
    module: Option<String>,
    types: Option<String>,
    typings: Option<String>,
    #[serde(default)]
    exports: Option<Value>,
    #[serde(default)]
    bin: Option<Value>,
    #[serde(default)]
    dependencies: IndexMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: IndexMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: IndexMap<String, String>,
}

/// Normalized package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub module_type: ModuleType,
    /// Legacy `main` field
    pub main: Option<String>,
    /// Legacy `module` field
    pub module: Option<String>,
    /// `types`, falling back to `typings`
    pub types: Option<String>,
    pub exports: Option<ExportsField>,
    pub bin: Option<BinField>,
    pub dependencies: IndexMap<String, String>,
    pub peer_dependencies: IndexMap<String, String>,
    pub optional_dependencies: IndexMap<String, String>,
    /// The untouched JSON document
    pub raw: Value,
    /// File path this was loaded from
    pub path: PathBuf,
}

impl Manifest {
    /// Load and normalize `package.json` from `path`.
    ///
    /// Files larger than 10MB are rejected before being read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ManifestError::NotFound(path.to_path_buf())
            } else {
                ManifestError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        if metadata.len() > MAX_PACKAGE_JSON_SIZE {
            tracing::warn!(
                path = %path.display(),
                bytes = metadata.len(),
                "package.json over size limit"
            );
            return Err(ManifestError::TooLarge {
                max_mib: MAX_PACKAGE_JSON_SIZE / 1024 / 1024,
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content)?;

        let mut manifest = Self::from_value(value)?;
        manifest.path = path.to_path_buf();
        tracing::debug!(
            path = %path.display(),
            name = manifest.name.as_deref().unwrap_or("<unnamed>"),
            module_type = ?manifest.module_type,
            "loaded package.json"
        );
        Ok(manifest)
    }

    /// Load `<dir>/package.json`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Self::from_path(&dir.join("package.json"))
    }

    /// Normalize an already-parsed manifest document.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ManifestError::InvalidField {
                field: "package.json".to_string(),
                message: "expected a JSON object".to_string(),
            });
        }
        let raw: RawManifest = serde_json::from_value(value.clone())?;

        let exports = raw
            .exports
            .as_ref()
            .map(ExportsField::from_value)
            .transpose()?;
        let bin = raw.bin.as_ref().map(parse_bin).transpose()?;
        if raw.types.is_none() && raw.typings.is_some() {
            tracing::debug!("using `typings` in place of `types`");
        }

        Ok(Manifest {
            name: raw.name,
            version: raw.version,
            module_type: ModuleType::from_field(raw.module_type.as_deref()),
            main: raw.main,
            module: raw.module,
            types: raw.types.or(raw.typings),
            exports,
            bin,
            dependencies: raw.dependencies,
            peer_dependencies: raw.peer_dependencies,
            optional_dependencies: raw.optional_dependencies,
            raw: value,
            path: PathBuf::new(),
        })
    }

    /// Directory containing the manifest.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// True when none of `exports`, `main`, `module` or `bin` is declared.
    pub fn declares_no_entries(&self) -> bool {
        self.exports.as_ref().is_none_or(ExportsField::is_empty)
            && self.main.is_none()
            && self.module.is_none()
            && self.bin.is_none()
    }

    /// Package names that must stay external to every bundle.
    pub fn external_dependencies(&self) -> BTreeSet<String> {
        self.dependencies
            .keys()
            .chain(self.peer_dependencies.keys())
            .chain(self.optional_dependencies.keys())
            .cloned()
            .collect()
    }

    /// The `"tote"` configuration object, if present.
    pub fn tool_config(&self) -> Option<&Value> {
        self.raw.get("tote")
    }
}

fn parse_bin(value: &Value) -> Result<BinField> {
    match value {
        Value::String(path) => Ok(BinField::Single(path.clone())),
        Value::Object(map) => {
            let mut named = IndexMap::with_capacity(map.len());
            for (name, path) in map {
                let Value::String(path) = path else {
                    return Err(ManifestError::InvalidField {
                        field: FieldPath::field("bin").condition(name).to_string(),
                        message: "expected a path".to_string(),
                    });
                };
                named.insert(name.clone(), path.clone());
            }
            Ok(BinField::Named(named))
        }
        _ => Err(ManifestError::InvalidField {
            field: "bin".to_string(),
            message: "expected a path or an object of paths".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn module_type_defaults_to_commonjs() {
        let manifest = Manifest::from_value(json!({ "name": "pkg" })).unwrap();
        assert_eq!(manifest.module_type, ModuleType::CommonJs);

        let manifest = Manifest::from_value(json!({ "type": "module" })).unwrap();
        assert!(manifest.module_type.is_module());
    }

    #[test]
    fn typings_is_a_fallback_for_types() {
        let manifest = Manifest::from_value(json!({ "typings": "./dist/index.d.ts" })).unwrap();
        assert_eq!(manifest.types.as_deref(), Some("./dist/index.d.ts"));
    }

    #[test]
    fn named_bin_field_paths() {
        let manifest =
            Manifest::from_value(json!({ "bin": { "cli": "./dist/cli.js" } })).unwrap();
        let bin = manifest.bin.unwrap();
        let entries = bin.entries(None);
        assert_eq!(entries[0].0, "cli");
        assert_eq!(entries[0].2.to_string(), "bin.cli");
    }

    #[test]
    fn invalid_bin_is_rejected() {
        let err = Manifest::from_value(json!({ "bin": 3 })).unwrap_err();
        assert_eq!(err.field(), Some("bin"));
    }

    #[test]
    fn externals_cover_all_runtime_dependency_kinds() {
        let manifest = Manifest::from_value(json!({
            "dependencies": { "a": "1" },
            "peerDependencies": { "react": "19" },
            "optionalDependencies": { "fsevents": "2" }
        }))
        .unwrap();
        let externals: Vec<_> = manifest.external_dependencies().into_iter().collect();
        assert_eq!(externals, vec!["a", "fsevents", "react"]);
    }

    #[test]
    fn empty_manifest_declares_no_entries() {
        let manifest = Manifest::from_value(json!({ "name": "pkg" })).unwrap();
        assert!(manifest.declares_no_entries());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loading_logs_the_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "logged", "typings": "./dist/index.d.ts" }"#,
        )
        .unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            Manifest::from_dir(dir.path()).unwrap();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("loaded package.json"), "{logs}");
        assert!(logs.contains("logged"), "{logs}");
        assert!(logs.contains("using `typings` in place of `types`"), "{logs}");
    }
}
