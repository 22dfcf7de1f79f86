//! Output module formats and the file extensions that go with them.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tote_config::JsFormat;
use tote_manifest::ModuleType;

/// Module format of an emitted bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ECMAScript modules (`import`/`export`)
    Esm,
    /// CommonJS (`require`/`exports`)
    Cjs,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Esm, OutputFormat::Cjs];

    /// The format `.js` files have in a package of the given type.
    pub fn for_package(module_type: ModuleType) -> Self {
        match module_type {
            ModuleType::Module => OutputFormat::Esm,
            ModuleType::CommonJs => OutputFormat::Cjs,
        }
    }

    /// The format an output extension forces on its own, if any.
    pub fn from_extension(path: &str) -> Option<Self> {
        if path.ends_with(".mjs") {
            Some(OutputFormat::Esm)
        } else if path.ends_with(".cjs") {
            Some(OutputFormat::Cjs)
        } else {
            None
        }
    }

    /// Format a runtime would load `path` as, given the package type.
    pub fn natural(path: &str, module_type: ModuleType) -> Self {
        Self::from_extension(path).unwrap_or_else(|| Self::for_package(module_type))
    }

    /// Extension for generated chunk files.
    ///
    /// `.js` is used where the package type already implies this format,
    /// the explicit `.mjs`/`.cjs` otherwise.
    pub fn chunk_extension(self, module_type: ModuleType) -> &'static str {
        match (self, module_type) {
            (OutputFormat::Esm, ModuleType::Module) => "js",
            (OutputFormat::Esm, ModuleType::CommonJs) => "mjs",
            (OutputFormat::Cjs, ModuleType::Module) => "cjs",
            (OutputFormat::Cjs, ModuleType::CommonJs) => "js",
        }
    }

    /// Declaration extension matching an output path: `.mjs` -> `.d.mts`,
    /// `.cjs` -> `.d.cts`, anything else -> `.d.ts`.
    pub fn declaration_path_for(output: &Path) -> std::path::PathBuf {
        let ext = output.extension().and_then(|e| e.to_str()).unwrap_or("");
        let dts_ext = match ext {
            "mjs" => "d.mts",
            "cjs" => "d.cts",
            _ => "d.ts",
        };
        output.with_extension(dts_ext)
    }

    pub fn matches(self, format: JsFormat) -> bool {
        matches!(
            (self, format),
            (OutputFormat::Esm, JsFormat::Esm) | (OutputFormat::Cjs, JsFormat::Cjs)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Esm => "esm",
            OutputFormat::Cjs => "cjs",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for `.d.ts`, `.d.mts` and `.d.cts` paths.
pub fn is_declaration_path(path: &str) -> bool {
    path.ends_with(".d.ts") || path.ends_with(".d.mts") || path.ends_with(".d.cts")
}

/// True for paths a bundle can be written to.
pub fn is_script_path(path: &str) -> bool {
    !is_declaration_path(path)
        && (path.ends_with(".js") || path.ends_with(".mjs") || path.ends_with(".cjs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_decides_before_package_type() {
        assert_eq!(
            OutputFormat::natural("./dist/a.cjs", ModuleType::Module),
            OutputFormat::Cjs
        );
        assert_eq!(
            OutputFormat::natural("./dist/a.js", ModuleType::Module),
            OutputFormat::Esm
        );
        assert_eq!(
            OutputFormat::natural("./dist/a.js", ModuleType::CommonJs),
            OutputFormat::Cjs
        );
    }

    #[test]
    fn chunk_extensions_follow_package_type() {
        assert_eq!(OutputFormat::Esm.chunk_extension(ModuleType::CommonJs), "mjs");
        assert_eq!(OutputFormat::Cjs.chunk_extension(ModuleType::CommonJs), "js");
        assert_eq!(OutputFormat::Esm.chunk_extension(ModuleType::Module), "js");
        assert_eq!(OutputFormat::Cjs.chunk_extension(ModuleType::Module), "cjs");
    }

    #[test]
    fn declaration_paths() {
        assert_eq!(
            OutputFormat::declaration_path_for(Path::new("dist/index.mjs")),
            PathBuf::from("dist/index.d.mts")
        );
        assert_eq!(
            OutputFormat::declaration_path_for(Path::new("dist/index.cjs")),
            PathBuf::from("dist/index.d.cts")
        );
        assert_eq!(
            OutputFormat::declaration_path_for(Path::new("dist/index.js")),
            PathBuf::from("dist/index.d.ts")
        );
    }

    #[test]
    fn declaration_paths_are_not_scripts() {
        assert!(is_declaration_path("./dist/index.d.ts"));
        assert!(!is_script_path("./dist/index.d.ts"));
        assert!(is_script_path("./dist/index.cjs"));
        assert!(!is_script_path("./dist/style.css"));
    }
}
