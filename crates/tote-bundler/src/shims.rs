//! Ambient-binding shims for Node.js outputs.
//!
//! ES module outputs whose modules read `__filename`, `__dirname` or
//! `require` without declaring them (as recorded by the scanner) get those
//! bindings synthesized from `import.meta.url`. CommonJS outputs
//! have no `import.meta`, so references to it are rewritten in terms of the
//! CommonJS globals.

use std::sync::LazyLock;

use regex::Regex;
use tote_config::Runtime;

use crate::format::OutputFormat;
use crate::render::RenderedFile;

/// Node.js bindings an ES module output may need synthesized.
pub const HOST_GLOBALS: [&str; 3] = ["__filename", "__dirname", "require"];

static META_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bimport\.meta\.url\b").unwrap());
static META_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bimport\.meta\.filename\b").unwrap());
static META_DIRNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bimport\.meta\.dirname\b").unwrap());

const URL_FROM_FILENAME: &str = "new URL(require('node:url').pathToFileURL(__filename)).href";

/// Inject or rewrite ambient bindings in a rendered file. Returns the number
/// of shims applied.
pub fn apply_shims(file: &mut RenderedFile, format: OutputFormat, runtime: Runtime) -> usize {
    if runtime != Runtime::Node {
        return 0;
    }
    match format {
        OutputFormat::Esm => inject_esm(file),
        OutputFormat::Cjs => rewrite_cjs(file),
    }
}

fn inject_esm(file: &mut RenderedFile) -> usize {
    let uses = |name: &str| file.ambient.iter().any(|a| a == name);
    let needs_filename = uses("__filename");
    let needs_dirname = uses("__dirname");
    let needs_require = uses("require");

    let mut imports = Vec::new();
    let mut bindings = Vec::new();
    if needs_filename || needs_dirname {
        imports.push("import { fileURLToPath as __shim_fileURLToPath } from 'node:url';");
    }
    if needs_dirname {
        imports.push("import { dirname as __shim_dirname } from 'node:path';");
    }
    if needs_require {
        imports.push("import { createRequire as __shim_createRequire } from 'node:module';");
    }
    if needs_filename {
        bindings.push("const __filename = __shim_fileURLToPath(import.meta.url);");
    }
    if needs_dirname {
        bindings.push("const __dirname = __shim_dirname(__shim_fileURLToPath(import.meta.url));");
    }
    if needs_require {
        bindings.push("const require = __shim_createRequire(import.meta.url);");
    }

    file.shims
        .extend(imports.into_iter().chain(bindings).map(str::to_string));
    [needs_filename, needs_dirname, needs_require]
        .iter()
        .filter(|b| **b)
        .count()
}

fn rewrite_cjs(file: &mut RenderedFile) -> usize {
    let mut applied = 0;
    for (re, replacement) in [
        (&*META_URL, URL_FROM_FILENAME),
        (&*META_FILENAME, "__filename"),
        (&*META_DIRNAME, "__dirname"),
    ] {
        if re.is_match(&file.body) {
            file.body = re.replace_all(&file.body, replacement).into_owned();
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(body: &str, ambient: &[&str]) -> RenderedFile {
        RenderedFile {
            body: body.to_string(),
            ambient: ambient.iter().map(|a| a.to_string()).collect(),
            ..RenderedFile::default()
        }
    }

    #[test]
    fn esm_gets_dirname_only() {
        let mut f = file("const p = join(__dirname, 'x');", &["__dirname"]);
        assert_eq!(apply_shims(&mut f, OutputFormat::Esm, Runtime::Node), 1);
        assert!(f.shims.iter().any(|s| s == "const __dirname = __shim_dirname(__shim_fileURLToPath(import.meta.url));"));
        assert!(!f.shims.iter().any(|s| s.starts_with("const __filename")));
        assert!(!f.shims.iter().any(|s| s.contains("createRequire")));
    }

    #[test]
    fn esm_require_shim() {
        let mut f = file("const pkg = require('./package.json');", &["require"]);
        apply_shims(&mut f, OutputFormat::Esm, Runtime::Node);
        assert!(f.shims.iter().any(|s| s == "const require = __shim_createRequire(import.meta.url);"));
        let imports = f.shims.iter().position(|s| s.contains("from 'node:module'")).unwrap();
        let binding = f.shims.iter().position(|s| s.starts_with("const require")).unwrap();
        assert!(imports < binding);
    }

    #[test]
    fn text_mentions_without_references_get_nothing() {
        let mut f = file("const note = 'call require(x) with __dirname';", &[]);
        assert_eq!(apply_shims(&mut f, OutputFormat::Esm, Runtime::Node), 0);
        assert!(f.shims.is_empty());
    }

    #[test]
    fn cjs_rewrites_import_meta() {
        let mut f = file("const u = import.meta.url;\nconst d = import.meta.dirname;", &[]);
        assert_eq!(apply_shims(&mut f, OutputFormat::Cjs, Runtime::Node), 2);
        assert!(f.body.contains(URL_FROM_FILENAME));
        assert!(f.body.contains("const d = __dirname;"));
        assert!(!f.body.contains("import.meta"));
    }

    #[test]
    fn browser_runtime_skips_shims() {
        let mut f = file("console.log(__dirname, import.meta.url);", &["__dirname"]);
        assert_eq!(apply_shims(&mut f, OutputFormat::Esm, Runtime::Browser), 0);
        assert_eq!(apply_shims(&mut f, OutputFormat::Cjs, Runtime::Browser), 0);
        assert!(f.shims.is_empty());
    }
}
