//! The subset of `tsconfig.json` the declaration assembler reads.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::diagnostics::{Diagnostic, Scope, codes};

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    #[serde(default)]
    compiler_options: CompilerOptionsFile,
}

/// `compilerOptions` as written in the project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptionsFile {
    #[serde(default)]
    pub allow_js: bool,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub composite: bool,
    #[serde(default)]
    pub ts_build_info_file: Option<PathBuf>,
    #[serde(default)]
    pub no_emit: bool,
    #[serde(default)]
    pub declaration_dir: Option<PathBuf>,
    #[serde(default)]
    pub strip_internal: bool,
}

/// Project settings, defaulted when the file is missing or unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsConfig {
    pub compiler_options: CompilerOptionsFile,
    /// Where the settings came from, if a file was read
    pub path: Option<PathBuf>,
}

impl TsConfig {
    /// Read `path`. A missing file yields defaults silently; an unreadable
    /// or malformed one yields defaults and a warning.
    pub fn load(path: &Path) -> (Self, Option<Diagnostic>) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no tsconfig; using defaults");
                return (Self::default(), None);
            }
            Err(err) => return (Self::default(), Some(warning(path, err.to_string()))),
        };

        match Self::parse(&text) {
            Ok(compiler_options) => {
                if compiler_options.declaration_dir.is_some() {
                    tracing::debug!("ignoring compilerOptions.declarationDir; declarations follow the manifest");
                }
                let config = Self {
                    compiler_options,
                    path: Some(path.to_path_buf()),
                };
                (config, None)
            }
            Err(message) => (Self::default(), Some(warning(path, message))),
        }
    }

    /// Parse tsconfig text, which may contain comments and trailing commas.
    pub fn parse(text: &str) -> Result<CompilerOptionsFile, String> {
        let cleaned = strip_comments(text);
        let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1");
        serde_json::from_str::<RawTsConfig>(&cleaned)
            .map(|raw| raw.compiler_options)
            .map_err(|e| e.to_string())
    }
}

fn warning(path: &Path, message: String) -> Diagnostic {
    Diagnostic::warning(
        Scope::Build,
        codes::TSCONFIG,
        format!("cannot use `{}`, falling back to defaults: {message}", path.display()),
    )
    .with_file(path)
}

/// Remove `//` and `/* */` comments outside string literals.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}
