use std::path::{Component, Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Name of the optional TOML config file at the package root.
pub const CONFIG_FILE_NAME: &str = "tote.toml";

/// Prefix for environment variable overrides (`TOTE_OUT_DIR`, `TOTE_CLEAN`, ...).
pub const ENV_PREFIX: &str = "TOTE_";

/// The platform the emitted code runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Node.js: ambient bindings such as `__dirname` are shimmed.
    #[default]
    Node,
    /// Browsers and other non-Node hosts: no shims.
    Browser,
}

/// A module format named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsFormat {
    #[serde(alias = "module", alias = "es")]
    Esm,
    #[serde(alias = "commonjs")]
    Cjs,
}

fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_tsconfig() -> PathBuf {
    PathBuf::from("tsconfig.json")
}

fn default_hashbang() -> String {
    "#!/usr/bin/env node".to_string()
}

fn default_true() -> bool {
    true
}

/// Build configuration.
///
/// Field names are camelCase in `tote.toml` and in the `"tote"` object of
/// `package.json`. Environment variables use the upper snake-case spelling
/// (`TOTE_OUT_DIR` sets `outDir`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToteConfig {
    /// Source directory, relative to the package root
    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// Output directory, relative to the package root
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    #[serde(default)]
    pub runtime: Runtime,

    /// Empty the output directory before writing
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Emit declaration files
    #[serde(default = "default_true")]
    pub dts: bool,

    /// Formats for which plain JavaScript sources still get declarations
    #[serde(default)]
    pub allow_js: Vec<JsFormat>,

    /// TypeScript project file, relative to the package root
    #[serde(default = "default_tsconfig")]
    pub tsconfig: PathBuf,

    /// Extra module specifiers kept out of every bundle
    #[serde(default)]
    pub external: Vec<String>,

    /// Upper bound on concurrent bundler invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Interpreter line written at the top of executable outputs
    #[serde(default = "default_hashbang")]
    pub hashbang: String,
}

impl Default for ToteConfig {
    fn default() -> Self {
        Self {
            src_dir: default_src_dir(),
            out_dir: default_out_dir(),
            runtime: Runtime::default(),
            clean: true,
            dts: true,
            allow_js: Vec::new(),
            tsconfig: default_tsconfig(),
            external: Vec::new(),
            max_parallel: None,
            hashbang: default_hashbang(),
        }
    }
}

/// Explicit overrides applied on top of every other layer (CLI flags,
/// programmatic callers). Unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
}

impl ToteConfig {
    /// Load configuration for the package at `root`.
    ///
    /// Priority: overrides > `TOTE_*` environment > `package.json#tote` >
    /// `tote.toml` > defaults.
    pub fn load(
        root: &Path,
        package_config: Option<&serde_json::Value>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(ToteConfig::default()));

        let config_file = root.join(CONFIG_FILE_NAME);
        if config_file.is_file() {
            tracing::debug!(path = %config_file.display(), "loading config file");
            figment = figment.merge(Toml::file(config_file));
        }

        if let Some(value) = package_config {
            if !value.is_object() {
                return Err(ConfigError::invalid(
                    "package.json#tote",
                    "expected an object",
                ));
            }
            figment = figment.merge(Serialized::defaults(value));
        }

        figment = figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| env_key_to_field(key.as_str()).into())
                    .lowercase(false),
            )
            .merge(Serialized::defaults(overrides));

        let config: ToteConfig = figment
            .extract()
            .map_err(|e| ConfigError::invalid("configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would read or write outside the package.
    pub fn validate(&self) -> Result<()> {
        check_relative_dir("srcDir", &self.src_dir)?;
        check_relative_dir("outDir", &self.out_dir)?;

        if normalize(&self.out_dir) == normalize(&self.src_dir) {
            return Err(ConfigError::invalid(
                "outDir",
                "must differ from srcDir; cleaning it would delete the sources",
            ));
        }

        if self.max_parallel == Some(0) {
            return Err(ConfigError::invalid("maxParallel", "must be at least 1"));
        }

        if self.hashbang.lines().count() > 1 || !self.hashbang.starts_with("#!") {
            return Err(ConfigError::invalid(
                "hashbang",
                "must be a single line starting with `#!`",
            ));
        }

        Ok(())
    }

    /// Absolute source directory for a package rooted at `root`.
    pub fn src_path(&self, root: &Path) -> PathBuf {
        root.join(&self.src_dir)
    }

    /// Absolute output directory for a package rooted at `root`.
    pub fn out_path(&self, root: &Path) -> PathBuf {
        root.join(&self.out_dir)
    }
}

fn check_relative_dir(field: &str, dir: &Path) -> Result<()> {
    if dir.is_absolute() {
        return Err(ConfigError::invalid(
            field,
            format!("`{}` must be relative to the package root", dir.display()),
        ));
    }
    if dir.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConfigError::invalid(
            field,
            format!("`{}` escapes the package root", dir.display()),
        ));
    }
    if normalize(dir).as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            field,
            "must name a directory below the package root",
        ));
    }
    Ok(())
}

/// `OUT_DIR` -> `outDir`
fn env_key_to_field(key: &str) -> String {
    let mut field = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = !field.is_empty();
        } else if upper_next {
            field.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            field.push(c.to_ascii_lowercase());
        }
    }
    field
}

fn normalize(dir: &Path) -> PathBuf {
    dir.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}
