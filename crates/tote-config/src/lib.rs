//! Layered configuration for the tote bundler.
//!
//! [`ToteConfig::load`] merges, lowest priority first: built-in defaults,
//! `tote.toml` at the package root, the `"tote"` object of `package.json`,
//! `TOTE_*` environment variables and explicit [`ConfigOverrides`].

pub mod config;
pub mod error;

pub use config::{CONFIG_FILE_NAME, ConfigOverrides, ENV_PREFIX, JsFormat, Runtime, ToteConfig};
pub use error::{ConfigError, Result};
