//! Subcommand implementations.

pub mod build;
pub mod prepare;

use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

pub use build::execute as build_execute;
pub use prepare::execute as prepare_execute;

/// The package directory: `--cwd` resolved against the current directory.
pub fn package_root(cwd: Option<&Path>) -> Result<PathBuf> {
    let current = std::env::current_dir().map_err(|source| CliError::WorkingDirectory {
        path: PathBuf::from("."),
        source,
    })?;
    let root = match cwd {
        Some(dir) => current.join(dir),
        None => current,
    };
    if !root.is_dir() {
        return Err(CliError::WorkingDirectory {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            path: root,
        });
    }
    Ok(root)
}
