//! CLI error types and their conversion to miette reports.

use std::path::PathBuf;

use miette::Report;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The engine refused to run (manifest, configuration, I/O).
    #[error(transparent)]
    Bundler(#[from] tote_bundler::Error),

    #[error("cannot use `{}` as the package directory: {source}", .path.display())]
    WorkingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot print the export map: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convert a CLI error into a report with the engine's code and help text
/// when there is one.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Bundler(err) => Report::new(err),
        other => miette::miette!("{}", other),
    }
}
