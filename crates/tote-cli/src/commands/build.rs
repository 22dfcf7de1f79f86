//! `tote build`

use std::path::Path;

use tote_bundler::BuildOptions;

use crate::cli::BuildArgs;
use crate::error::Result;
use crate::ui::Printer;

/// Build the package at `root` and print the report. Returns the process
/// exit status.
pub async fn execute(root: &Path, args: BuildArgs, printer: Printer) -> Result<i32> {
    tracing::debug!(root = %root.display(), "building package");
    let report = BuildOptions::new(root)
        .overrides(args.overrides())
        .build()
        .await;
    printer.report(&report);
    Ok(report.exit_code())
}
