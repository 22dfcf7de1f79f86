//! `tote prepare`

use std::path::Path;

use tote_bundler::{Manifest, ToteConfig, prepare_exports, write_exports};

use crate::cli::PrepareArgs;
use crate::error::Result;
use crate::ui::Printer;

/// Derive the export map; print it, or write it into package.json.
pub async fn execute(root: &Path, args: PrepareArgs, printer: Printer) -> Result<i32> {
    let manifest = Manifest::from_dir(root).map_err(tote_bundler::Error::from)?;
    let config = ToteConfig::load(root, manifest.tool_config(), &args.overrides())
        .map_err(tote_bundler::Error::from)?;
    let exports = prepare_exports(root, &config)?;

    if args.write {
        write_exports(root, &exports)?;
        if !printer.quiet {
            printer.status("✓", &format!("wrote {} subpaths to package.json", exports.len()), true);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&exports)?);
    }
    Ok(0)
}
