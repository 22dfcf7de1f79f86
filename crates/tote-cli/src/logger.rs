//! Logging setup for the `tote` binary.
//!
//! Build diagnostics reach the terminal through [`crate::ui::Printer`], so
//! by default nothing is logged. `--verbose` turns on debug output for the
//! tote crates and `RUST_LOG` applies otherwise. `--quiet` silences logging
//! even when `RUST_LOG` is set.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "tote_bundler=debug,tote_config=debug,tote_manifest=debug,tote_cli=debug";
const SILENT_FILTER: &str = "off";

/// The filter for the given flags. `verbose` wins over `quiet`.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(SILENT_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(SILENT_FILTER))
    }
}

/// Install the global subscriber. Logs go to stderr so stdout only carries
/// the build report.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .without_time()
        .compact();

    let installed = tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("a global subscriber is already installed");
    }
}
