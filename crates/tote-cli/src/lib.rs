//! The `tote` command-line interface.
//!
//! A thin wrapper over [`tote_bundler`]: parses flags into configuration
//! overrides, runs the build and prints the report. Emitted paths go to
//! stdout, diagnostics and status lines to stderr.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
