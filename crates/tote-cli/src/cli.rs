//! Command-line interface definition.
//!
//! - `tote [build]` builds the package in the working directory (the default
//!   when no subcommand is given)
//! - `tote prepare [--write]` derives an export map from the source tree

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tote_bundler::{ConfigOverrides, Runtime};

/// tote - build a JavaScript/TypeScript package from its package.json
#[derive(Parser, Debug)]
#[command(
    name = "tote",
    version,
    about = "Build a JavaScript/TypeScript package from its package.json",
    long_about = "tote reads the package manifest, works out every file its export map promises\n\
                  and builds each entry once per module format, sharing chunks between entries.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Package directory (default: the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress everything except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Build flags when no subcommand is given
    #[command(flatten)]
    pub build: BuildArgs,
}

impl Cli {
    /// The subcommand to run; a bare `tote` builds.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Build(self.build))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every output the manifest declares
    Build(BuildArgs),

    /// Print an export map derived from the source tree
    ///
    /// With `--write` the map replaces the `exports` field of package.json.
    Prepare(PrepareArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Source directory, relative to the package root
    #[arg(long, value_name = "DIR")]
    pub src: Option<PathBuf>,

    /// Output directory, relative to the package root
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Platform the output runs on
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeArg>,

    /// Keep existing files in the output directory
    #[arg(long)]
    pub no_clean: bool,

    /// Skip declaration files
    #[arg(long)]
    pub no_dts: bool,

    /// Keep a module out of every bundle (repeatable)
    #[arg(short, long, value_name = "NAME")]
    pub external: Vec<String>,
}

impl BuildArgs {
    /// Overrides for the flags that were given; the rest come from config.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            src_dir: self.src.clone(),
            out_dir: self.out_dir.clone(),
            runtime: self.runtime.map(Runtime::from),
            clean: self.no_clean.then_some(false),
            dts: self.no_dts.then_some(false),
            external: (!self.external.is_empty()).then(|| self.external.clone()),
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PrepareArgs {
    /// Write the derived map into package.json instead of printing it
    #[arg(long)]
    pub write: bool,

    /// Source directory, relative to the package root
    #[arg(long, value_name = "DIR")]
    pub src: Option<PathBuf>,

    /// Output directory the map points into
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

impl PrepareArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            src_dir: self.src.clone(),
            out_dir: self.out_dir.clone(),
            ..ConfigOverrides::default()
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeArg {
    /// Node.js (shims `__dirname`, `__filename` and `require`)
    Node,
    /// Browsers and other non-Node hosts
    Browser,
}

impl From<RuntimeArg> for Runtime {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Node => Runtime::Node,
            RuntimeArg::Browser => Runtime::Browser,
        }
    }
}
