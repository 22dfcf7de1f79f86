#![cfg_attr(docsrs, feature(doc_cfg))]

//! # tote-bundler
//!
//! Packages a JavaScript/TypeScript library for publishing: reads the
//! package manifest, works out every file its export map promises, bundles
//! each entry once per module format and writes the bundles, shared chunks
//! and declaration files.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() {
//! let report = tote_bundler::BuildOptions::new(".")
//!     .out_dir("dist")
//!     .external(["react"])
//!     .build()
//!     .await;
//!
//! for path in report.paths() {
//!     println!("{}", path.display());
//! }
//! std::process::exit(report.exit_code());
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`entries`] finds the entries from the manifest and the source tree.
//! 2. [`exports`] flattens each entry's condition tree into [`BuildTarget`]s
//!    and rejects manifests that cannot load as declared.
//! 3. [`plan`] collapses targets into bundler invocations and runs them
//!    concurrently, then splits, names, renders and writes on one task.
//! 4. [`dts`] produces the declaration files.
//!
//! Bundling and declaration generation are capabilities
//! ([`BundleCapability`], [`DeclarationCompiler`]) with default
//! implementations in [`source_graph`] and [`dts`].

pub mod bundle;
pub mod diagnostics;
pub mod dts;
pub mod entries;
pub mod error;
pub mod exports;
pub mod format;
pub mod graph;
pub mod lint;
pub mod options;
pub mod output;
pub mod plan;
pub mod prepare;
pub mod render;
pub mod report;
pub mod shims;
pub mod source_graph;
pub mod splitter;
pub mod target;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use bundle::{BundleCapability, BundleError};
pub use diagnostics::{Diagnostic, Diagnostics, Scope, Severity};
pub use dts::{DeclarationCompiler, DeclarationFailure, UnavailableCompiler, default_compiler};
pub use error::{Error, NoEntryError, Result};
pub use format::OutputFormat;
pub use graph::{Directive, ModuleGraph, ModuleKind, ModuleNode};
pub use lint::{ManifestLinter, PackageShapeLinter};
pub use options::BuildOptions;
pub use output::ArtifactKind;
pub use prepare::{prepare_exports, write_exports};
pub use report::{BuildReport, ReportedArtifact};
pub use source_graph::SourceGraphBundler;
pub use target::BuildTarget;

#[cfg(feature = "dts-generation")]
#[cfg_attr(docsrs, doc(cfg(feature = "dts-generation")))]
pub use dts::IsolatedDeclarationsCompiler;

pub use tote_config::{ConfigOverrides, Runtime, ToteConfig};
pub use tote_manifest::{Manifest, ModuleType};
