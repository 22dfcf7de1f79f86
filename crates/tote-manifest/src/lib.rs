//! # tote-manifest
//!
//! The package manifest model used by the tote bundler.
//!
//! [`Manifest`] is the normalized view of `package.json`; its `exports` field
//! is an [`ExportsField`] whose values are [`ExportNode`] trees, so the rest
//! of the build never inspects raw JSON shapes.
//!
//! ```
//! use tote_manifest::{ExportNode, Manifest};
//!
//! let manifest = Manifest::from_value(serde_json::json!({
//!     "type": "module",
//!     "exports": { ".": { "import": "./dist/index.js" } }
//! }))
//! .unwrap();
//!
//! let main = manifest.exports.as_ref().and_then(|e| e.get(".")).unwrap();
//! assert!(matches!(main, ExportNode::Conditional(_)));
//! ```

mod error;
mod export_node;
mod package_json;

pub use error::{ManifestError, Result};
pub use export_node::{DEFAULT_CONDITION, ExportNode, ExportsField, FieldPath};
pub use package_json::{BinField, Manifest, ModuleType};
