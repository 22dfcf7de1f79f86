//! The module graph a bundling capability returns for one invocation.
//!
//! Nodes live in an arena and refer to each other by [`ModuleIdx`]. A module
//! body has had all module syntax removed; what it imports and exports is
//! described by the structured fields instead, so later stages can regroup
//! modules into chunks and re-link them in either output format.

use std::fmt;

/// Index of a module inside one [`ModuleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIdx(pub usize);

impl ModuleIdx {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Component-isolation directive declared in a module's prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Directive {
    Client,
    Server,
}

impl Directive {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "use client" => Some(Directive::Client),
            "use server" => Some(Directive::Server),
            _ => None,
        }
    }

    /// The directive text, e.g. `use client`.
    pub fn text(self) -> &'static str {
        match self {
            Directive::Client => "use client",
            Directive::Server => "use server",
        }
    }

    /// Short kind used in chunk names.
    pub fn kind(self) -> &'static str {
        match self {
            Directive::Client => "client",
            Directive::Server => "server",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// JavaScript (possibly compiled from TypeScript/JSX)
    Code,
    /// Non-code data such as JSON
    Asset,
}

/// What an import binding refers to in the target module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Imported {
    /// A named export (`default` for default imports)
    Name(String),
    /// The module namespace object
    Namespace,
}

impl Imported {
    pub fn default_export() -> Self {
        Imported::Name("default".to_string())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Imported::Name(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub imported: Imported,
    /// Name the binding has inside the importing module
    pub local: String,
}

/// An import of another module in the same graph. Empty `bindings` means
/// a side-effect import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    pub target: ModuleIdx,
    pub bindings: Vec<ImportBinding>,
}

/// An import of a module outside the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalImport {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

/// `export { local as exported }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    pub exported: String,
    pub local: String,
}

/// `export { imported as exported } from './target'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExport {
    pub exported: String,
    pub target: ModuleIdx,
    pub imported: Imported,
}

/// `export * from '...'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarExport {
    Internal(ModuleIdx),
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    /// Package-relative path with `/` separators, e.g. `src/utils.ts`
    pub id: String,
    pub kind: ModuleKind,
    pub directive: Option<Directive>,
    /// Module body without module syntax, directive prologue or hashbang
    pub code: String,
    /// Top-level names the body declares
    pub declared: Vec<String>,
    /// Node.js host bindings the body reads without declaring them
    pub ambient: Vec<String>,
    pub imports: Vec<ImportEdge>,
    pub externals: Vec<ExternalImport>,
    pub exports: Vec<LocalExport>,
    pub reexports: Vec<ReExport>,
    pub star_exports: Vec<StarExport>,
}

impl ModuleNode {
    pub fn new(id: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            id: id.into(),
            kind,
            directive: None,
            code: String::new(),
            declared: Vec::new(),
            ambient: Vec::new(),
            imports: Vec::new(),
            externals: Vec::new(),
            exports: Vec::new(),
            reexports: Vec::new(),
            star_exports: Vec::new(),
        }
    }

    /// Modules this one depends on, in source order.
    pub fn dependencies(&self) -> impl Iterator<Item = ModuleIdx> + '_ {
        self.imports
            .iter()
            .map(|edge| edge.target)
            .chain(self.reexports.iter().map(|re| re.target))
            .chain(self.star_exports.iter().filter_map(|star| match star {
                StarExport::Internal(idx) => Some(*idx),
                StarExport::External(_) => None,
            }))
    }
}

/// Result of bundling one entry in one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGraph {
    pub modules: Vec<ModuleNode>,
    pub entry: ModuleIdx,
}

impl ModuleGraph {
    pub fn entry_module(&self) -> &ModuleNode {
        &self.modules[self.entry.index()]
    }

    pub fn module(&self, idx: ModuleIdx) -> &ModuleNode {
        &self.modules[idx.index()]
    }

    pub fn find(&self, id: &str) -> Option<ModuleIdx> {
        self.modules
            .iter()
            .position(|module| module.id == id)
            .map(ModuleIdx)
    }
}

/// Builder for hand-made graphs, used by capability implementations and tests.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    modules: Vec<ModuleNode>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: ModuleNode) -> ModuleIdx {
        self.modules.push(module);
        ModuleIdx(self.modules.len() - 1)
    }

    pub fn get_mut(&mut self, idx: ModuleIdx) -> &mut ModuleNode {
        &mut self.modules[idx.index()]
    }

    pub fn build(self, entry: ModuleIdx) -> ModuleGraph {
        ModuleGraph {
            modules: self.modules,
            entry,
        }
    }
}
