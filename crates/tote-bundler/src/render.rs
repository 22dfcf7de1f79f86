//! Renders entry outputs and standalone chunks of one format to source text.
//!
//! Module bodies are concatenated into their output file. Bindings that
//! cross module boundaries are re-linked here: within one file by aliasing
//! top-level names, across files with generated import/export statements.
//! When two modules of one file declare the same top-level name, every
//! module of that file is wrapped in its own function scope instead.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use sugar_path::SugarPath;

use crate::format::OutputFormat;
use crate::graph::{Directive, Imported, ModuleNode};
use crate::source_graph::id_hash;
use crate::splitter::{ChunkPlan, FormatGraph, LinkedStar, Placement};

/// Written first in every CommonJS file that has exports.
pub const CJS_INTEROP_HEADER: &str = "Object.defineProperty(exports, '__esModule', { value: true });";

const INTEROP_DEFAULT_HELPER: &str =
    "function __interopDefault(m) { return m && m.__esModule ? m.default : m; }";

/// What a rendered file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// The output of one view's entry module
    Entry { view: usize },
    /// A standalone chunk
    Chunk { chunk: usize },
}

/// One file to render.
#[derive(Debug, Clone)]
pub struct RenderUnit {
    pub path: PathBuf,
    pub kind: UnitKind,
    pub hashbang: Option<String>,
}

/// A rendered file, kept in sections until shims have been applied.
#[derive(Debug, Clone, Default)]
pub struct RenderedFile {
    pub hashbang: Option<String>,
    pub directive: Option<Directive>,
    pub interop_header: bool,
    pub shims: Vec<String>,
    /// Host bindings the member modules read without declaring them
    pub ambient: Vec<String>,
    pub imports: Vec<String>,
    pub helpers: Vec<String>,
    pub body: String,
    /// Linking problems worth surfacing (missing exports and the like)
    pub warnings: Vec<String>,
}

impl RenderedFile {
    pub fn assemble(&self) -> String {
        let mut prologue = Vec::new();
        if let Some(hashbang) = &self.hashbang {
            prologue.push(hashbang.clone());
        }
        if let Some(directive) = self.directive {
            prologue.push(format!("\"{}\";", directive.text()));
        }
        if self.interop_header {
            prologue.push(CJS_INTEROP_HEADER.to_string());
        }

        let sections = [
            prologue.join("\n"),
            self.shims.join("\n"),
            self.imports.join("\n"),
            self.helpers.join("\n"),
            self.body.clone(),
        ];
        let mut out = sections
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        out.push('\n');
        out
    }
}

/// What a name refers to once imports and re-exports are followed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding<'g> {
    Local { module: usize, local: &'g str },
    Namespace(usize),
    External { specifier: &'g str, imported: Imported },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ImportSource<'g> {
    Chunk(PathBuf),
    External(&'g str),
}

enum Home<'a> {
    Local,
    Chunk(&'a Path),
    Unavailable,
}

#[derive(Default)]
struct UnitState<'g> {
    wrapped: bool,
    imports: IndexMap<ImportSource<'g>, Vec<(Imported, String)>>,
    namespaces: IndexMap<usize, Option<String>>,
    aliases: FxHashSet<String>,
    needs_interop: bool,
    warnings: Vec<String>,
}

impl<'g> UnitState<'g> {
    fn add_import(&mut self, source: ImportSource<'g>, spec: Option<(Imported, String)>) {
        let specs = self.imports.entry(source).or_default();
        if let Some(spec) = spec {
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
    }
}

/// Renders every file of one format.
pub struct Renderer<'a, 'g> {
    graph: &'a FormatGraph<'g>,
    plan: &'a ChunkPlan,
    chunk_paths: &'a FxHashMap<usize, PathBuf>,
    /// Name each exposed `(module, local)` is exported under by its chunk
    public: FxHashMap<(usize, &'g str), String>,
}

impl<'a, 'g> Renderer<'a, 'g> {
    pub fn new(
        graph: &'a FormatGraph<'g>,
        plan: &'a ChunkPlan,
        chunk_paths: &'a FxHashMap<usize, PathBuf>,
    ) -> Self {
        let mut renderer = Self {
            graph,
            plan,
            chunk_paths,
            public: FxHashMap::default(),
        };
        for chunk in plan.chunks.iter().filter(|c| c.is_standalone()) {
            let mut used = FxHashSet::default();
            for &module in &chunk.modules {
                for local in renderer.exposed(module) {
                    let mut name = local.to_string();
                    let mut n = 1;
                    while used.contains(&name) {
                        name = format!("{local}_{n}");
                        n += 1;
                    }
                    used.insert(name.clone());
                    renderer.public.insert((module, local), name);
                }
            }
        }
        renderer
    }

    pub fn format(&self) -> OutputFormat {
        self.graph.format
    }

    pub fn render(&self, unit: &RenderUnit) -> RenderedFile {
        let members = self.members(unit);
        let mut state = UnitState {
            wrapped: self.has_collisions(&members),
            ..UnitState::default()
        };
        if state.wrapped {
            tracing::debug!(path = %unit.path.display(), "top-level names collide, wrapping modules");
        }

        // An entry whose own module lives in a chunk still has to load it.
        if let UnitKind::Entry { view } = unit.kind {
            if let Home::Chunk(path) = self.home(self.graph.views[view].entry, unit) {
                state.add_import(ImportSource::Chunk(path.to_path_buf()), None);
            }
        }

        let sections: Vec<String> = members
            .iter()
            .map(|&module| self.render_module(module, unit, &mut state))
            .collect();
        let (exports, stars) = self.unit_exports(unit, &mut state);

        let mut ambient: Vec<String> = Vec::new();
        for name in members.iter().flat_map(|&m| &self.node(m).ambient) {
            if !ambient.contains(name) {
                ambient.push(name.clone());
            }
        }

        let format = self.format();
        let mut body: Vec<String> = state.namespaces.values().flatten().cloned().collect();
        body.extend(sections);
        body.extend(self.export_lines(format, &exports, &stars));

        let imports = self.import_lines(unit, &mut state);
        let directive = match unit.kind {
            UnitKind::Entry { view } => self.graph.directive(self.graph.views[view].entry),
            UnitKind::Chunk { chunk } => self.plan.chunks[chunk].directive,
        };

        RenderedFile {
            hashbang: unit.hashbang.clone(),
            directive,
            interop_header: format == OutputFormat::Cjs && (!exports.is_empty() || !stars.is_empty()),
            shims: Vec::new(),
            ambient,
            imports,
            helpers: if state.needs_interop {
                vec![INTEROP_DEFAULT_HELPER.to_string()]
            } else {
                Vec::new()
            },
            body: body.join("\n\n"),
            warnings: state.warnings,
        }
    }

    fn node(&self, module: usize) -> &'g ModuleNode {
        self.graph.modules[module].node
    }

    fn members(&self, unit: &RenderUnit) -> Vec<usize> {
        match unit.kind {
            UnitKind::Entry { view } => self
                .plan
                .order
                .iter()
                .copied()
                .filter(|module| {
                    self.plan
                        .module_chunk
                        .get(module)
                        .is_some_and(|&c| self.plan.chunks[c].placement == Placement::Inline(view))
                })
                .collect(),
            UnitKind::Chunk { chunk } => self.plan.chunks[chunk].modules.clone(),
        }
    }

    fn home(&self, module: usize, unit: &RenderUnit) -> Home<'a> {
        let Some(&chunk) = self.plan.module_chunk.get(&module) else {
            return Home::Unavailable;
        };
        let local = match unit.kind {
            UnitKind::Entry { view } => self.plan.chunks[chunk].placement == Placement::Inline(view),
            UnitKind::Chunk { chunk: own } => own == chunk,
        };
        if local {
            return Home::Local;
        }
        match self.chunk_paths.get(&chunk) {
            Some(path) if self.plan.chunks[chunk].is_standalone() => Home::Chunk(path),
            _ => Home::Unavailable,
        }
    }

    fn is_import_bound(&self, module: usize, local: &str) -> bool {
        let linked = &self.graph.modules[module];
        linked
            .imports
            .iter()
            .any(|(_, bindings)| bindings.iter().any(|b| b.local == local))
            || linked
                .node
                .externals
                .iter()
                .any(|ext| ext.bindings.iter().any(|b| b.local == local))
    }

    /// Locals of `module` other modules may refer to.
    fn exposed(&self, module: usize) -> Vec<&'g str> {
        let mut locals = IndexSet::new();
        for export in &self.node(module).exports {
            if !self.is_import_bound(module, &export.local) {
                locals.insert(export.local.as_str());
            }
        }
        locals.into_iter().collect()
    }

    fn resolve_export(
        &self,
        module: usize,
        name: &str,
        seen: &mut FxHashSet<(usize, String)>,
    ) -> Binding<'g> {
        if !seen.insert((module, name.to_string())) {
            return Binding::Missing;
        }
        let node = self.node(module);
        let linked = &self.graph.modules[module];

        if let Some(export) = node.exports.iter().find(|e| e.exported == name) {
            return self.resolve_local(module, &export.local, seen);
        }
        if let Some(&(target, reexport)) = linked.reexports.iter().find(|(_, re)| re.exported == name) {
            return self.follow(target, &reexport.imported, seen);
        }
        if name == "default" {
            return Binding::Missing;
        }
        for star in &linked.stars {
            if let LinkedStar::Internal(target) = *star {
                let binding = self.resolve_export(target, name, seen);
                if binding != Binding::Missing {
                    return binding;
                }
            }
        }
        linked
            .stars
            .iter()
            .find_map(|star| match *star {
                LinkedStar::External(specifier) => Some(Binding::External {
                    specifier,
                    imported: Imported::name(name),
                }),
                LinkedStar::Internal(_) => None,
            })
            .unwrap_or(Binding::Missing)
    }

    fn resolve_local(
        &self,
        module: usize,
        local: &'g str,
        seen: &mut FxHashSet<(usize, String)>,
    ) -> Binding<'g> {
        let linked = &self.graph.modules[module];
        for &(target, bindings) in &linked.imports {
            if let Some(binding) = bindings.iter().find(|b| b.local == local) {
                return self.follow(target, &binding.imported, seen);
            }
        }
        for ext in &self.node(module).externals {
            if let Some(binding) = ext.bindings.iter().find(|b| b.local == local) {
                return Binding::External {
                    specifier: ext.specifier.as_str(),
                    imported: binding.imported.clone(),
                };
            }
        }
        Binding::Local { module, local }
    }

    fn follow(
        &self,
        target: usize,
        imported: &Imported,
        seen: &mut FxHashSet<(usize, String)>,
    ) -> Binding<'g> {
        match imported {
            Imported::Namespace => Binding::Namespace(target),
            Imported::Name(name) => self.resolve_export(target, name, seen),
        }
    }

    fn binding_of(&self, target: usize, imported: &Imported) -> Binding<'g> {
        self.follow(target, imported, &mut FxHashSet::default())
    }

    /// Every name `module` exports, including those reached through
    /// internal `export *` (which never forward `default`).
    fn exported_names(&self, module: usize) -> Vec<&'g str> {
        fn collect<'g>(
            renderer: &Renderer<'_, 'g>,
            module: usize,
            with_default: bool,
            names: &mut IndexSet<&'g str>,
            visited: &mut FxHashSet<usize>,
        ) {
            if !visited.insert(module) {
                return;
            }
            let node = renderer.node(module);
            let exported = node
                .exports
                .iter()
                .map(|e| e.exported.as_str())
                .chain(node.reexports.iter().map(|re| re.exported.as_str()));
            for name in exported {
                if with_default || name != "default" {
                    names.insert(name);
                }
            }
            for star in &renderer.graph.modules[module].stars {
                if let LinkedStar::Internal(target) = *star {
                    collect(renderer, target, false, names, visited);
                }
            }
        }

        let mut names = IndexSet::new();
        collect(self, module, true, &mut names, &mut FxHashSet::default());
        names.into_iter().collect()
    }

    /// External modules whose exports `module` forwards with `export *`.
    fn external_stars(&self, module: usize) -> Vec<&'g str> {
        let mut stars = IndexSet::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![module];
        while let Some(module) = stack.pop() {
            if !visited.insert(module) {
                continue;
            }
            for star in &self.graph.modules[module].stars {
                match *star {
                    LinkedStar::External(specifier) => {
                        stars.insert(specifier);
                    }
                    LinkedStar::Internal(target) => stack.push(target),
                }
            }
        }
        stars.into_iter().collect()
    }

    /// True when two modules of the unit bind one top-level name to
    /// different things.
    fn has_collisions(&self, members: &[usize]) -> bool {
        let mut claims: FxHashMap<&'g str, Binding<'g>> = FxHashMap::default();
        let mut claim = |name: &'g str, binding: Binding<'g>| match claims.get(name) {
            Some(existing) => *existing != binding,
            None => {
                claims.insert(name, binding);
                false
            }
        };

        for &module in members {
            let linked = &self.graph.modules[module];
            let node = self.node(module);
            for name in &node.declared {
                if claim(name.as_str(), Binding::Local { module, local: name.as_str() }) {
                    return true;
                }
            }
            for &(target, bindings) in &linked.imports {
                for binding in bindings {
                    if claim(binding.local.as_str(), self.binding_of(target, &binding.imported)) {
                        return true;
                    }
                }
            }
            for ext in &node.externals {
                for binding in &ext.bindings {
                    let external = Binding::External {
                        specifier: ext.specifier.as_str(),
                        imported: binding.imported.clone(),
                    };
                    if claim(binding.local.as_str(), external) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// An expression evaluating to `binding` inside the unit.
    fn expr_for(&self, binding: Binding<'g>, unit: &RenderUnit, state: &mut UnitState<'g>) -> String {
        match binding {
            Binding::Local { module, local } => match self.home(module, unit) {
                Home::Local if state.wrapped => {
                    format!("__m_{}.{local}", id_hash(self.graph.id(module)))
                }
                Home::Local => local.to_string(),
                Home::Chunk(path) => match self.public.get(&(module, local)) {
                    Some(public) => {
                        let alias = format!("__{}_{}", id_hash(self.graph.id(module)), local);
                        state.add_import(
                            ImportSource::Chunk(path.to_path_buf()),
                            Some((Imported::name(public.clone()), alias.clone())),
                        );
                        alias
                    }
                    None => {
                        state.warnings.push(format!(
                            "`{local}` of {} is not exported by its chunk",
                            self.graph.id(module)
                        ));
                        "void 0".to_string()
                    }
                },
                Home::Unavailable => {
                    state.warnings.push(format!(
                        "{} is not available to {}",
                        self.graph.id(module),
                        unit.path.display()
                    ));
                    "void 0".to_string()
                }
            },
            Binding::Namespace(module) => self.namespace(module, unit, state),
            Binding::External {
                specifier,
                imported,
            } => {
                let suffix = match &imported {
                    Imported::Namespace => "ns".to_string(),
                    Imported::Name(name) => sanitize(name),
                };
                let alias = format!("__ext_{}_{suffix}", id_hash(specifier));
                state.add_import(ImportSource::External(specifier), Some((imported, alias.clone())));
                alias
            }
            Binding::Missing => "void 0".to_string(),
        }
    }

    /// Name of a frozen namespace object for `module`, declared in the unit.
    fn namespace(&self, module: usize, unit: &RenderUnit, state: &mut UnitState<'g>) -> String {
        let name = format!("__ns_{}", id_hash(self.graph.id(module)));
        if state.namespaces.contains_key(&module) {
            return name;
        }
        state.namespaces.insert(module, None);

        let mut lines = vec![
            format!("const {name} = Object.freeze({{"),
            "\t__proto__: null,".to_string(),
            "\t[Symbol.toStringTag]: 'Module',".to_string(),
        ];
        for export in self.exported_names(module) {
            let binding = self.resolve_export(module, export, &mut FxHashSet::default());
            let expr = self.expr_for(binding, unit, state);
            lines.push(format!("\tget {}() {{ return {expr}; }},", property_key(export)));
        }
        lines.push("});".to_string());
        state.namespaces.insert(module, Some(lines.join("\n")));
        name
    }

    fn render_module(&self, module: usize, unit: &RenderUnit, state: &mut UnitState<'g>) -> String {
        let linked = &self.graph.modules[module];
        let node = linked.node;
        let mut lines = Vec::new();

        for &dep in &linked.deps {
            if let Home::Chunk(path) = self.home(dep, unit) {
                state.add_import(ImportSource::Chunk(path.to_path_buf()), None);
            }
        }

        for &(target, bindings) in &linked.imports {
            for binding in bindings {
                let resolved = self.binding_of(target, &binding.imported);
                if resolved == Binding::Missing {
                    state.warnings.push(format!(
                        "{}: {} is not exported by {}",
                        node.id,
                        imported_label(&binding.imported),
                        self.graph.id(target)
                    ));
                }
                self.alias(&binding.local, resolved, unit, state, &mut lines);
            }
        }

        for ext in &node.externals {
            let source = ImportSource::External(ext.specifier.as_str());
            if ext.bindings.is_empty() {
                state.add_import(source, None);
                continue;
            }
            for binding in &ext.bindings {
                if state.wrapped {
                    let expr = self.expr_for(
                        Binding::External {
                            specifier: ext.specifier.as_str(),
                            imported: binding.imported.clone(),
                        },
                        unit,
                        state,
                    );
                    lines.push(format!("const {} = {expr};", binding.local));
                } else {
                    state.add_import(
                        source.clone(),
                        Some((binding.imported.clone(), binding.local.clone())),
                    );
                }
            }
        }

        let mut section = vec![format!("// {}", node.id)];
        if state.wrapped {
            let getters: Vec<String> = self
                .exposed(module)
                .into_iter()
                .map(|local| format!("get {local}() {{ return {local}; }}"))
                .collect();
            section.push(format!(
                "const __m_{} = (() => {{",
                id_hash(self.graph.id(module))
            ));
            section.extend(lines);
            if !node.code.is_empty() {
                section.push(node.code.clone());
            }
            section.push(format!("return {{ {} }};", getters.join(", ")));
            section.push("})();".to_string());
        } else {
            section.extend(lines);
            if !node.code.is_empty() {
                section.push(node.code.clone());
            }
        }
        section.join("\n")
    }

    /// Bind `local` to `binding` for the module being rendered.
    fn alias(
        &self,
        local: &str,
        binding: Binding<'g>,
        unit: &RenderUnit,
        state: &mut UnitState<'g>,
        lines: &mut Vec<String>,
    ) {
        if state.wrapped {
            let expr = self.expr_for(binding, unit, state);
            lines.push(format!("const {local} = {expr};"));
            return;
        }
        if !state.aliases.insert(local.to_string()) {
            return;
        }
        match binding {
            Binding::Local { module, local: target } => match self.home(module, unit) {
                Home::Local if target == local => {}
                Home::Chunk(path) if self.public.contains_key(&(module, target)) => {
                    let public = self.public[&(module, target)].clone();
                    state.add_import(
                        ImportSource::Chunk(path.to_path_buf()),
                        Some((Imported::name(public), local.to_string())),
                    );
                }
                _ => {
                    let expr = self.expr_for(binding, unit, state);
                    lines.push(format!("const {local} = {expr};"));
                }
            },
            Binding::External {
                specifier,
                imported,
            } => {
                state.add_import(
                    ImportSource::External(specifier),
                    Some((imported, local.to_string())),
                );
            }
            Binding::Namespace(_) | Binding::Missing => {
                let expr = self.expr_for(binding, unit, state);
                lines.push(format!("const {local} = {expr};"));
            }
        }
    }

    /// Public `(name, expression)` pairs and external star re-exports.
    fn unit_exports(
        &self,
        unit: &RenderUnit,
        state: &mut UnitState<'g>,
    ) -> (Vec<(String, String)>, Vec<&'g str>) {
        match unit.kind {
            UnitKind::Entry { view } => {
                let entry = self.graph.views[view].entry;
                let mut exports = Vec::new();
                for name in self.exported_names(entry) {
                    let binding = self.resolve_export(entry, name, &mut FxHashSet::default());
                    if binding == Binding::Missing {
                        state.warnings.push(format!(
                            "export `{name}` of {} could not be resolved",
                            self.graph.id(entry)
                        ));
                    }
                    exports.push((name.to_string(), self.expr_for(binding, unit, state)));
                }
                (exports, self.external_stars(entry))
            }
            UnitKind::Chunk { chunk } => {
                let mut exports = Vec::new();
                for &module in &self.plan.chunks[chunk].modules {
                    for local in self.exposed(module) {
                        let Some(public) = self.public.get(&(module, local)) else {
                            continue;
                        };
                        let expr = self.expr_for(Binding::Local { module, local }, unit, state);
                        exports.push((public.clone(), expr));
                    }
                }
                (exports, Vec::new())
            }
        }
    }

    fn import_lines(&self, unit: &RenderUnit, state: &mut UnitState<'g>) -> Vec<String> {
        let format = self.format();
        let mut lines = Vec::new();
        for (source, specs) in &state.imports {
            let specifier = match source {
                ImportSource::Chunk(path) => relative_specifier(&unit.path, path),
                ImportSource::External(specifier) => specifier.to_string(),
            };
            let from = js_string(&specifier);
            if specs.is_empty() {
                lines.push(match format {
                    OutputFormat::Esm => format!("import {from};"),
                    OutputFormat::Cjs => format!("require({from});"),
                });
                continue;
            }

            let mut named = Vec::new();
            for (imported, local) in specs {
                match (imported, format) {
                    (Imported::Namespace, OutputFormat::Esm) => {
                        lines.push(format!("import * as {local} from {from};"));
                    }
                    (Imported::Namespace, OutputFormat::Cjs) => {
                        lines.push(format!("const {local} = require({from});"));
                    }
                    (Imported::Name(name), OutputFormat::Cjs)
                        if name == "default" && matches!(source, ImportSource::External(_)) =>
                    {
                        state.needs_interop = true;
                        lines.push(format!("const {local} = __interopDefault(require({from}));"));
                    }
                    (Imported::Name(name), _) => named.push((name.as_str(), local.as_str())),
                }
            }
            if named.is_empty() {
                continue;
            }
            let specs: Vec<String> = named
                .iter()
                .map(|&(name, local)| match format {
                    _ if name == local => local.to_string(),
                    OutputFormat::Esm => format!("{} as {local}", property_key(name)),
                    OutputFormat::Cjs => format!("{}: {local}", property_key(name)),
                })
                .collect();
            lines.push(match format {
                OutputFormat::Esm => format!("import {{ {} }} from {from};", specs.join(", ")),
                OutputFormat::Cjs => format!("const {{ {} }} = require({from});", specs.join(", ")),
            });
        }
        lines
    }

    fn export_lines(
        &self,
        format: OutputFormat,
        exports: &[(String, String)],
        stars: &[&str],
    ) -> Vec<String> {
        let mut lines = Vec::new();
        match format {
            OutputFormat::Esm => {
                let mut specs = Vec::new();
                for (i, (name, expr)) in exports.iter().enumerate() {
                    let local = if is_identifier(expr) {
                        expr.clone()
                    } else {
                        let local = format!("__export_{i}");
                        lines.push(format!("const {local} = {expr};"));
                        local
                    };
                    specs.push(if &local == name {
                        local
                    } else {
                        format!("{local} as {}", property_key(name))
                    });
                }
                if !specs.is_empty() {
                    lines.push(format!("export {{ {} }};", specs.join(", ")));
                }
                for star in stars {
                    lines.push(format!("export * from {};", js_string(star)));
                }
            }
            OutputFormat::Cjs => {
                for (name, expr) in exports {
                    if is_identifier(name) {
                        lines.push(format!("exports.{name} = {expr};"));
                    } else {
                        lines.push(format!("exports[{}] = {expr};", js_string(name)));
                    }
                }
                for (i, star) in stars.iter().enumerate() {
                    let local = format!("__star_{i}");
                    lines.push(format!(
                        "const {local} = require({});\n\
                         Object.keys({local}).forEach(function (k) {{\n\
                         \tif (k !== 'default' && !Object.prototype.hasOwnProperty.call(exports, k)) Object.defineProperty(exports, k, {{\n\
                         \t\tenumerable: true,\n\
                         \t\tget: function () {{ return {local}[k]; }}\n\
                         \t}});\n\
                         }});",
                        js_string(star)
                    ));
                }
            }
        }
        if lines.is_empty() {
            return Vec::new();
        }
        vec![lines.join("\n")]
    }
}

/// `./chunk.js`-style specifier from one output file to another.
pub fn relative_specifier(from_file: &Path, to_file: &Path) -> String {
    let dir = from_file.parent().unwrap_or(Path::new(""));
    let relative = to_file.relative(dir).as_path().to_slash_lossy().into_owned();
    if relative.starts_with('.') {
        relative
    } else {
        format!("./{relative}")
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

fn js_string(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

fn imported_label(imported: &Imported) -> String {
    match imported {
        Imported::Namespace => "namespace".to_string(),
        Imported::Name(name) => format!("`{name}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        ExternalImport, GraphBuilder, ImportBinding, ImportEdge, LocalExport, ModuleGraph,
        ModuleIdx, ModuleKind, ModuleNode,
    };
    use crate::splitter::split;

    fn code(id: &str, body: &str, declared: &[&str], exports: &[(&str, &str)]) -> ModuleNode {
        let mut node = ModuleNode::new(id, ModuleKind::Code);
        node.code = body.to_string();
        node.declared = declared.iter().map(|s| s.to_string()).collect();
        node.exports = exports
            .iter()
            .map(|(exported, local)| LocalExport {
                exported: exported.to_string(),
                local: local.to_string(),
            })
            .collect();
        node
    }

    fn import(builder: &mut GraphBuilder, from: ModuleIdx, to: ModuleIdx, names: &[(&str, &str)]) {
        builder.get_mut(from).imports.push(ImportEdge {
            target: to,
            bindings: names
                .iter()
                .map(|(imported, local)| ImportBinding {
                    imported: if *imported == "*" {
                        Imported::Namespace
                    } else {
                        Imported::name(*imported)
                    },
                    local: local.to_string(),
                })
                .collect(),
        });
    }

    /// Render every entry of `graphs` in `format`; returns entry sources
    /// and standalone chunk sources.
    fn render_all(format: OutputFormat, graphs: &[&ModuleGraph]) -> (Vec<String>, Vec<String>) {
        let pairs: Vec<(usize, &ModuleGraph)> = graphs.iter().copied().enumerate().collect();
        let merged = FormatGraph::merge(format, &pairs);
        let plan = split(&merged).unwrap();
        let ext = format.chunk_extension(tote_manifest::ModuleType::Module);
        let chunk_paths: FxHashMap<usize, PathBuf> = plan
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_standalone())
            .map(|(i, _)| (i, PathBuf::from(format!("/pkg/dist/chunk{i}.{ext}"))))
            .collect();
        let renderer = Renderer::new(&merged, &plan, &chunk_paths);

        let entries = (0..graphs.len())
            .map(|view| {
                renderer
                    .render(&RenderUnit {
                        path: PathBuf::from(format!("/pkg/dist/entry{view}.{ext}")),
                        kind: UnitKind::Entry { view },
                        hashbang: None,
                    })
                    .assemble()
            })
            .collect();
        let mut chunk_ids: Vec<_> = chunk_paths.keys().copied().collect();
        chunk_ids.sort();
        let chunks = chunk_ids
            .into_iter()
            .map(|chunk| {
                renderer
                    .render(&RenderUnit {
                        path: chunk_paths[&chunk].clone(),
                        kind: UnitKind::Chunk { chunk },
                        hashbang: None,
                    })
                    .assemble()
            })
            .collect();
        (entries, chunks)
    }

    fn entry_with_helper() -> ModuleGraph {
        let mut builder = GraphBuilder::new();
        let entry = builder.add(code(
            "src/index.ts",
            "const value = twice(2);",
            &["value"],
            &[("value", "value")],
        ));
        let helper = builder.add(code(
            "src/helper.ts",
            "function twice(n) { return n * 2; }",
            &["twice"],
            &[("twice", "twice")],
        ));
        import(&mut builder, entry, helper, &[("twice", "twice")]);
        builder.build(entry)
    }

    #[test]
    fn esm_entry_inlines_helper() {
        let (entries, chunks) = render_all(OutputFormat::Esm, &[&entry_with_helper()]);
        assert!(chunks.is_empty());
        let out = &entries[0];
        assert!(out.contains("function twice(n)"));
        assert!(out.contains("const value = twice(2);"));
        assert!(out.ends_with("export { value };\n"));
        assert!(out.find("function twice").unwrap() < out.find("const value").unwrap());
    }

    #[test]
    fn cjs_entry_has_interop_header_and_exports() {
        let (entries, _) = render_all(OutputFormat::Cjs, &[&entry_with_helper()]);
        let out = &entries[0];
        assert!(out.starts_with(CJS_INTEROP_HEADER));
        assert!(out.contains("exports.value = value;"));
        assert!(!out.contains("export {"));
    }

    #[test]
    fn external_imports_in_both_formats() {
        let mut builder = GraphBuilder::new();
        let mut entry = code("src/index.js", "const el = React.createElement(x);", &["el"], &[("el", "el")]);
        entry.externals.push(ExternalImport {
            specifier: "react".into(),
            bindings: vec![
                ImportBinding {
                    imported: Imported::default_export(),
                    local: "React".into(),
                },
                ImportBinding {
                    imported: Imported::name("useState"),
                    local: "x".into(),
                },
            ],
        });
        let idx = builder.add(entry);
        let graph = builder.build(idx);

        let (esm, _) = render_all(OutputFormat::Esm, &[&graph]);
        assert!(esm[0].contains("import { default as React, useState as x } from 'react';"));

        let (cjs, _) = render_all(OutputFormat::Cjs, &[&graph]);
        assert!(cjs[0].contains("const React = __interopDefault(require('react'));"));
        assert!(cjs[0].contains("const { useState: x } = require('react');"));
        assert!(cjs[0].contains(INTEROP_DEFAULT_HELPER));
    }

    #[test]
    fn shared_helper_is_imported_from_chunk() {
        let make = |id: &str| {
            let mut builder = GraphBuilder::new();
            let entry = builder.add(code(id, "const out = twice(1);", &["out"], &[("out", "out")]));
            let helper = builder.add(code(
                "src/helper.ts",
                "function twice(n) { return n * 2; }",
                &["twice"],
                &[("twice", "twice")],
            ));
            import(&mut builder, entry, helper, &[("twice", "twice")]);
            builder.build(entry)
        };
        let a = make("src/a.ts");
        let b = make("src/b.ts");

        let (entries, chunks) = render_all(OutputFormat::Esm, &[&a, &b]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("function twice(n)"));
        assert!(chunks[0].contains("export { twice };"));
        for entry in &entries {
            assert!(entry.contains("import { twice } from './chunk"));
            assert!(!entry.contains("function twice"));
        }
    }

    #[test]
    fn entry_moved_into_a_chunk_still_loads_it() {
        let setup = || code("src/setup.ts", "globalThis.__setup = true;", &[], &[]);
        let mut builder = GraphBuilder::new();
        let index = builder.add(code("src/index.ts", "const ready = 1;", &["ready"], &[("ready", "ready")]));
        let imported = builder.add(setup());
        import(&mut builder, index, imported, &[]);
        let index_graph = builder.build(index);

        let mut builder = GraphBuilder::new();
        let own = builder.add(setup());
        let setup_graph = builder.build(own);

        for format in [OutputFormat::Esm, OutputFormat::Cjs] {
            let (entries, chunks) = render_all(format, &[&index_graph, &setup_graph]);
            assert_eq!(chunks.len(), 1);
            assert!(chunks[0].contains("globalThis.__setup = true;"));
            let loads = match format {
                OutputFormat::Esm => "import './chunk",
                OutputFormat::Cjs => "require('./chunk",
            };
            assert!(entries[0].contains(loads), "{}", entries[0]);
            assert!(entries[1].contains(loads), "{}", entries[1]);
            assert!(!entries[1].contains("__setup = true"));
        }
    }

    #[test]
    fn ambient_references_of_members_are_collected() {
        let mut builder = GraphBuilder::new();
        let mut entry = code("src/index.js", "const here = __dirname;", &["here"], &[("here", "here")]);
        entry.ambient = vec!["__dirname".into()];
        let idx = builder.add(entry);
        let graph = builder.build(idx);

        let merged = FormatGraph::merge(OutputFormat::Esm, &[(0, &graph)]);
        let plan = split(&merged).unwrap();
        let chunk_paths = FxHashMap::default();
        let file = Renderer::new(&merged, &plan, &chunk_paths).render(&RenderUnit {
            path: PathBuf::from("/pkg/dist/index.js"),
            kind: UnitKind::Entry { view: 0 },
            hashbang: None,
        });
        assert_eq!(file.ambient, vec!["__dirname"]);
    }

    #[test]
    fn colliding_names_are_wrapped() {
        let mut builder = GraphBuilder::new();
        let entry = builder.add(code(
            "src/index.js",
            "const helper = 1;\nconst total = helper + other;",
            &["helper", "total"],
            &[("total", "total")],
        ));
        let dep = builder.add(code(
            "src/dep.js",
            "const helper = 2;\nconst other = helper;",
            &["helper", "other"],
            &[("other", "other")],
        ));
        import(&mut builder, entry, dep, &[("other", "other")]);
        let graph = builder.build(entry);

        let (entries, _) = render_all(OutputFormat::Esm, &[&graph]);
        let out = &entries[0];
        let dep_hash = id_hash("src/dep.js");
        let entry_hash = id_hash("src/index.js");
        assert!(out.contains(&format!("const __m_{dep_hash} = (() => {{")));
        assert!(out.contains(&format!("const other = __m_{dep_hash}.other;")));
        assert!(out.contains(&format!("const __export_0 = __m_{entry_hash}.total;")));
        assert!(out.contains("export { __export_0 as total };"));
    }

    #[test]
    fn namespace_imports_build_frozen_objects() {
        let mut builder = GraphBuilder::new();
        let entry = builder.add(code("src/index.js", "const n = utils.a;", &["n"], &[("n", "n")]));
        let utils = builder.add(code("src/utils.js", "const a = 1;", &["a"], &[("a", "a")]));
        import(&mut builder, entry, utils, &[("*", "utils")]);
        let graph = builder.build(entry);

        let (entries, _) = render_all(OutputFormat::Esm, &[&graph]);
        let ns = format!("__ns_{}", id_hash("src/utils.js"));
        assert!(entries[0].contains(&format!("const {ns} = Object.freeze({{")));
        assert!(entries[0].contains("\tget a() { return a; },"));
        assert!(entries[0].contains(&format!("const utils = {ns};")));
    }

    #[test]
    fn entry_directive_leads_the_file() {
        let mut builder = GraphBuilder::new();
        let mut node = code("src/client.js", "const x = 1;", &["x"], &[("x", "x")]);
        node.directive = Some(Directive::Client);
        let idx = builder.add(node);
        let graph = builder.build(idx);
        let (entries, _) = render_all(OutputFormat::Esm, &[&graph]);
        assert!(entries[0].starts_with("\"use client\";\n"));
    }

    #[test]
    fn relative_specifiers() {
        assert_eq!(
            relative_specifier(Path::new("/pkg/dist/index.js"), Path::new("/pkg/dist/a-shared-1.js")),
            "./a-shared-1.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/pkg/dist/sub/index.js"), Path::new("/pkg/dist/a.js")),
            "../a.js"
        );
    }
}
