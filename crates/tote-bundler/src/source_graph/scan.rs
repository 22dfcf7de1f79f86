//! Per-module scanning: TypeScript/JSX stripping and module-syntax extraction.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, ModuleDeclaration,
    ModuleExportName, Statement,
};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use oxc_transformer::{TransformOptions, Transformer};

use crate::bundle::BundleError;
use crate::graph::{Directive, ImportBinding, Imported, LocalExport, ModuleKind};
use crate::shims::HOST_GLOBALS;

/// An import declaration before its specifier is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawImport {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

/// `export { imported as exported } from 'specifier'`, or
/// `export * as exported from 'specifier'` (imported = namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawReExport {
    pub specifier: String,
    pub exported: String,
    pub imported: Imported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedModule {
    pub kind: ModuleKind,
    pub directive: Option<Directive>,
    pub code: String,
    pub declared: Vec<String>,
    pub ambient: Vec<String>,
    pub imports: Vec<RawImport>,
    pub exports: Vec<LocalExport>,
    pub reexports: Vec<RawReExport>,
    pub stars: Vec<String>,
}

impl ScannedModule {
    /// Every specifier this module refers to, in source order per kind.
    pub fn specifiers(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .map(|i| i.specifier.as_str())
            .chain(self.reexports.iter().map(|r| r.specifier.as_str()))
            .chain(self.stars.iter().map(String::as_str))
    }
}

/// First eight hex digits of the BLAKE3 hash of a module id.
pub(crate) fn id_hash(id: &str) -> String {
    blake3::hash(id.as_bytes()).to_hex()[..8].to_string()
}

pub(crate) fn scan_source(path: &Path, id: &str, text: &str) -> Result<ScannedModule, BundleError> {
    if path.extension().is_some_and(|ext| ext == "json") {
        return scan_json(path, id, text);
    }

    let source_type = SourceType::from_path(path)
        .map_err(|_| BundleError::Other(format!("unsupported module type: {}", path.display())))?
        .with_module(true);

    let javascript;
    let text = if source_type.is_typescript() || source_type.is_jsx() {
        javascript = strip_types(path, text, source_type)?;
        javascript.as_str()
    } else {
        text
    };

    scan_javascript(path, id, text)
}

/// Compile TypeScript and JSX down to plain JavaScript.
fn strip_types(path: &Path, text: &str, source_type: SourceType) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, text, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(parse_error(path, parsed.errors.iter().map(|e| e.to_string())));
    }

    let mut program = parsed.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(parse_error(path, transformed.errors.iter().map(|e| e.to_string())));
    }

    Ok(Codegen::new().build(&program).code)
}

fn parse_error(path: &Path, messages: impl Iterator<Item = String>) -> BundleError {
    BundleError::Parse {
        path: path.to_path_buf(),
        messages: messages.collect(),
    }
}

fn scan_json(path: &Path, id: &str, text: &str) -> Result<ScannedModule, BundleError> {
    serde_json::from_str::<serde_json::Value>(text).map_err(|e| BundleError::Parse {
        path: path.to_path_buf(),
        messages: vec![e.to_string()],
    })?;
    let local = format!("__json_{}", id_hash(id));
    Ok(ScannedModule {
        kind: ModuleKind::Asset,
        directive: None,
        code: format!("const {local} = {};", text.trim()),
        declared: vec![local.clone()],
        ambient: Vec::new(),
        imports: Vec::new(),
        exports: vec![LocalExport {
            exported: "default".to_string(),
            local,
        }],
        reexports: Vec::new(),
        stars: Vec::new(),
    })
}

fn scan_javascript(path: &Path, id: &str, text: &str) -> Result<ScannedModule, BundleError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, text, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        return Err(parse_error(path, parsed.errors.iter().map(|e| e.to_string())));
    }
    let program = &parsed.program;

    let semantic = SemanticBuilder::new().build(program).semantic;
    let unresolved = semantic.scoping().root_unresolved_references();
    let ambient = HOST_GLOBALS
        .iter()
        .filter(|name| unresolved.contains_key(**name))
        .map(|name| (*name).to_string())
        .collect();

    let mut module = ScannedModule {
        kind: ModuleKind::Code,
        directive: program
            .directives
            .iter()
            .find_map(|d| Directive::parse(d.directive.as_str())),
        code: String::new(),
        declared: Vec::new(),
        ambient,
        imports: Vec::new(),
        exports: Vec::new(),
        reexports: Vec::new(),
        stars: Vec::new(),
    };
    let mut body: Vec<String> = Vec::new();

    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            collect_declared(stmt, &mut module.declared);
            body.push(stmt.span().source_text(text).to_string());
            continue;
        };

        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                let mut bindings = Vec::new();
                for spec in import.specifiers.iter().flatten() {
                    let binding = match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportBinding {
                            imported: Imported::default_export(),
                            local: s.local.name.to_string(),
                        },
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ImportBinding {
                            imported: Imported::Namespace,
                            local: s.local.name.to_string(),
                        },
                        ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding {
                            imported: Imported::Name(export_name(&s.imported)),
                            local: s.local.name.to_string(),
                        },
                    };
                    bindings.push(binding);
                }
                module.imports.push(RawImport {
                    specifier: import.source.value.to_string(),
                    bindings,
                });
            }
            ModuleDeclaration::ExportNamedDeclaration(named) => {
                if let Some(source) = &named.source {
                    for spec in &named.specifiers {
                        module.reexports.push(RawReExport {
                            specifier: source.value.to_string(),
                            exported: export_name(&spec.exported),
                            imported: Imported::Name(export_name(&spec.local)),
                        });
                    }
                    continue;
                }
                if let Some(declaration) = &named.declaration {
                    let mut names = Vec::new();
                    declaration_names(declaration, &mut names);
                    for name in &names {
                        module.exports.push(LocalExport {
                            exported: name.clone(),
                            local: name.clone(),
                        });
                    }
                    module.declared.extend(names);
                    let source_text = declaration.span().source_text(text);
                    if matches!(declaration, Declaration::VariableDeclaration(_))
                        && !source_text.trim_end().ends_with(';')
                    {
                        body.push(format!("{source_text};"));
                    } else {
                        body.push(source_text.to_string());
                    }
                }
                for spec in &named.specifiers {
                    module.exports.push(LocalExport {
                        exported: export_name(&spec.exported),
                        local: export_name(&spec.local),
                    });
                }
            }
            ModuleDeclaration::ExportDefaultDeclaration(default) => {
                let named_decl = match &default.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => continue,
                    _ => None,
                };
                let source_text = default.declaration.span().source_text(text);
                let local = match named_decl {
                    Some(name) => {
                        body.push(source_text.to_string());
                        name
                    }
                    None => {
                        let local = format!("__default_{}", id_hash(id));
                        body.push(format!("const {local} = {source_text};"));
                        local
                    }
                };
                module.declared.push(local.clone());
                module.exports.push(LocalExport {
                    exported: "default".to_string(),
                    local,
                });
            }
            ModuleDeclaration::ExportAllDeclaration(all) => match &all.exported {
                Some(name) => module.reexports.push(RawReExport {
                    specifier: all.source.value.to_string(),
                    exported: export_name(name),
                    imported: Imported::Namespace,
                }),
                None => module.stars.push(all.source.value.to_string()),
            },
            _ => {}
        }
    }

    module.code = body
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(module)
}

fn collect_declared(stmt: &Statement<'_>, out: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                for id in declarator.id.get_binding_identifiers() {
                    out.push(id.name.to_string());
                }
            }
        }
        Statement::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                out.push(id.name.to_string());
            }
        }
        Statement::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                out.push(id.name.to_string());
            }
        }
        _ => {}
    }
}

fn declaration_names(declaration: &Declaration<'_>, out: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                for id in declarator.id.get_binding_identifiers() {
                    out.push(id.name.to_string());
                }
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                out.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                out.push(id.name.to_string());
            }
        }
        _ => {}
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(file: &str, text: &str) -> ScannedModule {
        scan_source(Path::new(file), file, text).unwrap()
    }

    #[test]
    fn extracts_module_syntax() {
        let module = scan(
            "src/index.js",
            "'use client';\nimport React, { useState as useS } from 'react';\nimport * as utils from './utils.js';\nexport const a = 1;\nexport function b() { return a; }\nconst c = 2;\nexport { c as d };\nexport { e } from './e.js';\nexport * from './f.js';\n",
        );
        assert_eq!(module.directive, Some(Directive::Client));
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[0].bindings[0].imported, Imported::default_export());
        assert_eq!(module.imports[0].bindings[1].local, "useS");
        assert_eq!(module.imports[1].bindings[0].imported, Imported::Namespace);
        assert_eq!(module.declared, vec!["a", "b", "c"]);
        let exported: Vec<_> = module.exports.iter().map(|e| e.exported.as_str()).collect();
        assert_eq!(exported, vec!["a", "b", "d"]);
        assert_eq!(module.reexports[0].exported, "e");
        assert_eq!(module.stars, vec!["./f.js"]);
        assert!(!module.code.contains("import"));
        assert!(!module.code.contains("export"));
        assert!(!module.code.contains("use client"));
        assert!(module.code.contains("const a = 1;"));
    }

    #[test]
    fn anonymous_default_gets_generated_local() {
        let module = scan("src/a.js", "export default () => 42;\n");
        let local = format!("__default_{}", id_hash("src/a.js"));
        assert_eq!(module.exports[0].local, local);
        assert!(module.code.starts_with(&format!("const {local} = ")));
    }

    #[test]
    fn typescript_is_stripped() {
        let module = scan(
            "src/a.ts",
            "interface Shape { size: number }\nexport const area = (s: Shape): number => s.size * 2;\n",
        );
        assert!(!module.code.contains("interface"));
        assert!(!module.code.contains(": number"));
        assert_eq!(module.exports[0].exported, "area");
    }

    #[test]
    fn json_is_an_asset() {
        let module = scan("src/data.json", "{ \"a\": 1 }\n");
        assert_eq!(module.kind, ModuleKind::Asset);
        assert_eq!(module.exports[0].exported, "default");
        assert!(module.code.ends_with("{ \"a\": 1 };"));
    }

    #[test]
    fn host_globals_are_recorded_only_when_unbound() {
        let module = scan(
            "src/paths.ts",
            "export const where: string = __dirname;\nexport const note = 'call require(x) in __filename';\n// require('y')\n",
        );
        assert_eq!(module.ambient, vec!["__dirname"]);

        let module = scan(
            "src/bound.js",
            "export function load(require) { return require('x'); }\nconst { __filename } = globalThis;\nexport const f = __filename;\n",
        );
        assert!(module.ambient.is_empty(), "{:?}", module.ambient);
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = scan_source(Path::new("src/bad.js"), "src/bad.js", "export const = ;").unwrap_err();
        assert!(matches!(err, BundleError::Parse { .. }));
    }
}
