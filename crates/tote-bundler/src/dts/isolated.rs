//! Declaration emit with OXC isolated declarations.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, ExportDefaultDeclarationKind, ModuleExportName, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;

use super::DeclarationFailure;
#[cfg(feature = "dts-generation")]
use super::{DeclarationCompiler, DeclarationRequest, EmittedTypes};

/// Declarations from TypeScript sources with `oxc_isolated_declarations`;
/// plain JavaScript (when allowed) gets the loosest possible signatures.
#[cfg(feature = "dts-generation")]
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolatedDeclarationsCompiler;

#[cfg(feature = "dts-generation")]
impl DeclarationCompiler for IsolatedDeclarationsCompiler {
    fn emit_types(&self, request: &DeclarationRequest) -> Result<EmittedTypes, DeclarationFailure> {
        use oxc_codegen::Codegen;
        use oxc_isolated_declarations::{IsolatedDeclarations, IsolatedDeclarationsOptions};

        let Some(entry) = request.sources.first() else {
            return Err(DeclarationFailure::Diagnostics(vec![
                "no source files given".to_string(),
            ]));
        };

        if !crate::entries::is_typescript(&entry.path) {
            if !request.options.allow_js {
                return Err(DeclarationFailure::Diagnostics(vec![format!(
                    "`{}` is JavaScript and allowJs is off",
                    entry.path.display()
                )]));
            }
            return loose_declarations(&entry.path, &entry.text).map(|declaration| EmittedTypes {
                declaration,
                sideband: Vec::new(),
            });
        }

        let allocator = Allocator::default();
        let source_type = source_type_for(&entry.path)?;
        let parsed = Parser::new(&allocator, &entry.text, source_type).parse();
        if !parsed.errors.is_empty() {
            return Err(DeclarationFailure::Diagnostics(
                parsed.errors.iter().map(|e| e.to_string()).collect(),
            ));
        }

        let options = IsolatedDeclarationsOptions {
            strip_internal: request.options.strip_internal,
        };
        let dts = IsolatedDeclarations::new(&allocator, options).build(&parsed.program);
        if !dts.errors.is_empty() {
            return Err(DeclarationFailure::Diagnostics(
                dts.errors.iter().map(|e| e.to_string()).collect(),
            ));
        }

        Ok(EmittedTypes {
            declaration: Codegen::new().build(&dts.program).code,
            sideband: Vec::new(),
        })
    }
}

fn source_type_for(path: &Path) -> Result<SourceType, DeclarationFailure> {
    SourceType::from_path(path)
        .map(|source_type| source_type.with_module(true))
        .map_err(|_| {
            DeclarationFailure::Diagnostics(vec![format!(
                "unsupported source extension: {}",
                path.display()
            )])
        })
}

/// Declarations for plain JavaScript: every export typed as `any`.
pub fn loose_declarations(path: &Path, text: &str) -> Result<String, DeclarationFailure> {
    let allocator = Allocator::default();
    let source_type = source_type_for(path)?;
    let parsed = Parser::new(&allocator, text, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(DeclarationFailure::Diagnostics(
            parsed.errors.iter().map(|e| e.to_string()).collect(),
        ));
    }

    let mut out = String::new();
    for stmt in &parsed.program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    match declaration {
                        Declaration::FunctionDeclaration(func) => {
                            if let Some(id) = &func.id {
                                out.push_str(&format!(
                                    "export declare function {}(...args: any[]): any;\n",
                                    id.name
                                ));
                            }
                        }
                        Declaration::VariableDeclaration(var) => {
                            for declarator in &var.declarations {
                                for id in declarator.id.get_binding_identifiers() {
                                    out.push_str(&format!("export declare const {}: any;\n", id.name));
                                }
                            }
                        }
                        Declaration::ClassDeclaration(class) => {
                            if let Some(id) = &class.id {
                                out.push_str(&format!("export declare const {}: any;\n", id.name));
                            }
                        }
                        _ => {}
                    }
                }
                for spec in &decl.specifiers {
                    let exported = export_name(&spec.exported);
                    match &decl.source {
                        Some(source) => out.push_str(&format!(
                            "export {{ {} as {exported} }} from '{}';\n",
                            export_name(&spec.local),
                            source.value
                        )),
                        None if exported == "default" => {
                            out.push_str("declare const _default: any;\nexport default _default;\n")
                        }
                        None => out.push_str(&format!("export declare const {exported}: any;\n")),
                    }
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                if !matches!(
                    decl.declaration,
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_)
                ) {
                    out.push_str("declare const _default: any;\nexport default _default;\n");
                }
            }
            Statement::ExportAllDeclaration(decl) => match &decl.exported {
                Some(name) => out.push_str(&format!(
                    "export * as {} from '{}';\n",
                    export_name(name),
                    decl.source.value
                )),
                None => out.push_str(&format!("export * from '{}';\n", decl.source.value)),
            },
            _ => {}
        }
    }

    if out.is_empty() {
        out.push_str("export {};\n");
    }
    Ok(out)
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => format!("{:?}", lit.value.as_str()),
    }
}
