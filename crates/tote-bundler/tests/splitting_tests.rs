//! Directive isolation and shared chunks across entries.

mod helpers;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use helpers::{Package, assert_built, report_paths, with_code};
use serde_json::json;
use tote_bundler::diagnostics::codes;
use tote_bundler::dts::{DeclarationRequest, EmittedTypes};
use tote_bundler::{
    BundleCapability, BundleError, DeclarationCompiler, DeclarationFailure, ModuleGraph,
    OutputFormat, Scope, Severity, SourceGraphBundler,
};

const BUTTON: &str = "'use client';\n\nexport function Button(): string {\n  return 'button';\n}\n";

fn two_entry_manifest() -> serde_json::Value {
    json!({
        "name": "ui",
        "exports": {
            ".": { "import": "./dist/index.mjs", "require": "./dist/index.js" },
            "./other": { "import": "./dist/other.mjs", "require": "./dist/other.js" }
        }
    })
}

#[tokio::test]
async fn client_module_shared_by_entries_is_emitted_once_per_format() {
    let pkg = Package::new(two_entry_manifest())
        .file("src/button.ts", BUTTON)
        .file(
            "src/index.ts",
            "import { Button } from './button';\nexport const main: string = Button();\n",
        )
        .file(
            "src/other.ts",
            "import { Button } from './button';\nexport const other: string = Button();\n",
        );

    let report = pkg.options().build().await;
    assert_built(&report);

    let chunks = pkg.dist_matching("button-client-");
    assert_eq!(chunks.len(), 2, "{chunks:?}");
    assert_eq!(chunks.iter().filter(|c| c.ends_with(".mjs")).count(), 1);
    assert_eq!(chunks.iter().filter(|c| c.ends_with(".js")).count(), 1);
    for chunk in &chunks {
        let text = pkg.read(chunk);
        assert!(text.starts_with("\"use client\";"), "{chunk}: {text}");
        assert!(text.contains("function Button()"));
    }

    let index = pkg.read("dist/index.mjs");
    assert!(index.contains("from './button-client-"), "{index}");
    assert!(!index.contains("use client"));
    assert!(!index.contains("function Button()"));

    let other = pkg.read("dist/other.js");
    assert!(other.contains("require('./button-client-"), "{other}");
}

#[tokio::test]
async fn client_module_of_a_single_entry_still_gets_its_own_chunk() {
    let pkg = Package::new(json!({
        "name": "single",
        "type": "module",
        "exports": "./dist/index.js"
    }))
    .file("src/button.ts", BUTTON)
    .file(
        "src/index.ts",
        "import { Button } from './button';\nexport const label: string = Button();\n",
    );

    let report = pkg.options().build().await;
    assert_built(&report);

    let chunks = pkg.dist_matching("button-client-");
    assert_eq!(chunks.len(), 1, "{chunks:?}");
    assert!(chunks[0].ends_with(".js"));
    assert!(pkg.read(&chunks[0]).starts_with("\"use client\";"));
    assert!(pkg.read("dist/index.js").contains("export { label };"));
}

#[tokio::test]
async fn helpers_shared_by_entries_form_one_chunk() {
    let pkg = Package::new(two_entry_manifest())
        .file("src/helpers/a.ts", "export function one(): number {\n  return 1;\n}\n")
        .file("src/helpers/b.ts", "export function two(): number {\n  return 2;\n}\n")
        .file(
            "src/index.ts",
            "import { one } from './helpers/a';\nimport { two } from './helpers/b';\nexport const sum: number = one() + two();\n",
        )
        .file(
            "src/other.ts",
            "import { one } from './helpers/a';\nimport { two } from './helpers/b';\nexport const diff: number = two() - one();\n",
        );

    let report = pkg.options().build().await;
    assert_built(&report);

    let shared = pkg.dist_matching("-shared-");
    assert_eq!(shared.len(), 2, "{shared:?}");
    for ext in [".mjs", ".js"] {
        let files: Vec<_> = shared.iter().filter(|c| c.ends_with(ext)).collect();
        assert_eq!(files.len(), 1);
        let text = pkg.read(files[0]);
        assert!(text.contains("function one()"));
        assert!(text.contains("function two()"));
        assert!(!text.contains("use client"));
    }

    let index = pkg.read("dist/index.mjs");
    assert!(!index.contains("function one()"), "{index}");
    assert!(index.contains("export { sum };"));
}

#[tokio::test]
async fn json_reached_only_through_a_client_module_stays_in_its_chunk() {
    let pkg = Package::new(two_entry_manifest())
        .file(
            "src/button.ts",
            "'use client';\nimport data from './data.json';\n\nexport function Button(): string {\n  return data.label;\n}\n",
        )
        .file("src/data.json", "{ \"label\": \"hi\" }\n")
        .file(
            "src/index.ts",
            "import { Button } from './button';\nexport const main: string = Button();\n",
        )
        .file(
            "src/other.ts",
            "import { Button } from './button';\nexport const other: string = Button();\n",
        );

    let report = pkg.options().build().await;
    assert_built(&report);

    let chunks = pkg.dist_matching("-client-");
    assert_eq!(chunks.len(), 2, "{chunks:?}");
    assert_eq!(chunks.iter().filter(|c| c.ends_with(".mjs")).count(), 1);
    assert_eq!(chunks.iter().filter(|c| c.ends_with(".js")).count(), 1);
    for chunk in &chunks {
        let text = pkg.read(chunk);
        assert!(text.starts_with("\"use client\";"), "{chunk}: {text}");
        assert!(text.contains("\"label\": \"hi\""), "{chunk}: {text}");
    }
    assert!(pkg.dist_matching("-shared-").is_empty());
    assert_eq!(pkg.files_in("dist").len(), 6, "{:?}", pkg.files_in("dist"));

    for entry in ["dist/index.mjs", "dist/index.js", "dist/other.mjs", "dist/other.js"] {
        assert!(!pkg.read(entry).contains("\"label\""), "{entry}");
    }
}

#[tokio::test]
async fn side_effect_entry_imported_by_another_entry_loads_the_shared_chunk() {
    let pkg = Package::new(json!({
        "name": "setup",
        "type": "module",
        "exports": {
            ".": "./dist/index.js",
            "./setup": "./dist/setup.js"
        }
    }))
    .file("src/setup.ts", "globalThis.__setup = true;\n")
    .file(
        "src/index.ts",
        "import './setup';\nexport const ready: boolean = true;\n",
    );

    let report = pkg.options().build().await;
    assert_built(&report);

    let shared = pkg.dist_matching("-shared-");
    assert_eq!(shared.len(), 1, "{shared:?}");
    assert!(pkg.read(&shared[0]).contains("__setup = true"));

    let setup = pkg.read("dist/setup.js");
    assert!(setup.contains("import './setup-shared-"), "{setup}");
    assert!(!setup.contains("__setup = true"));

    let index = pkg.read("dist/index.js");
    assert!(index.contains("import './setup-shared-"), "{index}");
    assert!(index.contains("export { ready };"));
}

#[tokio::test]
async fn module_reached_from_client_and_server_aborts_the_build() {
    let pkg = Package::new(json!({ "name": "mixed", "type": "module", "exports": "./dist/index.js" }))
        .file("src/shared.ts", "export const tag: string = 'shared';\n")
        .file(
            "src/client.ts",
            "'use client';\nimport { tag } from './shared';\nexport const clientTag: string = tag;\n",
        )
        .file(
            "src/server.ts",
            "'use server';\nimport { tag } from './shared';\nexport const serverTag: string = tag;\n",
        )
        .file(
            "src/index.ts",
            "import { clientTag } from './client';\nimport { serverTag } from './server';\nexport const both: string = clientTag + serverTag;\n",
        );

    let report = pkg.options().build().await;

    assert_eq!(report.exit_code(), 1);
    assert!(report.artifacts.is_empty());
    let fatal = with_code(&report, codes::AMBIGUOUS_DIRECTIVE);
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].message.contains("src/shared.ts"), "{}", fatal[0].message);
    assert!(!pkg.path("dist").exists());
}

/// Fails for every entry whose file name starts with `broken`.
struct FailingBundler {
    inner: SourceGraphBundler,
}

#[async_trait]
impl BundleCapability for FailingBundler {
    async fn bundle(&self, entry: &Path, format: OutputFormat) -> Result<ModuleGraph, BundleError> {
        let name = entry.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with("broken") {
            return Err(BundleError::Other(format!("refusing {name}")));
        }
        self.inner.bundle(entry, format).await
    }
}

#[tokio::test]
async fn bundle_failure_only_affects_its_own_targets() {
    let pkg = Package::new(json!({
        "name": "partial",
        "exports": {
            ".": { "import": "./dist/index.mjs", "require": "./dist/index.js" },
            "./broken": { "import": "./dist/broken.mjs", "require": "./dist/broken.js" }
        }
    }))
    .file("src/index.ts", "export const ok: boolean = true;\n")
    .file("src/broken.ts", "export const nope: boolean = false;\n");

    let bundler = FailingBundler {
        inner: SourceGraphBundler::new(pkg.root()),
    };
    let report = pkg.options().bundler(Arc::new(bundler)).build().await;

    assert_eq!(report.exit_code(), 0, "{}", report.render());
    assert!(pkg.exists("dist/index.mjs"));
    assert!(pkg.exists("dist/index.js"));
    assert!(!pkg.exists("dist/broken.mjs"));
    assert!(!pkg.exists("dist/broken.js"));

    let failures = with_code(&report, codes::BUNDLE_FAILED);
    assert_eq!(failures.len(), 2);
    let mut scopes: Vec<_> = failures
        .iter()
        .map(|d| {
            assert_eq!(d.severity, Severity::Fatal);
            d.scope.clone()
        })
        .collect();
    scopes.sort_by_key(|s| format!("{s:?}"));
    assert_eq!(
        scopes,
        vec![
            Scope::Target("dist/broken.js".into()),
            Scope::Target("dist/broken.mjs".into()),
        ]
    );
}

/// Emits the same declaration for every source.
struct StaticCompiler;

impl DeclarationCompiler for StaticCompiler {
    fn emit_types(&self, _request: &DeclarationRequest) -> Result<EmittedTypes, DeclarationFailure> {
        Ok(EmittedTypes {
            declaration: "export declare const value: boolean;\n".into(),
            sideband: Vec::new(),
        })
    }
}

#[tokio::test]
async fn bundle_failure_skips_its_declarations() {
    let pkg = Package::new(json!({
        "name": "partial-types",
        "exports": {
            ".": { "import": "./dist/index.mjs" },
            "./broken": { "import": "./dist/broken.mjs" }
        }
    }))
    .file("src/index.ts", "export const ok: boolean = true;\n")
    .file("src/broken.ts", "export const nope: boolean = false;\n")
    .file("dist/broken.d.mts", "export declare const nope: boolean;\n");

    let bundler = FailingBundler {
        inner: SourceGraphBundler::new(pkg.root()),
    };
    let report = pkg
        .options()
        .clean(false)
        .dts(true)
        .bundler(Arc::new(bundler))
        .compiler(Arc::new(StaticCompiler))
        .build()
        .await;

    assert_eq!(report.exit_code(), 0, "{}", report.render());
    assert_eq!(with_code(&report, codes::BUNDLE_FAILED).len(), 1);
    assert!(pkg.exists("dist/index.mjs"));
    assert!(pkg.exists("dist/index.d.mts"));
    assert!(!pkg.exists("dist/broken.mjs"));
    assert!(!pkg.exists("dist/broken.d.mts"), "declaration of a failed bundle was kept");
    assert!(
        report_paths(&report).iter().all(|p| !p.contains("broken")),
        "{:?}",
        report_paths(&report)
    );
}
