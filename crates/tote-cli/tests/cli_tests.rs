//! End-to-end runs of the `tote` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn package(manifest: &str, files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), manifest).unwrap();
    for (path, contents) in files {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

/// `tote <args> --cwd <root> --no-color`; subcommands go first in `args`.
fn tote(root: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("tote").unwrap();
    cmd.args(args)
        .arg("--cwd")
        .arg(root)
        .arg("--no-color")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn build_prints_emitted_paths() {
    let dir = package(
        r#"{ "name": "cli-pkg", "main": "./dist/index.js" }"#,
        &[("src/index.ts", "export const answer: number = 42;\n")],
    );

    tote(dir.path(), &["--no-dts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dist/index.js"))
        .stderr(predicate::str::contains("wrote 1 file"));

    let output = fs::read_to_string(dir.path().join("dist/index.js")).unwrap();
    assert!(output.contains("exports.answer = answer;"));
}

#[test]
fn whole_build_failure_exits_nonzero() {
    let dir = package(
        r#"{ "name": "cli-bad", "type": "module", "main": "./dist/index.cjs" }"#,
        &[("src/index.ts", "export const answer: number = 42;\n")],
    );

    tote(dir.path(), &["build", "--no-dts"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CONFIGURATION_ERROR"))
        .stderr(predicate::str::contains("(at `main`)"));

    assert!(!dir.path().join("dist").exists());
}

#[test]
fn missing_entries_exit_nonzero() {
    let dir = package(r#"{ "name": "cli-empty" }"#, &[]);

    tote(dir.path(), &[])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NO_ENTRY"));
}

#[test]
fn target_failures_keep_exit_zero() {
    let dir = package(
        r#"{ "name": "cli-partial", "exports": { ".": "./dist/index.js", "./broken": "./dist/broken.js" } }"#,
        &[
            ("src/index.ts", "export const ok: boolean = true;\n"),
            ("src/broken.ts", "import { gone } from './missing';\nexport const x: number = gone;\n"),
        ],
    );

    tote(dir.path(), &["--no-dts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dist/index.js"))
        .stderr(predicate::str::contains("BUNDLE_FAILED"));
}

#[test]
fn quiet_hides_warnings() {
    let dir = package(
        r#"{ "name": "cli-quiet", "exports": { ".": { "import": "./dist/index.js", "require": "./dist/index.js" } } }"#,
        &[("src/index.ts", "export const v: number = 1;\n")],
    );

    tote(dir.path(), &["--no-dts", "--quiet"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn prepare_prints_and_writes_exports() {
    let dir = package(
        r#"{ "name": "cli-prepare", "version": "1.0.0" }"#,
        &[
            ("src/index.ts", "export const a: number = 1;\n"),
            ("src/extra.ts", "export const b: number = 2;\n"),
        ],
    );

    tote(dir.path(), &["prepare"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"./extra\""))
        .stdout(predicate::str::contains("./dist/index.mjs"));

    tote(dir.path(), &["prepare", "--write"]).assert().success();

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("package.json")).unwrap()).unwrap();
    assert_eq!(manifest["version"], "1.0.0");
    assert_eq!(manifest["exports"]["."]["require"], "./dist/index.js");
    assert_eq!(manifest["exports"]["./extra"]["types"], "./dist/extra.d.ts");
}

#[test]
fn missing_directory_is_reported() {
    let dir = TempDir::new().unwrap();
    tote(&dir.path().join("nope"), &[])
        .assert()
        .failure()
        .stderr(predicate::str::contains("package directory"));
}
