//! Shared fixture builders for tote-bundler integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tote_bundler::{BuildOptions, BuildReport, Diagnostic};
use walkdir::WalkDir;

/// A package on disk: `package.json` plus whatever files a test adds.
pub struct Package {
    dir: TempDir,
}

impl Package {
    pub fn new(manifest: Value) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let text = serde_json::to_string_pretty(&manifest).expect("manifest json");
        fs::write(dir.path().join("package.json"), text).expect("write package.json");
        fs::create_dir_all(dir.path().join("src")).expect("create src");
        Self { dir }
    }

    /// Add a file relative to the package root.
    pub fn file(self, relative: &str, contents: &str) -> Self {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, contents).expect("write file");
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).is_file()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative))
            .unwrap_or_else(|e| panic!("cannot read {relative}: {e}"))
    }

    /// Build options for this package with declarations off, the most
    /// common setup in these tests.
    pub fn options(&self) -> BuildOptions {
        BuildOptions::new(self.root()).dts(false)
    }

    /// Every file below `dir`, relative to the package root, sorted.
    pub fn files_in(&self, dir: &str) -> Vec<String> {
        let base = self.path(dir);
        if !base.is_dir() {
            return Vec::new();
        }
        let mut files: Vec<String> = WalkDir::new(&base)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(self.root())
                    .expect("inside root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }

    /// Files below `dist` whose name contains `needle`.
    pub fn dist_matching(&self, needle: &str) -> Vec<String> {
        self.files_in("dist")
            .into_iter()
            .filter(|path| path.rsplit('/').next().is_some_and(|name| name.contains(needle)))
            .collect()
    }
}

/// Emitted paths, `/`-separated.
pub fn report_paths(report: &BuildReport) -> Vec<String> {
    report
        .paths()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect()
}

pub fn with_code<'a>(report: &'a BuildReport, code: &str) -> Vec<&'a Diagnostic> {
    report.diagnostics.iter().filter(|d| d.code == code).collect()
}

/// Panic with the rendered report when the build did not succeed.
pub fn assert_built(report: &BuildReport) {
    assert_eq!(report.exit_code(), 0, "build failed:\n{}", report.render());
}
