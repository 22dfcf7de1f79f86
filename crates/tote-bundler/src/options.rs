use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tote_config::{ConfigOverrides, Runtime, ToteConfig};
use tote_manifest::Manifest;

use crate::bundle::BundleCapability;
use crate::diagnostics::Diagnostics;
use crate::dts::{DeclarationCompiler, TsConfig, default_compiler};
use crate::error::Result;
use crate::lint::{ManifestLinter, PackageShapeLinter};
use crate::plan::{Capabilities, execute, plan_build};
use crate::report::{BuildReport, ReportedArtifact};
use crate::source_graph::SourceGraphBundler;

/// Everything needed to build one package.
///
/// Settings not given here come from the layered configuration
/// (`tote.toml`, `package.json#tote`, `TOTE_*`). Capabilities default to
/// [`SourceGraphBundler`] and [`default_compiler`].
///
/// ```no_run
/// # async fn run() {
/// use tote_bundler::BuildOptions;
///
/// let report = BuildOptions::new("./packages/ui").out_dir("dist").build().await;
/// println!("{}", report.render());
/// std::process::exit(report.exit_code());
/// # }
/// ```
#[derive(Clone)]
pub struct BuildOptions {
    /// Package root (the directory holding `package.json`)
    pub root: PathBuf,

    /// Highest-priority configuration layer
    pub overrides: ConfigOverrides,

    /// Bundling capability (default: [`SourceGraphBundler`]).
    pub bundler: Option<Arc<dyn BundleCapability>>,

    /// Declaration-generation capability (default: [`default_compiler`]).
    pub compiler: Option<Arc<dyn DeclarationCompiler>>,

    /// Validators run over the manifest after writing.
    pub linters: Vec<Arc<dyn ManifestLinter>>,
}

impl BuildOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: ConfigOverrides::default(),
            bundler: None,
            compiler: None,
            linters: vec![Arc::new(PackageShapeLinter)],
        }
    }

    pub fn src_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overrides.src_dir = Some(dir.into());
        self
    }

    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overrides.out_dir = Some(dir.into());
        self
    }

    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.overrides.runtime = Some(runtime);
        self
    }

    /// Empty the output directory before writing (default: on).
    pub fn clean(mut self, enabled: bool) -> Self {
        self.overrides.clean = Some(enabled);
        self
    }

    /// Generate declaration files (default: on).
    pub fn dts(mut self, enabled: bool) -> Self {
        self.overrides.dts = Some(enabled);
        self
    }

    /// Specifiers to keep out of every bundle, on top of the package's
    /// dependencies.
    pub fn external<I, S>(mut self, specifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides
            .external
            .get_or_insert_with(Vec::new)
            .extend(specifiers.into_iter().map(Into::into));
        self
    }

    /// Cap on concurrent bundler invocations (default: `min(cpus, 8)`).
    pub fn max_parallel(mut self, limit: usize) -> Self {
        self.overrides.max_parallel = Some(limit);
        self
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn bundler(mut self, bundler: Arc<dyn BundleCapability>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn DeclarationCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn linter(mut self, linter: Arc<dyn ManifestLinter>) -> Self {
        self.linters.push(linter);
        self
    }

    /// Drop every registered linter, including the default one.
    pub fn without_linters(mut self) -> Self {
        self.linters.clear();
        self
    }

    /// Run the build.
    ///
    /// Never fails as a whole: a whole-build error becomes the fatal
    /// diagnostic of an empty report whose [`BuildReport::exit_code`] is 1.
    pub async fn build(self) -> BuildReport {
        let mut diagnostics = Diagnostics::new();
        match self.run(&mut diagnostics).await {
            Ok((manifest, artifacts)) => {
                let mut report = BuildReport {
                    artifacts,
                    diagnostics: Vec::new(),
                };
                for linter in &self.linters {
                    diagnostics.extend(linter.lint(&manifest, &report));
                }
                report.diagnostics = diagnostics.into_vec();
                report
            }
            Err(err) => {
                tracing::error!(error = %err, "build aborted");
                BuildReport::aborted(&err, diagnostics.into_vec())
            }
        }
    }

    async fn run(&self, diagnostics: &mut Diagnostics) -> Result<(Manifest, Vec<ReportedArtifact>)> {
        let root = self.root.as_path();
        let manifest = Manifest::from_dir(root)?;
        let config = ToteConfig::load(root, manifest.tool_config(), &self.overrides)?;
        tracing::debug!(
            root = %root.display(),
            src = %config.src_dir.display(),
            out = %config.out_dir.display(),
            runtime = ?config.runtime,
            "configuration loaded"
        );

        let (tsconfig, warning) = TsConfig::load(&root.join(&config.tsconfig));
        if let Some(warning) = warning {
            diagnostics.push(warning);
        }

        let plan = plan_build(root, &config, &manifest, &tsconfig, diagnostics)?;
        let capabilities = self.capabilities(root, &manifest, &config);
        let artifacts = execute(root, &plan, &config, &tsconfig, &capabilities, diagnostics).await?;
        Ok((manifest, artifacts))
    }

    fn capabilities(&self, root: &Path, manifest: &Manifest, config: &ToteConfig) -> Capabilities {
        let bundler = self.bundler.clone().unwrap_or_else(|| {
            let externals = manifest
                .external_dependencies()
                .into_iter()
                .chain(config.external.iter().cloned());
            let bundler: Arc<dyn BundleCapability> =
                Arc::new(SourceGraphBundler::new(root).with_externals(externals));
            bundler
        });
        Capabilities {
            bundler,
            compiler: self.compiler.clone().unwrap_or_else(default_compiler),
        }
    }
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOptions")
            .field("root", &self.root)
            .field("overrides", &self.overrides)
            .field("custom_bundler", &self.bundler.is_some())
            .field("custom_compiler", &self.compiler.is_some())
            .field("linters", &self.linters.len())
            .finish()
    }
}
