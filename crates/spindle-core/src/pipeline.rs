//! Pipeline driver.
//!
//! Discovers packages under a target tree, decides which need building,
//! assembles those (up to `jobs` at a time), and writes the repository index
//! once every package has finished or failed.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use spindle_schema::{INFO_FILE, IndexError, RepoIndexEntry, RepositoryIndex};
use thiserror::Error;

use crate::bootstrap::RepoOutput;
use crate::config::Config;
use crate::discovery::{PackageDir, discover_packages};
use crate::io::archive::{ArchiveError, archive_package};
use crate::io::download::Fetcher;
use crate::package::{BUILD_SPEC_FILE, ChangelogSource, PackageBuildSpec, spec_modified_date};
use crate::reconcile::{BinaryPath, Decision, IndexReconciler, build_entry, infer_binary, kib, tree_size};
use crate::reporter::Reporter;
use crate::resolver::AssetResolver;

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The target tree holds no package directories.
    #[error("no packages found under {0}")]
    NoPackages(PathBuf),

    /// The target tree could not be read.
    #[error("cannot read target directory: {0}")]
    Discovery(#[source] io::Error),

    /// The index could not be written.
    #[error("cannot write repository index: {0}")]
    Index(#[from] IndexError),

    /// The download client could not be created.
    #[error("cannot create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a package failed to build. The package gets no index entry.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Writing the manifest, metadata or tree failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// `info.json` could not be serialized.
    #[error("cannot write info.json: {0}")]
    Info(#[from] serde_json::Error),

    /// The package archive could not be written.
    #[error("cannot archive package: {0}")]
    Archive(#[from] ArchiveError),

    /// The archiving task panicked or was cancelled.
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of one run, by package identifier (or directory name, for
/// packages whose spec could not be read).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Assembled and indexed.
    pub built: Vec<String>,
    /// Unchanged version; previous entry kept.
    pub skipped: Vec<String>,
    /// Not indexed.
    pub failed: Vec<String>,
}

impl BuildSummary {
    /// Packages seen.
    pub fn total(&self) -> usize {
        self.built.len() + self.skipped.len() + self.failed.len()
    }

    /// Whether no package failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of building a single package.
#[derive(Debug)]
pub enum PackageOutcome {
    /// Rebuilt; the new entry.
    Built(RepoIndexEntry),
    /// Up to date; the previous entry.
    Skipped(RepoIndexEntry),
    /// Failed.
    Failed {
        /// Package identifier.
        name: String,
        /// What went wrong.
        error: PackageError,
    },
}

/// Builds a repository from a target tree.
pub struct Pipeline<'a> {
    config: &'a Config,
    reporter: &'a dyn Reporter,
    fetcher: Fetcher,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline for one run.
    ///
    /// # Errors
    ///
    /// Returns an error if the download client cannot be created.
    pub fn new(config: &'a Config, reporter: &'a dyn Reporter) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            reporter,
            fetcher: Fetcher::new(config)?,
        })
    }

    /// Build every package under `target` into `output`.
    ///
    /// Package failures are reported and counted in the summary; only an
    /// unreadable target, an empty target, or an unwritable index fail the
    /// run itself.
    ///
    /// # Errors
    ///
    /// See [`PipelineError`].
    pub async fn run(&self, target: &Path, output: &RepoOutput) -> Result<BuildSummary, PipelineError> {
        self.reporter.section("Discovering packages");
        let dirs = discover_packages(target, output.root()).map_err(PipelineError::Discovery)?;
        if dirs.is_empty() {
            return Err(PipelineError::NoPackages(target.to_path_buf()));
        }
        self.reporter.info(&format!("found {} package directories", dirs.len()));

        let mut summary = BuildSummary::default();
        let specs = self.load_specs(dirs, &mut summary);

        self.reporter.section("Building packages");
        let reconciler = IndexReconciler::new(output.prior());
        let mut index = RepositoryIndex::new();

        let mut builds = stream::iter(
            specs
                .iter()
                .map(|(dir, spec)| self.build_package(dir, spec, reconciler, output)),
        )
        .buffered(self.config.effective_jobs());

        while let Some(outcome) = builds.next().await {
            match outcome {
                PackageOutcome::Built(entry) => {
                    summary.built.push(entry.name().to_string());
                    index.insert(entry);
                }
                PackageOutcome::Skipped(entry) => {
                    summary.skipped.push(entry.name().to_string());
                    index.insert(entry);
                }
                PackageOutcome::Failed { name, error } => {
                    tracing::warn!(package = %name, %error, "package failed");
                    self.reporter.package_failed(&name, &error.to_string());
                    summary.failed.push(name);
                }
            }
        }

        index.save(&output.index_path())?;
        tracing::info!(packages = index.len(), path = %output.index_path().display(), "wrote repository index");

        self.reporter.summary(&summary);
        Ok(summary)
    }

    /// Read every build spec, failing unreadable ones and later duplicates
    /// of an identifier already seen.
    fn load_specs(&self, dirs: Vec<PackageDir>, summary: &mut BuildSummary) -> Vec<(PackageDir, PackageBuildSpec)> {
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut specs = Vec::with_capacity(dirs.len());

        for dir in dirs {
            let spec = match PackageBuildSpec::load(&dir.path) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(dir = %dir.path.display(), error = %e, "unreadable build spec");
                    self.reporter.package_failed(&dir.dir_name, &e.to_string());
                    summary.failed.push(dir.dir_name);
                    continue;
                }
            };
            if let Some(first) = seen.get(&spec.package) {
                self.reporter.package_failed(
                    &spec.package,
                    &format!(
                        "duplicate package identifier in {} (already declared in {})",
                        dir.path.display(),
                        first.display()
                    ),
                );
                summary.failed.push(spec.package);
                continue;
            }
            seen.insert(spec.package.clone(), dir.path.clone());
            specs.push((dir, spec));
        }
        specs
    }

    async fn build_package(
        &self,
        dir: &PackageDir,
        spec: &PackageBuildSpec,
        reconciler: IndexReconciler<'_>,
        output: &RepoOutput,
    ) -> PackageOutcome {
        let name = spec.package.as_str();
        let updating = match reconciler.decide(spec) {
            Decision::Unchanged(entry) => {
                self.reporter
                    .package_skipped(name, &format!("version {} already built", spec.version));
                return PackageOutcome::Skipped(entry.clone());
            }
            Decision::Changed { previous } => {
                self.remove_stale_archive(name, output);
                tracing::debug!(package = name, from = previous, to = %spec.version, "version changed");
                true
            }
            Decision::Fresh => false,
        };

        self.reporter.package_started(name, &spec.title, updating);
        match self.assemble(dir, spec, output).await {
            Ok(entry) => {
                self.reporter.package_done(
                    name,
                    &format!("{} ({} KiB, {} KiB extracted)", spec.version, entry.filesize, entry.extracted),
                );
                PackageOutcome::Built(entry)
            }
            Err(error) => PackageOutcome::Failed {
                name: name.to_string(),
                error,
            },
        }
    }

    /// Resolve assets, write the manifest and metadata, archive the tree and
    /// format the index entry.
    async fn assemble(
        &self,
        dir: &PackageDir,
        spec: &PackageBuildSpec,
        output: &RepoOutput,
    ) -> Result<RepoIndexEntry, PackageError> {
        let name = spec.package.as_str();
        match spec.changelog_source {
            ChangelogSource::Changelog => {}
            ChangelogSource::DeprecatedChanges => {
                self.warn(name, "`changes` is deprecated, use `changelog` instead");
            }
            ChangelogSource::Missing => self.warn(name, "no changelog provided"),
        }

        let mut resolver = AssetResolver::new(&dir.path, output.preview_dir(name), &self.fetcher, self.reporter, name);
        for asset in &spec.assets {
            if let Err(e) = resolver.resolve_declared(asset).await {
                self.warn(name, &format!("skipping {} asset `{}`: {e}", asset.kind, asset.url));
            }
        }
        let manifest = resolver.into_manifest();
        manifest.write(&dir.path)?;
        tracing::debug!(package = name, actions = manifest.len(), "wrote manifest");

        let updated = spec_modified_date(&dir.path)?;
        fs::write(
            dir.path.join(INFO_FILE),
            serde_json::to_string_pretty(&spec.info(updated.clone()))?,
        )?;

        let extracted = tree_size(&dir.path)?;
        let root = dir.path.clone();
        let archive_path = output.archive_path(name);
        let filesize = tokio::task::spawn_blocking(move || {
            archive_package(&root, &archive_path, &[Path::new(BUILD_SPEC_FILE)])
        })
        .await??;
        tracing::debug!(package = name, bytes = filesize, kib = kib(filesize), "archived package");

        let binary = infer_binary(spec, &dir.path, self.config);
        if binary == BinaryPath::Missing {
            self.warn(name, "no binary found, leaving `binary` unset");
        }

        Ok(build_entry(spec, updated, extracted, filesize, binary))
    }

    fn remove_stale_archive(&self, name: &str, output: &RepoOutput) {
        let path = output.archive_path(name);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => self.warn(name, &format!("cannot remove stale archive {}: {e}", path.display())),
        }
    }

    fn warn(&self, package: &str, msg: &str) {
        tracing::warn!(package, "{msg}");
        self.reporter.warning(&format!("{package}: {msg}"));
    }
}
