//! Output directory preparation.
//!
//! Decides, before any package is touched, whether the output location can
//! hold a repository and whether a previous index makes this an incremental
//! build.

use std::fs;
use std::path::{Path, PathBuf};

use spindle_schema::{ARCHIVE_EXT, INDEX_FILE, RepositoryIndex};
use thiserror::Error;

/// Output directory that cannot be used. Aborts the run.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The directory has content but no readable `repo.json`.
    #[error(
        "output directory {0} is not empty and is not a repository (use --ignore-non-empty-output to build into it anyway)"
    )]
    NotARepository(PathBuf),

    /// The output path exists but is not a directory.
    #[error("output path {0} is not a directory")]
    NotADirectory(PathBuf),

    /// The directory could not be inspected or created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A prepared output location.
#[derive(Debug, Clone)]
pub struct RepoOutput {
    root: PathBuf,
    prior: Option<RepositoryIndex>,
}

impl RepoOutput {
    /// Canonical output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index loaded from a previous run, when building incrementally.
    pub fn prior(&self) -> Option<&RepositoryIndex> {
        self.prior.as_ref()
    }

    /// Whether a previous index was found.
    pub fn is_incremental(&self) -> bool {
        self.prior.is_some()
    }

    /// `<output>/repo.json`
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// `<output>/zips`
    pub fn zips_dir(&self) -> PathBuf {
        self.root.join("zips")
    }

    /// `<output>/zips/<id>.zip`
    pub fn archive_path(&self, package: &str) -> PathBuf {
        self.zips_dir().join(format!("{package}.{ARCHIVE_EXT}"))
    }

    /// `<output>/packages/<id>`, where preview images are served from.
    pub fn preview_dir(&self, package: &str) -> PathBuf {
        self.root.join("packages").join(package)
    }
}

/// Prepare `output_dir` for a build.
///
/// - missing: created, fresh build
/// - empty: fresh build
/// - holds a valid `repo.json`: incremental build against that index
/// - anything else: refused unless `allow_overwrite` is set
///
/// # Errors
///
/// Returns [`BootstrapError::NotARepository`] for a non-empty directory
/// without an index (and no `allow_overwrite`), or an IO error if the
/// directory cannot be read or created.
pub fn prepare_output(output_dir: &Path, allow_overwrite: bool) -> Result<RepoOutput, BootstrapError> {
    let mut prior = None;

    if output_dir.exists() {
        if !output_dir.is_dir() {
            return Err(BootstrapError::NotADirectory(output_dir.to_path_buf()));
        }
        let is_empty = fs::read_dir(output_dir)?.next().is_none();
        if !is_empty {
            match RepositoryIndex::load(&output_dir.join(INDEX_FILE)) {
                Ok(index) => {
                    tracing::info!(packages = index.len(), "output directory is a repository, updating it");
                    prior = Some(index);
                }
                Err(e) if allow_overwrite => {
                    tracing::warn!(error = %e, "output directory is not a repository, overwriting as requested");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "no usable index in output directory");
                    return Err(BootstrapError::NotARepository(output_dir.to_path_buf()));
                }
            }
        }
    } else {
        fs::create_dir_all(output_dir)?;
    }

    let root = output_dir.canonicalize()?;
    fs::create_dir_all(root.join("zips"))?;

    Ok(RepoOutput { root, prior })
}
