//! Incremental index decisions and entry formatting.
//!
//! A package is rebuilt when the previous index has no entry for it or
//! lists a different version string. Equal versions skip the build and the
//! previous entry is carried forward untouched.

use std::io;
use std::path::Path;

use spindle_schema::{BINARY_NONE, RepoIndexEntry, RepositoryIndex, THEME_CATEGORY, UNKNOWN_DOWNLOADS};
use walkdir::WalkDir;

use crate::config::Config;
use crate::package::PackageBuildSpec;

/// What to do with a package, given the previous index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision<'a> {
    /// No previous entry; build.
    Fresh,
    /// Same version as before; keep this entry.
    Unchanged(&'a RepoIndexEntry),
    /// Version moved on from `previous`; remove the old archive and build.
    Changed {
        /// Version in the previous index.
        previous: &'a str,
    },
}

/// Compares build specs against the index of a previous run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexReconciler<'a> {
    prior: Option<&'a RepositoryIndex>,
}

impl<'a> IndexReconciler<'a> {
    /// Reconcile against `prior`, or treat everything as fresh if `None`.
    pub fn new(prior: Option<&'a RepositoryIndex>) -> Self {
        Self { prior }
    }

    /// Decide whether `spec` needs building.
    pub fn decide(&self, spec: &PackageBuildSpec) -> Decision<'a> {
        match self.prior.and_then(|index| index.find(&spec.package)) {
            None => Decision::Fresh,
            Some(entry) if entry.version() == spec.version => Decision::Unchanged(entry),
            Some(entry) => Decision::Changed {
                previous: entry.version(),
            },
        }
    }
}

/// How a package's `binary` field was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryPath {
    /// Declared in the build spec.
    Explicit(String),
    /// Themes have no binary.
    Theme,
    /// First allowed executable found walking the package tree.
    Inferred(String),
    /// Nothing found.
    Missing,
}

impl BinaryPath {
    /// Value for the index entry.
    pub fn into_field(self) -> Option<String> {
        match self {
            Self::Explicit(path) | Self::Inferred(path) => Some(path),
            Self::Theme => Some(BINARY_NONE.to_string()),
            Self::Missing => None,
        }
    }
}

/// Settle the binary path of an assembled package.
///
/// The tree is walked in lexicographic order and the first file whose name
/// ends with an allowed extension wins.
pub fn infer_binary(spec: &PackageBuildSpec, package_root: &Path, config: &Config) -> BinaryPath {
    if let Some(binary) = &spec.binary {
        return BinaryPath::Explicit(binary.clone());
    }
    if spec.category == THEME_CATEGORY {
        return BinaryPath::Theme;
    }

    WalkDir::new(package_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| config.is_binary(&entry.file_name().to_string_lossy()))
        .and_then(|entry| {
            let relative = entry.path().strip_prefix(package_root).ok()?;
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            Some(BinaryPath::Inferred(format!("/{}", parts.join("/"))))
        })
        .unwrap_or(BinaryPath::Missing)
}

/// Total size in bytes of the regular files under `root`. Symbolic links
/// are not followed or counted.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn tree_size(root: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Bytes to whole KiB, rounded down.
pub const fn kib(bytes: u64) -> u64 {
    bytes / 1024
}

/// Index entry for a freshly built package.
pub fn build_entry(
    spec: &PackageBuildSpec,
    updated: String,
    extracted_bytes: u64,
    archive_bytes: u64,
    binary: BinaryPath,
) -> RepoIndexEntry {
    RepoIndexEntry {
        extracted: kib(extracted_bytes),
        filesize: kib(archive_bytes),
        web_dls: UNKNOWN_DOWNLOADS,
        app_dls: UNKNOWN_DOWNLOADS,
        binary: binary.into_field(),
        info: spec.info(updated),
        extra: serde_json::Map::new(),
    }
}
