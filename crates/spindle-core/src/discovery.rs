//! Package directory discovery.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::package::BUILD_SPEC_FILE;

/// A directory holding a build spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDir {
    /// Directory name, used to label the package before its spec is read.
    pub dir_name: String,
    /// Absolute path of the package root.
    pub path: PathBuf,
}

/// Walk `target` and return every directory containing a build spec.
///
/// The walk is sorted by file name so repeated runs see packages in the same
/// order. Package directories are not searched for nested packages, and
/// nothing under `exclude` (the output directory) is visited.
///
/// # Errors
///
/// Returns an error if `target` does not exist or cannot be resolved.
pub fn discover_packages(target: &Path, exclude: &Path) -> io::Result<Vec<PackageDir>> {
    let target = target.canonicalize()?;
    let mut packages = Vec::new();

    let mut walker = WalkDir::new(&target)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().starts_with(exclude) {
            walker.skip_current_dir();
            continue;
        }
        if entry.path().join(BUILD_SPEC_FILE).is_file() {
            packages.push(PackageDir {
                dir_name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path().to_path_buf(),
            });
            walker.skip_current_dir();
        }
    }

    Ok(packages)
}
