//! Package archiver.
//!
//! Zips a package's assembled tree into a single DEFLATE archive. Entries
//! are relative to the package root, in sorted walk order; directories and
//! symbolic links are not written, and excluded paths (at least the build
//! spec) never appear.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Errors that can occur while writing a package archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A file could not be read or the archive could not be written.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The package tree could not be walked.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The zip writer failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Zip `package_root` into `archive_path`, skipping `exclude` (paths
/// relative to the package root). Returns the archive size in bytes.
///
/// The archive is written beside its final path and renamed into place, so
/// a failed run never leaves a truncated archive behind.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked, a file cannot be read, or
/// the archive cannot be written.
pub fn archive_package(
    package_root: &Path,
    archive_path: &Path,
    exclude: &[&Path],
) -> Result<u64, ArchiveError> {
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = archive_path.with_extension("zip.tmp");
    let mut writer = ZipWriter::new(File::create(&temp_path)?);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(package_root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(package_root) else {
            continue;
        };
        if exclude.contains(&relative) {
            continue;
        }

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            options.unix_permissions(entry.metadata()?.permissions().mode())
        };

        writer.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut writer)?;
    }

    writer.finish()?;
    fs::rename(&temp_path, archive_path)?;

    Ok(fs::metadata(archive_path)?.len())
}
