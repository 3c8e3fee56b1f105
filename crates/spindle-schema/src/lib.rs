//! Shared types and wire format for spindle repositories.
//!
//! These are the documents a repository consumer reads: the per-package
//! `info.json`, the `manifest.install` replayed by installers, and the
//! repository-wide `repo.json` index.

pub mod index;
pub mod manifest;

pub use index::{IndexError, PackageInfo, RepoIndexEntry, RepositoryIndex};
pub use manifest::{ActionKind, ManifestAction};

/// File name of the repository index at the output root.
pub const INDEX_FILE: &str = "repo.json";

/// File name of the per-package info document.
pub const INFO_FILE: &str = "info.json";

/// File name of the per-package install manifest.
pub const MANIFEST_FILE: &str = "manifest.install";

/// Extension of per-package archives under `zips/`.
pub const ARCHIVE_EXT: &str = "zip";

/// Category whose packages never carry a launchable binary.
pub const THEME_CATEGORY: &str = "theme";

/// Binary path recorded for packages without an executable.
pub const BINARY_NONE: &str = "none";

/// Download counters are not known at build time.
pub const UNKNOWN_DOWNLOADS: i64 = -1;
