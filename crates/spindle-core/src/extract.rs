//! Pattern matching over zip members.
//!
//! A zip asset names its interesting members with shell-style globs. Here
//! `*` also crosses `/`, so `*.nro` selects every `.nro` in the archive,
//! however deep.

use std::io::Cursor;

use bytes::Bytes;
use glob::{MatchOptions, Pattern, PatternError};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::io::source::ArchiveMember;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// The file members of an in-memory zip, in archive listing order.
#[derive(Debug, Clone)]
pub struct ZipListing {
    archive: Bytes,
    members: Vec<String>,
}

impl ZipListing {
    /// Read the central directory of `archive`.
    ///
    /// # Errors
    ///
    /// Returns an error if `archive` is not a readable zip.
    pub fn open(archive: Bytes) -> Result<Self, ZipError> {
        let mut zip = ZipArchive::new(Cursor::new(archive.clone()))?;
        let mut members = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            if !entry.is_dir() {
                members.push(entry.name().to_string());
            }
        }
        Ok(Self { archive, members })
    }

    /// Member paths, directories excluded.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Members matching `pattern`, in listing order.
    pub fn matching(&self, pattern: &Pattern) -> Vec<String> {
        self.members
            .iter()
            .filter(|name| pattern.matches_with(name, MATCH_OPTIONS))
            .cloned()
            .collect()
    }

    /// A source reading member `name`.
    pub fn member(&self, name: &str) -> ArchiveMember {
        ArchiveMember::new(self.archive.clone(), name)
    }
}

/// Compile a member pattern. A leading `/` is ignored, since member paths
/// are relative.
///
/// # Errors
///
/// Returns an error if the glob is malformed.
pub fn compile_pattern(pattern: &str) -> Result<Pattern, PatternError> {
    Pattern::new(pattern.trim_start_matches('/'))
}

/// The directory part of `pattern` that precedes any wildcard, including
/// its trailing `/`. Empty when the first wildcard is in the first component.
pub fn literal_prefix(pattern: &str) -> &str {
    let pattern = pattern.trim_start_matches('/');
    let literal = pattern
        .find(['*', '?', '['])
        .map_or(pattern, |wildcard| &pattern[..wildcard]);
    literal.rfind('/').map_or("", |slash| &pattern[..=slash])
}

/// Where a matched member is placed.
///
/// A directory-style `dest` (trailing `/`) receives the member's path below
/// the pattern's literal prefix; any other `dest` is used as is.
pub fn member_destination(pattern: &str, member: &str, dest: &str) -> String {
    if !dest.ends_with('/') {
        return dest.to_string();
    }
    let suffix = member
        .strip_prefix(literal_prefix(pattern))
        .unwrap_or(member)
        .trim_start_matches('/');
    let base = dest.trim_matches('/');
    if base.is_empty() {
        format!("/{suffix}")
    } else {
        format!("/{base}/{suffix}")
    }
}
