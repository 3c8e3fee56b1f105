//! Install manifest lines.
//!
//! Each placement made while assembling a package is recorded as one line,
//! `<LETTER>: <path>`, where the letter is the upper-cased first character of
//! the placement kind.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an installer should treat a placed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Replaced on every install.
    Update,
    /// Placed only when absent.
    Get,
    /// Kept local to the package.
    Local,
    /// Extracted from an archive.
    Extract,
}

impl ActionKind {
    /// Single-letter code written to the manifest.
    pub fn code(self) -> char {
        match self {
            Self::Update => 'U',
            Self::Get => 'G',
            Self::Local => 'L',
            Self::Extract => 'E',
        }
    }

    /// Lower-case name as used in build specs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Get => "get",
            Self::Local => "local",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One placement recorded in a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAction {
    /// Placement semantics.
    pub kind: ActionKind,
    /// Destination, rooted at the package (always begins with `/`).
    pub path: String,
}

impl ManifestAction {
    /// Create an action, normalising the destination to a rooted path.
    pub fn new(kind: ActionKind, path: &str) -> Self {
        Self {
            kind,
            path: format!("/{}", path.trim_matches('/')),
        }
    }
}

impl fmt::Display for ManifestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.path)
    }
}
