//! Per-package install manifest.
//!
//! Actions are appended in the order assets are placed (zip members depth
//! first) and the whole list is written once, after every asset has been
//! attempted. A manifest with failed assets is still written and reflects
//! exactly what was placed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use spindle_schema::{MANIFEST_FILE, ManifestAction};

/// Append-only list of placements for the package being assembled.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    actions: Vec<ManifestAction>,
}

impl ManifestBuilder {
    /// Start an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placement.
    pub fn push(&mut self, action: ManifestAction) {
        self.actions.push(action);
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing has been placed.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Render the manifest text, one `<LETTER>: <path>` line per action.
    pub fn render(&self) -> String {
        self.actions.iter().map(|a| format!("{a}\n")).collect()
    }

    /// Write `manifest.install` into the package directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, package_root: &Path) -> io::Result<PathBuf> {
        let path = package_root.join(MANIFEST_FILE);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}
