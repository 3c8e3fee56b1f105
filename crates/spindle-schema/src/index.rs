//! Repository index (`repo.json`) and per-package info (`info.json`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or saving a repository index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The index file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index content is not a valid index document.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// User-facing package metadata, written to `info.json` and embedded in
/// every index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Category the package is listed under (e.g. `tool`, `game`, `theme`).
    pub category: String,
    /// Package identifier.
    pub name: String,
    /// License name.
    pub license: String,
    /// Display title.
    pub title: String,
    /// Homepage URL.
    pub url: String,
    /// Author or team.
    pub author: String,
    /// Declared version string, compared verbatim between runs.
    pub version: String,
    /// Long description.
    pub details: String,
    /// Short description.
    pub description: String,
    /// Build-spec modification date (`YYYY-MM-DD`, UTC).
    pub updated: String,
    /// Release notes for this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
}

/// One package in the repository index: [`PackageInfo`] plus the figures
/// only known once the package has been assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoIndexEntry {
    /// Size of the assembled package tree in KiB.
    pub extracted: u64,
    /// Size of the package archive in KiB.
    pub filesize: u64,
    /// Web download counter; unknown at build time.
    pub web_dls: i64,
    /// App download counter; unknown at build time.
    pub app_dls: i64,
    /// Path of the launchable binary inside the package, or `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Package metadata.
    #[serde(flatten)]
    pub info: PackageInfo,
    /// Fields written by other tools, preserved when an entry is carried over.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RepoIndexEntry {
    /// Package identifier of this entry.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Declared version of this entry.
    pub fn version(&self) -> &str {
        &self.info.version
    }
}

/// The repository-wide catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Entries in build order, one per package identifier.
    pub packages: Vec<RepoIndexEntry>,
}

impl RepositoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index from disk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file cannot be read, or
    /// [`IndexError::Parse`] if it is not a valid index document.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse an index from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Parse`] if the text is not a valid index document.
    pub fn parse(content: &str) -> Result<Self, IndexError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Atomically persist the index: written to a sibling temp file, then
    /// renamed over `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, the write, or the rename fails.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Look up the entry for a package identifier.
    pub fn find(&self, name: &str) -> Option<&RepoIndexEntry> {
        self.packages.iter().find(|e| e.name() == name)
    }

    /// Add an entry, replacing any existing entry with the same identifier
    /// in place.
    pub fn insert(&mut self, entry: RepoIndexEntry) {
        if let Some(existing) = self.packages.iter_mut().find(|e| e.name() == entry.name()) {
            *existing = entry;
        } else {
            self.packages.push(entry);
        }
    }

    /// Number of packages in the index.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the index holds no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(name: &str, version: &str) -> RepoIndexEntry {
        RepoIndexEntry {
            extracted: 12,
            filesize: 4,
            web_dls: -1,
            app_dls: -1,
            binary: Some(format!("/switch/{name}.nro")),
            info: PackageInfo {
                category: "tool".to_string(),
                name: name.to_string(),
                license: "GPLv3".to_string(),
                title: name.to_uppercase(),
                url: "https://example.com".to_string(),
                author: "someone".to_string(),
                version: version.to_string(),
                details: "details".to_string(),
                description: "description".to_string(),
                updated: "2024-01-02".to_string(),
                changelog: None,
            },
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_entry_field_order() {
        let json = serde_json::to_string(&entry("foo", "1.0")).unwrap();
        let extracted = json.find("\"extracted\"").unwrap();
        let binary = json.find("\"binary\"").unwrap();
        let category = json.find("\"category\"").unwrap();
        let updated = json.find("\"updated\"").unwrap();
        assert!(extracted < binary && binary < category && category < updated);
        assert!(!json.contains("changelog"));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let text = r#"{"packages":[{"extracted":1,"filesize":1,"web_dls":5,"app_dls":7,
            "category":"game","name":"foo","license":"MIT","title":"Foo","url":"u",
            "author":"a","version":"1.0","details":"d","description":"d",
            "updated":"2023-05-06","screens":3}]}"#;
        let index = RepositoryIndex::parse(text).unwrap();
        let foo = index.find("foo").unwrap();
        assert_eq!(foo.web_dls, 5);
        assert_eq!(foo.binary, None);
        assert_eq!(foo.extra.get("screens"), Some(&serde_json::json!(3)));

        let again = RepositoryIndex::parse(&serde_json::to_string(&index).unwrap()).unwrap();
        assert_eq!(again, index);
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut index = RepositoryIndex::new();
        index.insert(entry("foo", "1.0"));
        index.insert(entry("bar", "2.0"));
        index.insert(entry("foo", "1.1"));

        assert_eq!(index.len(), 2);
        assert_eq!(index.packages[0].version(), "1.1");
        assert_eq!(index.packages[1].name(), "bar");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo.json");

        let mut index = RepositoryIndex::new();
        index.insert(entry("foo", "1.0"));
        index.save(&path).unwrap();

        assert!(!dir.path().join("repo.json.tmp").exists());
        let loaded = RepositoryIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_load_rejects_non_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo.json");
        fs::write(&path, "{\"not\": \"an index\"}").unwrap();
        assert!(matches!(RepositoryIndex::load(&path), Err(IndexError::Parse(_))));
    }
}
