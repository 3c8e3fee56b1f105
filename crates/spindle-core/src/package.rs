//! Build spec (`pkgbuild.json`) parsing and validation.
//!
//! Metadata fields may sit at the top level of the document or inside an
//! `info` group; the top level wins when both are present.

use std::fmt;
use std::fs;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spindle_schema::{ActionKind, PackageInfo};
use thiserror::Error;

/// File name of the per-package build spec. Never shipped in the archive.
pub const BUILD_SPEC_FILE: &str = "pkgbuild.json";

/// Fields every build spec must declare, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "category",
    "package",
    "license",
    "title",
    "url",
    "author",
    "version",
    "details",
    "description",
];

/// Errors that can occur when loading or validating a build spec.
#[derive(Error, Debug)]
pub enum SpecError {
    /// The spec file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The spec is not valid JSON or has the wrong shape.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required metadata field is absent from both the top level and `info`.
    #[error("pkgbuild.json is missing the `{0}` field")]
    MissingField(&'static str),

    /// The package identifier cannot be used as a file name.
    #[error("invalid package identifier `{0}`")]
    InvalidIdentifier(String),
}

/// Declared asset type.
///
/// Unrecognised type strings are kept as [`AssetKind::Unknown`] so a single
/// odd asset does not make the whole spec unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetKind {
    /// Placed, replaced on every install.
    Update,
    /// Placed, kept if already present on the device.
    Get,
    /// Placed, local to the package.
    Local,
    /// Placed, typically a zip member.
    Extract,
    /// Package icon, `icon.png`.
    Icon,
    /// Package screenshot, `screen.png`.
    Screenshot,
    /// Archive whose members are matched against sub-asset patterns.
    Zip,
    /// Anything else.
    Unknown(String),
}

/// Where a resolved asset ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Written to its destination and recorded in the manifest.
    File(ActionKind),
    /// Written to a fixed preview path and published next to the index.
    Preview(PreviewImage),
    /// Opened and matched against sub-asset patterns.
    Archive,
}

/// Preview images published per package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewImage {
    /// `icon.png`
    Icon,
    /// `screen.png`
    Screenshot,
}

impl PreviewImage {
    /// Fixed file name inside the package and the preview directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Icon => "icon.png",
            Self::Screenshot => "screen.png",
        }
    }
}

impl AssetKind {
    /// Type string as written in the build spec.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Update => "update",
            Self::Get => "get",
            Self::Local => "local",
            Self::Extract => "extract",
            Self::Icon => "icon",
            Self::Screenshot => "screenshot",
            Self::Zip => "zip",
            Self::Unknown(other) => other,
        }
    }

    /// How assets of this type are placed; `None` for unknown types.
    pub fn placement(&self) -> Option<Placement> {
        match self {
            Self::Update => Some(Placement::File(ActionKind::Update)),
            Self::Get => Some(Placement::File(ActionKind::Get)),
            Self::Local => Some(Placement::File(ActionKind::Local)),
            Self::Extract => Some(Placement::File(ActionKind::Extract)),
            Self::Icon => Some(Placement::Preview(PreviewImage::Icon)),
            Self::Screenshot => Some(Placement::Preview(PreviewImage::Screenshot)),
            Self::Zip => Some(Placement::Archive),
            Self::Unknown(_) => None,
        }
    }
}

impl From<String> for AssetKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "update" => Self::Update,
            "get" => Self::Get,
            "local" => Self::Local,
            "extract" => Self::Extract,
            "icon" => Self::Icon,
            "screenshot" => Self::Screenshot,
            "zip" => Self::Zip,
            _ => Self::Unknown(s),
        }
    }
}

impl From<AssetKind> for String {
    fn from(kind: AssetKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a build spec's `assets` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDeclaration {
    /// Asset type.
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Path under the package root, or an `http(s)` URL.
    pub url: String,
    /// Destination relative to the package root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Member patterns, for `zip` assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zip: Vec<SubAssetPattern>,
}

/// A pattern selecting members of a zip asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAssetPattern {
    /// Shell-style glob over member paths; `*` also matches `/`.
    pub path: String,
    /// Type each matched member is resolved as.
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Destination. A trailing `/` places matches beneath it, keeping their
    /// path below the pattern's directory prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Patterns for matched members that are themselves zips.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zip: Vec<SubAssetPattern>,
}

/// Optional metadata fields, as found at one level of the spec.
#[derive(Debug, Clone, Default, Deserialize)]
struct MetadataFields {
    category: Option<String>,
    package: Option<String>,
    license: Option<String>,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    version: Option<String>,
    details: Option<String>,
    description: Option<String>,
    changelog: Option<String>,
    changes: Option<String>,
    binary: Option<String>,
}

impl MetadataFields {
    fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "category" => &self.category,
            "package" => &self.package,
            "license" => &self.license,
            "title" => &self.title,
            "url" => &self.url,
            "author" => &self.author,
            "version" => &self.version,
            "details" => &self.details,
            "description" => &self.description,
            "changelog" => &self.changelog,
            "changes" => &self.changes,
            "binary" => &self.binary,
            _ => return None,
        };
        value.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct RawBuildSpec {
    #[serde(flatten)]
    top: MetadataFields,
    #[serde(default)]
    info: MetadataFields,
    #[serde(default)]
    assets: Vec<AssetDeclaration>,
}

/// Where the changelog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogSource {
    /// The `changelog` field.
    Changelog,
    /// The deprecated `changes` alias.
    DeprecatedChanges,
    /// Neither field was present.
    Missing,
}

/// A validated build spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBuildSpec {
    /// Category the package is listed under.
    pub category: String,
    /// Package identifier; names the archive and preview directory.
    pub package: String,
    /// License name.
    pub license: String,
    /// Display title.
    pub title: String,
    /// Homepage URL.
    pub url: String,
    /// Author or team.
    pub author: String,
    /// Declared version, compared verbatim between runs.
    pub version: String,
    /// Long description.
    pub details: String,
    /// Short description.
    pub description: String,
    /// Release notes.
    pub changelog: Option<String>,
    /// Which field the release notes came from.
    pub changelog_source: ChangelogSource,
    /// Explicit binary path; inferred when absent.
    pub binary: Option<String>,
    /// Assets in declaration order.
    pub assets: Vec<AssetDeclaration>,
}

impl PackageBuildSpec {
    /// Load the build spec of a package directory.
    ///
    /// # Errors
    ///
    /// Returns `SpecError::Io` if the file cannot be read, `SpecError::Parse`
    /// if it is malformed, or `SpecError::MissingField` naming the first
    /// absent required field.
    pub fn load(package_dir: &Path) -> Result<Self, SpecError> {
        let content = fs::read_to_string(package_dir.join(BUILD_SPEC_FILE))?;
        Self::parse(&content)
    }

    /// Parse and validate a build spec from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `SpecError::Parse` if the text is malformed,
    /// `SpecError::MissingField` naming the first absent required field, or
    /// `SpecError::InvalidIdentifier` if the package identifier is not a
    /// plain file name.
    pub fn parse(content: &str) -> Result<Self, SpecError> {
        let raw: RawBuildSpec = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawBuildSpec) -> Result<Self, SpecError> {
        let RawBuildSpec { top, info, assets } = raw;
        let lookup = |field: &str| top.get(field).or_else(|| info.get(field));

        for field in REQUIRED_FIELDS {
            if lookup(field).is_none() {
                return Err(SpecError::MissingField(field));
            }
        }
        let field = |name: &str| lookup(name).unwrap_or_default().to_string();

        let package = field("package");
        if !is_plain_file_name(&package) {
            return Err(SpecError::InvalidIdentifier(package));
        }

        let (changelog, changelog_source) = if let Some(text) = lookup("changelog") {
            (Some(text.to_string()), ChangelogSource::Changelog)
        } else if let Some(text) = lookup("changes") {
            (Some(text.to_string()), ChangelogSource::DeprecatedChanges)
        } else {
            (None, ChangelogSource::Missing)
        };

        Ok(Self {
            category: field("category"),
            package,
            license: field("license"),
            title: field("title"),
            url: field("url"),
            author: field("author"),
            version: field("version"),
            details: field("details"),
            description: field("description"),
            changelog,
            changelog_source,
            binary: lookup("binary").map(str::to_string),
            assets,
        })
    }

    /// User-facing metadata for this package. `updated` is the build-spec
    /// modification date.
    pub fn info(&self, updated: String) -> PackageInfo {
        PackageInfo {
            category: self.category.clone(),
            name: self.package.clone(),
            license: self.license.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
            details: self.details.clone(),
            description: self.description.clone(),
            updated,
            changelog: self.changelog.clone(),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Modification date of a package's build spec, `YYYY-MM-DD` in UTC.
///
/// # Errors
///
/// Returns an error if the spec's metadata cannot be read.
pub fn spec_modified_date(package_dir: &Path) -> std::io::Result<String> {
    let modified = fs::metadata(package_dir.join(BUILD_SPEC_FILE))?.modified()?;
    Ok(DateTime::<Utc>::from(modified).format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NESTED: &str = r#"{
        "package": "foo",
        "info": {
            "category": "tool",
            "license": "GPLv2",
            "title": "Foo",
            "url": "https://example.com/foo",
            "author": "someone",
            "version": "1.0",
            "details": "long text",
            "description": "short text"
        },
        "changelog": "first release",
        "assets": [
            {"type": "update", "url": "https://example.com/foo.nro", "dest": "/switch/foo/foo.nro"},
            {"type": "zip", "url": "foo.zip", "zip": [
                {"path": "*.nro", "type": "extract", "dest": "/"}
            ]},
            {"type": "sticker", "url": "sticker.png"}
        ]
    }"#;

    #[test]
    fn test_parse_nested_info() {
        let spec = PackageBuildSpec::parse(NESTED).unwrap();
        assert_eq!(spec.package, "foo");
        assert_eq!(spec.version, "1.0");
        assert_eq!(spec.changelog.as_deref(), Some("first release"));
        assert_eq!(spec.changelog_source, ChangelogSource::Changelog);
        assert_eq!(spec.binary, None);

        assert_eq!(spec.assets.len(), 3);
        assert_eq!(spec.assets[0].kind, AssetKind::Update);
        assert_eq!(spec.assets[1].zip[0].kind, AssetKind::Extract);
        assert_eq!(spec.assets[2].kind, AssetKind::Unknown("sticker".to_string()));
        assert_eq!(spec.assets[2].kind.placement(), None);
    }

    #[test]
    fn test_top_level_fields_win() {
        let spec = PackageBuildSpec::parse(
            r#"{"category":"game","package":"bar","license":"MIT","title":"Bar",
                "url":"u","author":"a","version":"2.0","details":"d","description":"d",
                "binary":"/switch/bar.nro",
                "info": {"version": "1.0", "changes": "old notes"}}"#,
        )
        .unwrap();
        assert_eq!(spec.version, "2.0");
        assert_eq!(spec.binary.as_deref(), Some("/switch/bar.nro"));
        assert_eq!(spec.changelog_source, ChangelogSource::DeprecatedChanges);
        assert_eq!(spec.changelog.as_deref(), Some("old notes"));
        assert!(spec.assets.is_empty());
    }

    #[test]
    fn test_missing_field_names_first_gap() {
        let err = PackageBuildSpec::parse(
            r#"{"package":"foo","info":{"category":"tool","title":"Foo"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingField("license")));
        assert_eq!(err.to_string(), "pkgbuild.json is missing the `license` field");
    }

    #[test]
    fn test_every_required_field_is_enforced() {
        let full: serde_json::Value = serde_json::from_str(NESTED).unwrap();
        for field in REQUIRED_FIELDS {
            let mut doc = full.clone();
            doc.as_object_mut().unwrap().remove(field);
            doc["info"].as_object_mut().unwrap().remove(field);

            let err = PackageBuildSpec::parse(&doc.to_string()).unwrap_err();
            assert!(
                matches!(err, SpecError::MissingField(f) if f == field),
                "expected {field} to be required"
            );
        }
    }

    #[test]
    fn test_rejects_path_like_identifier() {
        let text = NESTED.replace("\"package\": \"foo\"", "\"package\": \"../foo\"");
        assert!(matches!(
            PackageBuildSpec::parse(&text),
            Err(SpecError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_unparseable_spec() {
        assert!(matches!(
            PackageBuildSpec::parse("{ not json"),
            Err(SpecError::Parse(_))
        ));
    }

    #[test]
    fn test_load_and_modified_date() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(BUILD_SPEC_FILE), NESTED).unwrap();

        let spec = PackageBuildSpec::load(dir.path()).unwrap();
        let info = spec.info(spec_modified_date(dir.path()).unwrap());
        assert_eq!(info.name, "foo");
        assert_eq!(info.updated.len(), 10);
        assert_eq!(&info.updated[4..5], "-");
    }
}
