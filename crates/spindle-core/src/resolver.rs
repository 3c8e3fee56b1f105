//! Asset resolution.
//!
//! Every declared asset goes through [`AssetResolver::resolve`]: its bytes
//! are pulled from an [`AssetSource`] and placed according to its type. A
//! `zip` asset is listed and each matching member is fed back through
//! `resolve` as a derived asset, to any depth. Placements of the four file
//! types are recorded in the package manifest as they happen.

use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::future::BoxFuture;
use spindle_schema::{INFO_FILE, MANIFEST_FILE, ManifestAction};
use thiserror::Error;
use tokio::fs;

use crate::extract::{ZipListing, compile_pattern, member_destination};
use crate::io::download::Fetcher;
use crate::io::source::{AssetSource, SourceError, source_for};
use crate::manifest::ManifestBuilder;
use crate::package::{BUILD_SPEC_FILE, AssetDeclaration, AssetKind, Placement, PreviewImage, SubAssetPattern};
use crate::reporter::Reporter;

/// Why a single asset was skipped. Never fatal to the package.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The bytes could not be obtained.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The bytes could not be written.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A zip asset is not a readable archive.
    #[error("not a readable zip: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The asset type is not one this tool knows how to place.
    #[error("unknown asset type `{0}`")]
    UnknownType(String),

    /// A file-placing asset declared no destination.
    #[error("`{0}` asset has no destination")]
    MissingDestination(String),

    /// The destination is empty, leaves the package directory, or names a
    /// file spindle reads or writes itself.
    #[error("invalid destination `{0}`")]
    InvalidDestination(String),
}

/// An asset ready to be placed: its type, where its bytes come from, and
/// where they go.
pub struct ResolvableAsset<'a> {
    /// Placement type.
    pub kind: &'a AssetKind,
    /// Origin of the bytes.
    pub source: Box<dyn AssetSource>,
    /// Destination relative to the package root.
    pub dest: Option<String>,
    /// Member patterns, for `zip` assets.
    pub zip: &'a [SubAssetPattern],
}

/// Places the assets of one package and records its manifest.
pub struct AssetResolver<'r> {
    package_root: &'r Path,
    preview_dir: PathBuf,
    fetcher: &'r Fetcher,
    reporter: &'r dyn Reporter,
    label: &'r str,
    manifest: ManifestBuilder,
}

impl<'r> AssetResolver<'r> {
    /// Resolver for the package at `package_root`. Preview images are also
    /// copied into `preview_dir`; `label` prefixes diagnostics.
    pub fn new(
        package_root: &'r Path,
        preview_dir: PathBuf,
        fetcher: &'r Fetcher,
        reporter: &'r dyn Reporter,
        label: &'r str,
    ) -> Self {
        Self {
            package_root,
            preview_dir,
            fetcher,
            reporter,
            label,
            manifest: ManifestBuilder::new(),
        }
    }

    /// Resolve an asset as declared in the build spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset type is unknown, its source cannot be
    /// found or fetched, or its destination cannot be written. Failures of
    /// individual zip members are reported and do not surface here.
    pub async fn resolve_declared(&mut self, asset: &AssetDeclaration) -> Result<(), AssetError> {
        if asset.kind.placement().is_none() {
            return Err(AssetError::UnknownType(asset.kind.to_string()));
        }
        let source = source_for(self.package_root, &asset.url, self.fetcher)?;
        self.resolve(ResolvableAsset {
            kind: &asset.kind,
            source,
            dest: asset.dest.clone(),
            zip: &asset.zip,
        })
        .await
    }

    /// Place one asset.
    pub fn resolve<'s>(&'s mut self, asset: ResolvableAsset<'s>) -> BoxFuture<'s, Result<(), AssetError>> {
        Box::pin(async move {
            let placement = asset
                .kind
                .placement()
                .ok_or_else(|| AssetError::UnknownType(asset.kind.to_string()))?;

            match placement {
                Placement::File(action) => {
                    let dest = asset
                        .dest
                        .ok_or_else(|| AssetError::MissingDestination(asset.kind.to_string()))?;
                    let target = self.destination(&dest)?;
                    let bytes = asset.source.fetch().await?;
                    write_file(&target, &bytes).await?;
                    tracing::debug!(package = self.label, from = %asset.source.describe(), to = %target.display(), "placed asset");
                    self.manifest.push(ManifestAction::new(action, &dest));
                    Ok(())
                }
                Placement::Preview(image) => self.place_preview(image, asset.source.as_ref()).await,
                Placement::Archive => {
                    let bytes = asset.source.fetch().await?;
                    self.extract(bytes, asset.zip).await
                }
            }
        })
    }

    /// Resolve the members of `archive` selected by `patterns`.
    async fn extract(&mut self, archive: Bytes, patterns: &[SubAssetPattern]) -> Result<(), AssetError> {
        let listing = ZipListing::open(archive)?;
        let mut handled = 0usize;

        for sub in patterns {
            let pattern = match compile_pattern(&sub.path) {
                Ok(pattern) => pattern,
                Err(e) => {
                    self.warn(&format!("invalid zip pattern `{}`: {e}", sub.path));
                    continue;
                }
            };
            let matches = listing.matching(&pattern);
            if matches.is_empty() {
                self.warn(&format!("zip pattern `{}` matched nothing", sub.path));
                continue;
            }

            for name in matches {
                let member = listing.member(&name);
                let dest = sub
                    .dest
                    .as_deref()
                    .map(|dest| member_destination(&sub.path, &name, dest));
                let derived = ResolvableAsset {
                    kind: &sub.kind,
                    source: Box::new(member),
                    dest,
                    zip: &sub.zip,
                };
                match self.resolve(derived).await {
                    Ok(()) => handled += 1,
                    Err(e) => self.warn(&format!("skipping zip member `{name}`: {e}")),
                }
            }
        }

        if handled != patterns.len() {
            tracing::info!(package = self.label, handled, declared = patterns.len(), "zip member count differs from pattern count");
            self.reporter.info(&format!(
                "{}: handled {handled} zip members for {} declared patterns",
                self.label,
                patterns.len()
            ));
        }
        Ok(())
    }

    async fn place_preview(&mut self, image: PreviewImage, source: &dyn AssetSource) -> Result<(), AssetError> {
        let in_package = self.package_root.join(image.file_name());
        let bytes = source.fetch().await?;
        if source.local_path() != Some(in_package.as_path()) {
            write_file(&in_package, &bytes).await?;
        }
        write_file(&self.preview_dir.join(image.file_name()), &bytes).await?;
        Ok(())
    }

    /// Join `dest` onto the package root, refusing anything that would
    /// leave it, name the root itself, or replace the build spec, manifest
    /// or info document.
    fn destination(&self, dest: &str) -> Result<PathBuf, AssetError> {
        let mut path = self.package_root.to_path_buf();
        let mut depth = 0;
        for component in Path::new(dest).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(AssetError::InvalidDestination(dest.to_string()));
                }
            }
        }
        let reserved = [BUILD_SPEC_FILE, MANIFEST_FILE, INFO_FILE]
            .iter()
            .any(|name| path == self.package_root.join(name));
        if depth == 0 || reserved {
            return Err(AssetError::InvalidDestination(dest.to_string()));
        }
        Ok(path)
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(package = self.label, "{msg}");
        self.reporter.warning(&format!("{}: {msg}", self.label));
    }

    /// Placements recorded so far.
    pub fn manifest(&self) -> &ManifestBuilder {
        &self.manifest
    }

    /// Finish, handing back the manifest.
    pub fn into_manifest(self) -> ManifestBuilder {
        self.manifest
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reporter::NullReporter;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    #[derive(Default)]
    struct Warnings(Mutex<Vec<String>>);

    impl Reporter for Warnings {
        fn section(&self, _: &str) {}
        fn package_started(&self, _: &str, _: &str, _: bool) {}
        fn package_done(&self, _: &str, _: &str) {}
        fn package_skipped(&self, _: &str, _: &str) {}
        fn package_failed(&self, _: &str, _: &str) {}
        fn info(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("info: {msg}"));
        }
        fn warning(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("warning: {msg}"));
        }
        fn error(&self, _: &str) {}
        fn summary(&self, _: &crate::pipeline::BuildSummary) {}
    }

    fn zip_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn declaration(json: &str) -> AssetDeclaration {
        serde_json::from_str(json).unwrap()
    }

    fn rendered(resolver: &AssetResolver<'_>) -> String {
        resolver.manifest().render()
    }

    #[tokio::test]
    async fn test_local_asset_is_copied_and_recorded() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(pkg.path().join("app.nro"), b"NRO").unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &NullReporter, "app");

        resolver
            .resolve_declared(&declaration(r#"{"type": "update", "url": "app.nro", "dest": "/switch/app/app.nro"}"#))
            .await
            .unwrap();

        assert_eq!(std::fs::read(pkg.path().join("switch/app/app.nro")).unwrap(), b"NRO");
        assert_eq!(rendered(&resolver), "U: /switch/app/app.nro\n");
    }

    #[tokio::test]
    async fn test_zip_members_become_extract_actions() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(
            pkg.path().join("release.zip"),
            zip_with(&[("a.nro", b"A"), ("readme.txt", b"R"), ("b.nro", b"B")]),
        )
        .unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &NullReporter, "app");

        resolver
            .resolve_declared(&declaration(
                r#"{"type": "zip", "url": "release.zip",
                    "zip": [{"path": "*.nro", "type": "extract", "dest": "/"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(rendered(&resolver), "E: /a.nro\nE: /b.nro\n");
        assert_eq!(std::fs::read(pkg.path().join("b.nro")).unwrap(), b"B");
        assert!(!pkg.path().join("readme.txt").exists());
    }

    #[tokio::test]
    async fn test_member_count_is_compared_with_pattern_count() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(
            pkg.path().join("release.zip"),
            zip_with(&[("a.nro", b"A"), ("b.nro", b"B"), ("c.txt", b"C")]),
        )
        .unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let reporter = Warnings::default();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &reporter, "app");

        resolver
            .resolve_declared(&declaration(
                r#"{"type": "zip", "url": "release.zip", "zip": [
                    {"path": "*.nro", "type": "extract", "dest": "/"}
                ]}"#,
            ))
            .await
            .unwrap();
        resolver
            .resolve_declared(&declaration(
                r#"{"type": "zip", "url": "release.zip", "zip": [
                    {"path": "c.txt", "type": "get", "dest": "/c.txt"}
                ]}"#,
            ))
            .await
            .unwrap();

        let messages = reporter.0.lock().unwrap();
        assert_eq!(
            *messages,
            ["info: app: handled 2 zip members for 1 declared patterns"]
        );
    }

    #[tokio::test]
    async fn test_nested_zip_recursion() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        let inner = zip_with(&[("bin/tool.nro", b"T"), ("bin/tool.txt", b"X")]);
        std::fs::write(
            pkg.path().join("outer.zip"),
            zip_with(&[("payload/inner.zip", inner.as_slice()), ("payload/config.ini", b"C")]),
        )
        .unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &NullReporter, "app");

        resolver
            .resolve_declared(&declaration(
                r#"{"type": "zip", "url": "outer.zip", "zip": [
                    {"path": "payload/*.ini", "type": "get", "dest": "/config/"},
                    {"path": "payload/inner.zip", "type": "zip", "zip": [
                        {"path": "bin/*.nro", "type": "update", "dest": "/switch/tool/"}
                    ]}
                ]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(rendered(&resolver), "G: /config/config.ini\nU: /switch/tool/tool.nro\n");
        assert_eq!(std::fs::read(pkg.path().join("switch/tool/tool.nro")).unwrap(), b"T");
    }

    #[tokio::test]
    async fn test_unmatched_pattern_warns_and_continues() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(pkg.path().join("release.zip"), zip_with(&[("a.nro", b"A")])).unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let reporter = Warnings::default();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &reporter, "app");

        resolver
            .resolve_declared(&declaration(
                r#"{"type": "zip", "url": "release.zip", "zip": [
                    {"path": "*.elf", "type": "extract", "dest": "/"},
                    {"path": "*.nro", "type": "extract", "dest": "/"}
                ]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(rendered(&resolver), "E: /a.nro\n");
        let messages = reporter.0.lock().unwrap();
        assert!(messages.contains(&"warning: app: zip pattern `*.elf` matched nothing".to_string()));
        assert!(messages.contains(&"info: app: handled 1 zip members for 2 declared patterns".to_string()));
    }

    #[tokio::test]
    async fn test_icon_goes_to_package_and_preview() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(pkg.path().join("icon.png"), b"PNG").unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let preview = out.path().join("packages/app");
        let mut resolver = AssetResolver::new(pkg.path(), preview.clone(), &fetcher, &NullReporter, "app");

        resolver
            .resolve_declared(&declaration(r#"{"type": "icon", "url": "icon.png"}"#))
            .await
            .unwrap();
        resolver
            .resolve_declared(&declaration(r#"{"type": "screenshot", "url": "icon.png"}"#))
            .await
            .unwrap();

        assert_eq!(std::fs::read(preview.join("icon.png")).unwrap(), b"PNG");
        assert_eq!(std::fs::read(pkg.path().join("screen.png")).unwrap(), b"PNG");
        assert_eq!(std::fs::read(preview.join("screen.png")).unwrap(), b"PNG");
        assert!(resolver.manifest().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_assets() {
        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(pkg.path().join("app.nro"), b"NRO").unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &NullReporter, "app");

        let unknown = resolver
            .resolve_declared(&declaration(r#"{"type": "banner", "url": "app.nro", "dest": "/a"}"#))
            .await;
        assert!(matches!(unknown, Err(AssetError::UnknownType(t)) if t == "banner"));

        let escape = resolver
            .resolve_declared(&declaration(r#"{"type": "get", "url": "app.nro", "dest": "/../x.nro"}"#))
            .await;
        assert!(matches!(escape, Err(AssetError::InvalidDestination(_))));

        for reserved in ["/pkgbuild.json", "manifest.install", "/./info.json"] {
            let clobber = resolver
                .resolve_declared(&AssetDeclaration {
                    kind: AssetKind::Get,
                    url: "app.nro".into(),
                    dest: Some(reserved.into()),
                    zip: Vec::new(),
                })
                .await;
            assert!(matches!(clobber, Err(AssetError::InvalidDestination(d)) if d == reserved));
        }
        assert!(!pkg.path().join("pkgbuild.json").exists());
        assert!(!pkg.path().join("manifest.install").exists());

        let nested = resolver
            .resolve_declared(&declaration(r#"{"type": "get", "url": "app.nro", "dest": "/config/info.json"}"#))
            .await;
        assert!(nested.is_ok());

        let no_dest = resolver
            .resolve_declared(&declaration(r#"{"type": "local", "url": "app.nro"}"#))
            .await;
        assert!(matches!(no_dest, Err(AssetError::MissingDestination(_))));

        let missing = resolver
            .resolve_declared(&declaration(r#"{"type": "get", "url": "gone.nro", "dest": "/x.nro"}"#))
            .await;
        assert!(matches!(missing, Err(AssetError::Source(SourceError::NotFound(_)))));

        assert_eq!(rendered(&resolver), "G: /config/info.json\n");
    }

    #[tokio::test]
    async fn test_download_asset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/app.nro")
            .with_status(200)
            .with_body("REMOTE")
            .create_async()
            .await;

        let pkg = tempdir().unwrap();
        let out = tempdir().unwrap();
        let fetcher = Fetcher::new(&Config::default()).unwrap();
        let mut resolver =
            AssetResolver::new(pkg.path(), out.path().join("packages/app"), &fetcher, &NullReporter, "app");

        let url = format!("{}/app.nro", server.url());
        resolver
            .resolve_declared(&AssetDeclaration {
                kind: AssetKind::Get,
                url,
                dest: Some("/switch/app.nro".into()),
                zip: Vec::new(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(pkg.path().join("switch/app.nro")).unwrap(), b"REMOTE");
        assert_eq!(rendered(&resolver), "G: /switch/app.nro\n");
    }
}
