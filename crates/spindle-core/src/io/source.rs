//! Where an asset's bytes come from.
//!
//! The resolver only sees [`AssetSource`]; whether the bytes live in the
//! package directory, behind a URL, or inside an already-fetched zip is
//! decided once, when the source is constructed.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use zip::ZipArchive;

use super::download::Fetcher;

/// Errors that can occur while obtaining an asset's bytes.
#[derive(Error, Debug)]
pub enum SourceError {
    /// A local asset could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A download failed or timed out.
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An archive member could not be read.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The source is neither an existing local file nor an HTTP(S) URL.
    #[error("no local file at {0} and not a URL")]
    NotFound(PathBuf),

    /// A local path climbs out of the package directory.
    #[error("`{0}` is outside the package directory")]
    OutsidePackage(String),
}

/// Capability to produce an asset's bytes.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Human-readable origin, for diagnostics.
    fn describe(&self) -> String;

    /// Produce the full content.
    async fn fetch(&self) -> Result<Bytes, SourceError>;

    /// Path of the content on disk, when it already lives there.
    fn local_path(&self) -> Option<&Path> {
        None
    }
}

/// A file inside the package directory.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    /// Wrap a path that is known to exist.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AssetSource for LocalFile {
    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }

    async fn fetch(&self) -> Result<Bytes, SourceError> {
        Ok(Bytes::from(tokio::fs::read(&self.path).await?))
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// A file downloaded over HTTP(S).
#[derive(Debug, Clone)]
pub struct RemoteUrl {
    fetcher: Fetcher,
    url: String,
}

impl RemoteUrl {
    /// Download `url` with `fetcher`.
    pub fn new(fetcher: Fetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AssetSource for RemoteUrl {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Bytes, SourceError> {
        Ok(self.fetcher.fetch(&self.url).await?)
    }
}

/// A member of a zip archive held in memory.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    archive: Bytes,
    name: String,
}

impl ArchiveMember {
    /// Refer to member `name` of `archive`.
    pub fn new(archive: Bytes, name: impl Into<String>) -> Self {
        Self {
            archive,
            name: name.into(),
        }
    }
}

#[async_trait]
impl AssetSource for ArchiveMember {
    fn describe(&self) -> String {
        format!("zip member {}", self.name)
    }

    async fn fetch(&self) -> Result<Bytes, SourceError> {
        let mut archive = ZipArchive::new(Cursor::new(self.archive.clone()))?;
        let mut member = archive.by_name(&self.name)?;
        let mut buf = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Pick the source for a declared asset location.
///
/// An existing file under the package root wins, whatever the asset type;
/// otherwise an `http://` or `https://` location is downloaded.
///
/// # Errors
///
/// Returns [`SourceError::NotFound`] if the location is neither, or
/// [`SourceError::OutsidePackage`] if it is a path with `..` components.
pub fn source_for(
    package_root: &Path,
    location: &str,
    fetcher: &Fetcher,
) -> Result<Box<dyn AssetSource>, SourceError> {
    let relative = Path::new(location.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    let local = package_root.join(relative);
    if !escapes && local.is_file() {
        return Ok(Box::new(LocalFile::new(local)));
    }
    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Box::new(RemoteUrl::new(fetcher.clone(), location)));
    }
    if escapes {
        return Err(SourceError::OutsidePackage(location.to_string()));
    }
    Err(SourceError::NotFound(local))
}
