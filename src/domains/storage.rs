use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use super::Dependencies;
use crate::error::Result;
use crate::types::Bookmark;

/// Companion files kept next to the database, one of each per bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Thumbnail,
    Archive,
    Ebook,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Thumbnail, Self::Archive, Self::Ebook];

    fn dir(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumb",
            Self::Archive => "archive",
            Self::Ebook => "ebook",
        }
    }

    /// Path relative to the data directory, e.g. `ebook/12.epub`.
    #[must_use]
    pub fn relative_path(self, id: i64) -> String {
        match self {
            Self::Ebook => format!("ebook/{id}.epub"),
            other => format!("{}/{id}", other.dir()),
        }
    }
}

/// Size, mtime and validator of a companion file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub len: u64,
    pub modified: SystemTime,
    pub etag: String,
}

pub struct StorageDomain<'a> {
    deps: &'a Dependencies,
}

impl<'a> StorageDomain<'a> {
    pub(super) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.deps.config.data_dir
    }

    #[must_use]
    pub fn path(&self, kind: ArtifactKind, id: i64) -> PathBuf {
        self.data_dir().join(kind.relative_path(id))
    }

    #[must_use]
    pub fn exists(&self, kind: ArtifactKind, id: i64) -> bool {
        self.path(kind, id).is_file()
    }

    /// Creates the artifact's directory and returns the file path.
    pub async fn prepare(&self, kind: ArtifactKind, id: i64) -> Result<PathBuf> {
        let path = self.path(kind, id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(path)
    }

    /// Replaces the artifact with `bytes`, going through a temp file.
    pub async fn write(&self, kind: ArtifactKind, id: i64, bytes: &[u8]) -> Result<()> {
        let path = self.prepare(kind, id).await?;
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn read(&self, kind: ArtifactKind, id: i64) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(kind, id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stat(&self, kind: ArtifactKind, id: i64) -> Result<Option<FileInfo>> {
        let meta = match tokio::fs::metadata(self.path(kind, id)).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = meta.modified()?;
        Ok(Some(FileInfo {
            len: meta.len(),
            modified,
            etag: etag(meta.len(), modified),
        }))
    }

    /// Deletes every companion file of a bookmark. Missing files are fine.
    pub async fn remove_all(&self, id: i64) {
        for kind in ArtifactKind::ALL {
            let path = self.path(kind, id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }

    /// URL the thumbnail is served from, relative to the host.
    #[must_use]
    pub fn thumbnail_url(&self, id: i64) -> String {
        format!("{}bookmark/{id}/thumb", self.deps.config.http.root_path)
    }

    /// Fills the flags and URLs derived from files on disk.
    pub fn decorate(&self, bookmark: &mut Bookmark) {
        bookmark.has_thumbnail = self.exists(ArtifactKind::Thumbnail, bookmark.id);
        bookmark.has_archive = self.exists(ArtifactKind::Archive, bookmark.id);
        bookmark.has_ebook = self.exists(ArtifactKind::Ebook, bookmark.id);
        bookmark.image_url = if bookmark.has_thumbnail {
            self.thumbnail_url(bookmark.id)
        } else {
            String::new()
        };
    }

    pub fn decorate_all(&self, bookmarks: &mut [Bookmark]) {
        for bookmark in bookmarks {
            self.decorate(bookmark);
        }
    }
}

/// Hex sha256 of the file size and mtime.
fn etag(len: u64, modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    hex::encode(hasher.finalize())
}
