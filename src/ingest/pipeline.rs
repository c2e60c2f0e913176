//! The ingestion pipeline shared by bookmark creation, the browser
//! extension, imports and the bulk cache refresh.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::extract::Extracted;
use super::fetch::FetchedPage;
use super::import::{ParsedImport, SkippedEntry};
use super::url::{canonicalize, is_fetchable};
use crate::domains::{ArtifactKind, Dependencies};
use crate::error::{Error, Result};
use crate::types::{Bookmark, GetBookmarksOptions, Tag, normalize_tag_name};

/// In-flight fetches allowed during a bulk refresh.
pub const CACHE_CONCURRENCY: usize = 10;

/// A bookmark to ingest. Empty strings mean "not supplied".
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub public: bool,
    /// Page HTML captured by a client; skips the fetch when present.
    pub html: Option<String>,
    pub create_archive: bool,
    pub create_ebook: bool,
    /// Store the bookmark without fetching anything.
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CacheRequest {
    pub ids: Vec<i64>,
    /// Keep the stored title and excerpt instead of the fetched ones.
    pub keep_metadata: bool,
    pub create_archive: bool,
    pub create_ebook: bool,
    /// Skip bookmarks that already have every requested artifact.
    pub skip_exist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheFailure {
    pub id: i64,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheReport {
    pub updated: Vec<Bookmark>,
    pub failures: Vec<CacheFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: Vec<Bookmark>,
    pub skipped: Vec<SkippedEntry>,
}

/// What was retrieved for a bookmark before it is persisted.
#[derive(Default)]
struct Capture {
    page: Option<FetchedPage>,
    extracted: Option<Extracted>,
}

pub struct Pipeline<'a> {
    deps: &'a Dependencies,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    /// Creates a new bookmark. Fails with `AlreadyExists` when the canonical
    /// URL is already saved.
    pub async fn create(&self, request: IngestRequest) -> Result<Bookmark> {
        let url = canonicalize(&request.url)?;
        if self.deps.store.get_bookmark(0, &url).await?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let capture = self.capture(&url, &request).await?;

        let mut bookmark = Bookmark {
            url: url.clone(),
            title: request.title.clone(),
            excerpt: request.excerpt.clone(),
            public: request.public,
            tags: tag_list(&request.tags),
            ..Bookmark::default()
        };
        if let Some(extracted) = &capture.extracted {
            fill_from_extraction(&mut bookmark, extracted, false);
        }
        bookmark.title = sanitize_title(&bookmark.title, &url);

        let mut bookmark = self.save(true, bookmark).await?;
        tracing::info!(id = bookmark.id, url = %bookmark.url, "Saved bookmark");

        self.finish(&mut bookmark, capture, request.create_archive, request.create_ebook)
            .await?;
        Ok(bookmark)
    }

    /// Saves parsed import entries one by one. Entries that fail on their
    /// own (duplicates, bad URLs, unreachable pages) are skipped.
    pub async fn import(&self, parsed: ParsedImport, online: bool) -> Result<ImportReport> {
        let mut report = ImportReport {
            skipped: parsed.skipped,
            ..ImportReport::default()
        };

        for entry in parsed.bookmarks {
            let url = entry.url.clone();
            let request = IngestRequest {
                url: entry.url,
                title: entry.title,
                excerpt: entry.excerpt,
                tags: entry.tags,
                offline: !online,
                ..IngestRequest::default()
            };
            match self.create(request).await {
                Ok(bookmark) => report.imported.push(bookmark),
                Err(
                    e @ (Error::AlreadyExists
                    | Error::Validation { .. }
                    | Error::Upstream(_)
                    | Error::Http(_)),
                ) => {
                    tracing::info!("Skip {url}: {e}");
                    report.skipped.push(SkippedEntry {
                        url,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Browser-extension ingest: creates the bookmark, or merges tags and
    /// captured HTML into the one already saved under the same URL.
    pub async fn ingest_extension(&self, request: IngestRequest) -> Result<Bookmark> {
        let url = canonicalize(&request.url)?;
        let Some(mut existing) = self.deps.store.get_bookmark(0, &url).await? else {
            return self.create(request).await;
        };

        for tag in tag_list(&request.tags) {
            if !existing.tags.iter().any(|t| t.name == tag.name) {
                existing.tags.push(tag);
            }
        }
        if !request.title.trim().is_empty() {
            existing.title = sanitize_title(&request.title, &url);
        }
        if !request.excerpt.is_empty() {
            existing.excerpt = request.excerpt.clone();
        }

        let capture = match &request.html {
            Some(html) if !html.trim().is_empty() => {
                let page = FetchedPage::from_html(&url, html);
                let extracted = self.extract(&page)?;
                if let Some(extracted) = &extracted {
                    existing.html = extracted.content_html.clone();
                    existing.content = extracted.text_content.clone();
                }
                Capture {
                    page: Some(page),
                    extracted,
                }
            }
            _ => Capture::default(),
        };

        let mut bookmark = self.save(false, existing).await?;
        self.finish(&mut bookmark, capture, request.create_archive, request.create_ebook)
            .await?;
        Ok(bookmark)
    }

    /// Re-fetches every listed bookmark with bounded concurrency. A failing
    /// bookmark is reported and never stops the others.
    pub async fn update_cache(&self, request: CacheRequest) -> Result<CacheReport> {
        let bookmarks = if request.ids.is_empty() {
            Vec::new()
        } else {
            self.deps
                .store
                .get_bookmarks(&GetBookmarksOptions {
                    ids: request.ids.clone(),
                    with_content: true,
                    ..GetBookmarksOptions::default()
                })
                .await?
        };
        if bookmarks.is_empty() {
            return Err(Error::BookmarkNotFound);
        }

        let semaphore = Arc::new(Semaphore::new(CACHE_CONCURRENCY));
        let mut tasks = JoinSet::new();
        for bookmark in bookmarks {
            let deps = self.deps.clone();
            let semaphore = semaphore.clone();
            let request = request.clone();
            tasks.spawn(async move {
                let (id, url) = (bookmark.id, bookmark.url.clone());
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => deps.ingest().refresh(bookmark, &request).await,
                    Err(e) => Err(Error::Internal(e.to_string())),
                };
                (id, url, result)
            });
        }

        let mut report = CacheReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(bookmark))) => report.updated.push(bookmark),
                Ok((id, url, Err(e))) => {
                    tracing::warn!(id, url = %url, "Failed to update cache: {e}");
                    report.failures.push(CacheFailure {
                        id,
                        url,
                        error: e.to_string(),
                    });
                }
                Err(e) => tracing::error!("Cache worker panicked: {e}"),
            }
        }

        report.updated.sort_by_key(|b| b.id);
        report.failures.sort_by_key(|f| f.id);
        Ok(report)
    }

    /// Steps fetch to re-save for one stored bookmark.
    pub async fn refresh(&self, mut bookmark: Bookmark, request: &CacheRequest) -> Result<Bookmark> {
        let storage = self.deps.storage();
        storage.decorate(&mut bookmark);

        let archive_done = !request.create_archive || bookmark.has_archive;
        let ebook_done = !request.create_ebook || bookmark.has_ebook;
        if request.skip_exist && bookmark.has_content && archive_done {
            if !ebook_done {
                self.write_ebook(&mut bookmark).await?;
            }
            return Ok(bookmark);
        }

        if !is_fetchable(&bookmark.url) {
            return Err(Error::validation("url", "only http and https URLs can be fetched"));
        }
        let page = self.deps.fetcher.fetch(&bookmark.url).await?;
        let extracted = self.extract(&page)?;

        if let Some(extracted) = &extracted {
            fill_from_extraction(&mut bookmark, extracted, !request.keep_metadata);
        }
        bookmark.title = sanitize_title(&bookmark.title, &bookmark.url);

        let capture = Capture {
            page: Some(page),
            extracted,
        };
        let mut bookmark = self.save(false, bookmark).await?;
        self.finish(&mut bookmark, capture, request.create_archive, request.create_ebook)
            .await?;
        Ok(bookmark)
    }

    /// Fetch and extract, tolerating a failed fetch when the caller already
    /// gave a title.
    async fn capture(&self, url: &str, request: &IngestRequest) -> Result<Capture> {
        let page = match &request.html {
            Some(html) if !html.trim().is_empty() => Some(FetchedPage::from_html(url, html)),
            _ if request.offline => None,
            _ if !is_fetchable(url) => None,
            _ => match self.deps.fetcher.fetch(url).await {
                Ok(page) => Some(page),
                Err(e) if !request.title.trim().is_empty() => {
                    tracing::warn!(url, "Fetch failed, saving without content: {e}");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let extracted = match &page {
            Some(page) => self.extract(page)?,
            None => None,
        };
        Ok(Capture { page, extracted })
    }

    fn extract(&self, page: &FetchedPage) -> Result<Option<Extracted>> {
        if !page.is_html() {
            return Ok(None);
        }
        self.deps.extractor.extract(&page.text(), &page.url).map(Some)
    }

    /// Thumbnail, archive, ebook, then the final save.
    async fn finish(
        &self,
        bookmark: &mut Bookmark,
        capture: Capture,
        create_archive: bool,
        create_ebook: bool,
    ) -> Result<()> {
        let mut pages: Vec<FetchedPage> = capture.page.into_iter().collect();

        // The lead image first, then the site icon.
        let candidates = capture
            .extracted
            .as_ref()
            .map(|e| [e.image_url.as_str(), e.favicon_url.as_str()])
            .unwrap_or_default();
        for image_url in candidates.into_iter().filter(|u| is_fetchable(u)) {
            if let Some(image) = self.download_thumbnail(bookmark.id, image_url).await {
                pages.push(image);
                break;
            }
        }

        let mut changed = false;
        if create_archive && !pages.is_empty() {
            let dest = self
                .deps
                .storage()
                .prepare(ArtifactKind::Archive, bookmark.id)
                .await?;
            let archiver = self.deps.archiver.clone();
            let name = archiver.name();
            tokio::task::spawn_blocking(move || archiver.archive(&pages, &dest))
                .await
                .map_err(|e| Error::Internal(e.to_string()))??;
            bookmark.archiver = name.to_string();
            bookmark.archive_path = ArtifactKind::Archive.relative_path(bookmark.id);
            changed = true;
        }

        if create_ebook {
            self.write_ebook(bookmark).await?;
        }

        if changed {
            *bookmark = self.save(false, bookmark.clone()).await?;
        }
        self.deps.storage().decorate(bookmark);
        Ok(())
    }

    async fn write_ebook(&self, bookmark: &mut Bookmark) -> Result<()> {
        let storage = self.deps.storage();
        let cover = storage.read(ArtifactKind::Thumbnail, bookmark.id).await?;
        let dest = storage.prepare(ArtifactKind::Ebook, bookmark.id).await?;
        let generator = self.deps.ebooks.clone();
        let snapshot = bookmark.clone();
        tokio::task::spawn_blocking(move || generator.generate(&snapshot, cover.as_deref(), &dest))
            .await
            .map_err(|e| Error::Internal(e.to_string()))??;
        bookmark.has_ebook = true;
        Ok(())
    }

    /// Downloads the lead image into `thumb/<id>`. Failures are logged only.
    async fn download_thumbnail(&self, id: i64, image_url: &str) -> Option<FetchedPage> {
        let page = match self.deps.fetcher.fetch(image_url).await {
            Ok(page) if page.is_image() => page,
            Ok(page) => {
                tracing::debug!(id, image_url, "Not an image: {}", page.content_type());
                return None;
            }
            Err(e) => {
                tracing::warn!(id, image_url, "Failed to download thumbnail: {e}");
                return None;
            }
        };
        if let Err(e) = self
            .deps
            .storage()
            .write(ArtifactKind::Thumbnail, id, &page.body)
            .await
        {
            tracing::warn!(id, "Failed to store thumbnail: {e}");
            return None;
        }
        Some(page)
    }

    async fn save(&self, create: bool, bookmark: Bookmark) -> Result<Bookmark> {
        self.deps
            .store
            .save_bookmarks(create, vec![bookmark])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("store returned no bookmark".into()))
    }
}

fn tag_list(names: &[String]) -> Vec<Tag> {
    let mut tags: Vec<Tag> = Vec::new();
    for name in names.iter().map(|n| normalize_tag_name(n)) {
        if !name.is_empty() && !tags.iter().any(|t| t.name == name) {
            tags.push(Tag::named(name));
        }
    }
    tags
}

/// Copies extracted fields into the bookmark. Title and excerpt are only
/// replaced when empty, unless `overwrite` is set.
fn fill_from_extraction(bookmark: &mut Bookmark, extracted: &Extracted, overwrite: bool) {
    if (overwrite || bookmark.title.trim().is_empty()) && !extracted.title.is_empty() {
        bookmark.title = extracted.title.clone();
    }
    if (overwrite || bookmark.excerpt.is_empty()) && !extracted.excerpt.is_empty() {
        bookmark.excerpt = extracted.excerpt.clone();
    }
    if bookmark.author.is_empty() || overwrite {
        bookmark.author = extracted.byline.clone();
    }
    bookmark.content = extracted.text_content.clone();
    bookmark.html = extracted.content_html.clone();
}

/// Drops replacement and control characters. Falls back to the URL when
/// nothing printable is left.
#[must_use]
pub fn sanitize_title(title: &str, url: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        url.to_string()
    } else {
        cleaned.to_string()
    }
}
