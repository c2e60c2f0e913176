use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::indices::parse_indices;
use super::output::{confirm_action, print_bookmarks, print_index_only};
use crate::domains::{BookmarkPatch, Dependencies};
use crate::error::Error;
use crate::ingest::{CACHE_CONCURRENCY, CacheRequest, IngestRequest};
use crate::types::{DeleteBookmarks, GetBookmarksOptions, normalize_tag_name};

#[allow(clippy::too_many_arguments)]
pub async fn run_add(
    deps: &Dependencies,
    url: String,
    title: Option<String>,
    excerpt: Option<String>,
    tags: Vec<String>,
    offline: bool,
    no_archival: bool,
    public: bool,
) -> anyhow::Result<()> {
    let request = IngestRequest {
        url,
        title: title.unwrap_or_default(),
        excerpt: excerpt.unwrap_or_default(),
        tags,
        public,
        create_archive: !offline && !no_archival,
        offline,
        ..IngestRequest::default()
    };

    let bookmark = match deps.bookmarks().create(request).await {
        Ok(bookmark) => bookmark,
        Err(Error::AlreadyExists) => bail!("URL already exists"),
        Err(e) => return Err(e).context("Failed to save bookmark"),
    };

    print_bookmarks(std::slice::from_ref(&bookmark));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_print(
    deps: &Dependencies,
    indices: Vec<String>,
    json: bool,
    index_only: bool,
    keyword: Option<String>,
    tags: Vec<String>,
    excluded: Vec<String>,
) -> anyhow::Result<()> {
    let opts = GetBookmarksOptions {
        ids: parse_indices(&indices)?,
        keyword: keyword.unwrap_or_default(),
        tags: tags.iter().map(|t| normalize_tag_name(t)).collect(),
        excluded_tags: excluded.iter().map(|t| normalize_tag_name(t)).collect(),
        ..GetBookmarksOptions::default()
    };
    let bookmarks = deps.bookmarks().find(&opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bookmarks)?);
    } else if index_only {
        print_index_only(&bookmarks);
    } else if bookmarks.is_empty() {
        println!("No bookmarks found");
    } else {
        print_bookmarks(&bookmarks);
    }
    Ok(())
}

/// Re-fetches content for the selected bookmarks and applies tag edits.
/// A tag prefixed with `-` is removed instead of added.
pub async fn run_update(
    deps: &Dependencies,
    indices: Vec<String>,
    offline: bool,
    keep_metadata: bool,
    tags: Vec<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let ids = parse_indices(&indices)?;
    if ids.is_empty() && !confirm_action("Update ALL bookmarks?", yes)? {
        println!("No bookmarks updated");
        return Ok(());
    }

    if !offline {
        let request = CacheRequest {
            ids: ids.clone(),
            keep_metadata,
            create_archive: true,
            ..CacheRequest::default()
        };
        let report = match deps.bookmarks().update_cache(request).await {
            Ok(report) => report,
            Err(Error::BookmarkNotFound) => bail!("No matching index"),
            Err(e) => return Err(e.into()),
        };
        for failure in &report.failures {
            eprintln!("Failed to update {}: {}", failure.url, failure.error);
        }
        println!("Updated {} bookmark(s)", report.updated.len());
    }

    if tags.is_empty() {
        return Ok(());
    }

    let (removed, added): (Vec<String>, Vec<String>) = tags
        .iter()
        .map(|t| t.trim().to_string())
        .partition(|t| t.starts_with('-'));
    let removed: Vec<String> = removed
        .iter()
        .map(|t| normalize_tag_name(t.trim_start_matches('-')))
        .collect();

    let opts = GetBookmarksOptions {
        ids,
        ..GetBookmarksOptions::default()
    };
    let bookmarks = deps.bookmarks().find(&opts).await?;
    if bookmarks.is_empty() {
        bail!("No matching index");
    }

    let mut updated = Vec::with_capacity(bookmarks.len());
    for bookmark in bookmarks {
        let mut names: Vec<String> = bookmark
            .tags
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| !removed.contains(name))
            .collect();
        names.extend(added.iter().cloned());

        let patch = BookmarkPatch {
            tags: Some(names),
            ..BookmarkPatch::default()
        };
        updated.push(deps.bookmarks().update(bookmark.id, patch).await?);
    }

    print_bookmarks(&updated);
    Ok(())
}

pub async fn run_delete(deps: &Dependencies, indices: Vec<String>, yes: bool) -> anyhow::Result<()> {
    let ids = parse_indices(&indices)?;
    let target = if ids.is_empty() {
        if !confirm_action("Remove ALL bookmarks?", yes)? {
            println!("No bookmarks deleted");
            return Ok(());
        }
        DeleteBookmarks::All
    } else {
        DeleteBookmarks::Ids(ids)
    };

    let deleted = deps.bookmarks().delete(target).await?;
    println!("Deleted {deleted} bookmark(s)");
    Ok(())
}

/// Pings every selected bookmark. Fails when any of them is unreachable.
pub async fn run_check(deps: &Dependencies, indices: Vec<String>, yes: bool) -> anyhow::Result<()> {
    let ids = parse_indices(&indices)?;
    if ids.is_empty() && !confirm_action("Check ALL bookmarks?", yes)? {
        println!("No bookmarks checked");
        return Ok(());
    }

    let opts = GetBookmarksOptions {
        ids,
        ..GetBookmarksOptions::default()
    };
    let bookmarks = deps.bookmarks().find(&opts).await?;
    let total = bookmarks.len();

    let semaphore = Arc::new(Semaphore::new(CACHE_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for bookmark in bookmarks {
        let fetcher = deps.fetcher.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = fetcher.fetch(&bookmark.url).await.map(|_| ());
            (bookmark.id, bookmark.url, result)
        });
    }

    let mut unreachable = Vec::new();
    let mut done = 0;
    while let Some(joined) = tasks.join_next().await {
        let (id, url, result) = joined?;
        done += 1;
        match result {
            Ok(()) => println!("[{done}/{total}] Reached {url}"),
            Err(e) => {
                eprintln!("[{done}/{total}] Failed to reach {url}: {e}");
                unreachable.push(id);
            }
        }
    }

    println!();
    if unreachable.is_empty() {
        println!("All bookmarks are reachable.");
        return Ok(());
    }

    unreachable.sort_unstable();
    let ids: Vec<String> = unreachable.iter().map(ToString::to_string).collect();
    bail!("Encountered some unreachable bookmarks: {}", ids.join(" "))
}
