//! Turning a URL into a stored bookmark: canonicalization, fetching,
//! extraction, thumbnails, archives, ebooks and bookmark file formats.

pub mod ebook;
pub mod extract;
pub mod fetch;
pub mod import;
mod pipeline;
pub mod url;
pub mod warc;

pub use ebook::{EbookGenerator, EpubGenerator};
pub use extract::{Extracted, Extractor, ReadabilityExtractor};
pub use fetch::{FETCH_TIMEOUT, FetchedPage, Fetcher};
pub use import::{ImportedBookmark, ParsedImport, SkippedEntry, export_netscape};
pub use pipeline::{
    CACHE_CONCURRENCY, CacheFailure, CacheReport, CacheRequest, ImportReport, IngestRequest, Pipeline,
    sanitize_title,
};
pub use url::canonicalize;
pub use warc::{Archiver, WarcArchiver};
