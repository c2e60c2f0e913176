mod account;
mod bookmark;
mod tag;

pub use account::{Account, AccountConfig, AccountUpdate, ListAccountsOptions, NewAccount};
pub use bookmark::{Bookmark, BookmarkOrder, DeleteBookmarks, GetBookmarksOptions};
pub use tag::{ListTagsOptions, Tag, TagOrder, normalize_tag_name};

/// `strftime` layout used for every timestamp column, always in UTC.
pub const DATABASE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
