use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_count: Option<i64>,
    /// Set on a bookmark's tag list to request removal of that edge on save.
    #[serde(default, skip_serializing)]
    pub deleted: bool,
}

impl Tag {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Lowercases, collapses whitespace runs to a single space and trims.
#[must_use]
pub fn normalize_tag_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagOrder {
    #[default]
    None,
    Name,
}

#[derive(Debug, Clone, Default)]
pub struct ListTagsOptions {
    pub with_bookmark_count: bool,
    /// Only tags attached to this bookmark when non-zero.
    pub bookmark_id: i64,
    pub order_by: TagOrder,
    /// Case-insensitive substring filter on the tag name.
    pub search: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_and_collapses() {
        assert_eq!(normalize_tag_name("  Rust   Lang "), "rust lang");
        assert_eq!(normalize_tag_name("GO"), "go");
        assert_eq!(normalize_tag_name("a\t\nb"), "a b");
        assert_eq!(normalize_tag_name("   "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Hello  World", "x", " Mixed\tCase  Tag "] {
            let once = normalize_tag_name(raw);
            assert_eq!(normalize_tag_name(&once), once);
        }
    }
}
