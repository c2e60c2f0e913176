use serde::{Deserialize, Serialize};

/// A login account. The password hash never leaves the store layer in
/// serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub owner: bool,
    pub config: AccountConfig,
}

/// UI preferences persisted as a JSON blob on the account row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccountConfig {
    pub show_id: bool,
    pub list_mode: bool,
    pub hide_thumbnail: bool,
    pub hide_excerpt: bool,
    pub theme: String,
    pub keep_metadata: bool,
    pub use_archive: bool,
    pub create_ebook: bool,
    pub make_public: bool,
}

impl AccountConfig {
    /// Parses the stored JSON, tolerating empty or legacy values.
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable account config: {e}");
            Self::default()
        })
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Input for account creation. `password` is plain text; the store hashes it.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub owner: bool,
    pub config: AccountConfig,
}

/// Partial account update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub username: Option<String>,
    /// Plain-text replacement password.
    pub password: Option<String>,
    pub owner: Option<bool>,
    pub config: Option<AccountConfig>,
}

impl AccountUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.owner.is_none()
            && self.config.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListAccountsOptions {
    /// Substring match on username.
    pub keyword: String,
    /// Exact username match.
    pub username: String,
    pub owner_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_uses_pascal_case_keys() {
        let config = AccountConfig {
            theme: "dark".into(),
            make_public: true,
            ..AccountConfig::default()
        };
        let json: serde_json::Value = serde_json::from_str(&config.to_json()).unwrap();
        assert_eq!(json["Theme"], "dark");
        assert_eq!(json["MakePublic"], true);
        assert_eq!(json["HideExcerpt"], false);
    }

    #[test]
    fn config_tolerates_partial_and_broken_json() {
        let config = AccountConfig::from_json(r#"{"ListMode":true,"Unknown":1}"#);
        assert!(config.list_mode);
        assert_eq!(config.theme, "");

        assert_eq!(AccountConfig::from_json(""), AccountConfig::default());
        assert_eq!(AccountConfig::from_json("not json"), AccountConfig::default());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let account = Account {
            id: 1,
            username: "shiori".into(),
            password_hash: "$2b$10$secret".into(),
            owner: true,
            config: AccountConfig::default(),
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"owner\":true"));
    }
}
