use serde::{Deserialize, Deserializer};

use crate::server::response::ApiError;

/// Accepts `true`/`false` as well as `1`/`0` for flag fields.
pub fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "expected a boolean or 0/1, got {other}"
        ))),
    }
}

/// `Option` flavour of [`bool_or_int`].
pub fn opt_bool_or_int<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "bool_or_int")] bool);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(b)| b))
}

/// Splits a comma separated query value, dropping blanks.
#[must_use]
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Rejects empty id lists and non-positive ids.
pub fn validate_ids(field: &str, ids: &[i64]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Err(ApiError::invalid(field, format!("{field} must not be empty")));
    }
    if ids.iter().any(|id| *id <= 0) {
        return Err(ApiError::invalid(field, format!("{field} must be positive")));
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.trim().is_empty() {
        return Err(ApiError::invalid("url", "URL must not be empty"));
    }
    Ok(())
}
