use url::Url;

use crate::error::{Error, Result};

/// Query keys dropped besides everything starting with `utm_`.
pub const TRACKING_KEYS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "igshid", "ref_src"];

fn is_tracking_key(key: &str) -> bool {
    key.to_ascii_lowercase().starts_with("utm_") || TRACKING_KEYS.contains(&key)
}

/// Canonical form of a bookmark URL: fragment removed, tracking parameters
/// dropped and the remaining query sorted by key.
pub fn canonicalize(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|e| Error::validation("url", format!("invalid URL: {e}")))?;

    if url.scheme().is_empty() || url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation("url", "URL must have a scheme and a host"));
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_key(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query = pairs
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    urlencoding::encode(key).into_owned()
                } else {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    Ok(url.to_string())
}

/// True for `http` and `https` URLs, the only schemes the fetcher accepts.
#[must_use]
pub fn is_fetchable(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_utm() {
        assert_eq!(
            canonicalize("https://example.com/a?utm_source=x#frag").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            canonicalize("https://example.com/a?UTM_Medium=y&b=2").unwrap(),
            "https://example.com/a?b=2"
        );
    }

    #[test]
    fn drops_known_trackers_and_sorts() {
        assert_eq!(
            canonicalize("https://example.com/?z=1&fbclid=abc&a=2&gclid=q").unwrap(),
            "https://example.com/?a=2&z=1"
        );
    }

    #[test]
    fn keeps_flag_parameters_without_equals() {
        assert_eq!(
            canonicalize("https://example.com/p?print&id=3").unwrap(),
            "https://example.com/p?id=3&print"
        );
    }

    #[test]
    fn rejects_missing_scheme_or_host() {
        assert!(canonicalize("example.com/a").is_err());
        assert!(canonicalize("").is_err());
        assert!(canonicalize("file:///etc/passwd").is_err());
    }

    #[test]
    fn canonical_form_is_stable() {
        let once = canonicalize("HTTPS://Example.COM/x?b=1&a=hello%20world#top").unwrap();
        assert_eq!(canonicalize(&once).unwrap(), once);
        assert!(once.starts_with("https://example.com/x?a="));
    }

    #[test]
    fn fetchable_schemes() {
        assert!(is_fetchable("http://a.example"));
        assert!(!is_fetchable("ftp://a.example"));
    }
}
