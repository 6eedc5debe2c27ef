//! Query helpers for signed CDN URLs.
//!
//! The raw query string is edited in place so that parameters other than the
//! one being replaced keep their exact original encoding.

use url::Url;
use url::form_urlencoded;

/// Query parameter carrying the signing token.
pub const RKEY_PARAM: &str = "rkey";

/// First value of `key` in the query, percent-decoded.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Copy of `url` with every `key=` pair set to `value`.
///
/// Returns `None` when the query has no such parameter.
pub fn replace_query_param(url: &Url, key: &str, value: &str) -> Option<Url> {
    let query = url.query()?;
    let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();

    let mut found = false;
    let rewritten = query
        .split('&')
        .map(|pair| {
            let name = pair.split_once('=').map_or(pair, |(name, _)| name);
            if name == key {
                found = true;
                format!("{key}={encoded}")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    if !found {
        return None;
    }
    let mut out = url.clone();
    out.set_query(Some(&rewritten));
    Some(out)
}

/// Strip the `&rkey=` / `rkey=` prefixes some bots include in the token.
pub fn normalize_token(raw: &str) -> String {
    let token = raw.trim();
    let token = token.strip_prefix('&').unwrap_or(token);
    token
        .strip_prefix("rkey=")
        .unwrap_or(token)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_other_params_verbatim() {
        let url = Url::parse(
            "https://multimedia.nt.qq.com.cn/download?appid=1407&fileid=Ab%2Bc_d&spec=0&rkey=OLD",
        )
        .unwrap();
        let replaced = replace_query_param(&url, RKEY_PARAM, "NEW").unwrap();
        assert_eq!(
            replaced.as_str(),
            "https://multimedia.nt.qq.com.cn/download?appid=1407&fileid=Ab%2Bc_d&spec=0&rkey=NEW"
        );
    }

    #[test]
    fn test_replace_without_param() {
        let url = Url::parse("https://example.com/a.png?x=1").unwrap();
        assert!(replace_query_param(&url, RKEY_PARAM, "NEW").is_none());
        let bare = Url::parse("https://example.com/a.png").unwrap();
        assert!(replace_query_param(&bare, RKEY_PARAM, "NEW").is_none());
    }

    #[test]
    fn test_query_param() {
        let url = Url::parse("https://example.com/d?appid=1406&rkey=abc").unwrap();
        assert_eq!(query_param(&url, "appid").as_deref(), Some("1406"));
        assert_eq!(query_param(&url, "rkey").as_deref(), Some("abc"));
        assert_eq!(query_param(&url, "missing"), None);
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("&rkey=CAQSKAB"), "CAQSKAB");
        assert_eq!(normalize_token("rkey=CAQSKAB"), "CAQSKAB");
        assert_eq!(normalize_token("  CAQSKAB "), "CAQSKAB");
    }
}
