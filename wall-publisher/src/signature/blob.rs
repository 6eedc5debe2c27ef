//! Parsing of raw signing-key payloads returned by bots.

use serde_json::Value;

use super::{ResourceType, SignatureError};
use super::url::normalize_token;

/// One token found in a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub resource_type: ResourceType,
    pub token: String,
    /// Unix seconds the bot says the key was minted at.
    pub created_at: Option<i64>,
    /// Lifetime in seconds, if reported.
    pub ttl: Option<i64>,
}

/// Parse a blob into tokens, keeping the newest one per resource type.
///
/// Accepted shapes: `[{type, rkey, created_at?, ttl?}]`, `{"data": [...]}` and
/// `{"private_rkey": "...", "group_rkey": "..."}` (also nested under `data`).
pub fn parse_blob(raw: &[u8]) -> Result<Vec<ParsedKey>, SignatureError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| SignatureError::Parse(e.to_string()))?;
    let mut keys = collect(&value)?;

    // Newest per type wins; ties keep the later entry.
    keys.sort_by_key(|k| (k.resource_type, k.created_at.unwrap_or(i64::MIN)));
    let mut newest: Vec<ParsedKey> = Vec::with_capacity(keys.len());
    for key in keys {
        match newest.last_mut() {
            Some(last) if last.resource_type == key.resource_type => *last = key,
            _ => newest.push(key),
        }
    }
    Ok(newest)
}

fn collect(value: &Value) -> Result<Vec<ParsedKey>, SignatureError> {
    match value {
        Value::Array(items) => Ok(items.iter().filter_map(parse_entry).collect()),
        Value::Object(map) => {
            if let Some(data) = map.get("data") {
                return collect(data);
            }
            let named = [
                ("private_rkey", ResourceType::PRIVATE),
                ("group_rkey", ResourceType::GROUP),
            ];
            let keys: Vec<ParsedKey> = named
                .iter()
                .filter_map(|(field, resource_type)| {
                    let token = normalize_token(map.get(*field)?.as_str()?);
                    (!token.is_empty()).then(|| ParsedKey {
                        resource_type: *resource_type,
                        token,
                        created_at: None,
                        ttl: None,
                    })
                })
                .collect();
            if keys.is_empty() && !named.iter().any(|(f, _)| map.contains_key(*f)) {
                return Err(SignatureError::Parse(
                    "object carries neither a key list nor named keys".to_string(),
                ));
            }
            Ok(keys)
        }
        other => Err(SignatureError::Parse(format!(
            "unexpected payload type: {}",
            json_kind(other)
        ))),
    }
}

fn parse_entry(entry: &Value) -> Option<ParsedKey> {
    let token = normalize_token(entry.get("rkey")?.as_str()?);
    if token.is_empty() {
        return None;
    }
    Some(ParsedKey {
        resource_type: ResourceType(i32::try_from(as_int(entry.get("type")?)?).ok()?),
        token,
        created_at: entry.get("created_at").and_then(as_int),
        ttl: entry.get("ttl").and_then(as_int),
    })
}

/// Bots disagree on whether numbers are sent as numbers or strings.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array() {
        let keys = parse_blob(
            br#"[{"type":10,"rkey":"&rkey=PRIV","created_at":1700000000,"ttl":3600},
                 {"type":"20","rkey":"GRP"}]"#,
        )
        .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].resource_type, ResourceType::PRIVATE);
        assert_eq!(keys[0].token, "PRIV");
        assert_eq!(keys[0].ttl, Some(3600));
        assert_eq!(keys[1].resource_type, ResourceType::GROUP);
        assert_eq!(keys[1].token, "GRP");
    }

    #[test]
    fn test_out_of_range_type_is_skipped() {
        // 4294967306 wraps to 10 when narrowed.
        let keys = parse_blob(
            br#"[{"type":4294967306,"rkey":"BOGUS"},{"type":20,"rkey":"GRP"}]"#,
        )
        .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].resource_type, ResourceType::GROUP);
    }

    #[test]
    fn test_parse_data_wrapper() {
        let keys = parse_blob(br#"{"data":[{"type":20,"rkey":"rkey=G"}]}"#).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].token, "G");
    }

    #[test]
    fn test_parse_named_fields() {
        let keys = parse_blob(br#"{"private_rkey":"&rkey=P","group_rkey":"G"}"#).unwrap();
        assert_eq!(
            keys.iter()
                .map(|k| (k.resource_type, k.token.as_str()))
                .collect::<Vec<_>>(),
            vec![(ResourceType::PRIVATE, "P"), (ResourceType::GROUP, "G")]
        );
    }

    #[test]
    fn test_newest_per_type_wins() {
        let keys = parse_blob(
            br#"[{"type":10,"rkey":"NEW","created_at":200},{"type":10,"rkey":"OLD","created_at":100}]"#,
        )
        .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].token, "NEW");
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let keys = parse_blob(br#"[{"type":30,"rkey":"X"}]"#).unwrap();
        assert_eq!(keys[0].resource_type, ResourceType(30));
    }

    #[test]
    fn test_malformed_blobs() {
        assert!(matches!(parse_blob(b"not json"), Err(SignatureError::Parse(_))));
        assert!(matches!(parse_blob(b"42"), Err(SignatureError::Parse(_))));
        assert!(matches!(
            parse_blob(br#"{"unrelated":1}"#),
            Err(SignatureError::Parse(_))
        ));
        assert!(parse_blob(b"[]").unwrap().is_empty());
    }
}
