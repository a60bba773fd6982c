//! Extraction of JSON objects from model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Key used when a feature-based reply is not valid JSON.
pub const COMPLETE_RESPONSE_KEY: &str = "Complete Response";

/// First `{` through last `}`, across lines.
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid regex"));

/// Parse the outermost `{ ... }` span of `text` as a JSON object.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let span = JSON_OBJECT_RE.find(text)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Lenient parse used for generation. Never fails: text that does not
/// contain a JSON object is wrapped as `{"Complete Response": text}`.
#[must_use]
pub fn parse_structured_lenient(text: &str) -> Map<String, Value> {
    extract_json_object(text).unwrap_or_else(|| {
        let mut map = Map::new();
        map.insert(
            COMPLETE_RESPONSE_KEY.to_string(),
            Value::String(text.to_string()),
        );
        map
    })
}

/// Strict parse used for regeneration: the reply must be a JSON object
/// containing `feature_name`. Returns that key's value.
#[must_use]
pub fn parse_feature_strict(text: &str, feature_name: &str) -> Option<Value> {
    extract_json_object(text)?.remove(feature_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let map = extract_json_object(r#"{"Headline": "Hi", "Body": "There"}"#).expect("object");
        assert_eq!(map["Headline"], "Hi");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_extract_from_fenced_reply() {
        let text = "Here you go:\n```json\n{\n  \"Headline\": \"Hi\"\n}\n```\nEnjoy!";
        let map = extract_json_object(text).expect("object");
        assert_eq!(map["Headline"], "Hi");
    }

    #[test]
    fn test_extract_nested_object() {
        let text = r#"{"Plan": {"step": 1}, "Note": "x"}"#;
        let map = extract_json_object(text).expect("object");
        assert_eq!(map["Plan"]["step"], 1);
    }

    #[test]
    fn test_lenient_falls_back_to_complete_response() {
        let map = parse_structured_lenient("Just some prose, no JSON.");
        assert_eq!(map.len(), 1);
        assert_eq!(map[COMPLETE_RESPONSE_KEY], "Just some prose, no JSON.");
    }

    #[test]
    fn test_lenient_falls_back_on_broken_json() {
        let text = r#"{"Headline": "unterminated}"#;
        let map = parse_structured_lenient(text);
        assert_eq!(map[COMPLETE_RESPONSE_KEY], text);
    }

    #[test]
    fn test_strict_requires_feature_key() {
        assert_eq!(
            parse_feature_strict(r#"{"Headline": "New"}"#, "Headline"),
            Some(Value::String("New".to_string()))
        );
        assert_eq!(parse_feature_strict(r#"{"Body": "New"}"#, "Headline"), None);
        assert_eq!(parse_feature_strict("no json here", "Headline"), None);
    }

    #[test]
    fn test_json_array_is_not_an_object() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
