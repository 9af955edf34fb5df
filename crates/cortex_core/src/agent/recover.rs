//! JSON recovery for model output.
//!
//! Models wrap their JSON in prose, code fences or trailing chatter. Recovery
//! takes the first complete JSON value starting at the first `{` and ignores
//! whatever follows it. Only objects are accepted.

use serde_json::{Deserializer, Value};

use crate::error::{CortexError, Result};

/// Parse the first JSON value at the start of `text`, ignoring trailing text.
fn parse_leading(text: &str) -> Option<Value> {
    Deserializer::from_str(text).into_iter::<Value>().next()?.ok()
}

fn require_object(value: Value) -> Result<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(CortexError::Parse(format!(
            "expected a JSON object, got {}",
            preview(&value.to_string())
        )))
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Agent-tier recovery: parse from the first `{`, or the whole text if the
/// text has no brace at all.
pub fn from_first_brace(text: &str) -> Result<Value> {
    let start = text.find('{').unwrap_or(0);
    let candidate = &text[start..];
    match parse_leading(candidate.trim_start()) {
        Some(value) => require_object(value),
        None => Err(CortexError::Parse(format!(
            "no JSON object in {:?}",
            preview(text)
        ))),
    }
}

/// Chat-tier recovery: strict parse of the whole text first, then the
/// first-brace fallback.
pub fn direct_then_first_brace(text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) if value.is_object() => Ok(value),
        _ if text.contains('{') => from_first_brace(text),
        Ok(value) => require_object(value),
        Err(e) => Err(CortexError::Parse(format!(
            "{e} in {:?}",
            preview(text)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrapped_payload_is_recovered() {
        let value = from_first_brace(r#"blah blah {"user_text":"hi"} trailing"#).unwrap();
        assert_eq!(value, json!({"user_text": "hi"}));
    }

    #[test]
    fn test_code_fence_is_recovered() {
        let text = "```json\n{\"neural_inputs\": []}\n```";
        assert_eq!(from_first_brace(text).unwrap(), json!({"neural_inputs": []}));
        assert_eq!(
            direct_then_first_brace(text).unwrap(),
            json!({"neural_inputs": []})
        );
    }

    #[test]
    fn test_nested_braces_keep_first_complete_object() {
        let text = r#"Sure: {"a": {"b": 1}} and also {"c": 2}"#;
        assert_eq!(from_first_brace(text).unwrap(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_prose_is_a_parse_error() {
        assert!(matches!(
            from_first_brace("I cannot help with that."),
            Err(CortexError::Parse(_))
        ));
        assert!(matches!(
            direct_then_first_brace("I cannot help with that."),
            Err(CortexError::Parse(_))
        ));
    }

    #[test]
    fn test_truncated_object_is_a_parse_error() {
        assert!(from_first_brace(r#"{"user_text": "cut of"#).is_err());
    }

    #[test]
    fn test_non_object_values_are_rejected() {
        assert!(from_first_brace("42").is_err());
        assert!(direct_then_first_brace("[1, 2]").is_err());
    }

    #[test]
    fn test_direct_parse_of_clean_object() {
        assert_eq!(
            direct_then_first_brace("  {\"archive\": []}  ").unwrap(),
            json!({"archive": []})
        );
    }
}
