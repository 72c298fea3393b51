//! Recovery of JSON payloads from free-text model answers.

use serde_json::Value;
use tracing::debug;

use crate::error::StylistError;

/// Removes a leading ```` ```json ```` / ```` ``` ```` marker and a trailing
/// ```` ``` ````, then trims.
pub fn strip_code_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```JSON"))
    {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

fn slice_from(text: &str, start: usize, close: char) -> Option<&str> {
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// First `[` to last `]`.
fn array_slice(text: &str) -> Option<&str> {
    text.find('[').and_then(|start| slice_from(text, start, ']'))
}

/// Slices from the first opening bracket to the matching last closing one.
/// A top-level object (its `{` seen before any `[`) is sliced by braces so
/// arrays nested inside it are not mistaken for the payload.
pub fn slice_json_payload(text: &str) -> Option<&str> {
    let array_start = text.find('[');
    let object_start = text.find('{');
    match (array_start, object_start) {
        (Some(array), Some(object)) if object < array => {
            slice_from(text, object, '}').or_else(|| slice_from(text, array, ']'))
        }
        (Some(array), _) => slice_from(text, array, ']'),
        (None, Some(object)) => slice_from(text, object, '}'),
        (None, None) => None,
    }
}

/// Parses a model answer that should contain JSON, tolerating commentary and
/// code fences around it. A brace slice that does not parse is retried as
/// the array slice, then as the fence-stripped text.
pub fn extract_json(raw: &str) -> Result<Value, StylistError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StylistError::malformed(
            "Model returned an empty response",
            raw,
        ));
    }

    let primary = slice_json_payload(trimmed).unwrap_or_else(|| strip_code_fence(trimmed));
    let primary_err = match serde_json::from_str(primary) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let fallbacks = [array_slice(trimmed), Some(strip_code_fence(trimmed))];
    for candidate in fallbacks.into_iter().flatten() {
        if candidate == primary {
            continue;
        }
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => debug!("JSON fallback slice rejected: {err}"),
        }
    }

    Err(StylistError::malformed(
        format!("Failed to parse model JSON: {primary_err}"),
        primary,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OUTFITS: &str = r#"[{"outfit_name":"Năng động","item_ids":["a","b"],"description":"d","rationale":"r"}]"#;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn extraction_is_idempotent_over_wrapping() {
        let parsed: Value = serde_json::from_str(OUTFITS).unwrap();
        let wrapped = format!("Here you go:\n```json\n{OUTFITS}\n```\nEnjoy!");

        assert_eq!(extract_json(OUTFITS).unwrap(), parsed);
        assert_eq!(extract_json(&wrapped).unwrap(), parsed);
    }

    #[test]
    fn bracket_slice_returns_inner_array_verbatim() {
        let wrapped = format!("Here you go:\n```json\n{OUTFITS}\n```\nEnjoy!");
        assert_eq!(slice_json_payload(&wrapped), Some(OUTFITS));
    }

    #[test]
    fn top_level_object_is_not_sliced_to_nested_array() {
        let raw = r#"Sure! {"outfit_name":"x","item_ids":["1","2"]} Hope it helps"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value, json!({"outfit_name":"x","item_ids":["1","2"]}));
    }

    #[test]
    fn brace_in_commentary_before_array_is_recovered() {
        let raw = format!("Dưới đây là {{3}} bộ trang phục:\n```json\n{OUTFITS}\n```");
        let parsed: Value = serde_json::from_str(OUTFITS).unwrap();
        assert_eq!(extract_json(&raw).unwrap(), parsed);
    }

    #[test]
    fn falls_back_to_fence_stripping_without_brackets() {
        assert_eq!(extract_json("```json\n42\n```").unwrap(), json!(42));
    }

    #[test]
    fn empty_and_broken_answers_fail_with_snippet() {
        assert!(matches!(
            extract_json("   "),
            Err(StylistError::MalformedOutput { .. })
        ));

        let err = extract_json("Outfits: [{\"outfit_name\": }]").unwrap_err();
        let StylistError::MalformedOutput { snippet, .. } = err else {
            panic!("expected malformed output");
        };
        assert!(snippet.contains("outfit_name"));
    }
}
