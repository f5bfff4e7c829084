//! Best-effort JSON extraction from free-form classifier output.
//!
//! Model output is not guaranteed to be well-formed JSON — it may wrap the
//! object in prose, code fences, or commentary. The scanner locates the
//! first balanced `{...}` substring and attempts exactly one parse; anything
//! that fails is the caller's malformed-output case, never a crash.

use tracing::warn;

/// First balanced `{...}` substring of `text`, or `None`.
///
/// Tracks string literals and escapes so braces inside JSON strings don't
/// unbalance the scan. An object that never closes yields `None`.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a boolean `field` from the first JSON object in `text`.
///
/// `None` when no object is found, the object doesn't parse, or the field
/// is absent or non-boolean.
pub fn extract_decision(text: &str, field: &str) -> Option<bool> {
    let fragment = first_json_object(text)?;
    let value: serde_json::Value = match serde_json::from_str(fragment) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "extracted JSON fragment failed to parse");
            return None;
        }
    };
    value.get(field)?.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        assert_eq!(
            extract_decision(r#"{"should_reply": true}"#, "should_reply"),
            Some(true)
        );
    }

    #[test]
    fn object_wrapped_in_prose() {
        let text = "Sure! Here is my judgment:\n{\"should_reply\": false}\nLet me know.";
        assert_eq!(extract_decision(text, "should_reply"), Some(false));
    }

    #[test]
    fn object_inside_code_fence() {
        let text = "```json\n{\"should_reply\": true}\n```";
        assert_eq!(extract_decision(text, "should_reply"), Some(true));
    }

    #[test]
    fn nested_objects_stay_balanced() {
        let text = r#"{"meta": {"confidence": 0.9}, "should_reply": false}"#;
        assert_eq!(first_json_object(text), Some(text));
        assert_eq!(extract_decision(text, "should_reply"), Some(false));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"note": "weird { value }", "should_reply": true}"#;
        assert_eq!(extract_decision(text, "should_reply"), Some(true));
    }

    #[test]
    fn no_object_found() {
        assert_eq!(first_json_object("no json here"), None);
        assert_eq!(extract_decision("just words", "should_reply"), None);
    }

    #[test]
    fn unclosed_object_yields_none() {
        assert_eq!(first_json_object(r#"{"should_reply": tru"#), None);
    }

    #[test]
    fn malformed_fragment_yields_none() {
        assert_eq!(extract_decision("{not valid json}", "should_reply"), None);
    }

    #[test]
    fn missing_or_nonboolean_field_yields_none() {
        assert_eq!(extract_decision(r#"{"reply": true}"#, "should_reply"), None);
        assert_eq!(
            extract_decision(r#"{"should_reply": "yes"}"#, "should_reply"),
            None
        );
    }
}
