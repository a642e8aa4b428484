//! Locating a JSON document inside free-form model output.
//!
//! Models wrap JSON in Markdown fences, prepend reasoning, or stop mid-object
//! when they hit the token limit. Extraction tries, in order:
//! 1. The whole trimmed text
//! 2. The first fenced code block (```json or bare ```)
//! 3. The largest balanced `{...}` span that parses, preferring later ones
//!
//! and otherwise reports truncation if an object was opened but never closed.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static CODE_FENCE: OnceLock<Regex> = OnceLock::new();

fn code_fence_regex() -> &'static Regex {
    CODE_FENCE.get_or_init(|| {
        Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n?([\s\S]*?)```")
            .expect("Invalid regex for code fences")
    })
}

/// Outcome of scanning a response for JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    /// A complete JSON document.
    Found(Value),
    /// An object or array was opened but the text ends before it closes.
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
        in_string: bool,
    },
    /// Nothing that parses as JSON.
    NotFound,
}

impl JsonExtraction {
    pub fn is_truncated(&self) -> bool {
        matches!(self, JsonExtraction::Truncated { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            JsonExtraction::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Nesting state at the end of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonStructureAnalysis {
    pub unclosed_braces: usize,
    pub unclosed_brackets: usize,
    pub in_string: bool,
    /// Byte offset of the first `{` or `[` outside a string.
    pub json_start: Option<usize>,
}

impl JsonStructureAnalysis {
    pub fn is_unbalanced(&self) -> bool {
        self.unclosed_braces > 0 || self.unclosed_brackets > 0 || self.in_string
    }
}

/// Tracks brace and bracket depth, ignoring delimiters inside strings.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut json_start = None;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' if json_start.is_some() => in_string = !in_string,
            '{' | '[' if !in_string => {
                json_start.get_or_insert(i);
                if c == '{' {
                    braces += 1;
                } else {
                    brackets += 1;
                }
            }
            '}' if !in_string => braces -= 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: braces.max(0) as usize,
        unclosed_brackets: brackets.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Byte index of the `}` closing the object that starts at `s[0]`.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Contents of the first fenced code block, if any.
pub fn extract_code_block(content: &str) -> Option<&str> {
    code_fence_regex()
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Largest balanced object that parses; later spans win ties.
pub fn extract_largest_object(content: &str) -> Option<Value> {
    let mut best: Option<(usize, Value)> = None;
    for (start, _) in content.match_indices('{') {
        let tail = &content[start..];
        let Some(end) = find_matching_brace(tail) else {
            continue;
        };
        let candidate = &tail[..=end];
        if best.as_ref().is_some_and(|(len, _)| candidate.len() < *len) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            best = Some((candidate.len(), value));
        }
    }
    best.map(|(_, value)| value)
}

/// Finds the JSON document in a model response.
pub fn extract_json(content: &str) -> JsonExtraction {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return JsonExtraction::NotFound;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return JsonExtraction::Found(value);
    }

    if let Some(block) = extract_code_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return JsonExtraction::Found(value);
        }
    }

    if let Some(value) = extract_largest_object(trimmed) {
        return JsonExtraction::Found(value);
    }

    let analysis = analyze_json_structure(trimmed);
    if analysis.json_start.is_some() && analysis.is_unbalanced() {
        return JsonExtraction::Truncated {
            unclosed_braces: analysis.unclosed_braces,
            unclosed_brackets: analysis.unclosed_brackets,
            in_string: analysis.in_string,
        };
    }

    JsonExtraction::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_object() {
        let result = extract_json(r#"  {"title": "x", "n": 2}  "#);
        assert_eq!(result, JsonExtraction::Found(json!({"title": "x", "n": 2})));
    }

    #[test]
    fn test_direct_non_object_is_returned_as_is() {
        assert_eq!(extract_json("[1, 2]"), JsonExtraction::Found(json!([1, 2])));
        assert_eq!(extract_json("42"), JsonExtraction::Found(json!(42)));
    }

    #[test]
    fn test_json_code_block() {
        let content = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks!";
        assert_eq!(extract_json(content), JsonExtraction::Found(json!({"a": 1})));
    }

    #[test]
    fn test_bare_code_block() {
        let content = "```\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_json(content), JsonExtraction::Found(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_embedded_object_after_reasoning() {
        let content = r#"Let me think. An example is {"x": 1}. Final answer:
{"title": "Real", "tags": ["a", "b"], "nested": {"k": "v"}}"#;
        let value = extract_json(content);
        assert_eq!(
            value.value().and_then(|v| v.get("title")),
            Some(&json!("Real"))
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let content = r#"prefix {"text": "a } tricky { string", "ok": true} suffix"#;
        let value = extract_json(content);
        assert_eq!(value.value().and_then(|v| v.get("ok")), Some(&json!(true)));
    }

    #[test]
    fn test_truncated_object() {
        let content = r#"{"title": "Cut", "body": "the text stops here"#;
        match extract_json(content) {
            JsonExtraction::Truncated {
                unclosed_braces,
                in_string,
                ..
            } => {
                assert_eq!(unclosed_braces, 1);
                assert!(in_string);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_array_inside_object() {
        let content = r#"{"items": ["a", "b""#;
        match extract_json(content) {
            JsonExtraction::Truncated {
                unclosed_braces,
                unclosed_brackets,
                in_string,
            } => {
                assert_eq!(unclosed_braces, 1);
                assert_eq!(unclosed_brackets, 1);
                assert!(!in_string);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_prose_not_found() {
        assert_eq!(extract_json("I cannot help with that."), JsonExtraction::NotFound);
        assert_eq!(extract_json("   "), JsonExtraction::NotFound);
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace(r#"{"a": {"b": 1}} tail"#), Some(14));
        assert_eq!(find_matching_brace(r#"{"a": "}"}"#), Some(9));
        assert_eq!(find_matching_brace(r#"{"a": 1"#), None);
    }

    #[test]
    fn test_analyze_structure_balanced() {
        let analysis = analyze_json_structure(r#"text {"a": [1, {"b": 2}]}"#);
        assert!(!analysis.is_unbalanced());
        assert_eq!(analysis.json_start, Some(5));
    }

    #[test]
    fn test_apostrophes_before_json_do_not_confuse_analysis() {
        let analysis = analyze_json_structure(r#"Here's the "plan": {"a": 1"#);
        assert_eq!(analysis.unclosed_braces, 1);
        assert!(!analysis.in_string);
    }
}
