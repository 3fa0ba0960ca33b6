//! JSON recovery from free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*(\{[\s\S]*?\})\s*```").unwrap());

/// First balanced `{…}` span starting at the first `{`.
///
/// Braces inside double-quoted strings do not count. A backslash escapes
/// the next character, so `\"` never toggles string state.
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Recover a JSON object from a model response.
///
/// A fenced ```` ```json ```` block wins when present; if it does not parse,
/// recovery stops there. Otherwise the first balanced object is parsed.
pub fn extract_json(response: &str) -> Option<Value> {
    if let Some(caps) = FENCED_JSON.captures(response) {
        let block = caps.get(1)?.as_str();
        return match serde_json::from_str(block) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "Fenced JSON block did not parse");
                None
            }
        };
    }

    let candidate = balanced_object(response)?;
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Raw JSON object did not parse");
            None
        }
    }
}

/// Drop a leading `<reasoning>…</reasoning>` preamble some models emit.
pub fn strip_reasoning(response: &str) -> &str {
    if !response.contains("<reasoning>") {
        return response;
    }
    match response.rsplit_once("</reasoning>") {
        Some((_, rest)) => rest.trim(),
        None => response,
    }
}

/// Replace typographic quotes and dashes with ASCII.
pub fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_block_is_preferred() {
        let response = "Here you go:\n```json\n{\"status\": \"PASS\", \"reasoning\": \"ok\"}\n```\n{\"ignored\": true}";
        assert_eq!(
            extract_json(response),
            Some(json!({"status": "PASS", "reasoning": "ok"}))
        );
    }

    #[test]
    fn broken_fenced_block_does_not_fall_back() {
        let response = "```json\n{\"status\": PASS}\n```\n{\"status\": \"FAIL\"}";
        assert_eq!(extract_json(response), None);
    }

    #[test]
    fn unfenced_object_with_braces_in_strings() {
        let response = r#"Verdict follows {"status": "FAIL", "reasoning": "missing } and { in note"} trailing {"x": 1}"#;
        assert_eq!(
            extract_json(response),
            Some(json!({"status": "FAIL", "reasoning": "missing } and { in note"}))
        );
    }

    #[test]
    fn escaped_quotes_do_not_toggle_strings() {
        let response = r#"{"reasoning": "he said \"}\" twice", "status": "SKIP"}"#;
        assert_eq!(
            extract_json(response),
            Some(json!({"reasoning": "he said \"}\" twice", "status": "SKIP"}))
        );
    }

    #[test]
    fn nested_objects() {
        let response = "prefix {\"fields\": {\"a\": {\"b\": 1}}} suffix";
        assert_eq!(
            balanced_object(response),
            Some("{\"fields\": {\"a\": {\"b\": 1}}}")
        );
    }

    #[test]
    fn no_object_or_unbalanced() {
        assert_eq!(extract_json("I cannot determine this."), None);
        assert_eq!(extract_json("{\"status\": \"PASS\""), None);
        assert_eq!(balanced_object("{ { }"), None);
    }

    #[test]
    fn reasoning_preamble_is_stripped() {
        assert_eq!(
            strip_reasoning("<reasoning>think {not json}</reasoning>\n{\"a\":1}"),
            "{\"a\":1}"
        );
        assert_eq!(strip_reasoning("plain"), "plain");
    }

    #[test]
    fn punctuation_normalized() {
        assert_eq!(
            normalize_punctuation("\u{201C}Plan\u{201D} isn\u{2019}t met \u{2014} see IRP"),
            "\"Plan\" isn't met - see IRP"
        );
    }
}
