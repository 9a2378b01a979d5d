//! Common utilities shared across adapters.
//!
//! Result construction and the output normalizers most scanners need:
//! ANSI stripping, JSON-lines parsing with a raw fallback, severity tallies
//! and length limits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domains::tools::ToolError;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;]*[mGK]").expect("valid regex"));

/// Create an error result with a formatted message.
pub fn error_result(message: &str) -> CallToolResult {
    warn!("{}", message);
    CallToolResult::error(vec![Content::text(message.to_string())])
}

/// Create a success result with text content.
pub fn success_result(content: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(content)])
}

/// Pretty-printed JSON.
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Remove terminal color and cursor escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Trimmed, non-empty lines.
pub fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parse newline-delimited JSON. Lines that are not JSON are kept through
/// `fallback` instead of being dropped.
pub fn parse_json_lines<F>(text: &str, fallback: F) -> Vec<Value>
where
    F: Fn(&str) -> Value,
{
    non_empty_lines(text)
        .into_iter()
        .map(|line| serde_json::from_str(line).unwrap_or_else(|_| fallback(line)))
        .collect()
}

/// Wrap a non-JSON line as `{ key: line }`.
pub fn raw_line(key: &'static str) -> impl Fn(&str) -> Value {
    move |line| {
        let mut obj = Map::new();
        obj.insert(key.to_string(), Value::String(line.to_string()));
        Value::Object(obj)
    }
}

/// Tally occurrences of each label; missing labels count as "UNKNOWN".
pub fn count_by<'a, I>(labels: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts
            .entry(label.unwrap_or("UNKNOWN").to_string())
            .or_insert(0) += 1;
    }
    counts
}

/// At most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// String at a JSON pointer, or `default` when absent or not a string.
pub fn str_at<'a>(value: &'a Value, pointer: &str, default: &'a str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or(default)
}

/// Value at a JSON pointer, `null` when absent.
pub fn value_at(value: &Value, pointer: &str) -> Value {
    value.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// A scalar at a JSON pointer as display text: strings unquoted, `default`
/// when absent or null.
pub fn scalar_at(value: &Value, pointer: &str, default: &str) -> String {
    match value.pointer(pointer) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Array at a JSON pointer, empty when absent.
pub fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Reject anything that is not an absolute http(s) URL.
pub fn require_http_url(field: &str, value: &str) -> Result<reqwest::Url, ToolError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| ToolError::invalid_arguments(format!("{field} must be a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::invalid_arguments(format!(
            "{field} must use http or https, got {other}"
        ))),
    }
}

#[cfg(test)]
pub(crate) fn result_text(result: &CallToolResult) -> &str {
    match &result.content[0].raw {
        rmcp::model::RawContent::Text(text) => &text.text,
        _ => panic!("Expected text content"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1B[31mRED\x1B[0m"), "RED");
        assert_eq!(
            strip_ansi("\x1B[1;32m[+]\x1B[0m URL: http://wp.test/\x1B[K"),
            "[+] URL: http://wp.test/"
        );
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_parse_json_lines_falls_back() {
        let text = "{\"host\":\"a.example.com\"}\n\nnot json\n";
        let parsed = parse_json_lines(text, raw_line("raw"));
        assert_eq!(parsed, vec![json!({"host": "a.example.com"}), json!({"raw": "not json"})]);
    }

    #[test]
    fn test_count_by() {
        let counts = count_by([Some("HIGH"), Some("LOW"), Some("HIGH"), None]);
        assert_eq!(counts.get("HIGH"), Some(&2));
        assert_eq!(counts.get("LOW"), Some(&1));
        assert_eq!(counts.get("UNKNOWN"), Some(&1));
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 200), "short");
    }

    #[test]
    fn test_pointer_helpers() {
        let v = json!({"Location": {"start": {"line": 12}}, "Tags": ["a"], "Rule": "aws-key"});
        assert_eq!(str_at(&v, "/Rule", "?"), "aws-key");
        assert_eq!(str_at(&v, "/Missing", "?"), "?");
        assert_eq!(value_at(&v, "/Location/start/line"), json!(12));
        assert_eq!(scalar_at(&v, "/Location/start/line", "?"), "12");
        assert_eq!(scalar_at(&v, "/Rule", "?"), "aws-key");
        assert_eq!(scalar_at(&v, "/Missing", "n/a"), "n/a");
        assert_eq!(array_at(&v, "/Tags").len(), 1);
        assert!(array_at(&v, "/Nope").is_empty());
    }

    #[test]
    fn test_require_http_url() {
        assert!(require_http_url("url", "https://wp.example.com/").is_ok());
        assert!(matches!(
            require_http_url("url", "wp.example.com"),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            require_http_url("url", "file:///etc/passwd"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_result_helpers() {
        let ok = success_result("done".into());
        assert_eq!(result_text(&ok), "done");
        assert!(!ok.is_error.unwrap_or(false));

        let err = error_result("boom");
        assert!(err.is_error.unwrap_or(false));
    }
}
