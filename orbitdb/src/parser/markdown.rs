// Markdown files with a restricted YAML front-matter header

use super::RecordParser;
use crate::error::{OrbitError, Result};
use crate::record::{without_metadata, Record};
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

/// Parser for `---` delimited front matter followed by a Markdown body.
///
/// The header is a flat `key: value` list. Values are coerced with a fixed,
/// deliberately small rule set that existing content files rely on:
///
/// | raw value                        | result                     |
/// |----------------------------------|----------------------------|
/// | `"text"` / `'text'`              | string without quotes      |
/// | `true` `yes` `on` (any case)     | `true`                     |
/// | `false` `no` `off` (any case)    | `false`                    |
/// | `null` `~` or nothing            | `null`                     |
/// | `12`, `-3`, `1.5`                | integer, float if it has `.` |
/// | `[a, b]`                         | array of trimmed strings   |
/// | anything else                    | string as written          |
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        MarkdownParser
    }
}

impl RecordParser for MarkdownParser {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn parse(&self, text: &str, content_column: &str) -> Result<Record> {
        let (mut record, body) = match split_front_matter(text) {
            Some((header, body)) => (parse_header(header), body),
            None => (Record::new(), text),
        };

        record.insert(
            content_column.to_string(),
            Value::String(body.trim().to_string()),
        );
        Ok(record)
    }

    fn serialize(&self, record: &Record, content_column: &str) -> Result<String> {
        let mut header = without_metadata(record);
        let body = header
            .shift_remove(content_column)
            .map(body_text)
            .unwrap_or_default();

        if header.is_empty() {
            return Ok(body);
        }

        let mut out = String::from("---\n");
        for (key, value) in &header {
            if key.trim().is_empty()
                || key != key.trim()
                || key.contains(':')
                || key.contains('\n')
                || key.starts_with('#')
            {
                return Err(OrbitError::Other(format!(
                    "Front-matter key cannot be represented: {key:?}"
                )));
            }
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&format_value(value)?);
            out.push('\n');
        }
        out.push_str("---\n\n");
        out.push_str(&body);
        Ok(out)
    }
}

fn delimiter() -> &'static Regex {
    static DELIMITER: OnceLock<Regex> = OnceLock::new();
    DELIMITER.get_or_init(|| Regex::new(r"(?m)^---[ \t]*\r?$").expect("valid regex"))
}

fn numeric() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid regex")
    })
}

/// Split a document into (header, body).
///
/// Returns `None` unless the text opens with a delimiter line and a closing
/// delimiter follows, in which case the caller treats the whole text as body.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with("---") {
        return None;
    }

    let parts: Vec<&str> = delimiter().splitn(text, 3).collect();
    if parts.len() < 3 || !parts[0].is_empty() {
        return None;
    }

    Some((parts[1], parts[2]))
}

/// Parse the restricted YAML header: one `key: value` per line.
pub fn parse_header(header: &str) -> Record {
    let mut record = Record::new();

    for line in header.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        record.insert(key.to_string(), coerce_value(raw.trim()));
    }

    record
}

/// Apply the header coercion rules to a single raw (already trimmed) value.
pub fn coerce_value(raw: &str) -> Value {
    if is_quoted(raw) {
        return Value::String(unquote(raw));
    }

    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        "null" | "~" | "" => return Value::Null,
        _ => {}
    }

    if let Some(number) = parse_number(raw) {
        return number;
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                if is_quoted(item) {
                    Value::String(unquote(item))
                } else {
                    Value::String(item.to_string())
                }
            })
            .collect();
        return Value::Array(items);
    }

    Value::String(raw.to_string())
}

fn is_quoted(raw: &str) -> bool {
    raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
}

/// Decode a quoted scalar with the YAML library so escapes behave as YAML
/// defines them, falling back to stripping the quotes.
fn unquote(raw: &str) -> String {
    serde_yaml::from_str::<String>(raw).unwrap_or_else(|_| raw[1..raw.len() - 1].to_string())
}

fn parse_number(raw: &str) -> Option<Value> {
    if !numeric().is_match(raw) {
        return None;
    }

    if raw.contains('.') {
        return raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number);
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }

    // Exponent notation or out-of-range integers
    let f = raw.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number)
    }
}

fn body_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => format_string(s)?,
        Value::Array(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) if !needs_array_quoting(s) => Ok(s.clone()),
                    Value::String(s) => quote(s),
                    other => Ok(other.to_string()),
                })
                .collect::<Result<_>>()?;
            format!("[{}]", rendered.join(", "))
        }
        // Nested mappings are outside the header grammar; keep them as JSON text
        Value::Object(_) => quote(&value.to_string())?,
    })
}

/// Floats always carry a `.` so they are read back as floats.
fn format_number(n: &Number) -> String {
    let text = n.to_string();
    if !n.is_f64() || text.contains('.') {
        return text;
    }

    match text.find(['e', 'E']) {
        Some(exp) => format!("{}.0{}", &text[..exp], &text[exp..]),
        None => format!("{text}.0"),
    }
}

fn format_string(s: &str) -> Result<String> {
    if needs_quoting(s) {
        quote(s)
    } else {
        Ok(s.to_string())
    }
}

/// JSON string literals are valid YAML double-quoted scalars.
fn quote(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?)
}

const SPECIAL_CHARS: &[char] = &[
    ':', '#', '[', ']', '{', '}', ',', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`', '\n',
    '\r', '\t',
];

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s != s.trim()
        || s.starts_with('-')
        || s.starts_with('?')
        || s.contains(SPECIAL_CHARS)
        || coerce_value(s) != Value::String(s.to_string())
}

fn needs_array_quoting(s: &str) -> bool {
    s.is_empty() || s != s.trim() || s.contains([',', '[', ']', '"', '\'', '\n', '\r'])
}
