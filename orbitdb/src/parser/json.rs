use super::RecordParser;
use crate::error::Result;
use crate::record::{without_metadata, Record};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

/// One JSON object per file. No schema validation happens here.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        JsonParser
    }
}

impl RecordParser for JsonParser {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str, _content_column: &str) -> Result<Record> {
        let value: Value = serde_json::from_str(text)?;
        Ok(match value {
            Value::Object(map) => map,
            _ => Record::new(),
        })
    }

    fn serialize(&self, record: &Record, _content_column: &str) -> Result<String> {
        let clean = without_metadata(record);

        // serde_json leaves non-ASCII characters and '/' unescaped
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        clean.serialize(&mut ser)?;
        buf.push(b'\n');

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
