pub mod json;
pub mod markdown;

pub use json::JsonParser;
pub use markdown::MarkdownParser;

use crate::error::Result;
use crate::record::Record;

/// Converts the text of a single content file into a record and back.
pub trait RecordParser {
    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Parse file text into a record. `content_column` names the key that
    /// receives free-text bodies for formats that have one.
    fn parse(&self, text: &str, content_column: &str) -> Result<Record>;

    /// Render a record as file text. Metadata keys are never written.
    fn serialize(&self, record: &Record, content_column: &str) -> Result<String>;
}
