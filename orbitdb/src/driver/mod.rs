pub mod file;
pub mod sqlite;

pub use file::{FileDriver, JsonDriver, MarkdownDriver};
pub use sqlite::SqliteDriver;

use crate::error::Result;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Column that receives free-text bodies unless configured otherwise.
pub const DEFAULT_CONTENT_COLUMN: &str = "content";

/// The concrete backends a model can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Markdown,
    Json,
    Sqlite,
}

/// Uniform save/delete/load contract over file- and database-backed storage.
///
/// Write failures come back as `Err` for the caller to handle; they never
/// panic. `load_all` results are shared: two calls with no intervening
/// write return the same allocation.
pub trait StorageDriver {
    fn kind(&self) -> DriverKind;

    /// File extension of stored records, without the leading dot.
    fn extension(&self) -> &str;

    fn content_column(&self) -> &str;

    fn parse_file(&self, path: &Path) -> Result<Record>;

    fn dump_content(&self, record: &Record) -> Result<String>;

    fn save(&mut self, record: &Record, path: &Path) -> Result<()>;

    /// Deleting something that does not exist succeeds.
    fn delete(&mut self, path: &Path) -> Result<()>;

    fn load_all(&mut self, directory: &Path) -> Result<Arc<Vec<Record>>>;

    fn should_restore_cache(&self, directory: &Path) -> Result<bool>;

    /// Drop the cache for one directory, or everything with `None`.
    fn clear_cache(&mut self, directory: Option<&Path>);
}
