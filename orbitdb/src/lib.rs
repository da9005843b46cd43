pub mod cache;
pub mod config;
pub mod database;
pub mod driver;
pub mod error;
pub mod parser;
pub mod paths;
pub mod record;
pub mod storage;
pub mod watcher;

pub use config::{DriverConfig, ModelConfig, StorageConfig};
pub use database::{DatabaseConfig, DatabaseHealth, DatabaseManager, SharedConnection};
pub use driver::{DriverKind, FileDriver, JsonDriver, MarkdownDriver, SqliteDriver, StorageDriver};
pub use error::{OrbitError, Result};
pub use parser::{JsonParser, MarkdownParser, RecordParser};
pub use record::Record;
pub use storage::FileStorageService;
