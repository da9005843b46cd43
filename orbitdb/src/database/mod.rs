pub mod schema;

use crate::error::{OrbitError, Result};
use crate::paths::{secure_join, validate_component, validate_sql_identifier, validate_sql_type};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A managed connection. Shared, single-threaded: `Rc` keeps it on the thread
/// that owns the manager.
pub type SharedConnection = Rc<Connection>;

/// Timestamp format used by every `created_at`/`updated_at` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pragmas applied to every connection the manager opens.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
    PRAGMA cache_size = 10000;
";

/// Current UTC time in the row timestamp format.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Registration of one logical database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub filename: String,
    #[serde(default)]
    pub description: String,
    /// table name -> what it holds. Documentation only.
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
}

impl DatabaseConfig {
    pub fn new(filename: impl Into<String>, description: impl Into<String>) -> Self {
        DatabaseConfig {
            filename: filename.into(),
            description: description.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>, purpose: impl Into<String>) -> Self {
        self.tables.insert(table.into(), purpose.into());
        self
    }
}

/// Diagnostic snapshot of one registered database.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub connectable: bool,
    pub sqlite_version: Option<String>,
    pub error: Option<String>,
}

/// Owns every SQLite connection, partitioned by purpose.
///
/// Each logical name maps to its own file under `base_dir`, so writers to
/// different concerns never contend for the same lock. Connections are
/// opened on first use and reused for the lifetime of the manager.
pub struct DatabaseManager {
    base_dir: PathBuf,
    registrations: BTreeMap<String, DatabaseConfig>,
    connections: HashMap<String, SharedConnection>,
}

impl DatabaseManager {
    /// Create an empty manager storing database files in `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        DatabaseManager {
            base_dir: base_dir.into(),
            registrations: BTreeMap::new(),
            connections: HashMap::new(),
        }
    }

    /// The `var/orbit` directory that sits next to a content directory.
    pub fn orbit_directory(content_dir: &Path) -> PathBuf {
        content_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("var")
            .join("orbit")
    }

    /// Create `<content_dir>/../var/orbit` and register the default databases.
    pub fn initialize(content_dir: &Path) -> Result<Self> {
        let base_dir = Self::orbit_directory(content_dir);
        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)?;
            log::debug!("Created database directory {}", base_dir.display());
        }

        let mut manager = DatabaseManager::new(base_dir);
        for (name, config) in schema::default_registrations() {
            manager.register_database(name, config)?;
        }
        Ok(manager)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    /// Register (or replace) a logical database.
    pub fn register_database(&mut self, name: &str, config: DatabaseConfig) -> Result<()> {
        validate_component(&config.filename)?;

        if let Some(previous) = self.registrations.get(name) {
            if previous.filename != config.filename && self.connections.remove(name).is_some() {
                log::debug!("Closed connection '{name}' after re-registration");
            }
        }

        self.registrations.insert(name.to_string(), config);
        Ok(())
    }

    pub fn databases(&self) -> &BTreeMap<String, DatabaseConfig> {
        &self.registrations
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Absolute path of a registered database file.
    pub fn database_path(&self, name: &str) -> Result<PathBuf> {
        let config = self
            .registrations
            .get(name)
            .ok_or_else(|| OrbitError::UnknownDatabase(name.to_string()))?;
        secure_join(&self.base_dir, &config.filename)
    }

    /// The connection for `name`, opened and tuned on first use.
    pub fn connection(&mut self, name: &str) -> Result<SharedConnection> {
        if let Some(conn) = self.connections.get(name) {
            return Ok(Rc::clone(conn));
        }

        let path = self.database_path(name)?;
        let conn = Rc::new(open_tuned(&path)?);
        log::debug!("Opened database '{}' at {}", name, path.display());

        self.connections.insert(name.to_string(), Rc::clone(&conn));
        Ok(conn)
    }

    /// Drop every cached connection. Handles still held elsewhere stay open
    /// until their last clone goes away.
    pub fn close_all(&mut self) {
        let count = self.connections.len();
        self.connections.clear();
        log::debug!("Closed {count} database connections");
    }

    /// Create the built-in tables for a logical database. Idempotent.
    pub fn create_tables(&mut self, name: &str) -> Result<()> {
        if !self.registrations.contains_key(name) {
            return Err(OrbitError::UnknownDatabase(name.to_string()));
        }

        let Some(ddl) = schema::schema_for(name) else {
            log::warn!("No built-in schema for database '{name}', nothing created");
            return Ok(());
        };

        let conn = self.connection(name)?;
        conn.execute_batch(ddl)?;
        log::debug!("Ensured tables for database '{name}'");
        Ok(())
    }

    /// Create tables for every registered database that has a built-in schema.
    pub fn create_all_tables(&mut self) -> Result<()> {
        let names: Vec<String> = self.registrations.keys().cloned().collect();
        for name in names {
            if schema::schema_for(&name).is_some() {
                self.create_tables(&name)?;
            }
        }
        Ok(())
    }

    /// Existence, size and connectability of every registered database.
    /// Files that do not exist are reported, never created.
    pub fn health_status(&mut self) -> BTreeMap<String, DatabaseHealth> {
        let names: Vec<String> = self.registrations.keys().cloned().collect();
        let mut report = BTreeMap::new();

        for name in names {
            let health = match self.database_path(&name) {
                Ok(path) => self.check_health(&name, path),
                Err(e) => DatabaseHealth {
                    path: PathBuf::new(),
                    exists: false,
                    size_bytes: 0,
                    connectable: false,
                    sqlite_version: None,
                    error: Some(e.to_string()),
                },
            };
            report.insert(name, health);
        }

        report
    }

    fn check_health(&mut self, name: &str, path: PathBuf) -> DatabaseHealth {
        let mut health = DatabaseHealth {
            exists: path.exists(),
            size_bytes: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
            path,
            connectable: false,
            sqlite_version: None,
            error: None,
        };

        if !health.exists {
            return health;
        }

        let version = self.connection(name).and_then(|conn| {
            conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
                .map_err(OrbitError::from)
        });

        match version {
            Ok(version) => {
                health.connectable = true;
                health.sqlite_version = Some(version);
            }
            Err(e) => health.error = Some(e.to_string()),
        }
        health
    }
}

fn open_tuned(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

/// Best-effort `ALTER TABLE ... ADD COLUMN`.
///
/// Returns `Ok(false)` when the column already exists.
pub fn add_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<bool> {
    validate_sql_identifier(table)?;
    validate_sql_identifier(column)?;
    validate_sql_type(decl)?;

    let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {decl}");
    match conn.execute_batch(&sql) {
        Ok(()) => {
            log::debug!("Added column {table}.{column} {decl}");
            Ok(true)
        }
        Err(e) if e.to_string().contains("duplicate column name") => {
            log::warn!("Column {table}.{column} already exists, skipping ADD COLUMN");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Column names of a table, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    validate_sql_identifier(table)?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}
