// Relational driver: the file driver contract on top of one SQLite table

use super::{DriverKind, StorageDriver, DEFAULT_CONTENT_COLUMN};
use crate::database::{self, now_timestamp, SharedConnection, TIMESTAMP_FORMAT};
use crate::error::{OrbitError, Result};
use crate::paths::{record_path, validate_component, validate_sql_identifier};
use crate::record::{attach_metadata, without_metadata, Record};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Columns the driver manages itself.
const IDENTITY_COLUMN: &str = "id";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

struct TableCache {
    records: Arc<Vec<Record>>,
    data_version: i64,
}

/// Stores each record as a row of `table`, keyed by an integer `id`.
///
/// Path arguments are hints: the file stem of a path is the row ID, and
/// loaded rows get a `<directory>/<id>.sqlite` pseudo-path so callers can
/// treat them like file records.
pub struct SqliteDriver {
    conn: SharedConnection,
    table: String,
    content_column: String,
    cache: Option<TableCache>,
}

impl SqliteDriver {
    pub fn new(conn: SharedConnection, table: &str) -> Result<Self> {
        Self::with_content_column(conn, table, DEFAULT_CONTENT_COLUMN)
    }

    pub fn with_content_column(
        conn: SharedConnection,
        table: &str,
        content_column: &str,
    ) -> Result<Self> {
        validate_sql_identifier(table)?;
        validate_sql_identifier(content_column)?;

        let driver = SqliteDriver {
            conn,
            table: table.to_string(),
            content_column: content_column.to_string(),
            cache: None,
        };
        driver.ensure_table_exists()?;
        Ok(driver)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the backing table if it is missing.
    pub fn ensure_table_exists(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {content} TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            table = self.table,
            content = self.content_column,
        ))?;
        Ok(())
    }

    /// Add a column unless it already exists. Returns whether it was added.
    pub fn add_column(&mut self, name: &str, decl: &str) -> Result<bool> {
        let added = database::add_column(&self.conn, &self.table, name, decl)?;
        if added {
            self.cache = None;
        }
        Ok(added)
    }

    /// A single row without metadata, or `None` when absent.
    pub fn find(&self, id: i64) -> Result<Option<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} WHERE id = ?1", self.table))?;
        let columns = column_names(&stmt);
        let record = stmt
            .query_row(params![id], |row| row_to_record(row, &columns))
            .optional()?;
        Ok(record)
    }

    fn row_exists(&self, id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", self.table),
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Changes whenever another connection commits to the database file.
    fn data_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn ensure_columns(&mut self, data: &Record) -> Result<()> {
        let existing = database::table_columns(&self.conn, &self.table)?;
        for (column, value) in data {
            if !existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                self.add_column(column, column_type_for(value))?;
            }
        }
        Ok(())
    }

    fn insert(&self, id: Option<i64>, data: &Record) -> Result<i64> {
        let now = now_timestamp();
        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(id) = id {
            columns.push(IDENTITY_COLUMN);
            values.push(SqlValue::Integer(id));
        }
        for (column, value) in data {
            columns.push(column);
            values.push(to_sql_value(value));
        }
        columns.push(CREATED_AT);
        values.push(SqlValue::Text(now.clone()));
        columns.push(UPDATED_AT);
        values.push(SqlValue::Text(now));

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, id: i64, data: &Record) -> Result<()> {
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        for (column, value) in data {
            values.push(to_sql_value(value));
            assignments.push(format!("{column} = ?{}", values.len()));
        }
        values.push(SqlValue::Text(now_timestamp()));
        assignments.push(format!("{UPDATED_AT} = ?{}", values.len()));
        values.push(SqlValue::Integer(id));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.table,
            assignments.join(", "),
            values.len()
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

impl StorageDriver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn extension(&self) -> &str {
        "sqlite"
    }

    fn content_column(&self) -> &str {
        &self.content_column
    }

    /// Rows are not files.
    fn parse_file(&self, _path: &Path) -> Result<Record> {
        Ok(Record::new())
    }

    fn dump_content(&self, _record: &Record) -> Result<String> {
        Ok(String::new())
    }

    /// Update the row named by `record["id"]` (or the path's stem) if it
    /// exists, otherwise insert it. An explicit ID is kept on insert.
    fn save(&mut self, record: &Record, path: &Path) -> Result<()> {
        let mut data = without_metadata(record);

        // SQLite column names are case-insensitive; `ID` is the identity too
        let id_key = if data.contains_key(IDENTITY_COLUMN) {
            Some(IDENTITY_COLUMN.to_string())
        } else {
            data.keys()
                .find(|key| key.eq_ignore_ascii_case(IDENTITY_COLUMN))
                .cloned()
        };
        let id = match id_key.and_then(|key| data.shift_remove(&key)) {
            Some(value) if !value.is_null() => Some(id_from_value(&value)?),
            _ => id_from_path(path)?,
        };
        data.retain(|column, _| !is_managed_column(column));

        for column in data.keys() {
            validate_sql_identifier(column)?;
        }
        self.ensure_columns(&data)?;

        let result = match id {
            Some(id) if self.row_exists(id)? => self.update(id, &data).map(|_| id),
            _ => self.insert(id, &data),
        };
        self.cache = None;

        let id = result?;
        log::debug!("Saved row {}.{}", self.table, id);
        Ok(())
    }

    fn delete(&mut self, path: &Path) -> Result<()> {
        let Some(id) = id_from_path(path)? else {
            return Ok(());
        };

        let removed = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), params![id])?;
        self.cache = None;

        if removed > 0 {
            log::debug!("Deleted row {}.{}", self.table, id);
        }
        Ok(())
    }

    fn load_all(&mut self, directory: &Path) -> Result<Arc<Vec<Record>>> {
        let version = self.data_version()?;
        if let Some(cache) = &self.cache {
            if cache.data_version == version {
                log::debug!("Row cache hit for {}", self.table);
                return Ok(Arc::clone(&cache.records));
            }
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY id", self.table))?;
        let columns = column_names(&stmt);
        let rows = stmt.query_map([], |row| row_to_record(row, &columns))?;

        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            let id = record
                .get(IDENTITY_COLUMN)
                .and_then(Value::as_i64)
                .unwrap_or_default();
            let modified_at = record
                .get(UPDATED_AT)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .unwrap_or_default();
            let path = record_path(directory, &id.to_string(), self.extension())?;
            attach_metadata(&mut record, &path, modified_at);
            records.push(record);
        }
        drop(stmt);

        log::debug!("Loaded {} rows from {}", records.len(), self.table);
        let records = Arc::new(records);
        self.cache = Some(TableCache {
            records: Arc::clone(&records),
            data_version: version,
        });
        Ok(records)
    }

    fn should_restore_cache(&self, _directory: &Path) -> Result<bool> {
        match &self.cache {
            None => Ok(true),
            Some(cache) => Ok(cache.data_version != self.data_version()?),
        }
    }

    fn clear_cache(&mut self, _directory: Option<&Path>) {
        self.cache = None;
    }
}

fn is_managed_column(column: &str) -> bool {
    [IDENTITY_COLUMN, CREATED_AT, UPDATED_AT]
        .iter()
        .any(|managed| managed.eq_ignore_ascii_case(column))
}

/// The row ID named by a path hint's last component, if it is numeric.
fn id_from_path(path: &Path) -> Result<Option<i64>> {
    let Some(last) = path.components().last() else {
        return Ok(None);
    };

    let name = last.as_os_str().to_string_lossy();
    validate_component(&name)?;

    let stem = Path::new(name.as_ref())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(stem.parse::<i64>().ok())
}

fn id_from_value(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            validate_component(s)?;
            s.trim().parse::<i64>().ok()
        }
        _ => None,
    };

    parsed.ok_or_else(|| OrbitError::InvalidPath {
        input: value.to_string(),
        reason: "record id must be an integer".to_string(),
    })
}

fn parse_timestamp(text: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    (0..stmt.column_count())
        .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
        .collect()
}

fn row_to_record(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (i, name) in columns.iter().enumerate() {
        let value: SqlValue = row.get(i)?;
        let json_value = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(n) => Value::Number(n.into()),
            SqlValue::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into()),
        };
        record.insert(name.clone(), json_value);
    }
    Ok(record)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn column_type_for(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "INTEGER",
        Value::Number(n) if n.is_i64() => "INTEGER",
        Value::Number(_) => "REAL",
        _ => "TEXT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::record::{META_FILE_NAME, META_FILE_PATH, META_MODIFIED_AT};
    use pretty_assertions::assert_eq;
    use rusqlite::Connection;
    use serde_json::json;
    use std::path::PathBuf;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn memory_driver() -> SqliteDriver {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        SqliteDriver::new(conn, "articles").unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn dir() -> PathBuf {
        PathBuf::from("/content/articles")
    }

    #[test]
    fn test_table_created_on_construction() {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        SqliteDriver::new(Rc::clone(&conn), "articles").unwrap();
        // second construction is a no-op
        SqliteDriver::new(Rc::clone(&conn), "articles").unwrap();

        let columns = database::table_columns(&conn, "articles").unwrap();
        assert_eq!(columns, vec!["id", "content", "created_at", "updated_at"]);
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let conn = Rc::new(Connection::open_in_memory().unwrap());
        assert!(SqliteDriver::new(conn, "articles; DROP TABLE x").is_err());
    }

    #[test]
    fn test_upsert_by_explicit_id() {
        let mut driver = memory_driver();

        driver
            .save(&record(json!({ "id": 5, "title": "x" })), Path::new(""))
            .unwrap();
        let row = driver.find(5).unwrap().unwrap();
        assert_eq!(row["title"], json!("x"));
        assert_eq!(row["created_at"], row["updated_at"]);

        // Backdate so the update is observable without sleeping
        driver
            .conn
            .execute(
                "UPDATE articles SET created_at = '2000-01-01 00:00:00', updated_at = '2000-01-01 00:00:00' WHERE id = 5",
                [],
            )
            .unwrap();

        driver
            .save(&record(json!({ "id": 5, "title": "y" })), Path::new(""))
            .unwrap();
        let row = driver.find(5).unwrap().unwrap();
        assert_eq!(row["title"], json!("y"));
        assert_eq!(row["created_at"], json!("2000-01-01 00:00:00"));
        assert_ne!(row["updated_at"], json!("2000-01-01 00:00:00"));

        assert_eq!(driver.load_all(&dir()).unwrap().len(), 1);
    }

    #[test]
    fn test_managed_columns_ignore_case() {
        let mut driver = memory_driver();
        driver
            .save(&record(json!({ "id": 1, "title": "a" })), Path::new(""))
            .unwrap();
        driver
            .conn
            .execute(
                "UPDATE articles SET created_at = '2000-01-01 00:00:00' WHERE id = 1",
                [],
            )
            .unwrap();

        driver
            .save(
                &record(json!({
                    "id": 1,
                    "ID": 7,
                    "title": "b",
                    "CREATED_AT": "1999-01-01 00:00:00",
                    "Updated_At": "1999-01-01 00:00:00"
                })),
                Path::new(""),
            )
            .unwrap();

        assert!(driver.find(7).unwrap().is_none());
        let row = driver.find(1).unwrap().unwrap();
        assert_eq!(row["title"], json!("b"));
        assert_eq!(row["created_at"], json!("2000-01-01 00:00:00"));
        assert_ne!(row["updated_at"], json!("1999-01-01 00:00:00"));

        let columns = database::table_columns(&driver.conn, "articles").unwrap();
        assert_eq!(columns, vec!["id", "content", "created_at", "updated_at", "title"]);
    }

    #[test]
    fn test_uppercase_id_is_the_identity() {
        let mut driver = memory_driver();
        driver
            .save(&record(json!({ "ID": 4, "title": "a" })), Path::new(""))
            .unwrap();
        driver
            .save(&record(json!({ "Id": 4, "title": "b" })), Path::new(""))
            .unwrap();

        let rows = driver.load_all(&dir()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(4));
        assert_eq!(rows[0]["title"], json!("b"));
    }

    #[test]
    fn test_insert_without_id_autoincrements() {
        let mut driver = memory_driver();

        driver.save(&record(json!({ "title": "a" })), Path::new("")).unwrap();
        driver.save(&record(json!({ "title": "b" })), Path::new("")).unwrap();

        let rows = driver.load_all(&dir()).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_id_from_path_hint() {
        let mut driver = memory_driver();

        driver
            .save(&record(json!({ "title": "hinted" })), &dir().join("7.sqlite"))
            .unwrap();
        assert!(driver.find(7).unwrap().is_some());

        driver.delete(&dir().join("7.sqlite")).unwrap();
        assert!(driver.find(7).unwrap().is_none());
    }

    #[test]
    fn test_load_all_attaches_metadata() {
        let mut driver = memory_driver();
        driver
            .save(&record(json!({ "id": 3, "title": "t", "content": "body" })), Path::new(""))
            .unwrap();

        let rows = driver.load_all(&dir()).unwrap();
        let row = &rows[0];
        assert_eq!(row[META_FILE_NAME], json!("3"));
        assert_eq!(row[META_FILE_PATH], json!("/content/articles/3.sqlite"));
        assert!(row[META_MODIFIED_AT].as_i64().unwrap() > 0);
        assert_eq!(row["content"], json!("body"));
    }

    #[test]
    fn test_saving_loaded_record_round_trips() {
        let mut driver = memory_driver();
        driver
            .save(&record(json!({ "title": "first" })), Path::new(""))
            .unwrap();

        let mut loaded = driver.load_all(&dir()).unwrap()[0].clone();
        loaded.insert("title".into(), json!("renamed"));
        let path = PathBuf::from(loaded[META_FILE_PATH].as_str().unwrap());
        driver.save(&loaded, &path).unwrap();

        let rows = driver.load_all(&dir()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("renamed"));
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let mut driver = memory_driver();
        driver.save(&record(json!({ "title": "a" })), Path::new("")).unwrap();

        let first = driver.load_all(&dir()).unwrap();
        let second = driver.load_all(&dir()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!driver.should_restore_cache(&dir()).unwrap());

        driver.save(&record(json!({ "title": "b" })), Path::new("")).unwrap();
        assert!(driver.should_restore_cache(&dir()).unwrap());
        assert_eq!(driver.load_all(&dir()).unwrap().len(), 2);

        driver.clear_cache(None);
        assert!(driver.should_restore_cache(&dir()).unwrap());
    }

    #[test]
    fn test_foreign_writer_makes_cache_stale() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        let mut manager = DatabaseManager::initialize(&content).unwrap();
        let conn = manager.connection("app").unwrap();

        let mut driver = SqliteDriver::new(conn, "notes").unwrap();
        driver.save(&record(json!({ "title": "mine" })), Path::new("")).unwrap();
        assert_eq!(driver.load_all(&dir()).unwrap().len(), 1);

        // Simulates another process writing the same file
        let other = Connection::open(manager.database_path("app").unwrap()).unwrap();
        other
            .execute(
                "INSERT INTO notes (title, created_at, updated_at) VALUES ('theirs', '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
                [],
            )
            .unwrap();

        assert!(driver.should_restore_cache(&dir()).unwrap());
        assert_eq!(driver.load_all(&dir()).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_row_succeeds() {
        let mut driver = memory_driver();
        assert!(driver.delete(&dir().join("99.sqlite")).is_ok());
        assert!(driver.delete(&dir().join("not-a-number.sqlite")).is_ok());
    }

    #[test]
    fn test_unknown_columns_are_added() {
        let mut driver = memory_driver();
        driver
            .save(
                &record(json!({ "title": "t", "views": 10, "score": 1.5, "draft": true, "tags": ["a"] })),
                Path::new(""),
            )
            .unwrap();

        let row = driver.find(1).unwrap().unwrap();
        assert_eq!(row["views"], json!(10));
        assert_eq!(row["score"], json!(1.5));
        assert_eq!(row["draft"], json!(1));
        assert_eq!(row["tags"], json!("[\"a\"]"));
    }

    #[test]
    fn test_add_column_is_best_effort() {
        let mut driver = memory_driver();
        assert!(driver.add_column("subtitle", "TEXT").unwrap());
        assert!(!driver.add_column("subtitle", "TEXT").unwrap());
    }

    #[test]
    fn test_rejects_traversal_ids() {
        let mut driver = memory_driver();

        let err = driver
            .save(&record(json!({ "id": "../5", "title": "x" })), Path::new(""))
            .unwrap_err();
        assert!(matches!(err, OrbitError::InvalidPath { .. }));

        let err = driver
            .save(&record(json!({ "id": "~5" })), Path::new(""))
            .unwrap_err();
        assert!(matches!(err, OrbitError::InvalidPath { .. }));

        assert!(driver.delete(Path::new("/content/articles/..")).is_err());
    }

    #[test]
    fn test_rejects_bad_column_names() {
        let mut driver = memory_driver();
        let err = driver
            .save(&record(json!({ "title = 'x'; --": 1 })), Path::new(""))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_file_contract_methods_are_noops() {
        let driver = memory_driver();
        assert!(driver.parse_file(Path::new("/nope")).unwrap().is_empty());
        assert_eq!(driver.dump_content(&record(json!({ "a": 1 }))).unwrap(), "");
        assert_eq!(driver.kind(), DriverKind::Sqlite);
        assert_eq!(driver.extension(), "sqlite");
    }
}
