// Record model shared by every storage driver

use serde_json::{Map, Value};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One content item: an ordered mapping of field names to values.
pub type Record = Map<String, Value>;

/// Absolute path of the file (or pseudo-file for relational rows) a record came from.
pub const META_FILE_PATH: &str = "_file_path";
/// File name without extension. This is the record ID.
pub const META_FILE_NAME: &str = "_file_name";
/// Last modification time in unix seconds.
pub const META_MODIFIED_AT: &str = "_modified_at";

/// The reserved keys attached on load and stripped before write.
pub const METADATA_KEYS: [&str; 3] = [META_FILE_PATH, META_FILE_NAME, META_MODIFIED_AT];

/// Returns a copy of the record without the reserved metadata keys.
pub fn without_metadata(record: &Record) -> Record {
    record
        .iter()
        .filter(|(key, _)| !is_metadata_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn is_metadata_key(key: &str) -> bool {
    METADATA_KEYS.contains(&key)
}

/// Attach the three metadata keys describing where a record was loaded from.
pub fn attach_metadata(record: &mut Record, path: &Path, modified_at: i64) {
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    record.insert(
        META_FILE_PATH.to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    record.insert(META_FILE_NAME.to_string(), Value::String(id));
    record.insert(META_MODIFIED_AT.to_string(), Value::from(modified_at));
}

/// The record ID (file name without extension), if the record was loaded by a driver.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(META_FILE_NAME).and_then(Value::as_str)
}

/// Convert a `SystemTime` to unix seconds, clamping pre-epoch times to zero.
pub fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
