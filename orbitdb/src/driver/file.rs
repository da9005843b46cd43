// File-backed drivers: one record per file, one cache entry per directory

use super::{DriverKind, StorageDriver, DEFAULT_CONTENT_COLUMN};
use crate::cache::{scan_directory, DirectoryCache};
use crate::error::{OrbitError, Result};
use crate::parser::{JsonParser, MarkdownParser, RecordParser};
use crate::record::{attach_metadata, unix_seconds, Record};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

pub type MarkdownDriver = FileDriver<MarkdownParser>;
pub type JsonDriver = FileDriver<JsonParser>;

/// Stores each record as a file in a content directory, using `P` for the
/// on-disk format.
pub struct FileDriver<P: RecordParser> {
    parser: P,
    content_column: String,
    cache: DirectoryCache,
}

impl FileDriver<MarkdownParser> {
    pub fn markdown() -> Self {
        FileDriver::new(MarkdownParser::new())
    }
}

impl FileDriver<JsonParser> {
    pub fn json() -> Self {
        FileDriver::new(JsonParser::new())
    }
}

impl<P: RecordParser> FileDriver<P> {
    pub fn new(parser: P) -> Self {
        FileDriver {
            parser,
            content_column: DEFAULT_CONTENT_COLUMN.to_string(),
            cache: DirectoryCache::new(),
        }
    }

    pub fn with_content_column(mut self, column: impl Into<String>) -> Self {
        self.content_column = column.into();
        self
    }

    fn invalidate_parent(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.cache.invalidate(parent);
        }
    }

    fn read_record(&self, path: &Path, modified: SystemTime) -> Result<Record> {
        let mut record = self.parse_file(path)?;
        attach_metadata(&mut record, path, unix_seconds(modified));
        Ok(record)
    }
}

impl<P: RecordParser> StorageDriver for FileDriver<P> {
    fn kind(&self) -> DriverKind {
        match self.parser.extension() {
            "json" => DriverKind::Json,
            _ => DriverKind::Markdown,
        }
    }

    fn extension(&self) -> &str {
        self.parser.extension()
    }

    fn content_column(&self) -> &str {
        &self.content_column
    }

    fn parse_file(&self, path: &Path) -> Result<Record> {
        let text = std::fs::read_to_string(path)?;
        self.parser
            .parse(&text, &self.content_column)
            .map_err(|e| OrbitError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn dump_content(&self, record: &Record) -> Result<String> {
        self.parser.serialize(record, &self.content_column)
    }

    fn save(&mut self, record: &Record, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }

        let text = self.dump_content(record)?;
        let written = std::fs::write(path, text);
        // A failed write may still have truncated the file
        self.invalidate_parent(path);
        written?;

        log::debug!("Saved record {}", path.display());
        Ok(())
    }

    fn delete(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        std::fs::remove_file(path)?;
        self.invalidate_parent(path);

        log::debug!("Deleted record {}", path.display());
        Ok(())
    }

    fn load_all(&mut self, directory: &Path) -> Result<Arc<Vec<Record>>> {
        let scan = scan_directory(directory, self.parser.extension())?;

        if let Some(records) = self.cache.get_valid(directory, &scan) {
            log::debug!("Record cache hit for {}", directory.display());
            return Ok(records);
        }

        let mut records = Vec::with_capacity(scan.files.len());
        for file in &scan.files {
            match self.read_record(&file.path, file.modified) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("Skipping unreadable record {}: {}", file.path.display(), e);
                }
            }
        }

        log::debug!(
            "Loaded {} records from {}",
            records.len(),
            directory.display()
        );
        Ok(self.cache.store(directory, records, &scan))
    }

    fn should_restore_cache(&self, directory: &Path) -> Result<bool> {
        let scan = scan_directory(directory, self.parser.extension())?;
        Ok(self.cache.is_stale(directory, &scan))
    }

    fn clear_cache(&mut self, directory: Option<&Path>) {
        match directory {
            Some(dir) => self.cache.invalidate(dir),
            None => self.cache.clear(),
        }
    }
}

#[cfg(unix)]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{record_id, META_FILE_NAME, META_FILE_PATH, META_MODIFIED_AT};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn article(title: &str) -> Record {
        serde_json::from_value(json!({
            "title": title,
            "published": true,
            "content": format!("Body of {title}")
        }))
        .unwrap()
    }

    fn seed_articles(dir: &Path, count: usize) -> MarkdownDriver {
        let mut driver = MarkdownDriver::markdown();
        for i in 0..count {
            driver
                .save(&article(&format!("Post {i}")), &dir.join(format!("post-{i}.md")))
                .unwrap();
        }
        driver
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("articles");
        let mut driver = seed_articles(&dir, 2);

        let records = driver.load_all(&dir).unwrap();
        assert_eq!(records.len(), 2);

        let first = records
            .iter()
            .find(|r| record_id(r) == Some("post-0"))
            .unwrap();
        assert_eq!(first["title"], json!("Post 0"));
        assert_eq!(first["content"], json!("Body of Post 0"));
        assert_eq!(
            first[META_FILE_PATH],
            json!(dir.join("post-0.md").to_string_lossy())
        );
        assert!(first[META_MODIFIED_AT].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_repeated_load_is_a_cache_hit() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 3);

        let first = driver.load_all(tmp.path()).unwrap();
        let second = driver.load_all(tmp.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!driver.should_restore_cache(tmp.path()).unwrap());
    }

    #[test]
    fn test_save_invalidates_cache() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 3);

        let before = driver.load_all(tmp.path()).unwrap();
        assert_eq!(before.len(), 3);

        driver
            .save(&article("Fresh"), &tmp.path().join("fresh.md"))
            .unwrap();
        let after = driver.load_all(tmp.path()).unwrap();
        assert_eq!(after.len(), 4);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_external_write_is_detected() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 2);
        assert_eq!(driver.load_all(tmp.path()).unwrap().len(), 2);

        std::fs::write(tmp.path().join("external.md"), "---\ntitle: External\n---\nHi").unwrap();
        assert!(driver.should_restore_cache(tmp.path()).unwrap());
        assert_eq!(driver.load_all(tmp.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut driver = JsonDriver::json();
        for i in 0..3 {
            let record: Record = serde_json::from_value(json!({ "n": i })).unwrap();
            driver
                .save(&record, &tmp.path().join(format!("item-{i}.json")))
                .unwrap();
        }
        std::fs::write(tmp.path().join("broken.json"), "{ this is not json").unwrap();
        std::fs::write(tmp.path().join("binary.json"), [0xff, 0xfe, 0x00]).unwrap();

        let records = driver.load_all(tmp.path()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_delete_missing_file_succeeds() {
        let tmp = TempDir::new().unwrap();
        let mut driver = MarkdownDriver::markdown();
        assert!(driver.delete(&tmp.path().join("ghost.md")).is_ok());
    }

    #[test]
    fn test_delete_invalidates_cache() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 2);
        assert_eq!(driver.load_all(tmp.path()).unwrap().len(), 2);

        driver.delete(&tmp.path().join("post-1.md")).unwrap();
        assert!(!tmp.path().join("post-1.md").exists());

        let records = driver.load_all(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][META_FILE_NAME], json!("post-0"));
    }

    #[test]
    fn test_save_creates_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let mut driver = MarkdownDriver::markdown();
        let path: PathBuf = tmp.path().join("docs/guides/intro.md");

        driver.save(&article("Intro"), &path).unwrap();
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(tmp.path().join("docs")).unwrap().permissions().mode();
            assert_eq!(mode & 0o700, 0o700);
        }
    }

    #[test]
    fn test_save_failure_is_an_error_not_a_panic() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("blocker"), "file").unwrap();

        let mut driver = MarkdownDriver::markdown();
        let result = driver.save(&article("x"), &tmp.path().join("blocker/inner.md"));
        let err = result.unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_saved_metadata_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 1);

        let loaded = driver.load_all(tmp.path()).unwrap();
        let path = tmp.path().join("post-0.md");
        driver.save(&loaded[0], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("_file_path"));
        assert!(!text.contains("_modified_at"));
    }

    #[test]
    fn test_custom_content_column() {
        let tmp = TempDir::new().unwrap();
        let mut driver = MarkdownDriver::markdown().with_content_column("body");
        assert_eq!(driver.content_column(), "body");

        let record: Record =
            serde_json::from_value(json!({ "title": "T", "body": "Text" })).unwrap();
        driver.save(&record, &tmp.path().join("t.md")).unwrap();

        let text = std::fs::read_to_string(tmp.path().join("t.md")).unwrap();
        assert_eq!(text, "---\ntitle: T\n---\n\nText");
    }

    #[test]
    fn test_clear_cache() {
        let tmp = TempDir::new().unwrap();
        let mut driver = seed_articles(tmp.path(), 1);

        let first = driver.load_all(tmp.path()).unwrap();
        driver.clear_cache(None);
        assert!(driver.should_restore_cache(tmp.path()).unwrap());

        let second = driver.load_all(tmp.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_kind_and_extension() {
        assert_eq!(MarkdownDriver::markdown().kind(), DriverKind::Markdown);
        assert_eq!(MarkdownDriver::markdown().extension(), "md");
        assert_eq!(JsonDriver::json().kind(), DriverKind::Json);
        assert_eq!(JsonDriver::json().extension(), "json");
    }
}
