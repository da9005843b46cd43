// Per-directory record cache, validated against file modification times

use crate::error::{OrbitError, Result};
use crate::record::Record;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A content file found by a directory scan.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// The result of listing one directory without parsing anything.
#[derive(Debug, Clone)]
pub struct DirectoryScan {
    pub files: Vec<ScannedFile>,
    /// When the listing started. A cache built from this scan is stamped with it.
    pub scanned_at: SystemTime,
    pub fingerprint: String,
}

impl DirectoryScan {
    pub fn newest_mtime(&self) -> Option<SystemTime> {
        self.files.iter().map(|f| f.modified).max()
    }
}

/// List the files directly inside `dir` with the given extension.
/// A missing directory yields an empty scan.
pub fn scan_directory(dir: &Path, extension: &str) -> Result<DirectoryScan> {
    let scanned_at = SystemTime::now();

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        extension
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| OrbitError::Other(format!("Glob error: {e}")))?;

    let mut files = Vec::new();
    for path in paths.filter_map(|r| r.ok()) {
        // Files can vanish between listing and stat
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        files.push(ScannedFile { path, modified });
    }

    let entries: Vec<(String, u64)> = files
        .iter()
        .map(|f| {
            let name = f
                .path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let nanos = f
                .modified
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;
            (name, nanos)
        })
        .collect();

    Ok(DirectoryScan {
        fingerprint: compute_directory_hash(&entries),
        files,
        scanned_at,
    })
}

/// Compute a directory hash from a list of (filename, mtime) pairs.
pub fn compute_directory_hash(entries: &[(String, u64)]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = DefaultHasher::new();
    for (name, mtime) in &sorted {
        name.hash(&mut hasher);
        mtime.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    records: Arc<Vec<Record>>,
    built_at: SystemTime,
    fingerprint: String,
}

/// Parsed records per directory.
///
/// An entry is served only while no matching file is newer than the entry
/// and the set of (name, mtime) pairs is unchanged. Writers must call
/// [`DirectoryCache::invalidate`] for the directory they touched.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the entry for `dir` must be rebuilt given a fresh scan.
    pub fn is_stale(&self, dir: &Path, scan: &DirectoryScan) -> bool {
        match self.entries.get(dir) {
            None => true,
            Some(entry) => {
                let newer = scan
                    .newest_mtime()
                    .is_some_and(|newest| newest > entry.built_at);
                newer || entry.fingerprint != scan.fingerprint
            }
        }
    }

    /// The cached records for `dir`, if still valid for `scan`.
    pub fn get_valid(&self, dir: &Path, scan: &DirectoryScan) -> Option<Arc<Vec<Record>>> {
        if self.is_stale(dir, scan) {
            return None;
        }
        self.entries.get(dir).map(|entry| Arc::clone(&entry.records))
    }

    /// Store records built from `scan` and return the shared handle.
    pub fn store(
        &mut self,
        dir: &Path,
        records: Vec<Record>,
        scan: &DirectoryScan,
    ) -> Arc<Vec<Record>> {
        let records = Arc::new(records);
        self.entries.insert(
            dir.to_path_buf(),
            CacheEntry {
                records: Arc::clone(&records),
                built_at: scan.scanned_at,
                fingerprint: scan.fingerprint.clone(),
            },
        );
        records
    }

    pub fn invalidate(&mut self, dir: &Path) {
        if self.entries.remove(dir).is_some() {
            log::debug!("Invalidated record cache for {}", dir.display());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.entries.contains_key(dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
