use crate::config::{ModelConfig, StorageConfig};
use crate::database::DatabaseManager;
use crate::driver::{DriverKind, JsonDriver, MarkdownDriver, SqliteDriver, StorageDriver};
use crate::error::{OrbitError, Result};
use crate::paths::{record_path, secure_join, validate_component};
use crate::record::{record_id, Record};
use crate::watcher::FileWatcher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main entry point for content storage.
///
/// Owns every driver (built once from the config), the database manager and
/// the optional change watcher. Models are resolved to a driver and a
/// directory under the content root; records are then loaded, saved and
/// deleted through that driver.
pub struct FileStorageService {
    content_root: PathBuf,
    content_column: String,
    drivers: HashMap<String, Box<dyn StorageDriver>>,
    models: BTreeMap<String, ModelConfig>,
    databases: DatabaseManager,
    watcher: Option<FileWatcher>,
}

impl FileStorageService {
    /// Open the storage described by a YAML config file.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = StorageConfig::load(config_path)?;
        Self::from_config(config)
    }

    /// Storage rooted at `content_root` with only the markdown and json drivers.
    pub fn new(content_root: impl Into<PathBuf>) -> Result<Self> {
        Self::from_config(StorageConfig::for_root(content_root))
    }

    pub fn from_config(config: StorageConfig) -> Result<Self> {
        config.validate()?;

        let mut databases = DatabaseManager::initialize(&config.content_root)?;

        let mut drivers: HashMap<String, Box<dyn StorageDriver>> = HashMap::new();
        for (name, driver_config) in &config.drivers {
            let driver: Box<dyn StorageDriver> = match driver_config.kind {
                DriverKind::Markdown => Box::new(
                    MarkdownDriver::markdown().with_content_column(&config.content_column),
                ),
                DriverKind::Json => {
                    Box::new(JsonDriver::json().with_content_column(&config.content_column))
                }
                DriverKind::Sqlite => {
                    let table = driver_config.table.as_deref().ok_or_else(|| {
                        OrbitError::Config(format!("Driver '{name}' uses sqlite but has no table"))
                    })?;
                    let conn = databases.connection(driver_config.database_name())?;
                    Box::new(SqliteDriver::with_content_column(
                        conn,
                        table,
                        &config.content_column,
                    )?)
                }
            };
            log::debug!("Registered {:?} driver '{}'", driver_config.kind, name);
            drivers.insert(name.clone(), driver);
        }

        Ok(FileStorageService {
            content_root: config.content_root,
            content_column: config.content_column,
            drivers,
            models: config.models,
            databases,
            watcher: None,
        })
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn content_column(&self) -> &str {
        &self.content_column
    }

    /// Register a driver under `name`, replacing any driver already there.
    pub fn register_driver(&mut self, name: &str, driver: Box<dyn StorageDriver>) {
        if self.drivers.insert(name.to_string(), driver).is_some() {
            log::debug!("Replaced driver '{name}'");
        }
    }

    /// Map a model to a registered driver and an optional directory.
    pub fn register_model(&mut self, name: &str, model: ModelConfig) -> Result<()> {
        if !self.drivers.contains_key(&model.driver) {
            return Err(OrbitError::UnknownDriver(model.driver));
        }
        if let Some(dir) = &model.directory {
            validate_component(dir)?;
        }
        self.models.insert(name.to_string(), model);
        Ok(())
    }

    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn driver(&self, name: &str) -> Result<&dyn StorageDriver> {
        match self.drivers.get(name) {
            Some(driver) => Ok(driver.as_ref()),
            None => Err(OrbitError::UnknownDriver(name.to_string())),
        }
    }

    pub fn driver_mut(&mut self, name: &str) -> Result<&mut dyn StorageDriver> {
        match self.drivers.get_mut(name) {
            Some(driver) => Ok(driver.as_mut()),
            None => Err(OrbitError::UnknownDriver(name.to_string())),
        }
    }

    /// The driver configured for `model`.
    pub fn driver_for(&mut self, model: &str) -> Result<&mut dyn StorageDriver> {
        let name = self
            .models
            .get(model)
            .map(|m| m.driver.clone())
            .ok_or_else(|| OrbitError::Config(format!("Model not configured: {model}")))?;
        self.driver_mut(&name)
    }

    /// Directory holding `model`'s records: the configured directory, or the
    /// slugified model name, under the content root.
    pub fn storage_directory(&self, model: &str) -> Result<PathBuf> {
        let dir = match self.models.get(model).and_then(|m| m.directory.clone()) {
            Some(dir) => dir,
            None => slug::slugify(model),
        };
        secure_join(&self.content_root, &dir)
    }

    /// Drop every driver's cache.
    pub fn clear_cache(&mut self) {
        for driver in self.drivers.values_mut() {
            driver.clear_cache(None);
        }
        log::debug!("Cleared all record caches");
    }

    /// All records of `model`, in storage order.
    pub fn load(&mut self, model: &str) -> Result<Arc<Vec<Record>>> {
        let dir = self.storage_directory(model)?;
        self.driver_for(model)?.load_all(&dir)
    }

    /// The record of `model` with the given ID, or `None` if there is none.
    pub fn find(&mut self, model: &str, id: &str) -> Result<Option<Record>> {
        validate_component(id)?;
        let records = self.load(model)?;
        Ok(records.iter().find(|r| record_id(r) == Some(id)).cloned())
    }

    pub fn save(&mut self, model: &str, id: &str, record: &Record) -> Result<()> {
        let dir = self.storage_directory(model)?;
        let driver = self.driver_for(model)?;
        let path = record_path(&dir, id, driver.extension())?;
        driver.save(record, &path)
    }

    /// Delete a record. Deleting a missing record succeeds.
    pub fn delete(&mut self, model: &str, id: &str) -> Result<()> {
        let dir = self.storage_directory(model)?;
        let driver = self.driver_for(model)?;
        let path = record_path(&dir, id, driver.extension())?;
        driver.delete(&path)
    }

    pub fn databases(&self) -> &DatabaseManager {
        &self.databases
    }

    pub fn databases_mut(&mut self) -> &mut DatabaseManager {
        &mut self.databases
    }

    /// Start watching the directories of every file-backed model.
    pub fn watch(&mut self) -> Result<()> {
        let mut dirs = BTreeSet::new();
        let mut extensions = BTreeSet::new();

        for (model, config) in &self.models {
            let Some(driver) = self.drivers.get(&config.driver) else {
                continue;
            };
            if driver.kind() == DriverKind::Sqlite {
                continue;
            }
            dirs.insert(self.storage_directory(model)?);
            extensions.insert(driver.extension().to_string());
        }

        let dirs: Vec<PathBuf> = dirs.into_iter().collect();
        let extensions: Vec<String> = extensions.into_iter().collect();
        let watcher = FileWatcher::start(&dirs, &extensions)
            .map_err(|e| OrbitError::Other(format!("File watcher error: {e}")))?;

        log::debug!("Watching {} model directories", dirs.len());
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Evict the directories the watcher reported since the last call.
    /// Returns how many directories were evicted.
    pub fn sync_changes(&mut self) -> usize {
        let Some(watcher) = &self.watcher else {
            return 0;
        };

        let changed = watcher.changed_directories();
        for dir in &changed {
            for driver in self.drivers.values_mut() {
                driver.clear_cache(Some(dir));
            }
            log::debug!("Evicted {} after external change", dir.display());
        }
        changed.len()
    }
}
