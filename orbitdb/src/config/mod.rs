use crate::driver::{DriverKind, DEFAULT_CONTENT_COLUMN};
use crate::error::{OrbitError, Result};
use crate::paths::{validate_component, validate_sql_identifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Database used by relational drivers that do not name one.
pub const DEFAULT_DATABASE: &str = "app";

/// Storage layout read from a YAML file: where content lives, which drivers
/// exist and which driver each model uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,
    #[serde(default = "default_content_column")]
    pub content_column: String,
    #[serde(default)]
    pub drivers: BTreeMap<String, DriverConfig>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub kind: DriverKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl DriverConfig {
    pub fn file(kind: DriverKind) -> Self {
        DriverConfig {
            kind,
            database: None,
            table: None,
        }
    }

    pub fn sqlite(database: &str, table: &str) -> Self {
        DriverConfig {
            kind: DriverKind::Sqlite,
            database: Some(database.to_string()),
            table: Some(table.to_string()),
        }
    }

    /// Logical database for a relational driver.
    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub driver: String,
    /// Directory under the content root. Defaults to the slugified model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_content_root() -> PathBuf {
    PathBuf::from("content")
}

fn default_content_column() -> String {
    DEFAULT_CONTENT_COLUMN.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut config = StorageConfig {
            content_root: default_content_root(),
            content_column: default_content_column(),
            drivers: BTreeMap::new(),
            models: BTreeMap::new(),
        };
        config.add_default_drivers();
        config
    }
}

impl StorageConfig {
    /// Config for a content root with only the built-in file drivers.
    pub fn for_root(content_root: impl Into<PathBuf>) -> Self {
        StorageConfig {
            content_root: content_root.into(),
            ..StorageConfig::default()
        }
    }

    /// Read a config file. A relative `content_root` is resolved against the
    /// directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;

        if config.content_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.content_root = base.join(&config.content_root);
        }

        log::debug!(
            "Loaded storage config {} ({} drivers, {} models)",
            path.display(),
            config.drivers.len(),
            config.models.len()
        );
        Ok(config)
    }

    /// Parse and validate a YAML config. Relative paths are left as written.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: StorageConfig = serde_yaml::from_str(content)?;
        config.add_default_drivers();
        config.validate()?;
        Ok(config)
    }

    fn add_default_drivers(&mut self) {
        self.drivers
            .entry("markdown".to_string())
            .or_insert_with(|| DriverConfig::file(DriverKind::Markdown));
        self.drivers
            .entry("json".to_string())
            .or_insert_with(|| DriverConfig::file(DriverKind::Json));
    }

    /// Check cross references between models and drivers.
    pub fn validate(&self) -> Result<()> {
        if self.content_column.trim().is_empty() {
            return Err(OrbitError::Config("content_column must not be empty".into()));
        }

        for (name, driver) in &self.drivers {
            if driver.kind != DriverKind::Sqlite {
                continue;
            }
            let Some(table) = driver.table.as_deref() else {
                return Err(OrbitError::Config(format!(
                    "Driver '{name}' uses sqlite but has no table"
                )));
            };
            validate_sql_identifier(table)
                .map_err(|e| OrbitError::Config(format!("Driver '{name}': {e}")))?;
        }

        for (name, model) in &self.models {
            if !self.drivers.contains_key(&model.driver) {
                return Err(OrbitError::Config(format!(
                    "Model '{name}' references unknown driver '{}'",
                    model.driver
                )));
            }
            if let Some(dir) = &model.directory {
                validate_component(dir)?;
            }
        }

        Ok(())
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }
}
