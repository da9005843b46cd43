use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage driver not registered: {0}")]
    UnknownDriver(String),

    #[error("Database not registered: {0}")]
    UnknownDatabase(String),

    #[error("Invalid path component '{input}': {reason}")]
    InvalidPath { input: String, reason: String },

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl OrbitError {
    /// Configuration and security errors. These point at a setup mistake or a
    /// hostile identifier and should fail the enclosing request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrbitError::Config(_)
                | OrbitError::UnknownDriver(_)
                | OrbitError::UnknownDatabase(_)
                | OrbitError::InvalidPath { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OrbitError>;
