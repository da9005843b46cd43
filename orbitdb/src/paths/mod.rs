// Validation for every untrusted string that ends up in a filesystem path or SQL identifier

use crate::error::{OrbitError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Check that `input` is safe to use as a single path component.
///
/// Rejects rather than cleans: parent traversal (`..`), path separators,
/// home-directory shortcuts (`~`), NUL bytes and empty names.
pub fn validate_component(input: &str) -> Result<()> {
    let reason = if input.is_empty() || input == "." {
        Some("empty path component")
    } else if input.contains("..") {
        Some("parent directory traversal")
    } else if input.contains('/') || input.contains('\\') {
        Some("path separator")
    } else if input.contains('~') {
        Some("home directory shortcut")
    } else if input.contains('\0') {
        Some("NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(OrbitError::InvalidPath {
            input: input.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Join a validated component onto a trusted base directory.
pub fn secure_join(base: &Path, component: &str) -> Result<PathBuf> {
    validate_component(component)?;
    Ok(base.join(component))
}

/// Build `<base>/<id>.<extension>` after validating the record ID.
pub fn record_path(base: &Path, id: &str, extension: &str) -> Result<PathBuf> {
    validate_component(id)?;
    Ok(base.join(format!("{id}.{extension}")))
}

/// Check that `name` can be spliced into SQL as a table or column name.
pub fn validate_sql_identifier(name: &str) -> Result<()> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let re = IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

    if re.is_match(name) {
        Ok(())
    } else {
        Err(OrbitError::InvalidPath {
            input: name.to_string(),
            reason: "not a valid SQL identifier".to_string(),
        })
    }
}

/// Check a column type declaration such as `TEXT`, `INTEGER NOT NULL` or `VARCHAR(255)`.
pub fn validate_sql_type(decl: &str) -> Result<()> {
    static TYPE: OnceLock<Regex> = OnceLock::new();
    let re = TYPE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\d+(,\s*\d+)?\))?( [A-Za-z0-9_' ]+)?$")
            .expect("valid regex")
    });

    if re.is_match(decl.trim()) {
        Ok(())
    } else {
        Err(OrbitError::Config(format!("Unsupported column type: {decl}")))
    }
}
