//! Storage configuration
//!
//! Resolved from the environment at startup:
//! - `FILEDEX_DB_PATH`: database file location
//! - `FILEDEX_DISABLE_VECTOR`: force-disable vector search
//! - `FILEDEX_VECTOR_EXTENSION`: explicit vector extension to load

use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "FILEDEX_DB_PATH";
pub const ENV_DISABLE_VECTOR: &str = "FILEDEX_DISABLE_VECTOR";
pub const ENV_VECTOR_EXTENSION: &str = "FILEDEX_VECTOR_EXTENSION";

/// Only native libraries may be handed to the extension loader.
pub const ALLOWED_EXTENSION_SUFFIXES: &[&str] = &[".so", ".dylib", ".dll"];

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
    pub vector_enabled: bool,
    pub vector_extension: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            vector_enabled: true,
            vector_extension: None,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var_os(ENV_DB_PATH)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let vector_enabled = !std::env::var(ENV_DISABLE_VECTOR)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let vector_extension = std::env::var_os(ENV_VECTOR_EXTENSION)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self { db_path, vector_enabled, vector_extension }
    }

    /// Config pointing at an explicit database file, everything else default.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self { db_path: Some(path.into()), ..Self::default() }
    }

    pub fn without_vectors(mut self) -> Self {
        self.vector_enabled = false;
        self
    }

    /// Explicit path, else `<data dir>/filedex/index.db`.
    pub fn resolve_db_path(&self) -> Option<PathBuf> {
        self.resolve_db_path_with(dirs::data_dir())
    }

    /// Same as `resolve_db_path` against a given data directory.
    pub fn resolve_db_path_with(&self, data_dir: Option<PathBuf>) -> Option<PathBuf> {
        self.db_path
            .clone()
            .or_else(|| data_dir.map(|d| d.join("filedex").join("index.db")))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Checks a vector extension path against the suffix allow-list.
pub fn is_allowed_extension(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return false,
    };
    ALLOWED_EXTENSION_SUFFIXES.iter().any(|suffix| name.ends_with(suffix) && name.len() > suffix.len())
}
