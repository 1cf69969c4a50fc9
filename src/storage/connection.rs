//! Storage Service: owns the single database connection
//!
//! Startup sequence:
//! 1. Resolve the database path and create its parent directory
//! 2. Open the connection and apply pragmas (WAL, NORMAL sync, foreign keys, busy timeout)
//! 3. Best-effort vector extension detection
//! 4. Run pending migrations (plus the embedding tables when vectors are available)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use crate::config::{is_allowed_extension, StorageConfig};
use crate::error::{IndexError, Result};
use crate::storage::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Register sqlite-vec with SQLite so every connection opened afterwards has vec0.
///
/// Registration is process-wide and happens at most once.
fn register_sqlite_vec_extension() -> bool {
    static REGISTERED: OnceLock<bool> = OnceLock::new();

    *REGISTERED.get_or_init(|| {
        let result = unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )))
        };

        if result != rusqlite::ffi::SQLITE_OK {
            tracing::warn!("[Storage] Failed to register bundled sqlite-vec (code {})", result);
            return false;
        }

        tracing::info!("[Storage] Registered bundled sqlite-vec extension");
        true
    })
}

/// Loads a vector extension from an explicit, allow-listed location.
fn load_extension_from(conn: &Connection, path: &Path) -> Result<()> {
    if !is_allowed_extension(path) {
        return Err(IndexError::Configuration(format!(
            "refusing to load vector extension with unexpected suffix: {}",
            path.display()
        )));
    }

    unsafe {
        let _guard = rusqlite::LoadExtensionGuard::new(conn)?;
        conn.load_extension(path, None)?;
    }

    Ok(())
}

/// The vec0 module answers `vec_version()` once it is loaded.
fn probe_vector_support(conn: &Connection) -> bool {
    match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
        Ok(version) => {
            tracing::info!("[Storage] Vector search available (sqlite-vec {})", version);
            true
        }
        Err(e) => {
            tracing::debug!("[Storage] Vector search unavailable: {}", e);
            false
        }
    }
}

pub(crate) fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM app_meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub(crate) fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, crate::storage::now_millis()],
    )?;
    Ok(())
}

/// Single point of truth for the database handle.
///
/// Repositories borrow the connection through `with_connection` /
/// `with_transaction`; they never open one of their own.
pub struct StorageService {
    conn: Mutex<Option<Connection>>,
    db_path: Mutex<Option<PathBuf>>,
    vector_capable: AtomicBool,
}

impl Default for StorageService {
    fn default() -> Self {
        Self {
            conn: Mutex::new(None),
            db_path: Mutex::new(None),
            vector_capable: AtomicBool::new(false),
        }
    }
}

impl StorageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `new` + `initialize`, shared behind an `Arc`.
    pub fn open(config: &StorageConfig) -> Result<Arc<Self>> {
        let storage = Self::new();
        storage.initialize(config)?;
        Ok(Arc::new(storage))
    }

    pub fn initialize(&self, config: &StorageConfig) -> Result<()> {
        self.initialize_with_data_dir(config, dirs::data_dir())
    }

    fn initialize_with_data_dir(&self, config: &StorageConfig, data_dir: Option<PathBuf>) -> Result<()> {
        let db_path = config.resolve_db_path_with(data_dir).ok_or_else(|| {
            IndexError::Configuration("no database path configured and no data directory available".into())
        })?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(IndexError::Io)?;
        }

        // The bundled module must be registered before the connection exists.
        let bundled = config.vector_enabled
            && config.vector_extension.is_none()
            && register_sqlite_vec_extension();

        let mut conn = Connection::open(&db_path).map_err(IndexError::Database)?;

        conn.pragma_update(None, "journal_mode", WAL)?;
        conn.pragma_update(None, "synchronous", NORMAL)?;
        conn.pragma_update(None, "foreign_keys", ON)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let vector_capable = Self::detect_vector_capability(&conn, config, bundled);

        let plan = migrations::migration_plan(vector_capable);
        let applied = migrations::run_migrations(&mut conn, &plan)?;

        tracing::info!(
            "[Storage] Database ready at {} ({} migrations applied, vectors {})",
            db_path.display(),
            applied,
            if vector_capable { "on" } else { "off" }
        );

        self.vector_capable.store(vector_capable, Ordering::SeqCst);
        *self.db_path.lock().map_err(|_| IndexError::State("Poisoned lock".into()))? = Some(db_path);
        *self.conn.lock().map_err(|_| IndexError::State("Poisoned lock".into()))? = Some(conn);

        Ok(())
    }

    fn detect_vector_capability(conn: &Connection, config: &StorageConfig, bundled: bool) -> bool {
        if !config.vector_enabled {
            tracing::info!("[Storage] Vector search disabled by configuration");
            return false;
        }

        if let Some(path) = &config.vector_extension {
            if let Err(e) = load_extension_from(conn, path) {
                tracing::warn!(
                    "[Storage] Could not load requested vector extension {}: {}",
                    path.display(),
                    e
                );
                return false;
            }
        } else if !bundled {
            return false;
        }

        probe_vector_support(conn)
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    pub fn vector_capable(&self) -> bool {
        self.vector_capable.load(Ordering::SeqCst)
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_path.lock().ok().and_then(|p| p.clone())
    }

    /// Runs `op` against the live connection.
    pub fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock().map_err(|_| IndexError::State("Poisoned lock".into()))?;
        let conn = guard.as_ref().ok_or(IndexError::NotInitialized)?;
        op(conn)
    }

    /// Runs `op` inside a transaction: commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut guard = self.conn.lock().map_err(|_| IndexError::State("Poisoned lock".into()))?;
        let conn = guard.as_mut().ok_or(IndexError::NotInitialized)?;

        let tx = conn.transaction()?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| read_meta(conn, key))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| write_meta(conn, key, value))
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.with_connection(migrations::current_version)
    }

    /// Checkpoints the WAL into the main database file, then releases the handle.
    pub fn close(&self) -> Result<()> {
        let conn = {
            let mut guard = self.conn.lock().map_err(|_| IndexError::State("Poisoned lock".into()))?;
            guard.take()
        };

        let Some(conn) = conn else {
            return Ok(());
        };

        let (busy, log_frames, checkpointed): (i64, i64, i64) = conn.query_row(
            "PRAGMA wal_checkpoint(TRUNCATE)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        tracing::debug!(
            "[Storage] WAL checkpoint: busy={} log={} checkpointed={}",
            busy,
            log_frames,
            checkpointed
        );

        conn.close().map_err(|(_, e)| IndexError::Database(e))?;
        tracing::info!("[Storage] Database closed");
        Ok(())
    }
}

// SQL pragma constants
const WAL: &str = "WAL";
const ON: &str = "ON";
const NORMAL: &str = "NORMAL";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp(vectors: bool) -> (tempfile::TempDir, StorageService) {
        let dir = tempdir().unwrap();
        let mut config = StorageConfig::with_db_path(dir.path().join("nested").join("index.db"));
        config.vector_enabled = vectors;
        let storage = StorageService::new();
        storage.initialize(&config).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_initialize_creates_parent_dirs_and_schema() {
        let (dir, storage) = open_temp(false);
        assert!(dir.path().join("nested").join("index.db").exists());
        assert!(storage.is_initialized());
        assert_eq!(storage.schema_version().unwrap(), 2);
        assert!(!storage.vector_capable());
    }

    #[test]
    fn test_pragmas_applied() {
        let (_dir, storage) = open_temp(false);
        storage
            .with_connection(|conn| {
                let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                assert_eq!(mode, "wal");
                let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
                assert_eq!(fk, 1);
                let sync: i64 = conn.query_row("PRAGMA synchronous", [], |r| r.get(0))?;
                assert_eq!(sync, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_unresolvable_path_is_configuration_error() {
        let storage = StorageService::new();
        let err = storage.initialize_with_data_dir(&StorageConfig::default(), None).unwrap_err();
        assert!(matches!(err, IndexError::Configuration(_)));
        assert!(!storage.is_initialized());
    }

    #[test]
    fn test_not_initialized_errors() {
        let storage = StorageService::new();
        let err = storage.with_transaction(|_| Ok(())).unwrap_err();
        assert!(matches!(err, IndexError::NotInitialized));
        assert!(matches!(storage.get_meta("k").unwrap_err(), IndexError::NotInitialized));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (_dir, storage) = open_temp(false);

        let result: Result<()> = storage.with_transaction(|tx| {
            write_meta(tx, "flag", "on")?;
            Err(IndexError::State("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(storage.get_meta("flag").unwrap(), None);

        storage.with_transaction(|tx| write_meta(tx, "flag", "on")).unwrap();
        assert_eq!(storage.get_meta("flag").unwrap(), Some("on".to_string()));
    }

    #[test]
    fn test_meta_upsert() {
        let (_dir, storage) = open_temp(false);
        storage.set_meta("theme", "dark").unwrap();
        storage.set_meta("theme", "light").unwrap();
        assert_eq!(storage.get_meta("theme").unwrap(), Some("light".to_string()));

        let rows: i64 = storage
            .with_connection(|c| Ok(c.query_row("SELECT COUNT(*) FROM app_meta WHERE key = 'theme'", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_reopen_keeps_version() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::with_db_path(dir.path().join("index.db")).without_vectors();

        let first = StorageService::new();
        first.initialize(&config).unwrap();
        first.set_meta("marker", "1").unwrap();
        first.close().unwrap();
        assert!(!first.is_initialized());

        let second = StorageService::new();
        second.initialize(&config).unwrap();
        assert_eq!(second.schema_version().unwrap(), 2);
        assert_eq!(second.get_meta("marker").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_close_truncates_wal() {
        let (dir, storage) = open_temp(false);
        storage.set_meta("k", "v").unwrap();
        storage.close().unwrap();

        let wal = dir.path().join("nested").join("index.db-wal");
        let wal_len = std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        assert_eq!(wal_len, 0);
        assert!(matches!(storage.with_connection(|_| Ok(())).unwrap_err(), IndexError::NotInitialized));
    }

    #[test]
    fn test_rejected_extension_path_disables_vectors() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            db_path: Some(dir.path().join("index.db")),
            vector_enabled: true,
            vector_extension: Some(dir.path().join("payload.txt")),
        };
        let storage = StorageService::new();
        storage.initialize(&config).unwrap();
        assert!(!storage.vector_capable());
        assert_eq!(storage.schema_version().unwrap(), 2);
    }

    #[test]
    fn test_missing_extension_is_not_fatal() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            db_path: Some(dir.path().join("index.db")),
            vector_enabled: true,
            vector_extension: Some(dir.path().join("does_not_exist.so")),
        };
        let storage = StorageService::new();
        storage.initialize(&config).unwrap();
        assert!(!storage.vector_capable());
    }

    #[test]
    fn test_bundled_vectors_add_embedding_tables() {
        let (_dir, storage) = open_temp(true);
        assert!(storage.vector_capable());
        assert_eq!(storage.schema_version().unwrap(), 3);

        let count: i64 = storage
            .with_connection(|c| {
                Ok(c.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('text_embeddings', 'image_embeddings')",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
