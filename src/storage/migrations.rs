//! Forward-only schema migrations
//!
//! Each migration runs inside its own transaction together with the
//! version bump, so a failing batch leaves no partial schema behind.

use rusqlite::Connection;
use crate::error::Result;
use crate::storage::connection::{read_meta, write_meta};

pub const SCHEMA_VERSION_KEY: &str = "schema_version";

pub const TEXT_EMBEDDING_DIM: usize = 384;
pub const IMAGE_EMBEDDING_DIM: usize = 512;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: String,
}

/// Bootstraps the key/value table the schema version lives in.
pub const META_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS app_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
"#;

const CREATE_FILES: &str = r#"
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        mime_type TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        modified_at INTEGER NOT NULL,
        hashes TEXT NOT NULL DEFAULT '[]',
        metadata TEXT NOT NULL DEFAULT '{}',
        indexed_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_files_mime_type ON files(mime_type);
    CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
"#;

const CREATE_SCAN_HISTORY: &str = r#"
    CREATE TABLE IF NOT EXISTS scan_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        directory TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        completed_at INTEGER,
        files_scanned INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'running'
            CHECK (status IN ('running', 'completed', 'failed', 'cancelled'))
    );

    CREATE INDEX IF NOT EXISTS idx_scan_history_directory ON scan_history(directory);
    CREATE INDEX IF NOT EXISTS idx_scan_history_status ON scan_history(status);
"#;

/// Core schema, ordered by version.
pub fn core_migrations() -> Vec<Migration> {
    vec![
        Migration { version: 1, name: "create_files", sql: CREATE_FILES.to_string() },
        Migration { version: 2, name: "create_scan_history", sql: CREATE_SCAN_HISTORY.to_string() },
    ]
}

/// Embedding tables, only created when the vec0 module is available.
pub fn vector_migration(version: u32) -> Migration {
    Migration {
        version,
        name: "create_embedding_tables",
        sql: format!(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS text_embeddings USING vec0(
                file_id INTEGER PRIMARY KEY,
                embedding float[{TEXT_EMBEDDING_DIM}]
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS image_embeddings USING vec0(
                file_id INTEGER PRIMARY KEY,
                embedding float[{IMAGE_EMBEDDING_DIM}]
            );
            "#
        ),
    }
}

/// Full migration list for this instance. The vector migration takes the
/// next version after the core list.
pub fn migration_plan(vector_capable: bool) -> Vec<Migration> {
    let mut plan = core_migrations();
    if vector_capable {
        let next = plan.last().map(|m| m.version + 1).unwrap_or(1);
        plan.push(vector_migration(next));
    }
    plan
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(read_meta(conn, SCHEMA_VERSION_KEY)?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0))
}

/// Applies every migration newer than the recorded version. Returns how many ran.
pub fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    conn.execute_batch(META_TABLE_SQL)?;

    let start = current_version(conn)?;
    let mut version = start;
    let mut applied = 0;

    for migration in migrations.iter().filter(|m| m.version > start) {
        tracing::info!(
            "[Storage] Applying migration {} ({})",
            migration.version,
            migration.name
        );

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql)?;
        write_meta(&tx, SCHEMA_VERSION_KEY, &migration.version.to_string())?;
        tx.commit()?;

        version = migration.version;
        applied += 1;
    }

    if applied == 0 {
        tracing::debug!("[Storage] Schema up to date at version {}", version);
    }

    Ok(applied)
}
