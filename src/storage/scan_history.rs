//! Scan History Repository: one row per scan attempt in `scan_history`

use std::sync::Arc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use crate::error::{IndexError, Result};
use crate::storage::{now_millis, ScanHistoryEntry, ScanHistoryUpdate, ScanStatus, StorageService};

const SELECT_COLUMNS: &str = "id, directory, started_at, completed_at, files_scanned, status";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ScanHistoryEntry> {
    let status: String = row.get(5)?;
    Ok(ScanHistoryEntry {
        id: row.get(0)?,
        directory: row.get(1)?,
        started_at: row.get(2)?,
        completed_at: row.get(3)?,
        files_scanned: row.get(4)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
        })?,
    })
}

#[derive(Clone)]
pub struct ScanHistoryRepository {
    storage: Arc<StorageService>,
}

impl ScanHistoryRepository {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self { storage }
    }

    /// Opens a `running` entry for `directory` and returns its id.
    pub fn create(&self, directory: &str) -> Result<i64> {
        let id = self.storage.with_connection(|conn| {
            Ok(conn.query_row(
                "INSERT INTO scan_history (directory, started_at, files_scanned, status)
                 VALUES (?1, ?2, 0, ?3)
                 RETURNING id",
                params![directory, now_millis(), ScanStatus::Running.as_str()],
                |row| row.get(0),
            )?)
        })?;
        tracing::debug!("[ScanHistory] Opened entry {} for {}", id, directory);
        Ok(id)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<ScanHistoryEntry>> {
        self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM scan_history WHERE id = ?1"),
                    params![id],
                    entry_from_row,
                )
                .optional()?)
        })
    }

    /// Applies only the supplied fields. Status changes are only accepted
    /// while the entry is still `running`; a finished entry is never re-opened.
    pub fn update(&self, id: i64, changes: &ScanHistoryUpdate) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        if changes.status == Some(ScanStatus::Running) {
            return Err(IndexError::State(format!("scan history entry {id} cannot be set back to running")));
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(completed_at) = changes.completed_at {
            sets.push("completed_at = ?");
            values.push(Value::Integer(completed_at));
        }
        if let Some(files_scanned) = changes.files_scanned {
            sets.push("files_scanned = ?");
            values.push(Value::Integer(files_scanned as i64));
        }
        if let Some(status) = changes.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }

        values.push(Value::Integer(id));
        let mut sql = format!("UPDATE scan_history SET {} WHERE id = ?", sets.join(", "));
        if changes.status.is_some() {
            sql.push_str(" AND status = 'running'");
        }

        self.storage.with_connection(|conn| {
            let rows = conn.execute(&sql, params_from_iter(values.iter()))?;
            if rows == 0 && changes.status.is_some() {
                let exists: bool = conn
                    .query_row("SELECT 1 FROM scan_history WHERE id = ?1", params![id], |_| Ok(true))
                    .optional()?
                    .unwrap_or(false);
                if exists {
                    return Err(IndexError::State(format!("scan history entry {id} is already finished")));
                }
            }
            Ok(rows > 0)
        })
    }

    /// Entries for one directory, newest first.
    pub fn find_by_directory(&self, directory: &str) -> Result<Vec<ScanHistoryEntry>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM scan_history WHERE directory = ?1 ORDER BY started_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![directory], entry_from_row)?;
            let mut results = Vec::new();
            for r in rows { results.push(r?); }
            Ok(results)
        })
    }

    pub fn get_recent(&self, limit: usize) -> Result<Vec<ScanHistoryEntry>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM scan_history ORDER BY started_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], entry_from_row)?;
            let mut results = Vec::new();
            for r in rows { results.push(r?); }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, ScanHistoryRepository) {
        let dir = tempdir().unwrap();
        let storage = StorageService::open(&StorageConfig::with_db_path(dir.path().join("index.db")).without_vectors())
            .unwrap();
        (dir, ScanHistoryRepository::new(storage))
    }

    #[test]
    fn test_create_starts_running() {
        let (_dir, repo) = setup();
        let id = repo.create("/home/user/photos").unwrap();
        let entry = repo.find_by_id(id).unwrap().unwrap();

        assert_eq!(entry.directory, "/home/user/photos");
        assert_eq!(entry.status, ScanStatus::Running);
        assert_eq!(entry.files_scanned, 0);
        assert!(entry.completed_at.is_none());
        assert!(entry.started_at > 0);
    }

    #[test]
    fn test_progress_then_finish() {
        let (_dir, repo) = setup();
        let id = repo.create("/data").unwrap();

        assert!(repo.update(id, &ScanHistoryUpdate { files_scanned: Some(40), ..Default::default() }).unwrap());
        assert_eq!(repo.find_by_id(id).unwrap().unwrap().status, ScanStatus::Running);

        assert!(repo.update(id, &ScanHistoryUpdate::finish(ScanStatus::Completed, 42, 123)).unwrap());
        let entry = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Completed);
        assert_eq!(entry.files_scanned, 42);
        assert_eq!(entry.completed_at, Some(123));
    }

    #[test]
    fn test_finished_entry_is_never_reopened() {
        let (_dir, repo) = setup();
        let id = repo.create("/data").unwrap();
        repo.update(id, &ScanHistoryUpdate::finish(ScanStatus::Cancelled, 0, 1)).unwrap();

        let err = repo.update(id, &ScanHistoryUpdate::finish(ScanStatus::Completed, 5, 2)).unwrap_err();
        assert!(matches!(err, IndexError::State(_)));

        let err = repo
            .update(id, &ScanHistoryUpdate { status: Some(ScanStatus::Running), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, IndexError::State(_)));

        assert_eq!(repo.find_by_id(id).unwrap().unwrap().status, ScanStatus::Cancelled);
    }

    #[test]
    fn test_update_missing_or_empty() {
        let (_dir, repo) = setup();
        assert!(!repo.update(77, &ScanHistoryUpdate::finish(ScanStatus::Failed, 0, 1)).unwrap());
        let id = repo.create("/data").unwrap();
        assert!(!repo.update(id, &ScanHistoryUpdate::default()).unwrap());
    }

    #[test]
    fn test_browse_history() {
        let (_dir, repo) = setup();
        let a1 = repo.create("/a").unwrap();
        repo.create("/b").unwrap();
        let a2 = repo.create("/a").unwrap();

        let for_a: Vec<_> = repo.find_by_directory("/a").unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(for_a, vec![a2, a1]);

        let recent = repo.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, a2);
        assert!(repo.find_by_directory("/c").unwrap().is_empty());
    }
}
