//! File Repository: typed access to the `files` table
//!
//! - Upsert by path (re-scans update, never duplicate)
//! - Lookups by id and path
//! - Structured search with optional, ANDed criteria
//! - Partial updates touching only supplied fields

use std::sync::Arc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use crate::error::Result;
use crate::storage::{
    now_millis, FileDescriptor, FileMetadata, FileRecord, FileUpdate, SearchCriteria, StorageService,
};

const SELECT_COLUMNS: &str =
    "id, path, name, size, mime_type, created_at, modified_at, hashes, metadata, indexed_at";

const NEWEST_FIRST: &str = "ORDER BY created_at DESC, id DESC";

/// Row → domain mapping. JSON columns that fail to decode surface as conversion errors.
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let hashes: String = row.get(7)?;
    let metadata: String = row.get(8)?;

    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        size: row.get(3)?,
        mime_type: row.get(4)?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
        hashes: serde_json::from_str(&hashes).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?,
        metadata: serde_json::from_str::<FileMetadata>(&metadata).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?,
        indexed_at: row.get(9)?,
    })
}

/// Upserts one descriptor on an already-borrowed connection and returns its id.
pub(crate) fn upsert_descriptor(conn: &Connection, file: &FileDescriptor) -> Result<i64> {
    let hashes = serde_json::to_string(&file.hashes)?;
    let metadata = serde_json::to_string(&file.metadata)?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO files (path, name, size, mime_type, created_at, modified_at, hashes, metadata, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(path) DO UPDATE SET
             name = excluded.name,
             size = excluded.size,
             mime_type = excluded.mime_type,
             created_at = excluded.created_at,
             modified_at = excluded.modified_at,
             hashes = excluded.hashes,
             metadata = excluded.metadata,
             indexed_at = excluded.indexed_at
         RETURNING id",
    )?;

    let id = stmt.query_row(
        params![
            file.path,
            file.name,
            file.size,
            file.mime_type,
            file.created_at,
            file.modified_at,
            hashes,
            metadata,
            now_millis(),
        ],
        |row| row.get(0),
    )?;

    Ok(id)
}

/// Escapes LIKE wildcards so user text matches literally.
fn like_pattern(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

/// Builds the WHERE/LIMIT tail and its bound values for a search.
fn build_search_query(criteria: &SearchCriteria) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(mime_types) = criteria.mime_types.as_ref().filter(|m| !m.is_empty()) {
        let placeholders = vec!["?"; mime_types.len()].join(", ");
        clauses.push(format!("mime_type IN ({placeholders})"));
        values.extend(mime_types.iter().map(|m| Value::Text(m.clone())));
    }
    // Sizes are stored as INTEGER; bounds past i64::MAX cannot be met (min) or always are (max).
    match criteria.size_min.map(i64::try_from) {
        Some(Ok(min)) => {
            clauses.push("size >= ?".to_string());
            values.push(Value::Integer(min));
        }
        Some(Err(_)) => clauses.push("0 = 1".to_string()),
        None => {}
    }
    if let Some(Ok(max)) = criteria.size_max.map(i64::try_from) {
        clauses.push("size <= ?".to_string());
        values.push(Value::Integer(max));
    }
    if let Some(after) = criteria.created_after {
        clauses.push("created_at >= ?".to_string());
        values.push(Value::Integer(after));
    }
    if let Some(before) = criteria.created_before {
        clauses.push("created_at <= ?".to_string());
        values.push(Value::Integer(before));
    }
    if let Some(text) = criteria.text.as_deref().filter(|t| !t.is_empty()) {
        clauses.push("(name LIKE ? ESCAPE '\\' OR path LIKE ? ESCAPE '\\')".to_string());
        let pattern = like_pattern(text);
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM files");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push(' ');
    sql.push_str(NEWEST_FIRST);

    match (criteria.limit, criteria.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(limit as i64));
            values.push(Value::Integer(offset.unwrap_or(0) as i64));
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            values.push(Value::Integer(offset as i64));
        }
        (None, None) => {}
    }

    (sql, values)
}

#[derive(Clone)]
pub struct FileRepository {
    storage: Arc<StorageService>,
}

impl FileRepository {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self { storage }
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM files WHERE id = ?1"),
                    params![id],
                    record_from_row,
                )
                .optional()?)
        })
    }

    pub fn find_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM files WHERE path = ?1"),
                    params![path],
                    record_from_row,
                )
                .optional()?)
        })
    }

    /// Every record, newest first.
    pub fn find_all(&self) -> Result<Vec<FileRecord>> {
        self.search(&SearchCriteria::default())
    }

    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<FileRecord>> {
        let (sql, values) = build_search_query(criteria);
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), record_from_row)?;
            let mut results = Vec::new();
            for r in rows { results.push(r?); }
            Ok(results)
        })
    }

    pub fn insert(&self, file: &FileDescriptor) -> Result<i64> {
        let id = self.storage.with_connection(|conn| upsert_descriptor(conn, file))?;
        tracing::debug!("[FileRepository] Upserted {} (id: {})", file.path, id);
        Ok(id)
    }

    /// All-or-nothing insert of a batch inside one transaction.
    pub fn batch_insert(&self, files: &[FileDescriptor]) -> Result<Vec<i64>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.storage.with_transaction(|tx| {
            files.iter().map(|file| upsert_descriptor(tx, file)).collect::<Result<Vec<_>>>()
        })?;

        tracing::debug!("[FileRepository] Batch upserted {} files", ids.len());
        Ok(ids)
    }

    /// Writes only the fields present in `changes`. Returns whether a row was touched;
    /// an empty update is a no-op.
    pub fn update(&self, id: i64, changes: &FileUpdate) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(path) = &changes.path {
            sets.push("path = ?");
            values.push(Value::Text(path.clone()));
        }
        if let Some(name) = &changes.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(size) = changes.size {
            sets.push("size = ?");
            values.push(Value::Integer(size as i64));
        }
        if let Some(mime_type) = &changes.mime_type {
            sets.push("mime_type = ?");
            values.push(Value::Text(mime_type.clone()));
        }
        if let Some(created_at) = changes.created_at {
            sets.push("created_at = ?");
            values.push(Value::Integer(created_at));
        }
        if let Some(modified_at) = changes.modified_at {
            sets.push("modified_at = ?");
            values.push(Value::Integer(modified_at));
        }
        if let Some(hashes) = &changes.hashes {
            sets.push("hashes = ?");
            values.push(Value::Text(serde_json::to_string(hashes)?));
        }
        if let Some(metadata) = &changes.metadata {
            sets.push("metadata = ?");
            values.push(Value::Text(serde_json::to_string(metadata)?));
        }

        values.push(Value::Integer(id));
        let sql = format!("UPDATE files SET {} WHERE id = ?", sets.join(", "));

        let rows = self
            .storage
            .with_connection(|conn| Ok(conn.execute(&sql, params_from_iter(values.iter()))?))?;
        Ok(rows > 0)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .storage
            .with_connection(|conn| Ok(conn.execute("DELETE FROM files WHERE id = ?1", params![id])?))?;
        tracing::debug!("[FileRepository] Deleted file id {} (rows affected: {})", id, rows);
        Ok(rows > 0)
    }

    pub fn delete_by_path(&self, path: &str) -> Result<bool> {
        let rows = self
            .storage
            .with_connection(|conn| Ok(conn.execute("DELETE FROM files WHERE path = ?1", params![path])?))?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<u64> {
        self.storage
            .with_connection(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, FileRepository, Arc<StorageService>) {
        let dir = tempdir().unwrap();
        let storage = StorageService::open(&StorageConfig::with_db_path(dir.path().join("index.db")).without_vectors())
            .unwrap();
        (dir, FileRepository::new(storage.clone()), storage)
    }

    fn descriptor(path: &str, mime: &str, size: u64, created_at: i64) -> FileDescriptor {
        let name = path.rsplit('/').next().unwrap().to_string();
        let mut metadata = FileMetadata::new();
        metadata.insert("extension".into(), serde_json::json!(name.rsplit('.').next()));
        FileDescriptor {
            path: path.to_string(),
            name,
            size,
            mime_type: mime.to_string(),
            created_at,
            modified_at: created_at + 10,
            hashes: vec!["sha256:abc".to_string()],
            metadata,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (_dir, repo, _) = setup();
        let file = descriptor("/home/user/docs/readme.md", "text/markdown", 1024, 1_000);

        let id = repo.insert(&file).unwrap();
        assert!(id > 0);

        let by_id = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(by_id.name, "readme.md");
        assert_eq!(by_id.size, 1024);
        assert_eq!(by_id.hashes, vec!["sha256:abc".to_string()]);
        assert_eq!(by_id.metadata.get("extension"), Some(&serde_json::json!("md")));

        let by_path = repo.find_by_path(&file.path).unwrap().unwrap();
        assert_eq!(by_path.id, id);

        assert!(repo.find_by_id(id + 100).unwrap().is_none());
        assert!(repo.find_by_path("/nope").unwrap().is_none());
    }

    #[test]
    fn test_insert_same_path_updates() {
        let (_dir, repo, _) = setup();
        let mut file = descriptor("/data/a.txt", "text/plain", 10, 1_000);

        let first = repo.insert(&file).unwrap();
        file.size = 20;
        let second = repo.insert(&file).unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.find_by_id(first).unwrap().unwrap().size, 20);
    }

    #[test]
    fn test_batch_insert_persists_all() {
        let (_dir, repo, _) = setup();
        let files: Vec<_> = (0..5)
            .map(|i| descriptor(&format!("/data/f{i}.txt"), "text/plain", i, i as i64))
            .collect();

        let ids = repo.batch_insert(&files).unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(repo.count().unwrap(), 5);
        assert!(repo.batch_insert(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_batch_insert_is_atomic() {
        let (_dir, repo, storage) = setup();
        storage
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_poison BEFORE INSERT ON files
                     WHEN NEW.name = 'poison.txt'
                     BEGIN SELECT RAISE(ABORT, 'poisoned row'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let files = vec![
            descriptor("/data/one.txt", "text/plain", 1, 1),
            descriptor("/data/two.txt", "text/plain", 2, 2),
            descriptor("/data/poison.txt", "text/plain", 3, 3),
            descriptor("/data/four.txt", "text/plain", 4, 4),
        ];

        assert!(repo.batch_insert(&files).is_err());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_partial_update_touches_only_given_fields() {
        let (_dir, repo, _) = setup();
        let id = repo.insert(&descriptor("/data/report.pdf", "application/pdf", 4096, 5_000)).unwrap();
        let before = repo.find_by_id(id).unwrap().unwrap();

        let changed = repo
            .update(id, &FileUpdate { name: Some("x".to_string()), ..Default::default() })
            .unwrap();
        assert!(changed);

        let after = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(after.name, "x");
        assert_eq!(FileRecord { name: before.name.clone(), ..after.clone() }, before);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let (_dir, repo, _) = setup();
        let id = repo.insert(&descriptor("/data/a.txt", "text/plain", 1, 1)).unwrap();
        assert!(!repo.update(id, &FileUpdate::default()).unwrap());
        assert!(!repo.update(9_999, &FileUpdate::default()).unwrap());
    }

    #[test]
    fn test_search_png_min_size_newest_first() {
        let (_dir, repo, _) = setup();
        repo.insert(&descriptor("/pics/small.png", "image/png", 512, 100)).unwrap();
        repo.insert(&descriptor("/pics/old.png", "image/png", 2048, 200)).unwrap();
        repo.insert(&descriptor("/pics/new.png", "image/png", 4096, 300)).unwrap();
        repo.insert(&descriptor("/pics/photo.jpg", "image/jpeg", 8192, 400)).unwrap();

        let results = repo
            .search(&SearchCriteria {
                mime_types: Some(vec!["image/png".to_string()]),
                size_min: Some(1024),
                ..Default::default()
            })
            .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["new.png", "old.png"]);
        assert!(results.iter().all(|r| r.mime_type == "image/png" && r.size >= 1024));
    }

    #[test]
    fn test_search_text_date_and_paging() {
        let (_dir, repo, _) = setup();
        for i in 0..6 {
            repo.insert(&descriptor(&format!("/notes/note_{i}.txt"), "text/plain", 10, i * 100)).unwrap();
        }
        repo.insert(&descriptor("/other/100%.txt", "text/plain", 10, 50)).unwrap();

        let in_range = repo
            .search(&SearchCriteria {
                text: Some("note_".to_string()),
                created_after: Some(100),
                created_before: Some(400),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_range.len(), 4);

        let page = repo
            .search(&SearchCriteria { text: Some("notes".into()), limit: Some(2), offset: Some(1), ..Default::default() })
            .unwrap();
        let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["note_4.txt", "note_3.txt"]);

        let literal = repo.search(&SearchCriteria { text: Some("100%".into()), ..Default::default() }).unwrap();
        assert_eq!(literal.len(), 1);

        let skipped = repo.search(&SearchCriteria { offset: Some(5), ..Default::default() }).unwrap();
        assert_eq!(skipped.len(), 2);
    }

    #[test]
    fn test_search_size_bounds_beyond_i64() {
        let (_dir, repo, _) = setup();
        repo.insert(&descriptor("/data/small.txt", "text/plain", 10, 1_000)).unwrap();

        let too_big = SearchCriteria { size_min: Some(u64::MAX), ..Default::default() };
        assert!(repo.search(&too_big).unwrap().is_empty());

        let unbounded = SearchCriteria { size_min: Some(1), size_max: Some(u64::MAX), ..Default::default() };
        assert_eq!(repo.search(&unbounded).unwrap().len(), 1);
    }

    #[test]
    fn test_find_all_and_delete() {
        let (_dir, repo, _) = setup();
        let a = repo.insert(&descriptor("/d/a.txt", "text/plain", 1, 1)).unwrap();
        repo.insert(&descriptor("/d/b.txt", "text/plain", 1, 2)).unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "b.txt");

        assert!(repo.delete(a).unwrap());
        assert!(!repo.delete(a).unwrap());
        assert!(repo.delete_by_path("/d/b.txt").unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }
}
