//! Vector Store: per-file embeddings over sqlite-vec
//!
//! Two vec0 tables, one per modality, keyed by file id:
//! - `text_embeddings` (384 dims)
//! - `image_embeddings` (512 dims)
//!
//! The backend is chosen once from the storage capability flag. When vectors
//! are unavailable every write is a logged no-op and every search is empty.

use std::sync::Arc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::storage::{FileRecord, StorageService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    fn table(&self) -> &'static str {
        match self {
            Modality::Text => "text_embeddings",
            Modality::Image => "image_embeddings",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Modality::Text => "text",
            Modality::Image => "image",
        })
    }
}

/// Nearest-neighbor result. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityHit {
    pub file_id: i64,
    pub distance: f32,
    pub modality: Modality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRecord>,
}

trait VectorBackend: Send + Sync {
    fn upsert(&self, modality: Modality, file_id: i64, vector: &[f32]) -> Result<()>;
    fn nearest(&self, modality: Modality, query: &[f32], limit: usize) -> Result<Vec<SimilarityHit>>;
    fn remove(&self, file_id: i64) -> Result<()>;
    fn contains(&self, file_id: i64, modality: Modality) -> Result<bool>;
}

struct SqliteVecBackend {
    storage: Arc<StorageService>,
}

impl VectorBackend for SqliteVecBackend {
    fn upsert(&self, modality: Modality, file_id: i64, vector: &[f32]) -> Result<()> {
        let bytes: Vec<u8> = bytemuck::cast_slice(vector).to_vec();
        let table = modality.table();

        // vec0 has no ON CONFLICT support, so replace by delete + insert.
        self.storage.with_transaction(|tx| {
            tx.execute(&format!("DELETE FROM {table} WHERE file_id = ?1"), params![file_id])?;
            tx.execute(
                &format!("INSERT INTO {table} (file_id, embedding) VALUES (?1, ?2)"),
                params![file_id, bytes],
            )?;
            Ok(())
        })
    }

    fn nearest(&self, modality: Modality, query: &[f32], limit: usize) -> Result<Vec<SimilarityHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let bytes: Vec<u8> = bytemuck::cast_slice(query).to_vec();
        let sql = format!(
            "SELECT file_id, distance FROM {} WHERE embedding MATCH ?1 AND k = ?2 ORDER BY distance ASC",
            modality.table()
        );

        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![bytes, limit as i64], |row| {
                Ok(SimilarityHit {
                    file_id: row.get(0)?,
                    distance: row.get::<_, f64>(1)? as f32,
                    modality,
                    file: None,
                })
            })?;
            let mut results = Vec::new();
            for r in rows { results.push(r?); }
            Ok(results)
        })
    }

    fn remove(&self, file_id: i64) -> Result<()> {
        self.storage.with_transaction(|tx| {
            for modality in [Modality::Text, Modality::Image] {
                tx.execute(&format!("DELETE FROM {} WHERE file_id = ?1", modality.table()), params![file_id])?;
            }
            Ok(())
        })
    }

    fn contains(&self, file_id: i64, modality: Modality) -> Result<bool> {
        self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT 1 FROM {} WHERE file_id = ?1", modality.table()),
                    params![file_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }
}

/// Stand-in used when the vec0 module was not detected at startup.
struct DisabledBackend;

impl VectorBackend for DisabledBackend {
    fn upsert(&self, modality: Modality, file_id: i64, _vector: &[f32]) -> Result<()> {
        tracing::debug!("[VectorStore] Vector search unavailable, dropping {} embedding for file {}", modality, file_id);
        Ok(())
    }

    fn nearest(&self, modality: Modality, _query: &[f32], _limit: usize) -> Result<Vec<SimilarityHit>> {
        tracing::debug!("[VectorStore] Vector search unavailable, empty {} results", modality);
        Ok(Vec::new())
    }

    fn remove(&self, file_id: i64) -> Result<()> {
        tracing::debug!("[VectorStore] Vector search unavailable, nothing to remove for file {}", file_id);
        Ok(())
    }

    fn contains(&self, _file_id: i64, _modality: Modality) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Clone)]
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    available: bool,
}

impl VectorStore {
    pub fn new(storage: Arc<StorageService>) -> Self {
        if storage.vector_capable() {
            Self { backend: Arc::new(SqliteVecBackend { storage }), available: true }
        } else {
            tracing::info!("[VectorStore] Running without vector search");
            Self { backend: Arc::new(DisabledBackend), available: false }
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Replaces any previous text embedding for `file_id`.
    pub fn add_text_embedding(&self, file_id: i64, vector: &[f32]) -> Result<()> {
        self.backend.upsert(Modality::Text, file_id, vector)
    }

    /// Replaces any previous image embedding for `file_id`.
    pub fn add_image_embedding(&self, file_id: i64, vector: &[f32]) -> Result<()> {
        self.backend.upsert(Modality::Image, file_id, vector)
    }

    /// Nearest neighbors within a single modality, ascending distance.
    pub fn search(&self, modality: Modality, query: &[f32], limit: usize) -> Result<Vec<SimilarityHit>> {
        self.backend.nearest(modality, query, limit)
    }

    /// Text matches first; if they do not fill `limit`, image matches take the
    /// remaining slots. The union is re-sorted by distance and truncated.
    ///
    /// Either phase failing (e.g. the query length does not fit that table)
    /// only drops that phase's results.
    pub fn search_similar(&self, query: &[f32], limit: usize) -> Vec<SimilarityHit> {
        if limit == 0 {
            return Vec::new();
        }

        let mut hits = self.search_or_empty(Modality::Text, query, limit);

        if hits.len() < limit {
            let remaining = limit - hits.len();
            let extra = self.search_or_empty(Modality::Image, query, remaining);
            hits = merge_hits(hits, extra, limit);
        }

        hits
    }

    fn search_or_empty(&self, modality: Modality, query: &[f32], limit: usize) -> Vec<SimilarityHit> {
        self.backend.nearest(modality, query, limit).unwrap_or_else(|e| {
            tracing::warn!("[VectorStore] {} similarity search failed: {}", modality, e);
            Vec::new()
        })
    }

    /// Drops both embeddings for `file_id`. Failures are logged and swallowed.
    pub fn remove_embeddings(&self, file_id: i64) {
        if let Err(e) = self.backend.remove(file_id) {
            tracing::warn!("[VectorStore] Failed to remove embeddings for file {}: {}", file_id, e);
        }
    }

    pub fn has_embedding(&self, file_id: i64, modality: Modality) -> Result<bool> {
        self.backend.contains(file_id, modality)
    }
}

/// Merges two hit lists, keeping the closest hit per file, ascending by distance.
fn merge_hits(primary: Vec<SimilarityHit>, secondary: Vec<SimilarityHit>, limit: usize) -> Vec<SimilarityHit> {
    let mut merged: Vec<SimilarityHit> = Vec::with_capacity(primary.len() + secondary.len());

    for hit in primary.into_iter().chain(secondary) {
        match merged.iter_mut().find(|h| h.file_id == hit.file_id) {
            Some(existing) if hit.distance < existing.distance => *existing = hit,
            Some(_) => {}
            None => merged.push(hit),
        }
    }

    merged.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    merged.truncate(limit);
    merged
}
