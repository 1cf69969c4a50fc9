//! Command surface consumed by the presentation layer
//!
//! Every command returns either a structured value or a sanitized message.
//! Full errors are logged here and never cross the boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::config::StorageConfig;
use crate::engine::{EventSink, ScanEvent, ScanOrchestrator, ScanOutcome, Searcher};
use crate::error::Result;
use crate::storage::{
    FileRecord, FileRepository, Modality, ScanHistoryEntry, ScanHistoryRepository, SearchCriteria,
    SimilarityHit, StorageService, VectorStore,
};

/// How many history rows `get_scan_history` returns.
pub const RECENT_HISTORY_LIMIT: usize = 50;

pub type CommandResult<T> = std::result::Result<T, String>;

pub struct App {
    storage: Arc<StorageService>,
    files: FileRepository,
    history: ScanHistoryRepository,
    vectors: VectorStore,
    orchestrator: ScanOrchestrator,
    events: Arc<dyn EventSink>,
}

fn respond<T>(command: &str, result: Result<T>) -> CommandResult<T> {
    result.map_err(|e| {
        tracing::error!("[Commands] {} failed: {}", command, e);
        e.sanitized()
    })
}

impl App {
    /// Opens storage and wires every component. Failure here is fatal.
    pub fn bootstrap(config: &StorageConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let storage = StorageService::open(config)?;
        Ok(Self {
            files: FileRepository::new(storage.clone()),
            history: ScanHistoryRepository::new(storage.clone()),
            vectors: VectorStore::new(storage.clone()),
            orchestrator: ScanOrchestrator::new(storage.clone(), events.clone()),
            storage,
            events,
        })
    }

    pub fn files(&self) -> &FileRepository {
        &self.files
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Turns the directory the user picked into a canonical absolute path.
    /// `None` in, or anything that is not a directory, means "none chosen".
    pub fn select_directory(&self, candidate: Option<&Path>) -> Option<PathBuf> {
        let candidate = candidate?;
        match std::fs::canonicalize(candidate) {
            Ok(path) if path.is_dir() => Some(path),
            Ok(path) => {
                tracing::warn!("[Commands] Not a directory: {}", path.display());
                None
            }
            Err(e) => {
                tracing::warn!("[Commands] Cannot resolve {}: {}", candidate.display(), e);
                None
            }
        }
    }

    pub async fn scan_directory(&self, directory: impl AsRef<Path>) -> ScanOutcome {
        self.orchestrator.scan_directory(directory).await
    }

    /// Cancels every active scan.
    pub fn cancel_scan(&self) {
        self.orchestrator.cancel_all();
    }

    pub fn cancel_scan_by_id(&self, scan_id: u64) -> bool {
        self.orchestrator.cancel(scan_id)
    }

    pub fn active_scans(&self) -> Vec<u64> {
        self.orchestrator.active_scans()
    }

    pub fn search_files(&self, criteria: &SearchCriteria) -> CommandResult<Vec<FileRecord>> {
        respond("search_files", self.files.search(criteria))
    }

    pub fn get_file_metadata(&self, id: i64) -> CommandResult<Option<FileRecord>> {
        respond("get_file_metadata", self.files.find_by_id(id))
    }

    pub fn get_scan_history(&self) -> CommandResult<Vec<ScanHistoryEntry>> {
        respond("get_scan_history", self.history.get_recent(RECENT_HISTORY_LIMIT))
    }

    pub fn search_similar_images(&self, vector: &[f32], limit: usize) -> CommandResult<Vec<SimilarityHit>> {
        let hits = self
            .vectors
            .search(Modality::Image, vector, limit)
            .and_then(|hits| Searcher::hydrate(&self.files, hits));
        respond("search_similar_images", hits)
    }

    pub fn search_similar_text(&self, vector: &[f32], limit: usize) -> CommandResult<Vec<SimilarityHit>> {
        let hits = self.vectors.search_similar(vector, limit);
        respond("search_similar_text", Searcher::hydrate(&self.files, hits))
    }

    /// Removes a file record and, best-effort, its embeddings.
    pub fn delete_file(&self, id: i64) -> CommandResult<bool> {
        let deleted = respond("delete_file", self.files.delete(id))?;
        if deleted {
            self.vectors.remove_embeddings(id);
        }
        Ok(deleted)
    }

    pub fn get_app_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Pushes an application-level failure to the presentation layer.
    pub fn report_error(&self, message: impl Into<String>) {
        self.events.emit(ScanEvent::AppError { error: message.into() });
    }

    /// Signals running scans and releases the database.
    pub fn close(&self) -> Result<()> {
        self.orchestrator.cancel_all();
        self.storage.close()
    }
}
